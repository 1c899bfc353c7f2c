//! Core data model.
//!
//! A message is what a subscription delivers: an opaque byte payload plus a
//! string attribute map. Topics and subscriptions are addressed by
//! `(project, id)` pairs.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A message as delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Queue-assigned message id.
    pub id: i64,

    /// Opaque payload. For test requests this is the UTF-8 test name.
    pub data: Vec<u8>,

    /// Free-form string attributes set by the publisher.
    pub attributes: BTreeMap<String, String>,

    /// When the message was enqueued.
    pub publish_time: DateTime<Utc>,

    /// How many times this message has been handed out, starting at 1.
    pub delivery_attempt: i32,
}

impl Message {
    /// Build a first-delivery message from a published payload.
    pub fn received(id: i64, payload: NewMessage) -> Self {
        Self {
            id,
            data: payload.data,
            attributes: payload.attributes,
            publish_time: Utc::now(),
            delivery_attempt: 1,
        }
    }

    /// The payload decoded as UTF-8. Invalid sequences are replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Look up an attribute. Absence is not an error here.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// A message to publish. This is also the JSON shape stored in the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl NewMessage {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// A message whose payload is the given text.
    pub fn text(text: &str) -> Self {
        Self::new(text.as_bytes())
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Resource names
// ---------------------------------------------------------------------------

/// Fully-qualified topic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicName {
    pub project: String,
    pub topic: String,
}

impl TopicName {
    pub fn new(project: &str, topic: &str) -> Result<Self> {
        validate_id(topic)?;
        Ok(Self {
            project: project.to_string(),
            topic: topic.to_string(),
        })
    }
}

impl std::fmt::Display for TopicName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "projects/{}/topics/{}", self.project, self.topic)
    }
}

/// Fully-qualified subscription name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionName {
    pub project: String,
    pub subscription: String,
}

impl SubscriptionName {
    pub fn new(project: &str, subscription: &str) -> Result<Self> {
        validate_id(subscription)?;
        Ok(Self {
            project: project.to_string(),
            subscription: subscription.to_string(),
        })
    }
}

impl std::fmt::Display for SubscriptionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "projects/{}/subscriptions/{}",
            self.project, self.subscription
        )
    }
}

/// A row of the subscription registry.
#[derive(Debug, Clone)]
pub struct SubscriptionInfo {
    pub name: SubscriptionName,
    pub topic: TopicName,
    /// pgmq queue backing this subscription.
    pub queue_name: String,
    pub ack_deadline_seconds: i32,
    pub created_at: DateTime<Utc>,
}

/// Check a topic or subscription id against Pub/Sub naming rules.
fn validate_id(id: &str) -> Result<()> {
    let invalid = |reason| {
        Err(Error::InvalidName {
            name: id.to_string(),
            reason,
        })
    };

    if !(3..=255).contains(&id.len()) {
        return invalid("must be between 3 and 255 characters");
    }
    if !id.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return invalid("must start with a letter");
    }
    if id.starts_with("goog") {
        return invalid("must not start with \"goog\"");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_.~+%".contains(c))
    {
        return invalid("may only contain letters, digits and -_.~+%");
    }
    Ok(())
}
