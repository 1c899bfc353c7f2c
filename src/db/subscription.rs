//! Subscription registry: topic bindings, idempotent creation, publish fan-out.

use crate::error::{Error, Result};
use crate::model::{NewMessage, SubscriptionInfo, SubscriptionName, TopicName};
use crate::telemetry::metrics;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tracing::{debug, warn};

/// Result of creating a subscription.
#[derive(Debug)]
pub enum CreateSubscription {
    /// The subscription did not exist and was created.
    Created(SubscriptionInfo),
    /// A subscription with this name already existed for the same topic.
    Existing(SubscriptionInfo),
}

impl CreateSubscription {
    pub fn info(&self) -> &SubscriptionInfo {
        match self {
            Self::Created(info) | Self::Existing(info) => info,
        }
    }

    pub fn into_info(self) -> SubscriptionInfo {
        match self {
            Self::Created(info) | Self::Existing(info) => info,
        }
    }
}

type SubscriptionRow = (String, String, String, String, i32, DateTime<Utc>);

fn to_info(row: SubscriptionRow) -> SubscriptionInfo {
    let (project, name, topic, queue_name, ack_deadline_seconds, created_at) = row;
    SubscriptionInfo {
        name: SubscriptionName {
            project: project.clone(),
            subscription: name,
        },
        topic: TopicName { project, topic },
        queue_name,
        ack_deadline_seconds,
        created_at,
    }
}

const SELECT_SUBSCRIPTION: &str = "SELECT project, name, topic, queue_name, ack_deadline_seconds, created_at
     FROM subscriptions WHERE project = $1 AND name = $2";

impl super::Db {
    /// Create a subscription bound to `topic`, or reuse an existing one.
    ///
    /// The backing pgmq queue is (re)created either way. An existing
    /// subscription bound to a different topic is a conflict. Reuse keeps
    /// the registered ack deadline even when `ack_deadline_seconds` differs.
    pub async fn create_subscription(
        &self,
        name: &SubscriptionName,
        topic: &TopicName,
        ack_deadline_seconds: i32,
    ) -> Result<CreateSubscription> {
        if name.project != topic.project {
            return Err(Error::Other(format!(
                "subscription {name} and topic {topic} are in different projects"
            )));
        }

        let mut tx = self.pool.begin().await?;

        let inserted: Option<SubscriptionRow> = sqlx::query_as(
            "INSERT INTO subscriptions (project, name, topic, ack_deadline_seconds)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (project, name) DO NOTHING
             RETURNING project, name, topic, queue_name, ack_deadline_seconds, created_at",
        )
        .bind(&name.project)
        .bind(&name.subscription)
        .bind(&topic.topic)
        .bind(ack_deadline_seconds)
        .fetch_optional(&mut *tx)
        .await?;

        let result = match inserted {
            Some(row) => CreateSubscription::Created(to_info(row)),
            None => {
                let existing: SubscriptionRow = sqlx::query_as(SELECT_SUBSCRIPTION)
                    .bind(&name.project)
                    .bind(&name.subscription)
                    .fetch_one(&mut *tx)
                    .await?;
                let info = to_info(existing);
                if info.topic.topic != topic.topic {
                    return Err(Error::SubscriptionConflict {
                        subscription: name.to_string(),
                        existing: info.topic.to_string(),
                        requested: topic.to_string(),
                    });
                }
                if info.ack_deadline_seconds != ack_deadline_seconds {
                    warn!(
                        subscription = %info.name,
                        registered = info.ack_deadline_seconds,
                        requested = ack_deadline_seconds,
                        "keeping the registered ack deadline"
                    );
                }
                CreateSubscription::Existing(info)
            }
        };

        tx.commit().await?;

        let info = result.info();
        self.create_queue(&info.queue_name).await?;
        debug!(
            subscription = %info.name,
            queue = %info.queue_name,
            created = matches!(result, CreateSubscription::Created(_)),
            "subscription ready"
        );
        Ok(result)
    }

    /// Look up a subscription by name.
    pub async fn get_subscription(&self, name: &SubscriptionName) -> Result<SubscriptionInfo> {
        let row: Option<SubscriptionRow> = sqlx::query_as(SELECT_SUBSCRIPTION)
            .bind(&name.project)
            .bind(&name.subscription)
            .fetch_optional(&self.pool)
            .await?;
        row.map(to_info)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Delete a subscription and drop its queue.
    pub async fn delete_subscription(&self, name: &SubscriptionName) -> Result<()> {
        let info = self.get_subscription(name).await?;
        sqlx::query("DELETE FROM subscriptions WHERE project = $1 AND name = $2")
            .bind(&name.project)
            .bind(&name.subscription)
            .execute(&self.pool)
            .await?;
        self.drop_queue(&info.queue_name).await
    }

    /// Subscriptions currently bound to `topic`.
    pub async fn subscriptions_for_topic(&self, topic: &TopicName) -> Result<Vec<SubscriptionInfo>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            "SELECT project, name, topic, queue_name, ack_deadline_seconds, created_at
             FROM subscriptions WHERE project = $1 AND topic = $2
             ORDER BY id",
        )
        .bind(&topic.project)
        .bind(&topic.topic)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(to_info).collect())
    }

    /// Publish a message to every subscription bound to `topic`.
    ///
    /// Returns one message id per subscription. With no subscriptions the
    /// message is dropped and the result is empty.
    pub async fn publish(&self, topic: &TopicName, message: &NewMessage) -> Result<Vec<i64>> {
        let payload = serde_json::to_value(message)?;
        let subscriptions = self.subscriptions_for_topic(topic).await?;

        let mut ids = Vec::with_capacity(subscriptions.len());
        for sub in &subscriptions {
            ids.push(self.send_to_queue(&sub.queue_name, &payload, 0).await?);
        }

        metrics::messages_published().add(
            1,
            &[
                KeyValue::new("topic", topic.topic.clone()),
                KeyValue::new("fanout", ids.len() as i64),
            ],
        );
        Ok(ids)
    }
}
