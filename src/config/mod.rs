//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast on malformed values.
//! The database URL is wrapped in secrecy::SecretString to prevent log leaks.

pub mod credentials;

use crate::error::{Error, Result};
use crate::model::{SubscriptionName, TopicName};
use secrecy::SecretString;
use std::path::Path;
use std::time::Duration;

pub use credentials::ProjectSource;

/// Topic used when `PUBSUB_TOPIC` is unset or empty.
pub const DEFAULT_TOPIC: &str = "logging-test";

/// Project id used when neither the environment nor credentials name one.
pub const DEFAULT_PROJECT_ID: &str = "MY_PROJECT_ID";

#[derive(Debug)]
pub struct Config {
    /// Subscriber only runs when `ENABLE_SUBSCRIBER` is exactly `true`.
    pub enable_subscriber: bool,
    pub project_id: String,
    pub project_source: ProjectSource,
    pub topic_id: String,
    pub subscription_id: String,
    pub database_url: Option<SecretString>,
    pub listen_timeout: Duration,
    pub ack_deadline_seconds: i32,
    pub nack_delay_seconds: i32,
    pub poll_interval: Duration,
    pub max_messages: usize,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let enable_subscriber = lookup("ENABLE_SUBSCRIBER").as_deref() == Some("true");

        let (project_id, project_source) = resolve_project(&lookup)?;

        let topic_id = lookup("PUBSUB_TOPIC")
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string());
        let subscription_id = lookup("PUBSUB_SUBSCRIPTION")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("{topic_id}-subscriber"));

        let database_url = lookup("DATABASE_URL")
            .filter(|u| !u.is_empty())
            .map(SecretString::from);
        if enable_subscriber && database_url.is_none() {
            return Err(Error::Config(
                "DATABASE_URL is required when ENABLE_SUBSCRIBER=true".to_string(),
            ));
        }

        let ack_deadline_seconds = at_least("ACK_DEADLINE_SECS", parsed_var(&lookup, "ACK_DEADLINE_SECS", 20)?, 1)?;
        let nack_delay_seconds = at_least("NACK_DELAY_SECS", parsed_var(&lookup, "NACK_DELAY_SECS", 1)?, 0)?;
        let poll_interval_ms = at_least("POLL_INTERVAL_MS", parsed_var(&lookup, "POLL_INTERVAL_MS", 500u64)?, 1)?;
        let max_messages = at_least("MAX_MESSAGES", parsed_var(&lookup, "MAX_MESSAGES", 10usize)?, 1)?;

        Ok(Self {
            enable_subscriber,
            project_id,
            project_source,
            topic_id,
            subscription_id,
            database_url,
            listen_timeout: Duration::from_secs(parsed_var(&lookup, "LISTEN_TIMEOUT_SECS", 30)?),
            ack_deadline_seconds,
            nack_delay_seconds,
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_messages,
            otel_endpoint: lookup("OTEL_ENDPOINT").filter(|e| !e.is_empty()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn topic_name(&self) -> Result<TopicName> {
        TopicName::new(&self.project_id, &self.topic_id)
    }

    pub fn subscription_name(&self) -> Result<SubscriptionName> {
        SubscriptionName::new(&self.project_id, &self.subscription_id)
    }

    /// The database URL, or a config error for commands that need one.
    pub fn require_database_url(&self) -> Result<&SecretString> {
        self.database_url
            .as_ref()
            .ok_or_else(|| Error::Config("required environment variable DATABASE_URL is not set".to_string()))
    }
}

fn resolve_project(lookup: &impl Fn(&str) -> Option<String>) -> Result<(String, ProjectSource)> {
    if let Some(project) = lookup("GOOGLE_CLOUD_PROJECT").filter(|p| !p.is_empty()) {
        return Ok((project, ProjectSource::Environment));
    }
    if let Some(path) = lookup("GOOGLE_APPLICATION_CREDENTIALS").filter(|p| !p.is_empty()) {
        if let Some(project) = credentials::service_account_project(Path::new(&path))? {
            return Ok((project, ProjectSource::ServiceAccount(path.into())));
        }
    }
    Ok((DEFAULT_PROJECT_ID.to_string(), ProjectSource::Default))
}

fn parsed_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        None => Ok(default),
    }
}

/// Reject values below `min`. A zero batch size or poll interval would
/// make the listening loop spin, and a zero ack deadline leaves a leased
/// message visible to the next pull.
fn at_least<T>(name: &str, value: T, min: T) -> Result<T>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min {
        return Err(Error::Config(format!("{name}={value} must be at least {min}")));
    }
    Ok(value)
}
