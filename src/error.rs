//! Error types for envtest-router.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid resource name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("unrecognized severity: {0:?}")]
    InvalidSeverity(String),

    #[error("message is missing required attribute {0:?}")]
    MissingAttribute(&'static str),

    #[error("subscription {subscription} already exists for topic {existing}, not {requested}")]
    SubscriptionConflict {
        subscription: String,
        existing: String,
        requested: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
