//! Subscription manager: pull messages from a subscription, hand each one to
//! a handler, and settle it (ack on success, nack on failure).

pub mod manager;
pub mod memory;
pub mod pgmq;

use crate::error::Result;
use crate::model::Message;
use async_trait::async_trait;

pub use manager::{
    ListenStats, StopHandle, Subscriber, SubscriberConfig, SubscriberHandle, Termination,
};
pub use memory::MemoryBackend;
pub use pgmq::PgmqBackend;

/// Lease token for one delivery, used to settle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckId(pub i64);

impl std::fmt::Display for AckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A leased message together with the token that settles it.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub ack_id: AckId,
    pub message: Message,
}

/// Pull-based access to one subscription.
#[async_trait]
pub trait SubscriptionBackend: Send + Sync {
    /// Lease up to `max` messages. Empty when nothing is available.
    async fn pull(&self, max: usize) -> Result<Vec<ReceivedMessage>>;

    /// The message was processed; do not redeliver it.
    async fn ack(&self, ack_id: AckId) -> Result<()>;

    /// The message was not processed; make it available for redelivery.
    async fn nack(&self, ack_id: AckId) -> Result<()>;

    /// Release the subscription. Called once when the listening loop exits.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Processes one delivered message. `Ok` acks it, `Err` nacks it.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: &Message) -> Result<()>;
}
