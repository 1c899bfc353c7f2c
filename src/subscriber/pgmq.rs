//! Subscription backend over a pgmq queue.
//!
//! Pull reads with the subscription's ack deadline as visibility timeout.
//! Ack archives the message; nack resets its visibility so it is
//! redelivered after a delay that doubles with each delivery attempt,
//! capped at the ack deadline.

use super::{AckId, ReceivedMessage, SubscriptionBackend};
use crate::db::Db;
use crate::db::pgmq::PgmqMessage;
use crate::error::Result;
use crate::model::{Message, NewMessage, SubscriptionInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

pub struct PgmqBackend {
    db: Arc<Db>,
    queue_name: String,
    ack_deadline_seconds: i32,
    nack_delay_seconds: i32,
    /// Delivery attempt per outstanding lease, for nack backoff.
    attempts: Mutex<HashMap<i64, i32>>,
}

impl PgmqBackend {
    pub fn new(db: Arc<Db>, subscription: &SubscriptionInfo, nack_delay_seconds: i32) -> Self {
        Self {
            db,
            queue_name: subscription.queue_name.clone(),
            ack_deadline_seconds: subscription.ack_deadline_seconds,
            nack_delay_seconds,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn take_attempt(&self, ack_id: AckId) -> i32 {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&ack_id.0)
            .unwrap_or(1)
    }
}

/// Redelivery delay for a nack on the given delivery attempt.
///
/// `base * 2^(attempt - 1)`, capped at `ack_deadline`. Never below one
/// second, so a message that always fails cannot be pulled back at once.
pub(crate) fn nack_delay(base: i32, attempt: i32, ack_deadline: i32) -> i32 {
    let cap = ack_deadline.max(1);
    let shift = attempt.saturating_sub(1).clamp(0, 30) as u32;
    base.max(1).saturating_mul(1 << shift).min(cap)
}

/// Decode a queue row into a delivered message.
///
/// Payloads that are not in the published shape are delivered with the raw
/// JSON as data and no attributes.
pub(crate) fn decode(row: PgmqMessage) -> Message {
    let payload = match serde_json::from_value::<NewMessage>(row.message.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(msg_id = row.msg_id, "unrecognized payload shape: {e}");
            NewMessage::new(row.message.to_string())
        }
    };
    Message {
        id: row.msg_id,
        data: payload.data,
        attributes: payload.attributes,
        publish_time: row.enqueued_at,
        delivery_attempt: row.read_ct,
    }
}

#[async_trait]
impl SubscriptionBackend for PgmqBackend {
    async fn pull(&self, max: usize) -> Result<Vec<ReceivedMessage>> {
        let qty = i32::try_from(max).unwrap_or(i32::MAX);
        let rows = self
            .db
            .read_batch(&self.queue_name, self.ack_deadline_seconds, qty)
            .await?;
        let batch: Vec<ReceivedMessage> = rows
            .into_iter()
            .map(|row| ReceivedMessage {
                ack_id: AckId(row.msg_id),
                message: decode(row),
            })
            .collect();

        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        for received in &batch {
            attempts.insert(received.ack_id.0, received.message.delivery_attempt);
        }
        Ok(batch)
    }

    async fn ack(&self, ack_id: AckId) -> Result<()> {
        self.take_attempt(ack_id);
        self.db.archive_message(&self.queue_name, ack_id.0).await
    }

    async fn nack(&self, ack_id: AckId) -> Result<()> {
        let delay = nack_delay(
            self.nack_delay_seconds,
            self.take_attempt(ack_id),
            self.ack_deadline_seconds,
        );
        self.db
            .set_visibility(&self.queue_name, ack_id.0, delay)
            .await
    }
}
