//! In-process subscription backend.
//!
//! Leases never expire. Nacked messages are parked until
//! [`MemoryBackend::redeliver_nacked`] puts them back in the queue, so a
//! message that always fails does not spin the loop.

use super::{AckId, ReceivedMessage, SubscriptionBackend};
use crate::error::{Error, Result};
use crate::model::{Message, NewMessage};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct State {
    next_id: i64,
    pending: VecDeque<Message>,
    leased: HashMap<i64, Message>,
    parked: Vec<Message>,
    acked: Vec<i64>,
    nacked: Vec<i64>,
    closed: bool,
}

/// Subscription held entirely in memory.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message. Returns its id.
    pub fn publish(&self, payload: NewMessage) -> i64 {
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.pending.push_back(Message::received(id, payload));
        id
    }

    /// Move parked (nacked) messages back into the queue.
    pub fn redeliver_nacked(&self) -> usize {
        let mut state = self.lock();
        let parked = std::mem::take(&mut state.parked);
        let count = parked.len();
        for mut message in parked {
            message.delivery_attempt += 1;
            state.pending.push_back(message);
        }
        count
    }

    /// Ids of acked messages, in settlement order.
    pub fn acked(&self) -> Vec<i64> {
        self.lock().acked.clone()
    }

    /// Ids of nacked messages, in settlement order.
    pub fn nacked(&self) -> Vec<i64> {
        self.lock().nacked.clone()
    }

    /// Messages waiting for delivery.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means a test thread panicked mid-update.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SubscriptionBackend for MemoryBackend {
    async fn pull(&self, max: usize) -> Result<Vec<ReceivedMessage>> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::Other("subscription is closed".to_string()));
        }
        let count = max.min(state.pending.len());
        let batch: Vec<Message> = state.pending.drain(..count).collect();
        Ok(batch
            .into_iter()
            .map(|message| {
                state.leased.insert(message.id, message.clone());
                ReceivedMessage {
                    ack_id: AckId(message.id),
                    message,
                }
            })
            .collect())
    }

    async fn ack(&self, ack_id: AckId) -> Result<()> {
        let mut state = self.lock();
        state
            .leased
            .remove(&ack_id.0)
            .ok_or_else(|| Error::NotFound(format!("lease {ack_id}")))?;
        state.acked.push(ack_id.0);
        Ok(())
    }

    async fn nack(&self, ack_id: AckId) -> Result<()> {
        let mut state = self.lock();
        let message = state
            .leased
            .remove(&ack_id.0)
            .ok_or_else(|| Error::NotFound(format!("lease {ack_id}")))?;
        state.parked.push(message);
        state.nacked.push(ack_id.0);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}
