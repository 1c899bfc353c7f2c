//! Listening loop and its lifecycle handle.

use super::{MessageHandler, ReceivedMessage, SubscriptionBackend};
use crate::error::{Error, Result};
use crate::telemetry::message::{record_settlement, start_message_span};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

/// Configuration for the listening loop.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Maximum messages leased per pull.
    pub max_messages: usize,
    /// Wait after a pull that came back empty or settled nothing as acked.
    pub poll_interval: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Per-run delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenStats {
    pub received: u64,
    pub acked: u64,
    pub nacked: u64,
}

/// Why the listening loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A stop was requested before the wait window elapsed.
    Stopped(ListenStats),
    /// The wait window elapsed; the loop was stopped by the manager.
    TimedOut(ListenStats),
}

impl Termination {
    pub fn stats(&self) -> ListenStats {
        match self {
            Self::Stopped(stats) | Self::TimedOut(stats) => *stats,
        }
    }
}

/// Feeds messages from one subscription to a handler.
pub struct Subscriber {
    name: String,
    backend: Arc<dyn SubscriptionBackend>,
    handler: Arc<dyn MessageHandler>,
    config: SubscriberConfig,
}

impl Subscriber {
    pub fn new(
        name: impl Into<String>,
        backend: Arc<dyn SubscriptionBackend>,
        handler: Arc<dyn MessageHandler>,
        config: SubscriberConfig,
    ) -> Self {
        Self {
            name: name.into(),
            backend,
            handler,
            config,
        }
    }

    /// Spawn the listening loop and return a handle to it.
    pub fn start(self) -> SubscriberHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);
        let task = tokio::spawn(async move { self.run(signal).await });
        SubscriberHandle {
            shutdown: StopHandle(shutdown),
            task,
        }
    }

    async fn run(self, shutdown: Arc<Notify>) -> Result<ListenStats> {
        info!(subscription = %self.name, "listening for messages");
        let result = self.listen(&shutdown).await;

        if let Err(e) = self.backend.close().await {
            warn!(subscription = %self.name, "close error: {e}");
        }
        match &result {
            Ok(stats) => info!(
                subscription = %self.name,
                received = stats.received,
                acked = stats.acked,
                nacked = stats.nacked,
                "subscriber stopped"
            ),
            Err(e) => error!(subscription = %self.name, "subscriber failed: {e}"),
        }
        result
    }

    async fn listen(&self, shutdown: &Notify) -> Result<ListenStats> {
        let mut stats = ListenStats::default();

        loop {
            let batch = tokio::select! {
                biased;
                _ = shutdown.notified() => return Ok(stats),
                batch = self.backend.pull(self.config.max_messages) => batch?,
            };

            // Back off when there was nothing to do, or nothing succeeded.
            // A batch with no acks is likely a message that keeps failing.
            let idle = if batch.is_empty() {
                true
            } else {
                let acked_before = stats.acked;
                self.process_batch(batch, &mut stats).await?;
                stats.acked == acked_before
            };

            if idle {
                tokio::select! {
                    biased;
                    _ = shutdown.notified() => return Ok(stats),
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }
    }

    /// Handle every message of a batch concurrently, then settle each one.
    async fn process_batch(
        &self,
        batch: Vec<ReceivedMessage>,
        stats: &mut ListenStats,
    ) -> Result<()> {
        let mut tasks = JoinSet::new();

        for received in batch {
            stats.received += 1;
            metrics::messages_received()
                .add(1, &[KeyValue::new("subscription", self.name.clone())]);

            let handler = Arc::clone(&self.handler);
            let span = start_message_span(
                &self.name,
                received.message.id,
                received.message.delivery_attempt,
            );
            tasks.spawn(async move {
                let _entered = span.enter();
                let start = Instant::now();
                let outcome = handler.handle(&received.message);
                metrics::handler_duration_ms()
                    .record(start.elapsed().as_secs_f64() * 1000.0, &[]);
                if let Err(ref e) = outcome {
                    warn!(id = received.message.id, "handler failed: {e}");
                }
                record_settlement(&span, outcome.is_ok());
                (received.ack_id, outcome.is_ok())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (ack_id, ok) = match joined {
                Ok(settled) => settled,
                Err(e) => {
                    // The lease expires and the queue redelivers it.
                    error!("handler task panicked: {e}");
                    continue;
                }
            };

            let outcome = if ok {
                self.backend.ack(ack_id).await?;
                stats.acked += 1;
                "ack"
            } else {
                self.backend.nack(ack_id).await?;
                stats.nacked += 1;
                "nack"
            };
            metrics::messages_settled().add(
                1,
                &[
                    KeyValue::new("subscription", self.name.clone()),
                    KeyValue::new("outcome", outcome),
                ],
            );
        }
        Ok(())
    }
}

/// Cloneable stop signal for a running subscriber.
#[derive(Clone)]
pub struct StopHandle(Arc<Notify>);

impl StopHandle {
    /// Ask the loop to stop after the batch in hand.
    pub fn stop(&self) {
        self.0.notify_one();
    }
}

/// Handle to a running listening loop.
pub struct SubscriberHandle {
    shutdown: StopHandle,
    task: JoinHandle<Result<ListenStats>>,
}

impl SubscriberHandle {
    pub fn stop(&self) {
        self.shutdown.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.shutdown.clone()
    }

    /// Wait up to `timeout` for the loop to end on its own.
    ///
    /// If the window elapses first, the loop is stopped and awaited; that is
    /// a normal `TimedOut` termination. Loop failures are returned as errors.
    pub async fn await_terminated(mut self, timeout: Duration) -> Result<Termination> {
        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(joined) => Ok(Termination::Stopped(flatten(joined)?)),
            Err(_) => {
                info!("wait window elapsed, stopping subscriber");
                self.shutdown.stop();
                Ok(Termination::TimedOut(flatten(self.task.await)?))
            }
        }
    }
}

fn flatten(
    joined: std::result::Result<Result<ListenStats>, tokio::task::JoinError>,
) -> Result<ListenStats> {
    joined.map_err(|e| Error::Other(format!("subscriber task failed: {e}")))?
}
