//! Integration tests for the subscription manager over the in-memory backend.

use envtest_router::dispatch::{SIMPLE_LOG, TestDispatcher};
use envtest_router::error::{Error, Result};
use envtest_router::logsink::{LogSink, Severity};
use envtest_router::model::{Message, NewMessage};
use envtest_router::subscriber::{
    AckId, ListenStats, MemoryBackend, MessageHandler, ReceivedMessage, Subscriber,
    SubscriberConfig, SubscriptionBackend, Termination,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<(String, String, Severity)>>,
}

impl LogSink for RecordingSink {
    fn write(&self, name: &str, text: &str, severity: Severity) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .push((name.to_string(), text.to_string(), severity));
        Ok(())
    }
}

fn fast_config() -> SubscriberConfig {
    SubscriberConfig {
        max_messages: 4,
        poll_interval: Duration::from_millis(10),
    }
}

fn start(backend: Arc<MemoryBackend>, handler: Arc<dyn MessageHandler>) -> envtest_router::subscriber::SubscriberHandle {
    Subscriber::new("projects/p/subscriptions/test", backend, handler, fast_config()).start()
}

fn log_request(severity: &str) -> NewMessage {
    NewMessage::text(SIMPLE_LOG)
        .attribute("log_name", "n")
        .attribute("log_text", "t")
        .attribute("severity", severity)
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn acks_every_successfully_handled_message() {
    let backend = Arc::new(MemoryBackend::new());
    let sink = Arc::new(RecordingSink::default());
    let dispatcher = Arc::new(TestDispatcher::with_default_tests(sink.clone()));

    let ids = [
        backend.publish(log_request("INFO")),
        backend.publish(NewMessage::text("unknownTest")),
        backend.publish(NewMessage::new(Vec::new())),
        backend.publish(log_request("ERROR")),
        backend.publish(NewMessage::text("anotherUnknown")),
    ];

    let termination = start(backend.clone(), dispatcher)
        .await_terminated(Duration::from_millis(300))
        .await
        .unwrap();

    let mut acked = backend.acked();
    acked.sort();
    assert_eq!(acked, ids.to_vec());
    assert!(backend.nacked().is_empty());
    assert_eq!(
        termination.stats(),
        ListenStats {
            received: 5,
            acked: 5,
            nacked: 0
        }
    );

    let mut entries = sink.entries.lock().unwrap().clone();
    entries.sort_by_key(|(_, _, sev)| *sev);
    assert_eq!(
        entries,
        vec![
            ("n".to_string(), "t".to_string(), Severity::Info),
            ("n".to_string(), "t".to_string(), Severity::Error),
        ]
    );
}

#[tokio::test]
async fn bad_severity_is_nacked_not_dropped() {
    let backend = Arc::new(MemoryBackend::new());
    let sink = Arc::new(RecordingSink::default());
    let dispatcher = Arc::new(TestDispatcher::with_default_tests(sink.clone()));

    let bad = backend.publish(log_request("BOGUS"));
    let good = backend.publish(log_request("DEBUG"));

    let termination = start(backend.clone(), dispatcher)
        .await_terminated(Duration::from_millis(300))
        .await
        .unwrap();

    assert_eq!(backend.nacked(), vec![bad]);
    assert_eq!(backend.acked(), vec![good]);
    assert_eq!(termination.stats().nacked, 1);
    assert_eq!(sink.entries.lock().unwrap().len(), 1);

    // The nacked message is still available for redelivery.
    assert_eq!(backend.redeliver_nacked(), 1);
}

struct Panicking;

impl MessageHandler for Panicking {
    fn handle(&self, _message: &Message) -> Result<()> {
        panic!("handler blew up");
    }
}

#[tokio::test]
async fn panicking_handler_leaves_message_unsettled() {
    let backend = Arc::new(MemoryBackend::new());
    backend.publish(NewMessage::text("x"));

    let termination = start(backend.clone(), Arc::new(Panicking))
        .await_terminated(Duration::from_millis(200))
        .await
        .unwrap();

    assert!(backend.acked().is_empty());
    assert!(backend.nacked().is_empty());
    assert_eq!(termination.stats().received, 1);
}

/// Backend that hands the same message back on every pull, the way a
/// queue with a zero redelivery delay would.
struct ImmediateRedelivery {
    message: Message,
    pulls: Mutex<u64>,
    nacks: Mutex<u64>,
}

#[async_trait]
impl SubscriptionBackend for ImmediateRedelivery {
    async fn pull(&self, _max: usize) -> Result<Vec<ReceivedMessage>> {
        *self.pulls.lock().unwrap() += 1;
        Ok(vec![ReceivedMessage {
            ack_id: AckId(self.message.id),
            message: self.message.clone(),
        }])
    }

    async fn ack(&self, _ack_id: AckId) -> Result<()> {
        Ok(())
    }

    async fn nack(&self, _ack_id: AckId) -> Result<()> {
        *self.nacks.lock().unwrap() += 1;
        Ok(())
    }
}

#[tokio::test]
async fn failing_message_backs_off_between_pulls() {
    let backend = Arc::new(ImmediateRedelivery {
        message: Message::received(1, log_request("BOGUS")),
        pulls: Mutex::new(0),
        nacks: Mutex::new(0),
    });
    let dispatcher = Arc::new(TestDispatcher::with_default_tests(Arc::new(
        RecordingSink::default(),
    )));

    let termination = Subscriber::new(
        "projects/p/subscriptions/poison",
        backend.clone(),
        dispatcher,
        SubscriberConfig {
            max_messages: 1,
            poll_interval: Duration::from_millis(200),
        },
    )
    .start()
    .await_terminated(Duration::from_millis(500))
    .await
    .unwrap();

    // One pull per poll interval, not a hot loop.
    let pulls = *backend.pulls.lock().unwrap();
    assert!((1..=4).contains(&pulls), "expected a handful of pulls, got {pulls}");
    assert_eq!(*backend.nacks.lock().unwrap(), termination.stats().nacked);
    assert_eq!(termination.stats().acked, 0);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn times_out_and_releases_subscription() {
    let backend = Arc::new(MemoryBackend::new());
    let dispatcher = Arc::new(TestDispatcher::new());

    let termination = start(backend.clone(), dispatcher)
        .await_terminated(Duration::from_millis(100))
        .await
        .unwrap();

    assert!(matches!(termination, Termination::TimedOut(_)));
    assert!(backend.is_closed());
}

#[tokio::test]
async fn explicit_stop_ends_before_timeout() {
    let backend = Arc::new(MemoryBackend::new());
    let dispatcher = Arc::new(TestDispatcher::new());

    let handle = start(backend.clone(), dispatcher);
    let stopper = handle.stop_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.stop();
    });

    let termination = handle
        .await_terminated(Duration::from_secs(30))
        .await
        .unwrap();
    assert!(matches!(termination, Termination::Stopped(_)));
    assert!(backend.is_closed());
}

#[tokio::test]
async fn stop_before_waiting_is_not_lost() {
    let backend = Arc::new(MemoryBackend::new());
    let handle = start(backend.clone(), Arc::new(TestDispatcher::new()));
    handle.stop();

    let termination = handle
        .await_terminated(Duration::from_secs(30))
        .await
        .unwrap();
    assert!(matches!(termination, Termination::Stopped(_)));
}

/// Backend whose connection is gone.
struct Unreachable;

#[async_trait]
impl SubscriptionBackend for Unreachable {
    async fn pull(&self, _max: usize) -> Result<Vec<ReceivedMessage>> {
        Err(Error::Other("connection refused".to_string()))
    }

    async fn ack(&self, _ack_id: AckId) -> Result<()> {
        Ok(())
    }

    async fn nack(&self, _ack_id: AckId) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn pull_failures_propagate() {
    let handle = Subscriber::new(
        "projects/p/subscriptions/down",
        Arc::new(Unreachable),
        Arc::new(TestDispatcher::new()),
        fast_config(),
    )
    .start();

    let result = handle.await_terminated(Duration::from_secs(5)).await;
    assert!(matches!(result, Err(Error::Other(ref msg)) if msg.contains("connection refused")));
}
