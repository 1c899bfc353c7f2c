//! Metric instrument factories.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments come from the `"envtest-router"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("envtest-router")
}

/// Counter: queue-level operations (create, send, read, set_vt, archive, ...).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("envtest.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: messages published to a topic.
/// Labels: `topic`, `fanout`.
pub fn messages_published() -> Counter<u64> {
    meter()
        .u64_counter("envtest.messages.published")
        .with_description("Number of messages published")
        .build()
}

/// Counter: messages delivered to the handler.
/// Labels: `subscription`.
pub fn messages_received() -> Counter<u64> {
    meter()
        .u64_counter("envtest.messages.received")
        .with_description("Number of messages received")
        .build()
}

/// Counter: messages settled after handling.
/// Labels: `subscription`, `outcome` ("ack" | "nack").
pub fn messages_settled() -> Counter<u64> {
    meter()
        .u64_counter("envtest.messages.settled")
        .with_description("Number of messages acked or nacked")
        .build()
}

/// Counter: test actions run.
/// Labels: `test`, `result` ("ok" | "error").
pub fn dispatches() -> Counter<u64> {
    meter()
        .u64_counter("envtest.dispatch")
        .with_description("Number of test actions dispatched")
        .build()
}

/// Counter: entries written by the log sink.
/// Labels: `severity`.
pub fn log_entries() -> Counter<u64> {
    meter()
        .u64_counter("envtest.log.entries")
        .with_description("Number of log entries written")
        .build()
}

/// Histogram: handler time per message in milliseconds.
pub fn handler_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("envtest.handler.duration_ms")
        .with_description("Message handler duration in milliseconds")
        .with_unit("ms")
        .build()
}
