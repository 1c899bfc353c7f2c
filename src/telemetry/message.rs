//! Message processing span helpers.
//!
//! Field names follow the OpenTelemetry messaging semantic conventions.

use tracing::Span;

/// Start a span for processing one delivered message.
///
/// The `messaging.settlement` field is declared empty and filled by
/// [`record_settlement`].
pub fn start_message_span(subscription: &str, message_id: i64, delivery_attempt: i32) -> Span {
    tracing::info_span!(
        "messaging.process",
        "messaging.system" = "pgmq",
        "messaging.operation.type" = "process",
        "messaging.destination.subscription.name" = subscription,
        "messaging.message.id" = message_id,
        "messaging.delivery_attempt" = delivery_attempt,
        "messaging.settlement" = tracing::field::Empty,
    )
}

/// Record whether the message will be acked or nacked.
pub fn record_settlement(span: &Span, acked: bool) {
    span.record("messaging.settlement", if acked { "ack" } else { "nack" });
}
