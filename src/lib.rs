//! # envtest-router
//!
//! Queue-driven test dispatcher. A subscriber pulls test requests from a
//! pgmq-backed subscription, the dispatcher matches each request's test
//! name against registered actions, and the built-in `simpleLog` action
//! writes a log entry with the requested name, text, and severity.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod logsink;
pub mod model;
pub mod subscriber;
pub mod telemetry;
