//! Test actions: what runs when a test name matches.

use crate::error::{Error, Result};
use crate::logsink::{LogSink, Severity};
use crate::model::Message;
use std::sync::Arc;

/// Attribute names read by [`SimpleLog`].
pub const LOG_NAME: &str = "log_name";
pub const LOG_TEXT: &str = "log_text";
pub const SEVERITY: &str = "severity";

/// A runnable test, bound to a name in the dispatcher.
pub trait TestAction: Send + Sync {
    fn run(&self, message: &Message) -> Result<()>;
}

/// Writes one log entry described by the message attributes.
///
/// `log_name` and `severity` are required; `log_text` defaults to empty.
/// An unrecognized severity fails the message before anything is written.
pub struct SimpleLog {
    sink: Arc<dyn LogSink>,
}

impl SimpleLog {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

impl TestAction for SimpleLog {
    fn run(&self, message: &Message) -> Result<()> {
        let severity: Severity = message
            .attribute(SEVERITY)
            .ok_or(Error::MissingAttribute(SEVERITY))?
            .parse()?;
        let name = message
            .attribute(LOG_NAME)
            .ok_or(Error::MissingAttribute(LOG_NAME))?;
        let text = message.attribute(LOG_TEXT).unwrap_or_default();

        self.sink.write(name, text, severity)
    }
}
