//! Test dispatcher: maps a message's test name to a registered action.
//!
//! The test name is the message payload decoded as UTF-8. Names are matched
//! exactly. Messages with no name or an unregistered name are ignored
//! without side effects.

pub mod action;

use crate::error::Result;
use crate::logsink::LogSink;
use crate::model::Message;
use crate::subscriber::MessageHandler;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub use action::{SimpleLog, TestAction};

/// Name of the built-in log-writing test.
pub const SIMPLE_LOG: &str = "simpleLog";

/// What the dispatcher did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Ran { test: String },
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    NoMessage,
    EmptyTestName,
    UnknownTest(String),
}

/// Registry of test actions, indexed by test name.
pub struct TestDispatcher {
    tests: HashMap<String, Box<dyn TestAction>>,
}

impl TestDispatcher {
    /// Create a dispatcher with no tests registered.
    pub fn new() -> Self {
        Self {
            tests: HashMap::new(),
        }
    }

    /// Dispatcher with the built-in tests, writing to `sink`.
    pub fn with_default_tests(sink: Arc<dyn LogSink>) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(SIMPLE_LOG, SimpleLog::new(sink));
        dispatcher
    }

    /// Bind `name` to `action`, replacing any previous binding.
    pub fn register(&mut self, name: &str, action: impl TestAction + 'static) {
        self.tests.insert(name.to_string(), Box::new(action));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tests.contains_key(name)
    }

    /// Run the action matching the message's test name, if any.
    ///
    /// Errors from the action are returned unchanged.
    pub fn dispatch(&self, message: Option<&Message>) -> Result<Dispatch> {
        let Some(message) = message else {
            return Ok(Dispatch::Ignored(IgnoreReason::NoMessage));
        };

        let test = message.text();
        if test.is_empty() {
            return Ok(Dispatch::Ignored(IgnoreReason::EmptyTestName));
        }

        let Some(action) = self.tests.get(&test) else {
            debug!(test = %test, "no test registered under this name");
            return Ok(Dispatch::Ignored(IgnoreReason::UnknownTest(test)));
        };

        let result = action.run(message);
        metrics::dispatches().add(
            1,
            &[
                KeyValue::new("test", test.clone()),
                KeyValue::new("result", if result.is_ok() { "ok" } else { "error" }),
            ],
        );
        result?;
        Ok(Dispatch::Ran { test })
    }
}

impl Default for TestDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHandler for TestDispatcher {
    fn handle(&self, message: &Message) -> Result<()> {
        let outcome = self.dispatch(Some(message))?;
        info!(
            id = message.id,
            data = %message.text(),
            ?outcome,
            "message handled"
        );
        Ok(())
    }
}
