//! Log sink: where test actions write their log entries.
//!
//! Severity names follow the Cloud Logging enumeration. Entries are emitted
//! as `tracing` events, so with an OTLP endpoint configured they leave the
//! process through the OpenTelemetry log bridge.

use crate::error::{Error, Result};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// Log entry severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Default,
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Alert => "ALERT",
            Self::Emergency => "EMERGENCY",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = Error;

    /// Exact, case-sensitive match on the enumeration name.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DEFAULT" => Ok(Self::Default),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "NOTICE" => Ok(Self::Notice),
            "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            "ALERT" => Ok(Self::Alert),
            "EMERGENCY" => Ok(Self::Emergency),
            other => Err(Error::InvalidSeverity(other.to_string())),
        }
    }
}

/// Destination for log entries written by test actions.
pub trait LogSink: Send + Sync {
    fn write(&self, name: &str, text: &str, severity: Severity) -> Result<()>;
}

/// Writes entries as `tracing` events at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn write(&self, name: &str, text: &str, severity: Severity) -> Result<()> {
        let sev = severity.as_str();
        match severity {
            Severity::Debug => {
                tracing::debug!(log.name = name, log.severity = sev, "{text}")
            }
            Severity::Default | Severity::Info | Severity::Notice => {
                tracing::info!(log.name = name, log.severity = sev, "{text}")
            }
            Severity::Warning => {
                tracing::warn!(log.name = name, log.severity = sev, "{text}")
            }
            Severity::Error | Severity::Critical | Severity::Alert | Severity::Emergency => {
                tracing::error!(log.name = name, log.severity = sev, "{text}")
            }
        }
        metrics::log_entries().add(1, &[KeyValue::new("severity", sev)]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Severity; 9] = [
        Severity::Default,
        Severity::Debug,
        Severity::Info,
        Severity::Notice,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
        Severity::Alert,
        Severity::Emergency,
    ];

    #[test]
    fn parses_every_name() {
        for severity in ALL {
            assert_eq!(severity.as_str().parse::<Severity>().unwrap(), severity);
        }
    }

    #[test]
    fn rejects_unknown_and_wrong_case() {
        for bad in ["BOGUS", "info", "Warning", ""] {
            match bad.parse::<Severity>() {
                Err(Error::InvalidSeverity(s)) => assert_eq!(s, bad),
                other => panic!("expected InvalidSeverity for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Warning < Severity::Emergency);
    }

    #[test]
    fn tracing_sink_accepts_every_severity() {
        for severity in ALL {
            TracingLogSink.write("test-log", "hello", severity).unwrap();
        }
    }
}
