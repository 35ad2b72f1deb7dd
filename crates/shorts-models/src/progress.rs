//! Stage progress events.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One progress update from a running stage.
///
/// Within a stage invocation the percent never goes down, except for the
/// single reset to 0 that accompanies a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressEvent {
    /// Completion percentage (0-100)
    pub percent: u8,
    /// Short human-readable status
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Create an event; percent is capped at 100.
    pub fn new(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Failure event: percent resets to 0 and the message carries the cause.
    pub fn failed(cause: impl AsRef<str>) -> Self {
        let cause = cause.as_ref().trim();
        let cause = if cause.is_empty() { "unknown failure" } else { cause };
        Self::new(0, format!("Error: {}", cause))
    }

    /// Initial event recorded when a job is accepted.
    pub fn queued() -> Self {
        Self::new(0, "Queued")
    }

    pub fn is_failure(&self) -> bool {
        self.percent == 0 && self.message.starts_with("Error:")
    }

    pub fn is_complete(&self) -> bool {
        self.percent == 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_capped() {
        assert_eq!(ProgressEvent::new(250, "x").percent, 100);
    }

    #[test]
    fn test_failed_event() {
        let event = ProgressEvent::failed("disk full");
        assert_eq!(event.percent, 0);
        assert_eq!(event.message, "Error: disk full");
        assert!(event.is_failure());
        assert!(!ProgressEvent::queued().is_failure());
    }

    #[test]
    fn test_failed_event_never_has_empty_message() {
        let event = ProgressEvent::failed("   ");
        assert_eq!(event.message, "Error: unknown failure");
    }
}
