//! Domain event definitions

use serde::{Deserialize, Serialize};

/// Which stream an output chunk came from.
///
/// The tag exists for logging only; both streams feed the same matching logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl StreamSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamSource::Stdout => "stdout",
            StreamSource::Stderr => "stderr",
        }
    }
}

/// Raw event delivered from a supervised process to its dispatcher.
///
/// Higher-level events (build success, process failure) are derived from these
/// by the supervisor: marker matching on `Output`, exit classification on `Exited`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProcessEvent {
    /// A chunk of output text, delivered as it became available.
    Output { source: StreamSource, text: String },
    /// The process exited. `code` is `None` when it died to a signal.
    Exited { code: Option<i32> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_source_as_str() {
        assert_eq!(StreamSource::Stdout.as_str(), "stdout");
        assert_eq!(StreamSource::Stderr.as_str(), "stderr");
    }

    #[test]
    fn test_process_event_roundtrip() {
        let event = ProcessEvent::Output {
            source: StreamSource::Stderr,
            text: "warning: something".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("stderr"));

        let back: ProcessEvent = serde_json::from_str(&json).unwrap();
        match back {
            ProcessEvent::Output { source, text } => {
                assert_eq!(source, StreamSource::Stderr);
                assert_eq!(text, "warning: something");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
