//! Events of a streamed answer, serialized as NDJSON.

use crate::types::SearchResult;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tadabbur_core::{AppError, AppResult};

/// One line of the answer stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Sources the answer is grounded on. Always first on success.
    Sources { data: Vec<SearchResult> },

    /// A fragment of answer text.
    Token { data: String },

    /// Successful end of the answer.
    Done,

    /// Failed end of the answer.
    Error {
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reset_time: Option<String>,
    },
}

impl StreamEvent {
    pub fn error(message: impl Into<String>, code: &str) -> Self {
        StreamEvent::Error {
            data: message.into(),
            error_code: Some(code.to_string()),
            reset_time: None,
        }
    }

    pub fn quota_exceeded(message: impl Into<String>, reset_time: impl Into<String>) -> Self {
        StreamEvent::Error {
            data: message.into(),
            error_code: Some("quota_exceeded".to_string()),
            reset_time: Some(reset_time.into()),
        }
    }

    /// `Done` and `Error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }

    /// The event as one newline-terminated JSON line.
    pub fn to_ndjson_line(&self) -> AppResult<String> {
        let mut line = serde_json::to_string(self)
            .map_err(|e| AppError::Serialization(format!("Failed to encode stream event: {}", e)))?;
        line.push('\n');
        Ok(line)
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        let token = StreamEvent::Token {
            data: "صبر".to_string(),
        };
        assert_eq!(token.to_ndjson_line().unwrap(), "{\"type\":\"token\",\"data\":\"صبر\"}\n");

        assert_eq!(
            serde_json::to_value(StreamEvent::Done).unwrap(),
            json!({ "type": "done" })
        );

        assert_eq!(
            serde_json::to_value(StreamEvent::error("boom", "internal_error")).unwrap(),
            json!({ "type": "error", "data": "boom", "error_code": "internal_error" })
        );

        assert_eq!(
            serde_json::to_value(StreamEvent::quota_exceeded("limite", "2026-10-17T00:00:00+00:00"))
                .unwrap(),
            json!({
                "type": "error",
                "data": "limite",
                "error_code": "quota_exceeded",
                "reset_time": "2026-10-17T00:00:00+00:00"
            })
        );
    }

    #[test]
    fn test_sources_event_has_no_embedding() {
        let event = StreamEvent::Sources {
            data: crate::tests::fixtures::sample_results(),
        };
        let line = event.to_ndjson_line().unwrap();

        assert!(line.starts_with("{\"type\":\"sources\",\"data\":["));
        assert!(!line.contains("embedding"));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_terminal_events() {
        assert!(StreamEvent::Done.is_terminal());
        assert!(StreamEvent::error("x", "internal_error").is_terminal());
        assert!(!StreamEvent::Token { data: "x".into() }.is_terminal());
    }
}
