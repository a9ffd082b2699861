//! Session event types delivered by the CLI server.
//!
//! Every event on the wire is a `{type, data}` record. The `type` strings
//! the SDK understands are modeled by [`EventType`]; anything else is
//! carried through as [`EventType::Other`] so new CLI event kinds never
//! break deserialization. The same deserializer is used for live
//! `session.event` notifications and for replayed history from
//! `session.getMessages`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of a session event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// A complete assistant message.
    AssistantMessage,
    /// A streamed chunk of assistant message content.
    AssistantMessageDelta,
    /// A streamed chunk of assistant reasoning content.
    AssistantReasoningDelta,
    /// The session finished processing and is waiting for input.
    SessionIdle,
    /// The session hit an error while processing.
    SessionError,
    /// Background context compaction started.
    SessionCompactionStart,
    /// Background context compaction finished.
    SessionCompactionComplete,
    /// Any event kind the SDK does not model; delivered opaquely.
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::AssistantMessage => "assistant.message",
            EventType::AssistantMessageDelta => "assistant.message_delta",
            EventType::AssistantReasoningDelta => "assistant.reasoning_delta",
            EventType::SessionIdle => "session.idle",
            EventType::SessionError => "session.error",
            EventType::SessionCompactionStart => "session.compaction_start",
            EventType::SessionCompactionComplete => "session.compaction_complete",
            EventType::Other(s) => s,
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "assistant.message" => EventType::AssistantMessage,
            "assistant.message_delta" => EventType::AssistantMessageDelta,
            "assistant.reasoning_delta" => EventType::AssistantReasoningDelta,
            "session.idle" => EventType::SessionIdle,
            "session.error" => EventType::SessionError,
            "session.compaction_start" => EventType::SessionCompactionStart,
            "session.compaction_complete" => EventType::SessionCompactionComplete,
            _ => EventType::Other(s),
        }
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One event from a session's stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Event payload; field names are fixed by the wire protocol but their
    /// semantics belong to the CLI, so the SDK keeps them opaque.
    #[serde(default)]
    pub data: Value,
}

impl SessionEvent {
    /// Text content of an `assistant.message` (or delta) event, if any.
    pub fn content(&self) -> Option<&str> {
        self.data.get("content").and_then(Value::as_str)
    }

    /// Streamed delta content of an `assistant.message_delta` event, if any.
    pub fn delta_content(&self) -> Option<&str> {
        self.data.get("deltaContent").and_then(Value::as_str)
    }

    /// Error message of a `session.error` event, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.data.get("message").and_then(Value::as_str)
    }

    /// Stack trace of a `session.error` event, if any.
    pub fn error_stack(&self) -> Option<&str> {
        self.data.get("stack").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_event_type_roundtrip() {
        let event: SessionEvent = serde_json::from_value(json!({
            "type": "assistant.message",
            "data": {"content": "hello"}
        }))
        .unwrap();
        assert_eq!(event.event_type, EventType::AssistantMessage);
        assert_eq!(event.content(), Some("hello"));

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["type"], "assistant.message");
    }

    #[test]
    fn test_unknown_event_type_is_opaque() {
        let event: SessionEvent = serde_json::from_value(json!({
            "type": "tool.execution_start",
            "data": {"toolName": "bash"}
        }))
        .unwrap();
        assert_eq!(
            event.event_type,
            EventType::Other("tool.execution_start".to_string())
        );

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["type"], "tool.execution_start");
    }

    #[test]
    fn test_missing_data_defaults_to_null() {
        let event: SessionEvent = serde_json::from_value(json!({"type": "session.idle"})).unwrap();
        assert_eq!(event.event_type, EventType::SessionIdle);
        assert!(event.data.is_null());
    }

    #[test]
    fn test_error_accessors() {
        let event: SessionEvent = serde_json::from_value(json!({
            "type": "session.error",
            "data": {"message": "model unavailable", "stack": "at foo\nat bar"}
        }))
        .unwrap();
        assert_eq!(event.error_message(), Some("model unavailable"));
        assert_eq!(event.error_stack(), Some("at foo\nat bar"));
    }

    #[test]
    fn test_compaction_event_types() {
        for (wire, expected) in [
            ("session.compaction_start", EventType::SessionCompactionStart),
            (
                "session.compaction_complete",
                EventType::SessionCompactionComplete,
            ),
        ] {
            let event: SessionEvent =
                serde_json::from_value(json!({"type": wire, "data": {}})).unwrap();
            assert_eq!(event.event_type, expected);
        }
    }
}
