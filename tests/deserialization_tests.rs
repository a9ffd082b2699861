//! Wire-shape tests for protocol payloads captured from CLI server traffic.

use copilot_codes::{
    EventType, GetAuthStatusResponse, ModelInfo, ModelPolicyState, SessionEvent, SessionMetadata,
    ToolResult, ToolResultType,
};
use serde_json::json;

#[test]
fn test_assistant_message_event() {
    let raw = json!({
        "type": "assistant.message",
        "data": {
            "messageId": "m-42",
            "content": "Here is the answer."
        }
    });
    let event: SessionEvent = serde_json::from_value(raw).unwrap();
    assert_eq!(event.event_type, EventType::AssistantMessage);
    assert_eq!(event.content(), Some("Here is the answer."));
    assert_eq!(event.data["messageId"], "m-42");
}

#[test]
fn test_streaming_delta_event() {
    let raw = json!({
        "type": "assistant.message_delta",
        "data": {"messageId": "m-42", "deltaContent": "Here "}
    });
    let event: SessionEvent = serde_json::from_value(raw).unwrap();
    assert_eq!(event.event_type, EventType::AssistantMessageDelta);
    assert_eq!(event.delta_content(), Some("Here "));
}

#[test]
fn test_history_replay_roundtrip() {
    // session.getMessages returns the same records the live stream carries;
    // both go through one deserializer.
    let records = json!([
        {"type": "user.message", "data": {"content": "hi"}},
        {"type": "assistant.message", "data": {"content": "hello"}},
        {"type": "session.idle", "data": {}}
    ]);
    let events: Vec<SessionEvent> = serde_json::from_value(records).unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(
        events[0].event_type,
        EventType::Other("user.message".to_string())
    );
    assert_eq!(events[2].event_type, EventType::SessionIdle);
}

#[test]
fn test_tool_result_wire_field_names() {
    let result = ToolResult::failure("Tool 'x' is not supported.", "tool 'x' not supported");
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["textResultForLlm"], "Tool 'x' is not supported.");
    assert_eq!(value["resultType"], "failure");
    assert_eq!(value["error"], "tool 'x' not supported");
    assert!(value.get("binaryResultsForLlm").is_none());
    assert!(value.get("toolTelemetry").is_none());
}

#[test]
fn test_tool_result_parses_with_unknown_fields() {
    let parsed: ToolResult = serde_json::from_value(json!({
        "textResultForLlm": "ok",
        "resultType": "success",
        "toolTelemetry": {"durationMs": 12},
        "futureField": [1, 2]
    }))
    .unwrap();
    assert_eq!(parsed.result_type, ToolResultType::Success);
    assert_eq!(parsed.extra["futureField"], json!([1, 2]));
}

#[test]
fn test_auth_status_variants() {
    let authenticated: GetAuthStatusResponse = serde_json::from_value(json!({
        "isAuthenticated": true,
        "authType": "user",
        "host": "https://github.com",
        "login": "octocat"
    }))
    .unwrap();
    assert!(authenticated.is_authenticated);
    assert_eq!(authenticated.login.as_deref(), Some("octocat"));

    let anonymous: GetAuthStatusResponse =
        serde_json::from_value(json!({"isAuthenticated": false})).unwrap();
    assert!(!anonymous.is_authenticated);
    assert!(anonymous.auth_type.is_none());
}

#[test]
fn test_models_list_entry() {
    let model: ModelInfo = serde_json::from_value(json!({
        "id": "claude-sonnet-4.5",
        "name": "Claude Sonnet 4.5",
        "capabilities": {
            "supports": {"vision": true},
            "limits": {
                "max_prompt_tokens": 128000,
                "max_context_window_tokens": 200000,
                "vision": {
                    "supported_media_types": ["image/png"],
                    "max_prompt_images": 5
                }
            }
        },
        "policy": {"state": "unconfigured", "terms": "Review the terms."},
        "billing": {"multiplier": 1.5}
    }))
    .unwrap();

    assert_eq!(model.policy.as_ref().unwrap().state, ModelPolicyState::Unconfigured);
    assert_eq!(model.billing.unwrap().multiplier, 1.5);
    assert_eq!(
        model.capabilities.limits.max_context_window_tokens,
        Some(200000)
    );
}

#[test]
fn test_session_list_entry() {
    let sessions: Vec<SessionMetadata> = serde_json::from_value(json!([
        {
            "sessionId": "sess-a",
            "startTime": "2025-06-10T08:00:00Z",
            "modifiedTime": "2025-06-10T09:30:00Z",
            "summary": "Refactoring the parser",
            "isRemote": false
        },
        {
            "sessionId": "sess-b",
            "startTime": "2025-06-11T10:00:00Z",
            "modifiedTime": "2025-06-11T10:00:00Z",
            "isRemote": true
        }
    ]))
    .unwrap();

    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].summary.as_deref(), Some("Refactoring the parser"));
    assert!(sessions[1].is_remote);
    assert!(sessions[1].summary.is_none());
}
