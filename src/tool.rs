//! Tool invocation results and the tool-call executor.
//!
//! The CLI expects every `tool.call` request to produce a tool result,
//! success or failure, never a JSON-RPC error: a protocol error would leak
//! into its model-facing pipeline. The executor therefore catches every
//! handler fault and substitutes a failure result whose model-visible text
//! is generic, while the real error string is retained in the `error` field
//! for client-side telemetry.

use crate::types::{BoxError, ToolHandler, ToolInvocation};
use futures::FutureExt;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::panic::AssertUnwindSafe;

/// Model-visible text substituted when a tool handler fails.
const TOOL_FAULT_TEXT: &str =
    "Invoking this tool produced an error. Detailed information is not available.";

/// Outcome class of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultType {
    Success,
    Failure,
    Rejected,
    Denied,
}

/// A binary payload attached to a tool result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolBinaryResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub binary_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Normalized result of a tool invocation, as sent back to the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub text_result_for_llm: String,
    pub result_type: ToolResultType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_results_for_llm: Option<Vec<ToolBinaryResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_telemetry: Option<Value>,
    /// Fields this SDK does not model are preserved on the way through.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text_result_for_llm: text.into(),
            result_type: ToolResultType::Success,
            error: None,
            binary_results_for_llm: None,
            session_log: None,
            tool_telemetry: None,
            extra: Map::new(),
        }
    }

    pub fn failure(text: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            result_type: ToolResultType::Failure,
            error: Some(error.into()),
            ..Self::success(text)
        }
    }

    /// The value a handler returns to pass this result through unchanged.
    pub fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Failure result for a tool the session has no handler for. The CLI treats
/// this as the tool's output, not as a protocol error.
pub(crate) fn unsupported_tool_result(tool_name: &str) -> ToolResult {
    ToolResult::failure(
        format!("Tool '{}' is not supported.", tool_name),
        format!("tool '{}' not supported", tool_name),
    )
}

/// Normalize whatever a tool handler returned into a [`ToolResult`].
///
/// - absent or `null` becomes a failure result,
/// - a value already shaped like a tool result passes through unchanged,
/// - a bare string becomes a success result with that text,
/// - anything else becomes a success result with the JSON-encoded value.
///
/// Normalization is idempotent.
pub fn normalize_tool_result(value: Option<Value>) -> ToolResult {
    let value = match value {
        None | Some(Value::Null) => {
            return ToolResult::failure("Tool returned no result.", "tool returned no result")
        }
        Some(value) => value,
    };

    if value.is_object() {
        if let Ok(result) = serde_json::from_value::<ToolResult>(value.clone()) {
            return result;
        }
    }

    match value {
        Value::String(text) => ToolResult::success(text),
        other => ToolResult::success(other.to_string()),
    }
}

/// Run a tool handler and turn whatever happens into a tool result.
pub(crate) async fn execute_tool_call(
    invocation: ToolInvocation,
    handler: ToolHandler,
) -> ToolResult {
    let tool_name = invocation.tool_name.clone();

    match AssertUnwindSafe(handler(invocation)).catch_unwind().await {
        Ok(Ok(value)) => normalize_tool_result(Some(value)),
        Ok(Err(error)) => tool_fault_result(&tool_name, error),
        Err(_) => {
            warn!("[TOOL] handler for '{}' panicked", tool_name);
            ToolResult::failure(TOOL_FAULT_TEXT, format!("tool '{}' panicked", tool_name))
        }
    }
}

fn tool_fault_result(tool_name: &str, error: BoxError) -> ToolResult {
    warn!("[TOOL] handler for '{}' failed: {}", tool_name, error);
    ToolResult::failure(TOOL_FAULT_TEXT, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn invocation() -> ToolInvocation {
        ToolInvocation {
            session_id: "s1".to_string(),
            tool_call_id: "c1".to_string(),
            tool_name: "get_user_location".to_string(),
            arguments: Value::Null,
        }
    }

    #[test]
    fn test_normalize_null_is_failure() {
        for input in [None, Some(Value::Null)] {
            let result = normalize_tool_result(input);
            assert_eq!(result.result_type, ToolResultType::Failure);
            assert_eq!(result.error.as_deref(), Some("tool returned no result"));
        }
    }

    #[test]
    fn test_normalize_string_is_success() {
        let result = normalize_tool_result(Some(json!("42 degrees")));
        assert_eq!(result.result_type, ToolResultType::Success);
        assert_eq!(result.text_result_for_llm, "42 degrees");
    }

    #[test]
    fn test_normalize_other_value_is_json_encoded() {
        let result = normalize_tool_result(Some(json!({"temp": 42})));
        assert_eq!(result.result_type, ToolResultType::Success);
        assert_eq!(result.text_result_for_llm, r#"{"temp":42}"#);
    }

    #[test]
    fn test_normalize_structural_result_passes_through() {
        let result = normalize_tool_result(Some(json!({
            "textResultForLlm": "done",
            "resultType": "rejected",
            "sessionLog": "log line",
            "customField": true
        })));
        assert_eq!(result.result_type, ToolResultType::Rejected);
        assert_eq!(result.text_result_for_llm, "done");
        assert_eq!(result.session_log.as_deref(), Some("log line"));
        assert_eq!(result.extra["customField"], json!(true));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            json!("text"),
            json!([1, 2, 3]),
            json!({"textResultForLlm": "x", "resultType": "failure", "error": "e"}),
        ];
        for input in inputs {
            let once = normalize_tool_result(Some(input));
            let twice = normalize_tool_result(Some(once.clone().into_value()));
            assert_eq!(
                serde_json::to_value(&once).unwrap(),
                serde_json::to_value(&twice).unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_handler_error_is_masked_from_model() {
        let handler: ToolHandler =
            Arc::new(|_inv| async move { Err("Melbourne".to_string().into()) }.boxed());

        let result = execute_tool_call(invocation(), handler).await;
        assert_eq!(result.result_type, ToolResultType::Failure);
        assert!(!result.text_result_for_llm.contains("Melbourne"));
        assert_eq!(result.error.as_deref(), Some("Melbourne"));
    }

    #[tokio::test]
    async fn test_handler_panic_is_masked_from_model() {
        let handler: ToolHandler =
            Arc::new(|_inv| async move { panic!("Melbourne") }.boxed());

        let result = execute_tool_call(invocation(), handler).await;
        assert_eq!(result.result_type, ToolResultType::Failure);
        assert!(!result.text_result_for_llm.contains("Melbourne"));
    }

    #[tokio::test]
    async fn test_handler_success_is_normalized() {
        let handler: ToolHandler = Arc::new(|_inv| async move { Ok(json!("Melbourne")) }.boxed());

        let result = execute_tool_call(invocation(), handler).await;
        assert_eq!(result.result_type, ToolResultType::Success);
        assert_eq!(result.text_result_for_llm, "Melbourne");
    }

    #[test]
    fn test_unsupported_tool_result_shape() {
        let result = unsupported_tool_result("missing_tool");
        assert_eq!(result.result_type, ToolResultType::Failure);
        assert_eq!(
            result.error.as_deref(),
            Some("tool 'missing_tool' not supported")
        );
    }
}
