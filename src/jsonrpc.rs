//! JSON-RPC 2.0 message types for the Copilot CLI server protocol.
//!
//! The CLI speaks standard JSON-RPC 2.0: every message carries a
//! `"jsonrpc": "2.0"` field, requests and responses are correlated by `id`,
//! and notifications carry no `id` at all. Inbound frames are classified by
//! field presence (see [`classify`]) rather than by serde's untagged
//! dispatch, because the CLI is allowed to attach extra fields we must
//! ignore.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The protocol version field carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// JSON-RPC error code for invalid request parameters.
pub const INVALID_PARAMS: i64 = -32602;

/// JSON-RPC error code for an internal fault while serving a request.
pub const INTERNAL_ERROR: i64 = -32603;

/// A JSON-RPC request/response identifier.
///
/// The SDK always emits string ids (UUID v4), but the CLI may use integers
/// for its own server-initiated requests, so both are accepted inbound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Integer(i64),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{}", s),
            RequestId::Integer(i) => write!(f, "{}", i),
        }
    }
}

/// A JSON-RPC request (client-to-server or server-to-client).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC notification (no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// The error payload within a JSON-RPC error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// A JSON-RPC response, carrying exactly one of `result` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorData>,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Field probe for classifying an inbound frame without committing to a
/// message shape up front.
#[derive(Debug, Deserialize)]
pub(crate) struct RawMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorData>,
}

/// A classified inbound message.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// Server-initiated request: has both a non-empty `id` and `method`.
    Request {
        id: RequestId,
        method: String,
        params: Value,
    },
    /// Response to one of our requests: has a non-empty `id` only.
    Response {
        id: RequestId,
        result: std::result::Result<Value, JsonRpcErrorData>,
    },
    /// Notification: has a non-empty `method` only.
    Notification { method: String, params: Value },
    /// Anything else is silently discarded.
    Discard,
}

fn parse_id(id: Option<Value>) -> Option<RequestId> {
    match id? {
        Value::String(s) if !s.is_empty() => Some(RequestId::String(s)),
        Value::Number(n) => n.as_i64().map(RequestId::Integer),
        _ => None,
    }
}

/// Classify an inbound frame per the field-presence rules:
/// `id` + `method` is a request, `id` alone is a response, `method` alone is
/// a notification, anything else is dropped.
pub(crate) fn classify(raw: RawMessage) -> Inbound {
    let id = parse_id(raw.id);
    let method = raw.method.filter(|m| !m.is_empty());

    match (id, method) {
        (Some(id), Some(method)) => Inbound::Request {
            id,
            method,
            params: raw.params.unwrap_or(Value::Null),
        },
        (Some(id), None) => {
            let result = match raw.error {
                Some(error) => Err(error),
                None => Ok(raw.result.unwrap_or(Value::Null)),
            };
            Inbound::Response { id, result }
        }
        (None, Some(method)) => Inbound::Notification {
            method,
            params: raw.params.unwrap_or(Value::Null),
        },
        (None, None) => Inbound::Discard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_str(json: &str) -> Inbound {
        let raw: RawMessage = serde_json::from_str(json).unwrap();
        classify(raw)
    }

    #[test]
    fn test_request_id_string() {
        let id: RequestId = serde_json::from_str(r#""req-1""#).unwrap();
        assert_eq!(id, RequestId::String("req-1".to_string()));
        assert_eq!(id.to_string(), "req-1");
    }

    #[test]
    fn test_request_id_integer() {
        let id: RequestId = serde_json::from_str("42").unwrap();
        assert_eq!(id, RequestId::Integer(42));
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_request_roundtrip() {
        let req = JsonRpcRequest::new(
            RequestId::String("abc".to_string()),
            "session.send",
            serde_json::json!({"sessionId": "s1", "prompt": "hi"}),
        );
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""jsonrpc":"2.0""#));
        let parsed: JsonRpcRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.method, "session.send");
    }

    #[test]
    fn test_classify_request() {
        let msg = classify_str(r#"{"jsonrpc":"2.0","id":"1","method":"tool.call","params":{}}"#);
        assert!(matches!(msg, Inbound::Request { .. }));
    }

    #[test]
    fn test_classify_response() {
        let msg = classify_str(r#"{"jsonrpc":"2.0","id":"1","result":{"messageId":"m1"}}"#);
        match msg {
            Inbound::Response { id, result } => {
                assert_eq!(id, RequestId::String("1".to_string()));
                assert!(result.is_ok());
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_error_response() {
        let msg =
            classify_str(r#"{"jsonrpc":"2.0","id":"1","error":{"code":-32601,"message":"nope"}}"#);
        match msg {
            Inbound::Response { result, .. } => {
                assert_eq!(result.unwrap_err().code, METHOD_NOT_FOUND);
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_notification() {
        let msg = classify_str(r#"{"jsonrpc":"2.0","method":"session.event","params":{}}"#);
        assert!(matches!(msg, Inbound::Notification { .. }));
    }

    #[test]
    fn test_classify_id_and_method_is_request() {
        // Both present: request wins over response.
        let msg = classify_str(r#"{"id":7,"method":"permission.request","result":{}}"#);
        match msg {
            Inbound::Request { id, method, .. } => {
                assert_eq!(id, RequestId::Integer(7));
                assert_eq!(method, "permission.request");
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_discards_junk() {
        assert!(matches!(classify_str(r#"{}"#), Inbound::Discard));
        assert!(matches!(
            classify_str(r#"{"jsonrpc":"2.0"}"#),
            Inbound::Discard
        ));
        // Empty method and null id do not count.
        assert!(matches!(
            classify_str(r#"{"id":null,"method":""}"#),
            Inbound::Discard
        ));
    }

    #[test]
    fn test_response_serializes_one_of_result_error() {
        let ok = JsonRpcResponse::success(RequestId::Integer(1), serde_json::json!({"a": 1}));
        let json = serde_json::to_string(&ok).unwrap();
        assert!(json.contains("result"));
        assert!(!json.contains("error"));

        let err = JsonRpcResponse::failure(
            RequestId::Integer(1),
            JsonRpcErrorData::new(INTERNAL_ERROR, "boom"),
        );
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("error"));
        assert!(!json.contains("result"));
    }
}
