//! Session lifecycle hooks.
//!
//! The CLI invokes hooks at fixed points of a session's life via the
//! `hooks.invoke` request, identified by a `hookType` string. Hook inputs
//! are weakly typed on the wire; the SDK parses them into typed records and
//! preserves any fields it does not model.

use crate::types::BoxError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Input to the `preToolUse` hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreToolUseHookInput {
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_args: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Output of the `preToolUse` hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreToolUseHookOutput {
    /// `"allow"` or `"deny"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_decision: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Input to the `postToolUse` hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostToolUseHookInput {
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_args: Option<Value>,
    #[serde(default)]
    pub tool_result: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Input to the `userPromptSubmitted` hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPromptSubmittedHookInput {
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Input to the `sessionStart` hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartHookInput {
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub initial_prompt: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Input to the `sessionEnd` hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndHookInput {
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub final_message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Input to the `errorOccurred` hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOccurredHookInput {
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_context: Option<String>,
    #[serde(default)]
    pub recoverable: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Context passed alongside every hook invocation.
#[derive(Debug, Clone)]
pub struct HookInvocation {
    pub session_id: String,
}

/// A hook callback: receives a typed input and returns an optional output
/// object that is passed back to the CLI unchanged.
pub type HookFn<I, O> =
    Arc<dyn Fn(I, HookInvocation) -> BoxFuture<'static, Result<Option<O>, BoxError>> + Send + Sync>;

/// The set of hooks a session may register. Every slot is optional; a
/// missing hook answers its invocation with `null`.
#[derive(Clone, Default)]
pub struct SessionHooks {
    pub on_pre_tool_use: Option<HookFn<PreToolUseHookInput, PreToolUseHookOutput>>,
    pub on_post_tool_use: Option<HookFn<PostToolUseHookInput, Value>>,
    pub on_user_prompt_submitted: Option<HookFn<UserPromptSubmittedHookInput, Value>>,
    pub on_session_start: Option<HookFn<SessionStartHookInput, Value>>,
    pub on_session_end: Option<HookFn<SessionEndHookInput, Value>>,
    pub on_error_occurred: Option<HookFn<ErrorOccurredHookInput, Value>>,
}

impl SessionHooks {
    /// Dispatch a `hooks.invoke` by its `hookType`. Returns the hook's
    /// output serialized for the wire, `null` for a missing hook or an
    /// unknown hook type.
    pub(crate) async fn invoke(
        &self,
        hook_type: &str,
        input: Value,
        invocation: HookInvocation,
    ) -> Result<Value, BoxError> {
        match hook_type {
            "preToolUse" => match &self.on_pre_tool_use {
                Some(hook) => {
                    let parsed: PreToolUseHookInput = serde_json::from_value(input)?;
                    to_wire(hook(parsed, invocation).await?)
                }
                None => Ok(Value::Null),
            },
            "postToolUse" => match &self.on_post_tool_use {
                Some(hook) => {
                    let parsed: PostToolUseHookInput = serde_json::from_value(input)?;
                    to_wire(hook(parsed, invocation).await?)
                }
                None => Ok(Value::Null),
            },
            "userPromptSubmitted" => match &self.on_user_prompt_submitted {
                Some(hook) => {
                    let parsed: UserPromptSubmittedHookInput = serde_json::from_value(input)?;
                    to_wire(hook(parsed, invocation).await?)
                }
                None => Ok(Value::Null),
            },
            "sessionStart" => match &self.on_session_start {
                Some(hook) => {
                    let parsed: SessionStartHookInput = serde_json::from_value(input)?;
                    to_wire(hook(parsed, invocation).await?)
                }
                None => Ok(Value::Null),
            },
            "sessionEnd" => match &self.on_session_end {
                Some(hook) => {
                    let parsed: SessionEndHookInput = serde_json::from_value(input)?;
                    to_wire(hook(parsed, invocation).await?)
                }
                None => Ok(Value::Null),
            },
            "errorOccurred" => match &self.on_error_occurred {
                Some(hook) => {
                    let parsed: ErrorOccurredHookInput = serde_json::from_value(input)?;
                    to_wire(hook(parsed, invocation).await?)
                }
                None => Ok(Value::Null),
            },
            _ => Ok(Value::Null),
        }
    }
}

fn to_wire<O: Serialize>(output: Option<O>) -> Result<Value, BoxError> {
    match output {
        Some(output) => Ok(serde_json::to_value(output)?),
        None => Ok(Value::Null),
    }
}
