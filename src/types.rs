//! Core configuration and wire types for the Copilot CLI SDK.

use crate::events::SessionEvent;
use crate::tool::ToolResult;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Error type user-supplied handlers may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Connection state of a [`crate::CopilotClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Log level passed to the CLI server via `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    None,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
    All,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::None => "none",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::All => "all",
        }
    }
}

/// Options for creating a [`crate::CopilotClient`].
///
/// The defaults spawn the CLI server found on `PATH` (or at
/// `COPILOT_CLI_PATH`) and talk to it over stdio pipes.
#[derive(Debug, Clone, Default)]
pub struct CopilotClientOptions {
    /// Path to the Copilot CLI executable. Defaults to the
    /// `COPILOT_CLI_PATH` environment variable, falling back to `"copilot"`.
    pub cli_path: Option<String>,
    /// Working directory for the CLI process.
    pub cwd: Option<PathBuf>,
    /// Port for the CLI server (TCP mode only; 0 lets the CLI pick).
    pub port: Option<u16>,
    /// Use stdio transport instead of TCP (default: true).
    pub use_stdio: Option<bool>,
    /// Connect to an already-running CLI server instead of spawning one.
    /// Accepts `"host:port"`, `"http://host:port"`, `"https://host:port"`,
    /// or a bare `"port"` (host defaults to localhost). Mutually exclusive
    /// with `cli_path` and `use_stdio`.
    pub cli_url: Option<String>,
    /// Log level for the CLI server (default: info).
    pub log_level: Option<LogLevel>,
    /// Start the CLI server automatically on first session use (default: true).
    pub auto_start: Option<bool>,
    /// Restart the CLI server if it crashes after startup (default: true).
    pub auto_restart: Option<bool>,
    /// Environment for the CLI process. When unset, the parent environment
    /// is inherited minus debug-logging variables that would pollute stdout.
    pub env: Option<HashMap<String, String>>,
    /// How long to wait for the CLI server to become ready (default: 10s).
    pub readiness_timeout: Option<Duration>,
}

/// A tool invocation passed to a [`ToolHandler`].
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub session_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// User-supplied tool implementation.
///
/// The returned value is normalized via
/// [`crate::tool::normalize_tool_result`]: return a string, any JSON value,
/// or a full [`ToolResult`] (via [`ToolResult::into_value`]).
pub type ToolHandler =
    Arc<dyn Fn(ToolInvocation) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync>;

/// A custom tool exposed to the assistant.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's arguments, passed through to the
    /// CLI unchanged.
    pub parameters: Option<Value>,
    pub handler: ToolHandler,
}

impl Tool {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ToolInvocation) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
            handler: Arc::new(move |invocation| Box::pin(handler(invocation))),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Wire shape of a tool definition inside `session.create` params.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ToolDefinition<'a> {
    pub name: &'a str,
    pub description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<&'a Value>,
}

/// System message configuration for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessageConfig {
    pub mode: SystemMessageMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemMessageMode {
    /// Use the CLI foundation prompt with optional appended content.
    Append,
    /// Use the caller-provided system message entirely, dropping all CLI
    /// guardrails including security restrictions.
    Replace,
}

/// Configuration for a local (spawned) MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpLocalServerConfig {
    /// Tools to include; `["*"]` means all, `[]` means none.
    pub tools: Vec<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub server_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

/// Configuration for a remote MCP server (HTTP or SSE).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpRemoteServerConfig {
    pub tools: Vec<String>,
    #[serde(rename = "type")]
    pub server_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

/// MCP server configuration, passed through to the CLI unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServerConfig {
    Remote(McpRemoteServerConfig),
    Local(McpLocalServerConfig),
}

/// Configuration for a custom agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomAgentConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_servers: Option<HashMap<String, McpServerConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infer: Option<bool>,
}

/// Azure-specific provider options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureProviderOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// Custom model provider configuration (bring your own key).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wire_api: Option<String>,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Bearer token for authentication; takes precedence over `api_key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureProviderOptions>,
}

/// Infinite-session configuration: automatic context compaction and
/// workspace persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfiniteSessionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Context utilization (0.0-1.0) at which background compaction starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_compaction_threshold: Option<f64>,
    /// Context utilization (0.0-1.0) at which the session blocks until
    /// compaction completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_exhaustion_threshold: Option<f64>,
}

/// A permission request from the CLI server.
///
/// `kind` is one of `shell`, `write`, `mcp`, `read`, `url`; the remaining
/// fields vary by kind and are preserved in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decision kinds for a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionResultKind {
    Approved,
    DeniedByRules,
    DeniedNoApprovalRuleAndCouldNotRequestFromUser,
    DeniedInteractivelyByUser,
}

/// Result of a permission request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequestResult {
    pub kind: PermissionResultKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Value>>,
}

impl PermissionRequestResult {
    pub fn approved() -> Self {
        Self {
            kind: PermissionResultKind::Approved,
            rules: None,
        }
    }

    pub fn denied_interactively() -> Self {
        Self {
            kind: PermissionResultKind::DeniedInteractivelyByUser,
            rules: None,
        }
    }

    /// The default when no handler is installed or the handler faulted.
    pub(crate) fn default_deny() -> Self {
        Self {
            kind: PermissionResultKind::DeniedNoApprovalRuleAndCouldNotRequestFromUser,
            rules: None,
        }
    }
}

/// Context passed alongside a permission request.
#[derive(Debug, Clone)]
pub struct PermissionInvocation {
    pub session_id: String,
}

pub type PermissionHandlerFn = Arc<
    dyn Fn(
            PermissionRequest,
            PermissionInvocation,
        ) -> BoxFuture<'static, Result<PermissionRequestResult, BoxError>>
        + Send
        + Sync,
>;

/// A request for user input (the `ask_user` tool).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The user's answer to a [`UserInputRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputResponse {
    pub answer: String,
    #[serde(default)]
    pub was_freeform: bool,
}

/// Context passed alongside a user input request.
#[derive(Debug, Clone)]
pub struct UserInputInvocation {
    pub session_id: String,
}

pub type UserInputHandlerFn = Arc<
    dyn Fn(
            UserInputRequest,
            UserInputInvocation,
        ) -> BoxFuture<'static, Result<UserInputResponse, BoxError>>
        + Send
        + Sync,
>;

/// Configuration for creating a session.
#[derive(Clone, Default)]
pub struct SessionConfig {
    /// Model to use for the session.
    pub model: Option<String>,
    /// Custom session ID instead of a CLI-assigned one.
    pub session_id: Option<String>,
    /// Custom tools exposed to the assistant.
    pub tools: Vec<Tool>,
    pub system_message: Option<SystemMessageConfig>,
    /// Tool names to allow; takes precedence over `excluded_tools`.
    pub available_tools: Option<Vec<String>>,
    /// Tool names to disable; ignored when `available_tools` is set.
    pub excluded_tools: Option<Vec<String>>,
    /// Handler for permission requests. Registering one enables the
    /// `requestPermission` callback on the wire.
    pub on_permission_request: Option<PermissionHandlerFn>,
    /// Handler for `ask_user` requests.
    pub on_user_input_request: Option<UserInputHandlerFn>,
    /// Lifecycle hooks.
    pub hooks: Option<crate::hooks::SessionHooks>,
    pub provider: Option<ProviderConfig>,
    /// Stream assistant message and reasoning chunks as they are generated.
    pub streaming: Option<bool>,
    pub mcp_servers: Option<HashMap<String, McpServerConfig>>,
    pub custom_agents: Option<Vec<CustomAgentConfig>>,
    /// Override the default configuration directory location.
    pub config_dir: Option<PathBuf>,
    /// Directories to load skills from.
    pub skill_directories: Option<Vec<PathBuf>>,
    /// Skill names to disable.
    pub disabled_skills: Option<Vec<String>>,
    pub infinite_sessions: Option<InfiniteSessionConfig>,
    /// Skip the model-enablement precheck against `models.list`.
    pub skip_model_validation: bool,
}

/// Configuration for resuming a session.
#[derive(Clone, Default)]
pub struct ResumeSessionConfig {
    pub tools: Vec<Tool>,
    pub provider: Option<ProviderConfig>,
    pub on_permission_request: Option<PermissionHandlerFn>,
    pub on_user_input_request: Option<UserInputHandlerFn>,
    pub hooks: Option<crate::hooks::SessionHooks>,
    pub streaming: Option<bool>,
    pub mcp_servers: Option<HashMap<String, McpServerConfig>>,
    pub custom_agents: Option<Vec<CustomAgentConfig>>,
    pub skill_directories: Option<Vec<PathBuf>>,
    pub disabled_skills: Option<Vec<String>>,
}

/// A file or directory attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(rename = "type")]
    pub attachment_type: AttachmentType,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    File,
    Directory,
}

/// Message processing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageMode {
    Enqueue,
    Immediate,
}

/// Options for sending a message to a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageOptions {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<MessageMode>,
}

impl MessageOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachments: None,
            mode: None,
        }
    }
}

/// Response from `ping`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub message: String,
    pub timestamp: i64,
    #[serde(default)]
    pub protocol_version: Option<i64>,
}

/// Response from `status.get`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStatusResponse {
    pub version: String,
    pub protocol_version: i64,
}

/// Response from `auth.getStatus`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAuthStatusResponse {
    pub is_authenticated: bool,
    #[serde(default)]
    pub auth_type: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
}

/// Vision-specific model limits.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelVisionLimits {
    #[serde(default)]
    pub supported_media_types: Vec<String>,
    #[serde(default)]
    pub max_prompt_images: Option<u64>,
    #[serde(default)]
    pub max_prompt_image_size: Option<u64>,
}

/// Model limits.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelLimits {
    #[serde(default)]
    pub max_prompt_tokens: Option<u64>,
    #[serde(default)]
    pub max_context_window_tokens: Option<u64>,
    #[serde(default)]
    pub vision: Option<ModelVisionLimits>,
}

/// Model support flags.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelSupports {
    #[serde(default)]
    pub vision: bool,
}

/// Model capabilities and limits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelCapabilities {
    #[serde(default)]
    pub supports: ModelSupports,
    #[serde(default)]
    pub limits: ModelLimits,
}

/// Policy state of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelPolicyState {
    Enabled,
    Disabled,
    Unconfigured,
}

impl std::fmt::Display for ModelPolicyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModelPolicyState::Enabled => "enabled",
            ModelPolicyState::Disabled => "disabled",
            ModelPolicyState::Unconfigured => "unconfigured",
        };
        write!(f, "{}", s)
    }
}

/// Model policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelPolicy {
    pub state: ModelPolicyState,
    #[serde(default)]
    pub terms: Option<String>,
}

/// Model billing information.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelBilling {
    pub multiplier: f64,
}

/// An available model, from `models.list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub capabilities: ModelCapabilities,
    #[serde(default)]
    pub policy: Option<ModelPolicy>,
    #[serde(default)]
    pub billing: Option<ModelBilling>,
}

/// Metadata about a session, from `session.list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub modified_time: DateTime<Utc>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub is_remote: bool,
}

/// Synchronous callback invoked for each session event.
pub type SessionEventHandler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Wire shape of the response to a `tool.call` request.
#[derive(Debug, Serialize)]
pub(crate) struct ToolCallResponse {
    pub result: ToolResult,
}
