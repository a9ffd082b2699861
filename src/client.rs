//! Client facade for the Copilot CLI server.
//!
//! [`CopilotClient`] supervises the CLI server process (or connects to an
//! external one), maintains the JSON-RPC connection, and owns the registry
//! of live sessions. Inbound traffic is routed here: `session.event`
//! notifications fan out to the right session's subscribers, and the CLI's
//! `tool.call`, `permission.request`, `user.input.request`, and
//! `hooks.invoke` requests dispatch to the right session's handlers.
//!
//! The client is cheap to clone; clones share one connection and one
//! session registry.

use crate::cli::{self, CliServerBuilder, DEFAULT_READINESS_TIMEOUT};
use crate::error::{Error, Result};
use crate::events::SessionEvent;
use crate::jsonrpc::{JsonRpcErrorData, INTERNAL_ERROR, INVALID_PARAMS};
use crate::rpc::RpcPeer;
use crate::session::CopilotSession;
use crate::transport::Transport;
use crate::types::{
    ConnectionState, CopilotClientOptions, GetAuthStatusResponse, GetStatusResponse, LogLevel,
    ModelInfo, ModelPolicyState, PermissionRequest, PingResponse, ResumeSessionConfig,
    SessionConfig, SessionMetadata, Tool, ToolCallResponse, ToolDefinition, ToolInvocation,
    UserInputRequest,
};
use crate::version;
use futures::FutureExt;
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Child;

/// How often the exit watcher polls the CLI process.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

type SessionRegistry = Arc<Mutex<HashMap<String, CopilotSession>>>;

struct ResolvedOptions {
    cli_path: Option<String>,
    cwd: Option<PathBuf>,
    port: u16,
    use_stdio: bool,
    cli_url: Option<String>,
    explicit_use_stdio: bool,
    log_level: LogLevel,
    auto_start: bool,
    auto_restart: bool,
    env: Option<HashMap<String, String>>,
    readiness_timeout: Duration,
}

struct ClientInner {
    options: ResolvedOptions,
    state: Mutex<ConnectionState>,
    peer: Mutex<Option<Arc<RpcPeer>>>,
    child: tokio::sync::Mutex<Option<Child>>,
    actual_port: Mutex<Option<u16>>,
    sessions: SessionRegistry,
    force_stopping: AtomicBool,
    /// Serializes start/stop transitions.
    lifecycle: tokio::sync::Mutex<()>,
}

/// Main client for interacting with the Copilot CLI server.
///
/// # Example
///
/// ```no_run
/// use copilot_codes::{CopilotClient, CopilotClientOptions, MessageOptions, SessionConfig};
///
/// # async fn example() -> copilot_codes::Result<()> {
/// let client = CopilotClient::new(CopilotClientOptions::default());
/// client.start().await?;
///
/// let session = client.create_session(SessionConfig::default()).await?;
/// let reply = session
///     .send_and_wait(MessageOptions::new("What is 2 + 2?"), None)
///     .await?;
/// if let Some(event) = reply {
///     println!("assistant: {}", event.content().unwrap_or(""));
/// }
///
/// session.destroy().await?;
/// client.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CopilotClient {
    inner: Arc<ClientInner>,
}

impl CopilotClient {
    /// Create a client from options. Nothing is spawned or connected until
    /// [`CopilotClient::start`] (or the first session operation, when
    /// `auto_start` is enabled).
    pub fn new(options: CopilotClientOptions) -> Self {
        let is_external = options.cli_url.is_some();
        let resolved = ResolvedOptions {
            cli_path: options.cli_path,
            cwd: options.cwd,
            port: options.port.unwrap_or(0),
            use_stdio: if is_external {
                false
            } else {
                options.use_stdio.unwrap_or(true)
            },
            cli_url: options.cli_url,
            explicit_use_stdio: options.use_stdio == Some(true),
            log_level: options.log_level.unwrap_or_default(),
            auto_start: options.auto_start.unwrap_or(true),
            auto_restart: options.auto_restart.unwrap_or(true),
            env: options.env,
            readiness_timeout: options.readiness_timeout.unwrap_or(DEFAULT_READINESS_TIMEOUT),
        };

        Self {
            inner: Arc::new(ClientInner {
                options: resolved,
                state: Mutex::new(ConnectionState::Disconnected),
                peer: Mutex::new(None),
                child: tokio::sync::Mutex::new(None),
                actual_port: Mutex::new(None),
                sessions: Arc::new(Mutex::new(HashMap::new())),
                force_stopping: AtomicBool::new(false),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock().unwrap()
    }

    /// Port of the CLI server when connected over TCP; `None` in stdio mode
    /// or while disconnected.
    pub fn cli_port(&self) -> Option<u16> {
        *self.inner.actual_port.lock().unwrap()
    }

    /// Start the CLI server (unless connecting to an external one) and
    /// establish the connection, including the protocol-version handshake.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.inner.lifecycle.lock().await;
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        match self.start_inner().await {
            Ok(()) => {
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Error);
                Err(e)
            }
        }
    }

    async fn start_inner(&self) -> Result<()> {
        self.validate_options()?;
        let options = &self.inner.options;

        let transport = if let Some(url) = &options.cli_url {
            let (host, port) = parse_cli_url(url)?;
            info!("[CLIENT] connecting to external CLI server at {}:{}", host, port);
            let stream = connect_tcp(&host, port, options.readiness_timeout).await?;
            *self.inner.actual_port.lock().unwrap() = Some(port);
            Transport::from_tcp(stream)
        } else {
            self.spawn_cli_server().await?
        };

        let peer = RpcPeer::new(transport);
        self.wire_dispatch(&peer);
        peer.start();
        *self.inner.peer.lock().unwrap() = Some(Arc::clone(&peer));

        self.verify_protocol_version().await
    }

    /// Spawn the CLI server process, wait for readiness, and build its
    /// transport. In pipe mode readiness is the spawn itself; in TCP mode
    /// it is the port announcement on stdout.
    async fn spawn_cli_server(&self) -> Result<Transport> {
        let options = &self.inner.options;
        let mut builder = CliServerBuilder::new()
            .log_level(options.log_level)
            .use_stdio(options.use_stdio)
            .port(options.port);
        if let Some(path) = &options.cli_path {
            builder = builder.cli_path(path);
        }
        if let Some(cwd) = &options.cwd {
            builder = builder.cwd(cwd.clone());
        }
        if let Some(env) = &options.env {
            builder = builder.env(env.clone());
        }

        let mut child = builder.spawn()?;
        if let Some(stderr) = child.stderr.take() {
            cli::forward_stderr(stderr);
        }

        let transport = if options.use_stdio {
            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| Error::Spawn("Failed to get stdin handle".to_string()))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| Error::Spawn("Failed to get stdout handle".to_string()))?;
            Transport::from_child_pipes(stdin, stdout)
        } else {
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| Error::Spawn("Failed to get stdout handle".to_string()))?;

            let port = match cli::wait_for_port(stdout, options.readiness_timeout).await {
                Ok(port) => port,
                Err(e) => {
                    // Readiness failed; don't leave a half-started server behind.
                    let exit = child.try_wait().ok().flatten();
                    let _ = child.kill().await;
                    return Err(match exit {
                        Some(status) => {
                            Error::Spawn(format!("CLI process exited before readiness: {}", status))
                        }
                        None => e,
                    });
                }
            };
            *self.inner.actual_port.lock().unwrap() = Some(port);
            let stream = connect_tcp("127.0.0.1", port, options.readiness_timeout).await?;
            Transport::from_tcp(stream)
        };

        *self.inner.child.lock().await = Some(child);
        self.spawn_exit_watcher();
        Ok(transport)
    }

    /// Stop the CLI server and close all active sessions.
    ///
    /// Returns the cleanup errors that occurred; an empty list means all
    /// cleanup succeeded.
    pub async fn stop(&self) -> Result<Vec<String>> {
        let _guard = self.inner.lifecycle.lock().await;
        let mut errors = Vec::new();

        // Take ownership of every session so no other caller can reach them.
        let sessions: Vec<CopilotSession> = {
            let mut registry = self.inner.sessions.lock().unwrap();
            registry.drain().map(|(_, session)| session).collect()
        };
        for session in sessions {
            if let Err(e) = session.destroy().await {
                errors.push(format!(
                    "Failed to destroy session {}: {}",
                    session.session_id(),
                    e
                ));
            }
        }

        let peer = self.inner.peer.lock().unwrap().take();
        if let Some(peer) = peer {
            peer.stop().await;
        }

        let child = self.inner.child.lock().await.take();
        if let Some(mut child) = child {
            if child.try_wait().ok().flatten().is_none() {
                if let Err(e) = child.kill().await {
                    errors.push(format!("Failed to kill CLI process: {}", e));
                }
            }
        }

        *self.inner.actual_port.lock().unwrap() = None;
        self.set_state(ConnectionState::Disconnected);
        Ok(errors)
    }

    /// Forcefully stop without graceful cleanup: sessions are dropped
    /// without `session.destroy`, the transport is torn down first so
    /// blocked I/O unblocks, and the CLI process is killed without waiting.
    pub async fn force_stop(&self) {
        self.inner.force_stopping.store(true, Ordering::SeqCst);

        self.inner.sessions.lock().unwrap().clear();

        let peer = self.inner.peer.lock().unwrap().take();
        if let Some(peer) = peer {
            peer.force_stop().await;
        }

        let child = self.inner.child.lock().await.take();
        if let Some(mut child) = child {
            let _ = child.start_kill();
        }

        *self.inner.actual_port.lock().unwrap() = None;
        self.set_state(ConnectionState::Disconnected);
        self.inner.force_stopping.store(false, Ordering::SeqCst);
    }

    /// Send a ping to verify connectivity.
    pub async fn ping(&self, message: Option<&str>) -> Result<PingResponse> {
        let peer = self.peer()?;
        let mut params = Map::new();
        if let Some(message) = message {
            params.insert("message".to_string(), json!(message));
        }
        let result = peer.request("ping", Value::Object(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Get CLI status including version and protocol information.
    pub async fn get_status(&self) -> Result<GetStatusResponse> {
        let result = self.peer()?.request("status.get", json!({})).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Get current authentication status.
    pub async fn get_auth_status(&self) -> Result<GetAuthStatusResponse> {
        let result = self.peer()?.request("auth.getStatus", json!({})).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// List available models with their metadata.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let result = self.peer()?.request("models.list", json!({})).await?;
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            models: Vec<ModelInfo>,
        }
        let response: Response = serde_json::from_value(result)?;
        Ok(response.models)
    }

    /// Whether `model_id` appears in `models.list` with an enabled policy.
    pub async fn is_model_enabled(&self, model_id: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|model| {
            model.id == model_id
                && model
                    .policy
                    .as_ref()
                    .map(|policy| policy.state == ModelPolicyState::Enabled)
                    .unwrap_or(false)
        }))
    }

    /// List all sessions known to the CLI server.
    pub async fn list_sessions(&self) -> Result<Vec<SessionMetadata>> {
        let result = self.peer()?.request("session.list", json!({})).await?;
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            sessions: Vec<SessionMetadata>,
        }
        let response: Response = serde_json::from_value(result)?;
        Ok(response.sessions)
    }

    /// ID of the most recently updated session, or `None` if none exist.
    /// Recency is the server's `modifiedTime`, not local call order.
    pub async fn get_last_session_id(&self) -> Result<Option<String>> {
        let result = self.peer()?.request("session.getLastId", json!({})).await?;
        Ok(result
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Permanently delete a session and its history.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let result = self
            .peer()?
            .request("session.delete", json!({"sessionId": session_id}))
            .await?;

        let success = result
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !success {
            let reason = result
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            return Err(Error::SessionError(format!(
                "Failed to delete session {}: {}",
                session_id, reason
            )));
        }

        self.inner.sessions.lock().unwrap().remove(session_id);
        Ok(())
    }

    /// Create a new conversation session.
    ///
    /// When the client is not connected and `auto_start` is enabled, the
    /// connection is established first. With an explicit `model` (and
    /// `skip_model_validation` unset) the model is prechecked against
    /// `models.list` before any session traffic.
    pub async fn create_session(&self, config: SessionConfig) -> Result<CopilotSession> {
        self.ensure_started().await?;

        if let Some(model) = &config.model {
            if !config.skip_model_validation {
                self.precheck_model(model).await?;
            }
        }

        let payload = build_create_payload(&config)?;
        let result = self.peer()?.request("session.create", payload).await?;

        let session = self.register_session(
            &result,
            &config.tools,
            config.on_permission_request.clone(),
            config.on_user_input_request.clone(),
            config.hooks.clone(),
        )?;
        Ok(session)
    }

    /// Resume an existing conversation session by its ID, keeping its
    /// history on the CLI side.
    pub async fn resume_session(
        &self,
        session_id: &str,
        config: ResumeSessionConfig,
    ) -> Result<CopilotSession> {
        self.ensure_started().await?;

        let payload = build_resume_payload(session_id, &config)?;
        let result = self.peer()?.request("session.resume", payload).await?;

        let session = self.register_session(
            &result,
            &config.tools,
            config.on_permission_request.clone(),
            config.on_user_input_request.clone(),
            config.hooks.clone(),
        )?;
        Ok(session)
    }

    // -- internals --

    fn set_state(&self, state: ConnectionState) {
        *self.inner.state.lock().unwrap() = state;
    }

    fn peer(&self) -> Result<Arc<RpcPeer>> {
        self.inner
            .peer
            .lock()
            .unwrap()
            .clone()
            .ok_or(Error::NotConnected)
    }

    async fn ensure_started(&self) -> Result<()> {
        if self.peer().is_ok() {
            return Ok(());
        }
        if self.inner.options.auto_start {
            self.start().await
        } else {
            Err(Error::NotConnected)
        }
    }

    fn validate_options(&self) -> Result<()> {
        let options = &self.inner.options;
        if options.cli_url.is_some() && (options.explicit_use_stdio || options.cli_path.is_some()) {
            return Err(Error::Configuration(
                "cli_url is mutually exclusive with use_stdio and cli_path".to_string(),
            ));
        }
        Ok(())
    }

    async fn verify_protocol_version(&self) -> Result<()> {
        let response = self.ping(None).await?;
        version::check_protocol_version(response.protocol_version)
    }

    async fn precheck_model(&self, model: &str) -> Result<()> {
        let models = self.list_models().await?;
        let info = models.iter().find(|m| m.id == model).ok_or_else(|| {
            Error::Configuration(format!("Cannot create session: Model '{}' not found", model))
        })?;

        if let Some(policy) = &info.policy {
            if policy.state != ModelPolicyState::Enabled {
                return Err(Error::Configuration(format!(
                    "Cannot create session: Model '{}' is not enabled (status: {})",
                    model, policy.state
                )));
            }
        }
        Ok(())
    }

    fn register_session(
        &self,
        create_result: &Value,
        tools: &[Tool],
        permission_handler: Option<crate::types::PermissionHandlerFn>,
        user_input_handler: Option<crate::types::UserInputHandlerFn>,
        hooks: Option<crate::hooks::SessionHooks>,
    ) -> Result<CopilotSession> {
        let session_id = create_result
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("invalid response: missing sessionId".to_string()))?
            .to_string();
        let workspace_path = create_result
            .get("workspacePath")
            .and_then(Value::as_str)
            .map(str::to_string);

        let session = CopilotSession::new(session_id.clone(), workspace_path, self.peer()?);
        session.register_tools(tools);
        if let Some(handler) = permission_handler {
            session.register_permission_handler(handler);
        }
        if let Some(handler) = user_input_handler {
            session.register_user_input_handler(handler);
        }
        if let Some(hooks) = hooks {
            session.register_hooks(hooks);
        }

        self.inner
            .sessions
            .lock()
            .unwrap()
            .insert(session_id, session.clone());
        Ok(session)
    }

    /// Install the inbound dispatch: event fan-out plus the four
    /// server-initiated request families, each resolved against the session
    /// registry.
    fn wire_dispatch(&self, peer: &Arc<RpcPeer>) {
        let sessions = Arc::clone(&self.inner.sessions);
        peer.set_notification_handler(Arc::new(move |method, params| {
            if method != "session.event" {
                debug!("[CLIENT] ignoring notification {}", method);
                return;
            }
            let Some(session_id) = params.get("sessionId").and_then(Value::as_str) else {
                warn!("[CLIENT] session.event without sessionId");
                return;
            };
            let event: SessionEvent =
                match serde_json::from_value(params.get("event").cloned().unwrap_or(Value::Null)) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("[CLIENT] undecodable session.event: {}", e);
                        return;
                    }
                };

            let session = sessions.lock().unwrap().get(session_id).cloned();
            if let Some(session) = session {
                session.dispatch_event(&event);
            } else {
                debug!("[CLIENT] event for unknown session {}", session_id);
            }
        }));

        let sessions = Arc::clone(&self.inner.sessions);
        peer.set_request_handler(
            "tool.call",
            Arc::new(move |params| {
                let sessions = Arc::clone(&sessions);
                async move { handle_tool_call(sessions, params).await }.boxed()
            }),
        );

        let sessions = Arc::clone(&self.inner.sessions);
        peer.set_request_handler(
            "permission.request",
            Arc::new(move |params| {
                let sessions = Arc::clone(&sessions);
                async move { handle_permission_request(sessions, params).await }.boxed()
            }),
        );

        let sessions = Arc::clone(&self.inner.sessions);
        peer.set_request_handler(
            "user.input.request",
            Arc::new(move |params| {
                let sessions = Arc::clone(&sessions);
                async move { handle_user_input_request(sessions, params).await }.boxed()
            }),
        );

        let sessions = Arc::clone(&self.inner.sessions);
        peer.set_request_handler(
            "hooks.invoke",
            Arc::new(move |params| {
                let sessions = Arc::clone(&sessions);
                async move { handle_hook_invoke(sessions, params).await }.boxed()
            }),
        );
    }

    /// Watch the CLI process for unexpected exit. A crash after readiness
    /// while connected triggers stop-then-start when auto-restart is
    /// enabled; in-flight requests fail with `ClientStopped` either way.
    fn spawn_exit_watcher(&self) {
        let client = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(EXIT_POLL_INTERVAL).await;

                let status = {
                    let mut child = client.inner.child.lock().await;
                    match child.as_mut() {
                        // Stopped and reaped elsewhere; nothing to watch.
                        None => return,
                        Some(child) => child.try_wait().ok().flatten(),
                    }
                };

                let Some(status) = status else { continue };

                if client.inner.force_stopping.load(Ordering::SeqCst)
                    || client.state() != ConnectionState::Connected
                {
                    return;
                }

                warn!("[CLIENT] CLI process exited unexpectedly ({})", status);
                if client.inner.options.auto_restart {
                    info!("[CLIENT] auto-restarting CLI server");
                    if let Err(e) = client.stop().await.map(drop) {
                        warn!("[CLIENT] cleanup before restart failed: {}", e);
                    }
                    if let Err(e) = client.start().await {
                        error!("[CLIENT] auto-restart failed: {}", e);
                    }
                } else {
                    let _ = client.stop().await;
                }
                return;
            }
        });
    }
}

async fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let connect = TcpStream::connect((host, port));
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(Error::Spawn(format!(
            "Failed to connect to CLI server at {}:{}: {}",
            host, port, e
        ))),
        Err(_) => Err(Error::Spawn(format!(
            "Timeout connecting to CLI server at {}:{}",
            host, port
        ))),
    }
}

/// Parse a `cli_url` into host and port.
///
/// Accepts `"host:port"`, `"http://host:port"`, `"https://host:port"`, or a
/// bare `"port"` (host defaults to localhost).
pub(crate) fn parse_cli_url(url: &str) -> Result<(String, u16)> {
    let clean = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);

    let parse_port = |raw: &str| -> Result<u16> {
        match raw.parse::<u32>() {
            Ok(port) if (1..=65535).contains(&port) => Ok(port as u16),
            _ => Err(Error::Configuration(format!(
                "Invalid port in cliUrl: {}",
                url
            ))),
        }
    };

    if !clean.is_empty() && clean.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(("localhost".to_string(), parse_port(clean)?));
    }

    let mut parts = clean.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(port), None) => {
            let host = if host.is_empty() { "localhost" } else { host };
            Ok((host.to_string(), parse_port(port)?))
        }
        _ => Err(Error::Configuration(format!(
            "Invalid cliUrl format: {}",
            url
        ))),
    }
}

fn find_session(
    sessions: &SessionRegistry,
    session_id: &str,
) -> std::result::Result<CopilotSession, JsonRpcErrorData> {
    sessions
        .lock()
        .unwrap()
        .get(session_id)
        .cloned()
        .ok_or_else(|| {
            JsonRpcErrorData::new(INVALID_PARAMS, format!("unknown session {}", session_id))
        })
}

async fn handle_tool_call(
    sessions: SessionRegistry,
    params: Value,
) -> std::result::Result<Value, JsonRpcErrorData> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ToolCallParams {
        session_id: String,
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        arguments: Value,
    }

    let call: ToolCallParams = serde_json::from_value(params).map_err(|e| {
        JsonRpcErrorData::new(INVALID_PARAMS, format!("invalid tool call payload: {}", e))
    })?;
    let session = find_session(&sessions, &call.session_id)?;

    let result = session
        .handle_tool_call(ToolInvocation {
            session_id: call.session_id,
            tool_call_id: call.tool_call_id,
            tool_name: call.tool_name,
            arguments: call.arguments,
        })
        .await;

    serde_json::to_value(ToolCallResponse { result })
        .map_err(|e| JsonRpcErrorData::new(INTERNAL_ERROR, e.to_string()))
}

async fn handle_permission_request(
    sessions: SessionRegistry,
    params: Value,
) -> std::result::Result<Value, JsonRpcErrorData> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct PermissionParams {
        session_id: String,
        permission_request: PermissionRequest,
    }

    let request: PermissionParams = serde_json::from_value(params).map_err(|e| {
        JsonRpcErrorData::new(
            INVALID_PARAMS,
            format!("invalid permission request payload: {}", e),
        )
    })?;
    let session = find_session(&sessions, &request.session_id)?;

    let result = session
        .handle_permission_request(request.permission_request)
        .await;
    Ok(json!({ "result": result }))
}

async fn handle_user_input_request(
    sessions: SessionRegistry,
    params: Value,
) -> std::result::Result<Value, JsonRpcErrorData> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct UserInputParams {
        session_id: String,
        request: UserInputRequest,
    }

    let request: UserInputParams = serde_json::from_value(params).map_err(|e| {
        JsonRpcErrorData::new(
            INVALID_PARAMS,
            format!("invalid user input payload: {}", e),
        )
    })?;
    let session = find_session(&sessions, &request.session_id)?;

    match session.handle_user_input_request(request.request).await {
        Ok(response) => serde_json::to_value(response)
            .map_err(|e| JsonRpcErrorData::new(INTERNAL_ERROR, e.to_string())),
        Err(e) => Err(JsonRpcErrorData::new(INTERNAL_ERROR, e.to_string())),
    }
}

async fn handle_hook_invoke(
    sessions: SessionRegistry,
    params: Value,
) -> std::result::Result<Value, JsonRpcErrorData> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct HookParams {
        session_id: String,
        hook_type: String,
        #[serde(default)]
        input: Value,
    }

    let request: HookParams = serde_json::from_value(params).map_err(|e| {
        JsonRpcErrorData::new(INVALID_PARAMS, format!("invalid hook payload: {}", e))
    })?;
    let session = find_session(&sessions, &request.session_id)?;

    session
        .handle_hook_invoke(&request.hook_type, request.input)
        .await
        .map_err(|e| JsonRpcErrorData::new(INTERNAL_ERROR, e.to_string()))
}

fn build_create_payload(config: &SessionConfig) -> Result<Value> {
    let mut payload = Map::new();

    if let Some(model) = &config.model {
        payload.insert("model".to_string(), json!(model));
    }
    if let Some(session_id) = &config.session_id {
        payload.insert("sessionId".to_string(), json!(session_id));
    }
    if !config.tools.is_empty() {
        payload.insert(
            "tools".to_string(),
            serde_json::to_value(tool_definitions(&config.tools))?,
        );
    }
    if let Some(system_message) = &config.system_message {
        payload.insert("systemMessage".to_string(), serde_json::to_value(system_message)?);
    }
    if let Some(available) = &config.available_tools {
        payload.insert("availableTools".to_string(), json!(available));
    }
    if let Some(excluded) = &config.excluded_tools {
        payload.insert("excludedTools".to_string(), json!(excluded));
    }
    if config.on_permission_request.is_some() {
        payload.insert("requestPermission".to_string(), json!(true));
    }
    if let Some(streaming) = config.streaming {
        payload.insert("streaming".to_string(), json!(streaming));
    }
    if let Some(provider) = &config.provider {
        payload.insert("provider".to_string(), serde_json::to_value(provider)?);
    }
    if let Some(servers) = &config.mcp_servers {
        payload.insert("mcpServers".to_string(), serde_json::to_value(servers)?);
    }
    if let Some(agents) = &config.custom_agents {
        payload.insert("customAgents".to_string(), serde_json::to_value(agents)?);
    }
    if let Some(config_dir) = &config.config_dir {
        payload.insert("configDir".to_string(), json!(config_dir));
    }
    if let Some(directories) = &config.skill_directories {
        payload.insert("skillDirectories".to_string(), json!(directories));
    }
    if let Some(skills) = &config.disabled_skills {
        payload.insert("disabledSkills".to_string(), json!(skills));
    }
    if let Some(infinite) = &config.infinite_sessions {
        payload.insert("infiniteSessions".to_string(), serde_json::to_value(infinite)?);
    }

    Ok(Value::Object(payload))
}

fn build_resume_payload(session_id: &str, config: &ResumeSessionConfig) -> Result<Value> {
    let mut payload = Map::new();
    payload.insert("sessionId".to_string(), json!(session_id));

    if !config.tools.is_empty() {
        payload.insert(
            "tools".to_string(),
            serde_json::to_value(tool_definitions(&config.tools))?,
        );
    }
    if let Some(provider) = &config.provider {
        payload.insert("provider".to_string(), serde_json::to_value(provider)?);
    }
    if config.on_permission_request.is_some() {
        payload.insert("requestPermission".to_string(), json!(true));
    }
    if let Some(streaming) = config.streaming {
        payload.insert("streaming".to_string(), json!(streaming));
    }
    if let Some(servers) = &config.mcp_servers {
        payload.insert("mcpServers".to_string(), serde_json::to_value(servers)?);
    }
    if let Some(agents) = &config.custom_agents {
        payload.insert("customAgents".to_string(), serde_json::to_value(agents)?);
    }
    if let Some(directories) = &config.skill_directories {
        payload.insert("skillDirectories".to_string(), json!(directories));
    }
    if let Some(skills) = &config.disabled_skills {
        payload.insert("disabledSkills".to_string(), json!(skills));
    }

    Ok(Value::Object(payload))
}

fn tool_definitions(tools: &[Tool]) -> Vec<ToolDefinition<'_>> {
    tools
        .iter()
        .filter(|tool| !tool.name.is_empty())
        .map(|tool| ToolDefinition {
            name: &tool.name,
            description: &tool.description,
            parameters: tool.parameters.as_ref(),
        })
        .collect()
}
