//! A single conversation session with the Copilot CLI.
//!
//! A session maintains conversation state on the CLI side; this handle
//! carries the client-side half: event subscribers, tool handlers, the
//! permission and user-input handlers, and lifecycle hooks. Handles are
//! cheap to clone and safe for concurrent use; after [`CopilotSession::destroy`]
//! the handle stays dereferenceable but its operations fail.

use crate::error::{Error, Result};
use crate::events::{EventType, SessionEvent};
use crate::hooks::{HookInvocation, SessionHooks};
use crate::rpc::RpcPeer;
use crate::tool::{self, ToolResult};
use crate::types::{
    BoxError, PermissionHandlerFn, PermissionInvocation, PermissionRequest,
    PermissionRequestResult, SessionEventHandler, Tool, ToolHandler, ToolInvocation,
    UserInputHandlerFn, UserInputInvocation, UserInputRequest, UserInputResponse,
};
use log::{debug, error, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

/// Default timeout for [`CopilotSession::send_and_wait`].
const DEFAULT_SEND_AND_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

struct Subscriber {
    id: u64,
    handler: SessionEventHandler,
}

pub(crate) struct SessionInner {
    session_id: String,
    workspace_path: Option<String>,
    peer: Arc<RpcPeer>,
    subscribers: RwLock<Vec<Subscriber>>,
    next_subscriber_id: AtomicU64,
    tool_handlers: RwLock<HashMap<String, ToolHandler>>,
    permission_handler: RwLock<Option<PermissionHandlerFn>>,
    user_input_handler: RwLock<Option<UserInputHandlerFn>>,
    hooks: RwLock<Option<SessionHooks>>,
}

/// Handle to a conversation session.
///
/// Created by [`crate::CopilotClient::create_session`] or
/// [`crate::CopilotClient::resume_session`].
#[derive(Clone)]
pub struct CopilotSession {
    inner: Arc<SessionInner>,
}

/// Handle returned by [`CopilotSession::on`]; removes the subscriber when
/// [`Subscription::unsubscribe`] is called. Safe to call repeatedly, and
/// safe to call from within the subscriber itself.
pub struct Subscription {
    session: Weak<SessionInner>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(session) = self.session.upgrade() {
            session
                .subscribers
                .write()
                .unwrap()
                .retain(|s| s.id != self.id);
        }
    }
}

impl CopilotSession {
    pub(crate) fn new(
        session_id: String,
        workspace_path: Option<String>,
        peer: Arc<RpcPeer>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                session_id,
                workspace_path,
                peer,
                subscribers: RwLock::new(Vec::new()),
                next_subscriber_id: AtomicU64::new(0),
                tool_handlers: RwLock::new(HashMap::new()),
                permission_handler: RwLock::new(None),
                user_input_handler: RwLock::new(None),
                hooks: RwLock::new(None),
            }),
        }
    }

    /// The CLI-assigned identifier of this session.
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Path to the session workspace directory when infinite sessions are
    /// enabled; `None` otherwise.
    pub fn workspace_path(&self) -> Option<&str> {
        self.inner.workspace_path.as_deref()
    }

    /// Send a message to this session.
    ///
    /// The message is processed asynchronously; subscribe via
    /// [`CopilotSession::on`] to receive streaming responses. Returns the
    /// message ID, which can be used to correlate events. Concurrent sends
    /// are legal and reach the CLI in arrival order.
    pub async fn send(&self, options: crate::types::MessageOptions) -> Result<String> {
        let mut params = serde_json::to_value(&options)?;
        params["sessionId"] = json!(self.inner.session_id);

        let result = self.inner.peer.request("session.send", params).await?;
        result
            .get("messageId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol("invalid response: missing messageId".to_string()))
    }

    /// Send a message and block until the session becomes idle.
    ///
    /// Subscribes to the event stream before sending, so an early
    /// `session.idle` cannot be missed. Returns the last `assistant.message`
    /// event observed, or `None` if the session went idle without one. A
    /// `session.error` event fails the call with the error's message and
    /// stack.
    ///
    /// `timeout` defaults to 60 seconds. It only stops this caller from
    /// waiting; in-flight CLI work is not aborted.
    pub async fn send_and_wait(
        &self,
        options: crate::types::MessageOptions,
        timeout: Option<Duration>,
    ) -> Result<Option<SessionEvent>> {
        let timeout = timeout.unwrap_or(DEFAULT_SEND_AND_WAIT_TIMEOUT);

        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.on(move |event| {
            let _ = tx.send(event.clone());
        });

        let result = self.wait_for_idle(options, timeout, rx).await;
        subscription.unsubscribe();
        result
    }

    async fn wait_for_idle(
        &self,
        options: crate::types::MessageOptions,
        timeout: Duration,
        mut rx: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Result<Option<SessionEvent>> {
        self.send(options).await?;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut last_assistant_message: Option<SessionEvent> = None;

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    return Err(Error::Timeout(format!(
                        "Timeout after {}ms waiting for session.idle",
                        timeout.as_millis()
                    )));
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        return Err(Error::ClientStopped);
                    };
                    match event.event_type {
                        EventType::AssistantMessage => last_assistant_message = Some(event),
                        EventType::SessionIdle => return Ok(last_assistant_message),
                        EventType::SessionError => {
                            let message = event.error_message().unwrap_or("session error");
                            let detail = match event.error_stack() {
                                Some(stack) => format!("{}\n{}", message, stack),
                                None => message.to_string(),
                            };
                            return Err(Error::SessionError(detail));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Subscribe to events from this session.
    ///
    /// Handlers are called synchronously in registration order. Returns a
    /// [`Subscription`] whose `unsubscribe` removes the handler.
    pub fn on<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.inner.subscribers.write().unwrap().push(Subscriber {
            id,
            handler: Arc::new(handler),
        });

        Subscription {
            session: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Abort the currently processing message. The session remains usable.
    pub async fn abort(&self) -> Result<()> {
        self.inner
            .peer
            .request("session.abort", json!({"sessionId": self.inner.session_id}))
            .await?;
        Ok(())
    }

    /// Destroy this session and release all associated resources.
    ///
    /// The in-memory subscriber list and handler tables are cleared even
    /// when the wire call fails, so no further CLI traffic can reach user
    /// code through this handle.
    pub async fn destroy(&self) -> Result<()> {
        let result = self
            .inner
            .peer
            .request(
                "session.destroy",
                json!({"sessionId": self.inner.session_id}),
            )
            .await;

        self.inner.subscribers.write().unwrap().clear();
        self.inner.tool_handlers.write().unwrap().clear();
        *self.inner.permission_handler.write().unwrap() = None;
        *self.inner.user_input_handler.write().unwrap() = None;
        *self.inner.hooks.write().unwrap() = None;

        result.map(|_| ())
    }

    /// Retrieve the session's full event history, in chronological order.
    /// Each record is re-parsed through the live event deserializer;
    /// records that do not parse are skipped.
    pub async fn get_messages(&self) -> Result<Vec<SessionEvent>> {
        let result = self
            .inner
            .peer
            .request(
                "session.getMessages",
                json!({"sessionId": self.inner.session_id}),
            )
            .await?;

        let raw_events = result
            .get("events")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Protocol("invalid response: missing events".to_string()))?;

        Ok(raw_events
            .iter()
            .filter_map(|raw| serde_json::from_value(raw.clone()).ok())
            .collect())
    }

    // -- internal registration, done at session creation/resume --

    pub(crate) fn register_tools(&self, tools: &[Tool]) {
        let mut table = self.inner.tool_handlers.write().unwrap();
        table.clear();
        for tool in tools {
            if tool.name.is_empty() {
                continue;
            }
            table.insert(tool.name.clone(), Arc::clone(&tool.handler));
        }
    }

    pub(crate) fn register_permission_handler(&self, handler: PermissionHandlerFn) {
        *self.inner.permission_handler.write().unwrap() = Some(handler);
    }

    pub(crate) fn register_user_input_handler(&self, handler: UserInputHandlerFn) {
        *self.inner.user_input_handler.write().unwrap() = Some(handler);
    }

    pub(crate) fn register_hooks(&self, hooks: SessionHooks) {
        *self.inner.hooks.write().unwrap() = Some(hooks);
    }

    // -- internal dispatch, driven by the client's peer wiring --

    /// Fan an event out to all subscribers in registration order.
    ///
    /// The subscriber list is snapshotted before any handler runs, so a
    /// subscriber may unsubscribe itself (or others) without deadlock. A
    /// panicking subscriber is logged and does not stop delivery to the
    /// rest.
    pub(crate) fn dispatch_event(&self, event: &SessionEvent) {
        let handlers: Vec<SessionEventHandler> = {
            let subscribers = self.inner.subscribers.read().unwrap();
            subscribers
                .iter()
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };

        for handler in handlers {
            if std::panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(
                    "[SESSION {}] event subscriber panicked on {}",
                    self.inner.session_id, event.event_type
                );
            }
        }
    }

    /// Serve a `tool.call` from the CLI. Always produces a tool result;
    /// handler faults and unknown tools become failure results, never
    /// JSON-RPC errors.
    pub(crate) async fn handle_tool_call(&self, invocation: ToolInvocation) -> ToolResult {
        let handler = self
            .inner
            .tool_handlers
            .read()
            .unwrap()
            .get(&invocation.tool_name)
            .cloned();

        match handler {
            Some(handler) => tool::execute_tool_call(invocation, handler).await,
            None => {
                debug!(
                    "[SESSION {}] no handler for tool '{}'",
                    self.inner.session_id, invocation.tool_name
                );
                tool::unsupported_tool_result(&invocation.tool_name)
            }
        }
    }

    /// Serve a `permission.request` from the CLI. A missing handler or a
    /// handler fault denies by default.
    pub(crate) async fn handle_permission_request(
        &self,
        request: PermissionRequest,
    ) -> PermissionRequestResult {
        let handler = self.inner.permission_handler.read().unwrap().clone();
        let Some(handler) = handler else {
            return PermissionRequestResult::default_deny();
        };

        let invocation = PermissionInvocation {
            session_id: self.inner.session_id.clone(),
        };

        use futures::FutureExt;
        match AssertUnwindSafe(handler(request, invocation))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(
                    "[SESSION {}] permission handler failed: {}",
                    self.inner.session_id, e
                );
                PermissionRequestResult::default_deny()
            }
            Err(_) => {
                warn!(
                    "[SESSION {}] permission handler panicked",
                    self.inner.session_id
                );
                PermissionRequestResult::default_deny()
            }
        }
    }

    /// Serve a `user.input.request` from the CLI. A missing handler is a
    /// configuration bug and surfaces as a JSON-RPC error.
    pub(crate) async fn handle_user_input_request(
        &self,
        request: UserInputRequest,
    ) -> std::result::Result<UserInputResponse, BoxError> {
        let handler = self.inner.user_input_handler.read().unwrap().clone();
        let Some(handler) = handler else {
            return Err("no user input handler registered".into());
        };

        let invocation = UserInputInvocation {
            session_id: self.inner.session_id.clone(),
        };
        handler(request, invocation).await
    }

    /// Serve a `hooks.invoke` from the CLI. Missing hooks respond `null`;
    /// hook faults surface as JSON-RPC errors.
    pub(crate) async fn handle_hook_invoke(
        &self,
        hook_type: &str,
        input: Value,
    ) -> std::result::Result<Value, BoxError> {
        let hooks = self.inner.hooks.read().unwrap().clone();
        let Some(hooks) = hooks else {
            return Ok(Value::Null);
        };

        let invocation = HookInvocation {
            session_id: self.inner.session_id.clone(),
        };
        hooks.invoke(hook_type, input, invocation).await
    }
}
