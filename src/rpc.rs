//! Concurrency-safe JSON-RPC peer over a framed transport.
//!
//! The peer owns the transport and runs a single inbound reader task. It
//! multiplexes three kinds of traffic over one stream:
//!
//! - outbound requests awaiting a correlated response,
//! - server-initiated requests, each dispatched to a registered handler on a
//!   fresh task so slow user code never blocks the reader loop,
//! - unsolicited notifications, delivered to the notification handler in
//!   transport arrival order.
//!
//! Shutdown resolves every outstanding response slot with
//! [`Error::ClientStopped`]; a forced shutdown additionally tears down the
//! transport so blocked I/O unblocks immediately.

use crate::error::{Error, Result};
use crate::jsonrpc::{
    classify, Inbound, JsonRpcErrorData, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RawMessage, RequestId, INTERNAL_ERROR, METHOD_NOT_FOUND,
};
use crate::transport::{self, BoxedWriter, Transport};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, warn};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Handler for a server-initiated request. Returns the `result` payload of
/// the response, or an error payload to send back as a JSON-RPC error.
pub(crate) type RequestHandler = Arc<
    dyn Fn(Value) -> BoxFuture<'static, std::result::Result<Value, JsonRpcErrorData>>
        + Send
        + Sync,
>;

/// Handler for inbound notifications, invoked on the reader task so that
/// notifications are observed in transport arrival order.
pub(crate) type NotificationHandler = Arc<dyn Fn(&str, Value) + Send + Sync>;

type ResponseSlot = oneshot::Sender<std::result::Result<Value, JsonRpcErrorData>>;

pub(crate) struct RpcPeer {
    writer: tokio::sync::Mutex<BoxedWriter>,
    reader_slot: Mutex<Option<tokio::io::BufReader<crate::transport::BoxedReader>>>,
    pending: Mutex<HashMap<String, ResponseSlot>>,
    notification_handler: RwLock<Option<NotificationHandler>>,
    request_handlers: RwLock<HashMap<String, RequestHandler>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    stopping: AtomicBool,
}

impl RpcPeer {
    /// Create a peer over the given transport. Handlers registered before
    /// [`RpcPeer::start`] are guaranteed to see the first inbound frame.
    pub fn new(transport: Transport) -> Arc<Self> {
        Arc::new(Self {
            writer: tokio::sync::Mutex::new(transport.writer),
            reader_slot: Mutex::new(Some(transport.reader)),
            pending: Mutex::new(HashMap::new()),
            notification_handler: RwLock::new(None),
            request_handlers: RwLock::new(HashMap::new()),
            reader_task: Mutex::new(None),
            stopping: AtomicBool::new(false),
        })
    }

    /// Start the inbound reader task.
    pub fn start(self: &Arc<Self>) {
        let Some(mut reader) = self.reader_slot.lock().unwrap().take() else {
            return;
        };
        let task_peer = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                match transport::read_frame(&mut reader).await {
                    Ok(Some(body)) if body.is_empty() => continue,
                    Ok(Some(body)) => task_peer.dispatch_frame(&body),
                    Ok(None) => {
                        debug!("[PEER] transport closed (EOF)");
                        break;
                    }
                    Err(e) => {
                        if !task_peer.stopping.load(Ordering::SeqCst) {
                            warn!("[PEER] transport read failed: {}", e);
                        }
                        break;
                    }
                }
            }
            // The connection is gone; release every waiting caller.
            task_peer.stopping.store(true, Ordering::SeqCst);
            task_peer.fail_pending();
        });
        *self.reader_task.lock().unwrap() = Some(handle);
    }

    pub fn set_notification_handler(&self, handler: NotificationHandler) {
        *self.notification_handler.write().unwrap() = Some(handler);
    }

    pub fn set_request_handler(&self, method: impl Into<String>, handler: RequestHandler) {
        self.request_handlers
            .write()
            .unwrap()
            .insert(method.into(), handler);
    }

    /// Send a request and wait for the correlated response.
    ///
    /// The response slot is installed before the frame is written, so a
    /// response can never race past its waiter. On shutdown the slot
    /// resolves with [`Error::ClientStopped`].
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        if self.stopping.load(Ordering::SeqCst) {
            return Err(Error::ClientStopped);
        }

        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id.clone(), tx);

        let request = JsonRpcRequest::new(RequestId::String(id.clone()), method, params);
        debug!("[PEER] -> request {} ({})", method, id);
        if let Err(e) = self.write_message(&request).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(Error::JsonRpc {
                code: err.code,
                message: err.message,
                data: err.data,
            }),
            // Slot dropped during shutdown.
            Err(_) => Err(Error::ClientStopped),
        }
    }

    /// Send a notification; no correlation, no waiting.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params);
        debug!("[PEER] -> notification {}", method);
        self.write_message(&notification).await
    }

    /// Graceful shutdown: cancel outstanding response slots, stop the reader
    /// task, close the writer.
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.fail_pending();

        let handle = self.reader_task.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }

        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    /// Forced shutdown: destroy the transport handle first so in-flight
    /// reads and writes unblock immediately, then cancel everything.
    pub async fn force_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);

        {
            let mut writer = self.writer.lock().await;
            let _ = writer.shutdown().await;
        }

        let handle = self.reader_task.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
        }

        self.fail_pending();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Drop every pending response slot, which resolves each waiting
    /// `request()` call with `ClientStopped`.
    fn fail_pending(&self) {
        let drained: Vec<_> = self.pending.lock().unwrap().drain().collect();
        if !drained.is_empty() {
            debug!("[PEER] cancelling {} pending request(s)", drained.len());
        }
    }

    async fn write_message<T: Serialize>(&self, message: &T) -> Result<()> {
        let body = serde_json::to_vec(message)?;
        let mut writer = self.writer.lock().await;
        transport::write_frame(&mut *writer, &body).await
    }

    fn dispatch_frame(self: &Arc<Self>, body: &[u8]) {
        let raw: RawMessage = match serde_json::from_slice(body) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "[PEER] dropping unparseable frame: {} (raw: {})",
                    e,
                    String::from_utf8_lossy(body)
                );
                return;
            }
        };

        match classify(raw) {
            Inbound::Request { id, method, params } => self.handle_request(id, method, params),
            Inbound::Response { id, result } => self.handle_response(id, result),
            Inbound::Notification { method, params } => self.handle_notification(&method, params),
            Inbound::Discard => {}
        }
    }

    fn handle_response(&self, id: RequestId, result: std::result::Result<Value, JsonRpcErrorData>) {
        let slot = self.pending.lock().unwrap().remove(&id.to_string());
        match slot {
            Some(slot) => {
                let _ = slot.send(result);
            }
            // A response for an id we no longer (or never) know: drop it.
            None => debug!("[PEER] dropping response for unknown id {}", id),
        }
    }

    fn handle_notification(&self, method: &str, params: Value) {
        let handler = self.notification_handler.read().unwrap().clone();
        if let Some(handler) = handler {
            handler(method, params);
        } else {
            debug!("[PEER] no handler for notification {}", method);
        }
    }

    /// Dispatch a server-initiated request on a fresh task. The task writes
    /// exactly one response frame: the handler's result, a `-32601` for an
    /// unknown method, or a `-32603` if the handler panicked.
    fn handle_request(self: &Arc<Self>, id: RequestId, method: String, params: Value) {
        let handler = self.request_handlers.read().unwrap().get(&method).cloned();
        let peer = Arc::clone(self);

        tokio::spawn(async move {
            let response = match handler {
                None => JsonRpcResponse::failure(
                    id,
                    JsonRpcErrorData::new(
                        METHOD_NOT_FOUND,
                        format!("Method not found: {}", method),
                    ),
                ),
                Some(handler) => {
                    match AssertUnwindSafe(handler(params)).catch_unwind().await {
                        Ok(Ok(result)) => JsonRpcResponse::success(id, result),
                        Ok(Err(err)) => JsonRpcResponse::failure(id, err),
                        Err(_) => {
                            error!("[PEER] handler for {} panicked", method);
                            JsonRpcResponse::failure(
                                id,
                                JsonRpcErrorData::new(INTERNAL_ERROR, "Internal error"),
                            )
                        }
                    }
                }
            };

            if let Err(e) = peer.write_message(&response).await {
                if !peer.stopping.load(Ordering::SeqCst) {
                    warn!("[PEER] failed to write response for {}: {}", method, e);
                }
            }
        });
    }
}
