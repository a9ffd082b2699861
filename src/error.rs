//! Error types for the Copilot CLI protocol

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A well-formed JSON-RPC error response from the CLI, surfaced unchanged.
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The client was stopped while a request was in flight.
    #[error("Client stopped")]
    ClientStopped,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("{0}")]
    Timeout(String),

    #[error("Client not connected. Call start() first.")]
    NotConnected,

    /// Protocol-version handshake failure. Fatal to start.
    #[error("{}", protocol_mismatch_message(.expected, .actual))]
    ProtocolMismatch {
        expected: i64,
        actual: Option<i64>,
    },

    /// Preflight validation failure, raised before any frame is sent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to spawn CLI process: {0}")]
    Spawn(String),

    #[error("Session error: {0}")]
    SessionError(String),
}

fn protocol_mismatch_message(expected: &i64, actual: &Option<i64>) -> String {
    match actual {
        None => format!(
            "SDK protocol version mismatch: SDK expects version {}, \
             but server does not report a protocol version. \
             Please update your server to ensure compatibility.",
            expected
        ),
        Some(actual) => format!(
            "SDK protocol version mismatch: SDK expects version {}, \
             but server reports version {}. \
             Please update your SDK or server to ensure compatibility.",
            expected, actual
        ),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
