//! A tightly typed Rust SDK for driving the Copilot CLI agent
//!
//! This crate speaks the Copilot CLI's JSON-RPC 2.0 server protocol over
//! stdio pipes or a TCP socket, with `Content-Length` header framing. It
//! supervises the CLI subprocess, multiplexes concurrent requests and
//! server-initiated callbacks over one connection, and manages conversation
//! sessions with per-session events, custom tools, permission brokering,
//! and lifecycle hooks.
//!
//! # Quick start
//!
//! ```no_run
//! use copilot_codes::{CopilotClient, CopilotClientOptions, MessageOptions, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> copilot_codes::Result<()> {
//!     let client = CopilotClient::new(CopilotClientOptions::default());
//!     client.start().await?;
//!
//!     let session = client.create_session(SessionConfig::default()).await?;
//!     let unsubscribe = session.on(|event| println!("event: {}", event.event_type));
//!
//!     let reply = session
//!         .send_and_wait(MessageOptions::new("Hello!"), None)
//!         .await?;
//!     if let Some(event) = reply {
//!         println!("assistant: {}", event.content().unwrap_or(""));
//!     }
//!
//!     unsubscribe.unsubscribe();
//!     session.destroy().await?;
//!     client.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod error;
pub mod events;
pub mod hooks;
pub mod jsonrpc;
mod rpc;
pub mod session;
pub mod tool;
mod transport;
pub mod types;
pub mod version;

pub use cli::CliServerBuilder;
pub use client::CopilotClient;
pub use error::{Error, Result};
pub use events::{EventType, SessionEvent};
pub use hooks::{
    ErrorOccurredHookInput, HookInvocation, PostToolUseHookInput, PreToolUseHookInput,
    PreToolUseHookOutput, SessionEndHookInput, SessionHooks, SessionStartHookInput,
    UserPromptSubmittedHookInput,
};
pub use session::{CopilotSession, Subscription};
pub use tool::{normalize_tool_result, ToolBinaryResult, ToolResult, ToolResultType};
pub use types::*;
pub use version::PROTOCOL_VERSION;
