//! End-to-end tests against a scripted mock CLI server over TCP.
//!
//! Each test binds a listener on an ephemeral port, points the client at it
//! via `cli_url`, and plays the CLI side of the wire protocol with its own
//! minimal frame codec.

use copilot_codes::{
    ConnectionState, CopilotClient, CopilotClientOptions, MessageOptions, PermissionRequestResult,
    SessionConfig, SessionHooks, Tool, PROTOCOL_VERSION,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

struct MockCli {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl MockCli {
    /// Bind a listener and return its port plus a future resolving to the
    /// accepted connection.
    async fn listen() -> (u16, tokio::task::JoinHandle<MockCli>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move {
            let (stream, _addr) = listener.accept().await.unwrap();
            let (read_half, write_half) = stream.into_split();
            MockCli {
                reader: BufReader::new(read_half),
                writer: write_half,
            }
        });
        (port, accept)
    }

    async fn read_msg(&mut self) -> Value {
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }
            if let Some((name, value)) = trimmed.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap();
                }
            }
        }
        let mut body = vec![0u8; content_length];
        self.reader.read_exact(&mut body).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn write_msg(&mut self, value: &Value) {
        let body = serde_json::to_vec(value).unwrap();
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.writer.write_all(header.as_bytes()).await.unwrap();
        self.writer.write_all(&body).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn respond(&mut self, id: &Value, result: Value) {
        self.write_msg(&json!({"jsonrpc": "2.0", "id": id, "result": result}))
            .await;
    }

    /// Serve the protocol-version handshake ping.
    async fn serve_handshake(&mut self) {
        let ping = self.read_msg().await;
        assert_eq!(ping["method"], "ping");
        let id = ping["id"].clone();
        self.respond(
            &id,
            json!({"message": "pong: ", "timestamp": 0, "protocolVersion": PROTOCOL_VERSION}),
        )
        .await;
    }

    /// Serve a `session.create` with the given session id.
    async fn serve_session_create(&mut self, session_id: &str) {
        let create = self.read_msg().await;
        assert_eq!(create["method"], "session.create");
        let id = create["id"].clone();
        self.respond(&id, json!({"sessionId": session_id})).await;
    }

    async fn send_session_event(&mut self, session_id: &str, event: Value) {
        self.write_msg(&json!({
            "jsonrpc": "2.0",
            "method": "session.event",
            "params": {"sessionId": session_id, "event": event}
        }))
        .await;
    }
}

fn client_for(port: u16) -> CopilotClient {
    CopilotClient::new(CopilotClientOptions {
        cli_url: Some(format!("127.0.0.1:{}", port)),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_ping_roundtrip_and_clean_stop() {
    let (port, accept) = MockCli::listen().await;
    let client = client_for(port);

    let server = tokio::spawn(async move {
        let mut cli = accept.await.unwrap();
        cli.serve_handshake().await;

        let ping = cli.read_msg().await;
        assert_eq!(ping["method"], "ping");
        assert_eq!(ping["params"]["message"], "hello");
        let id = ping["id"].clone();
        cli.respond(
            &id,
            json!({"message": "pong: hello", "timestamp": 1, "protocolVersion": PROTOCOL_VERSION}),
        )
        .await;
    });

    client.start().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    let pong = client.ping(Some("hello")).await.unwrap();
    assert_eq!(pong.message, "pong: hello");
    assert!(pong.timestamp >= 0);

    let errors = client.stop().await.unwrap();
    assert!(errors.is_empty());
    assert_eq!(client.state(), ConnectionState::Disconnected);

    server.await.unwrap();
}

#[tokio::test]
async fn test_handshake_rejects_missing_protocol_version() {
    let (port, accept) = MockCli::listen().await;
    let client = client_for(port);

    tokio::spawn(async move {
        let mut cli = accept.await.unwrap();
        let ping = cli.read_msg().await;
        let id = ping["id"].clone();
        // A pre-protocol-version server: no protocolVersion field.
        cli.respond(&id, json!({"message": "pong: ", "timestamp": 0}))
            .await;
    });

    let err = client.start().await.unwrap_err();
    assert!(err.to_string().contains("SDK protocol version mismatch"));
    assert_eq!(client.state(), ConnectionState::Error);

    // Error is transient and collapses to disconnected on stop.
    client.stop().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unregistered_tool_gets_failure_result_not_rpc_error() {
    let (port, accept) = MockCli::listen().await;
    let client = client_for(port);

    let server = tokio::spawn(async move {
        let mut cli = accept.await.unwrap();
        cli.serve_handshake().await;
        cli.serve_session_create("sess-1").await;

        // CLI-initiated tool call for a tool the session never registered.
        cli.write_msg(&json!({
            "jsonrpc": "2.0",
            "id": "srv-1",
            "method": "tool.call",
            "params": {
                "sessionId": "sess-1",
                "toolCallId": "tc-1",
                "toolName": "missing_tool",
                "arguments": {}
            }
        }))
        .await;

        let response = cli.read_msg().await;
        assert_eq!(response["id"], "srv-1");
        assert!(
            response.get("error").is_none(),
            "tool faults must not become JSON-RPC errors"
        );
        let result = &response["result"]["result"];
        assert_eq!(result["resultType"], "failure");
        assert_eq!(result["error"], "tool 'missing_tool' not supported");
    });

    client.start().await.unwrap();
    let _session = client.create_session(SessionConfig::default()).await.unwrap();

    server.await.unwrap();
    client.force_stop().await;
}

#[tokio::test]
async fn test_tool_handler_error_is_not_exposed_to_model() {
    let (port, accept) = MockCli::listen().await;
    let client = client_for(port);

    let server = tokio::spawn(async move {
        let mut cli = accept.await.unwrap();
        cli.serve_handshake().await;
        cli.serve_session_create("sess-1").await;

        cli.write_msg(&json!({
            "jsonrpc": "2.0",
            "id": "srv-2",
            "method": "tool.call",
            "params": {
                "sessionId": "sess-1",
                "toolCallId": "tc-2",
                "toolName": "get_user_location",
                "arguments": {}
            }
        }))
        .await;

        let response = cli.read_msg().await;
        let result = &response["result"]["result"];
        assert_eq!(result["resultType"], "failure");
        let text = result["textResultForLlm"].as_str().unwrap();
        assert!(
            !text.contains("Melbourne"),
            "handler error text leaked to the model: {}",
            text
        );
        // The original message stays available for telemetry.
        assert_eq!(result["error"], "Melbourne");
    });

    client.start().await.unwrap();
    let config = SessionConfig {
        tools: vec![Tool::new(
            "get_user_location",
            "Returns the user's location",
            |_invocation| async move { Err("Melbourne".into()) },
        )],
        ..Default::default()
    };
    let _session = client.create_session(config).await.unwrap();

    server.await.unwrap();
    client.force_stop().await;
}

#[tokio::test]
async fn test_send_and_wait_resolves_with_last_assistant_message() {
    let (port, accept) = MockCli::listen().await;
    let client = client_for(port);

    let server = tokio::spawn(async move {
        let mut cli = accept.await.unwrap();
        cli.serve_handshake().await;
        cli.serve_session_create("sess-1").await;

        let send = cli.read_msg().await;
        assert_eq!(send["method"], "session.send");
        assert_eq!(send["params"]["sessionId"], "sess-1");
        assert_eq!(send["params"]["prompt"], "What is 2 + 2?");
        let id = send["id"].clone();
        cli.respond(&id, json!({"messageId": "m-1"})).await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        cli.send_session_event(
            "sess-1",
            json!({"type": "assistant.message", "data": {"content": "4"}}),
        )
        .await;
        cli.send_session_event("sess-1", json!({"type": "session.idle", "data": {}}))
            .await;
    });

    client.start().await.unwrap();
    let session = client.create_session(SessionConfig::default()).await.unwrap();

    let reply = session
        .send_and_wait(MessageOptions::new("What is 2 + 2?"), None)
        .await
        .unwrap();
    let event = reply.expect("expected an assistant message before idle");
    assert_eq!(event.content(), Some("4"));

    server.await.unwrap();
    client.force_stop().await;
}

#[tokio::test]
async fn test_send_and_wait_times_out_without_idle() {
    let (port, accept) = MockCli::listen().await;
    let client = client_for(port);

    tokio::spawn(async move {
        let mut cli = accept.await.unwrap();
        cli.serve_handshake().await;
        cli.serve_session_create("sess-1").await;

        let send = cli.read_msg().await;
        let id = send["id"].clone();
        cli.respond(&id, json!({"messageId": "m-1"})).await;
        // Never send session.idle.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    client.start().await.unwrap();
    let session = client.create_session(SessionConfig::default()).await.unwrap();

    let err = session
        .send_and_wait(
            MessageOptions::new("hang forever"),
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Timeout after 50ms waiting for session.idle"
    );

    client.force_stop().await;
}

#[tokio::test]
async fn test_send_and_wait_fails_on_session_error_event() {
    let (port, accept) = MockCli::listen().await;
    let client = client_for(port);

    tokio::spawn(async move {
        let mut cli = accept.await.unwrap();
        cli.serve_handshake().await;
        cli.serve_session_create("sess-1").await;

        let send = cli.read_msg().await;
        let id = send["id"].clone();
        cli.respond(&id, json!({"messageId": "m-1"})).await;

        cli.send_session_event(
            "sess-1",
            json!({"type": "session.error", "data": {"message": "model blew up", "stack": "at x"}}),
        )
        .await;
    });

    client.start().await.unwrap();
    let session = client.create_session(SessionConfig::default()).await.unwrap();

    let err = session
        .send_and_wait(MessageOptions::new("boom"), None)
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("model blew up"));
    assert!(message.contains("at x"));

    client.force_stop().await;
}

#[tokio::test]
async fn test_permission_request_without_handler_denies() {
    let (port, accept) = MockCli::listen().await;
    let client = client_for(port);

    let server = tokio::spawn(async move {
        let mut cli = accept.await.unwrap();
        cli.serve_handshake().await;
        cli.serve_session_create("sess-1").await;

        cli.write_msg(&json!({
            "jsonrpc": "2.0",
            "id": "srv-3",
            "method": "permission.request",
            "params": {
                "sessionId": "sess-1",
                "permissionRequest": {"kind": "write", "toolCallId": "tc-3"}
            }
        }))
        .await;

        let response = cli.read_msg().await;
        assert_eq!(
            response["result"]["result"]["kind"],
            "denied-no-approval-rule-and-could-not-request-from-user"
        );
    });

    client.start().await.unwrap();
    let _session = client.create_session(SessionConfig::default()).await.unwrap();

    server.await.unwrap();
    client.force_stop().await;
}

#[tokio::test]
async fn test_permission_handler_decision_reaches_the_wire() {
    let (port, accept) = MockCli::listen().await;
    let client = client_for(port);

    let server = tokio::spawn(async move {
        let mut cli = accept.await.unwrap();
        cli.serve_handshake().await;

        let create = cli.read_msg().await;
        assert_eq!(create["params"]["requestPermission"], true);
        let id = create["id"].clone();
        cli.respond(&id, json!({"sessionId": "sess-1"})).await;

        cli.write_msg(&json!({
            "jsonrpc": "2.0",
            "id": "srv-4",
            "method": "permission.request",
            "params": {
                "sessionId": "sess-1",
                "permissionRequest": {"kind": "shell", "fullCommand": "ls"}
            }
        }))
        .await;

        let response = cli.read_msg().await;
        assert_eq!(
            response["result"]["result"]["kind"],
            "denied-interactively-by-user"
        );
    });

    client.start().await.unwrap();
    let config = SessionConfig {
        on_permission_request: Some(Arc::new(|request, _invocation| {
            Box::pin(async move {
                assert_eq!(request.kind, "shell");
                Ok(PermissionRequestResult::denied_interactively())
            })
        })),
        ..Default::default()
    };
    let _session = client.create_session(config).await.unwrap();

    server.await.unwrap();
    client.force_stop().await;
}

#[tokio::test]
async fn test_hooks_invoke_missing_hook_answers_null() {
    let (port, accept) = MockCli::listen().await;
    let client = client_for(port);

    let server = tokio::spawn(async move {
        let mut cli = accept.await.unwrap();
        cli.serve_handshake().await;
        cli.serve_session_create("sess-1").await;

        cli.write_msg(&json!({
            "jsonrpc": "2.0",
            "id": "srv-5",
            "method": "hooks.invoke",
            "params": {
                "sessionId": "sess-1",
                "hookType": "preToolUse",
                "input": {"toolName": "bash"}
            }
        }))
        .await;

        let response = cli.read_msg().await;
        assert!(response["result"].is_null());
    });

    client.start().await.unwrap();
    let config = SessionConfig {
        // A hooks bundle with no preToolUse slot.
        hooks: Some(SessionHooks::default()),
        ..Default::default()
    };
    let _session = client.create_session(config).await.unwrap();

    server.await.unwrap();
    client.force_stop().await;
}

#[tokio::test]
async fn test_user_input_request_without_handler_is_rpc_error() {
    let (port, accept) = MockCli::listen().await;
    let client = client_for(port);

    let server = tokio::spawn(async move {
        let mut cli = accept.await.unwrap();
        cli.serve_handshake().await;
        cli.serve_session_create("sess-1").await;

        cli.write_msg(&json!({
            "jsonrpc": "2.0",
            "id": "srv-6",
            "method": "user.input.request",
            "params": {
                "sessionId": "sess-1",
                "request": {"question": "Pick one", "choices": ["a", "b"]}
            }
        }))
        .await;

        let response = cli.read_msg().await;
        assert!(
            response.get("result").is_none(),
            "a missing user-input handler is a configuration bug"
        );
        assert!(response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("no user input handler"));
    });

    client.start().await.unwrap();
    let _session = client.create_session(SessionConfig::default()).await.unwrap();

    server.await.unwrap();
    client.force_stop().await;
}

#[tokio::test]
async fn test_events_fan_out_to_subscribers_in_order() {
    let (port, accept) = MockCli::listen().await;
    let client = client_for(port);

    let server = tokio::spawn(async move {
        let mut cli = accept.await.unwrap();
        cli.serve_handshake().await;
        cli.serve_session_create("sess-1").await;

        // The send doubles as a barrier: the subscriber is installed before
        // it, so every event below must be observed.
        let send = cli.read_msg().await;
        let id = send["id"].clone();
        cli.respond(&id, json!({"messageId": "m-1"})).await;

        for n in 0..3 {
            cli.send_session_event(
                "sess-1",
                json!({"type": "assistant.message_delta", "data": {"deltaContent": n.to_string()}}),
            )
            .await;
        }
        cli.send_session_event("sess-1", json!({"type": "session.idle", "data": {}}))
            .await;
    });

    client.start().await.unwrap();
    let session = client.create_session(SessionConfig::default()).await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _subscription = session.on(move |event| {
        let _ = tx.send(event.clone());
    });
    session
        .send(MessageOptions::new("stream me some deltas"))
        .await
        .unwrap();

    server.await.unwrap();

    let mut deltas = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event stream stalled")
            .expect("subscription dropped");
        match event.event_type {
            copilot_codes::EventType::SessionIdle => break,
            _ => deltas.extend(event.delta_content().map(str::to_string)),
        }
    }
    assert_eq!(deltas, vec!["0", "1", "2"]);

    client.force_stop().await;
}

#[tokio::test]
async fn test_get_messages_replays_history_and_abort_acks() {
    let (port, accept) = MockCli::listen().await;
    let client = client_for(port);

    let server = tokio::spawn(async move {
        let mut cli = accept.await.unwrap();
        cli.serve_handshake().await;
        cli.serve_session_create("sess-1").await;

        let get = cli.read_msg().await;
        assert_eq!(get["method"], "session.getMessages");
        assert_eq!(get["params"]["sessionId"], "sess-1");
        let id = get["id"].clone();
        cli.respond(
            &id,
            json!({"events": [
                {"type": "assistant.message", "data": {"content": "earlier reply"}},
                {"type": "session.idle", "data": {}}
            ]}),
        )
        .await;

        let abort = cli.read_msg().await;
        assert_eq!(abort["method"], "session.abort");
        let id = abort["id"].clone();
        cli.respond(&id, json!({})).await;
    });

    client.start().await.unwrap();
    let session = client.create_session(SessionConfig::default()).await.unwrap();

    let history = session.get_messages().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content(), Some("earlier reply"));

    session.abort().await.unwrap();

    server.await.unwrap();
    client.force_stop().await;
}

#[tokio::test]
async fn test_list_sessions_and_delete_failure() {
    let (port, accept) = MockCli::listen().await;
    let client = client_for(port);

    let server = tokio::spawn(async move {
        let mut cli = accept.await.unwrap();
        cli.serve_handshake().await;

        let list = cli.read_msg().await;
        assert_eq!(list["method"], "session.list");
        let id = list["id"].clone();
        cli.respond(
            &id,
            json!({"sessions": [{
                "sessionId": "sess-old",
                "startTime": "2025-05-01T00:00:00Z",
                "modifiedTime": "2025-05-02T00:00:00Z",
                "isRemote": false
            }]}),
        )
        .await;

        let delete = cli.read_msg().await;
        assert_eq!(delete["method"], "session.delete");
        assert_eq!(delete["params"]["sessionId"], "sess-old");
        let id = delete["id"].clone();
        cli.respond(&id, json!({"success": false, "error": "session is in use"}))
            .await;
    });

    client.start().await.unwrap();

    let sessions = client.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, "sess-old");

    let err = client.delete_session("sess-old").await.unwrap_err();
    assert!(err.to_string().contains("session is in use"));

    server.await.unwrap();
    client.force_stop().await;
}

#[tokio::test]
async fn test_requests_fail_with_client_stopped_on_stop() {
    let (port, accept) = MockCli::listen().await;
    let client = client_for(port);

    tokio::spawn(async move {
        let mut cli = accept.await.unwrap();
        cli.serve_handshake().await;
        // Swallow the next request without answering, holding the socket open.
        let _unanswered = cli.read_msg().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    client.start().await.unwrap();

    let racing = {
        let client = client.clone();
        tokio::spawn(async move { client.ping(Some("never answered")).await })
    };
    // Let the ping reach the wire before pulling the plug.
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.force_stop().await;

    let result = racing.await.unwrap();
    assert!(matches!(result, Err(copilot_codes::Error::ClientStopped)));
}
