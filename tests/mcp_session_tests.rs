//! Streamable HTTP session against a mock MCP server.

use mcp_responses_agent::tooling::{StreamableHttpSession, ToolInvokeError, ToolSession};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;

const SESSION_ID: &str = "sess-4f2a";

fn rpc_result(id: &str, result: serde_json::Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
}

/// Mocks for `initialize` (req-1) and `notifications/initialized`.
async fn mock_handshake(server: &mut ServerGuard) -> (Mock, Mock) {
    let init = server
        .mock("POST", "/mcp")
        .match_header("accept", "application/json, text/event-stream")
        .match_header("mcp-session-id", Matcher::Missing)
        .match_body(Matcher::PartialJson(json!({
            "jsonrpc": "2.0",
            "id": "req-1",
            "method": "initialize",
            "params": {"protocolVersion": "2025-06-18"}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("mcp-session-id", SESSION_ID)
        .with_body(rpc_result(
            "req-1",
            json!({
                "protocolVersion": "2025-06-18",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "mock", "version": "0.0.1"}
            }),
        ))
        .expect(1)
        .create_async()
        .await;
    let initialized = server
        .mock("POST", "/mcp")
        .match_header("mcp-session-id", SESSION_ID)
        .match_header("mcp-protocol-version", "2025-06-18")
        .match_body(Matcher::PartialJson(
            json!({"method": "notifications/initialized"}),
        ))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;
    (init, initialized)
}

async fn connected(server: &mut ServerGuard) -> (StreamableHttpSession, (Mock, Mock)) {
    let mocks = mock_handshake(server).await;
    let mut session = StreamableHttpSession::new(format!("{}/mcp", server.url()));
    session.connect().await.expect("connect");
    (session, mocks)
}

#[tokio::test]
async fn handshake_captures_session_id() {
    let mut server = Server::new_async().await;
    let (session, (init, initialized)) = connected(&mut server).await;

    assert!(session.is_connected());
    assert_eq!(session.session_id(), Some(SESSION_ID));
    init.assert_async().await;
    initialized.assert_async().await;
}

#[tokio::test]
async fn list_tools_follows_pagination() {
    let mut server = Server::new_async().await;
    let (session, _handshake) = connected(&mut server).await;

    let first_page = server
        .mock("POST", "/mcp")
        .match_header("mcp-session-id", SESSION_ID)
        .match_body(Matcher::PartialJson(
            json!({"id": "req-2", "method": "tools/list"}),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(
            "req-2",
            json!({
                "tools": [{
                    "name": "weather",
                    "description": "Fetch weather",
                    "inputSchema": {"type": "object", "properties": {"city": {"type": "string"}}}
                }],
                "nextCursor": "page-2"
            }),
        ))
        .create_async()
        .await;
    let second_page = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(json!({
            "id": "req-3",
            "method": "tools/list",
            "params": {"cursor": "page-2"}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(
            "req-3",
            json!({"tools": [{"name": "gmail_find_email", "inputSchema": {"type": "object"}}]}),
        ))
        .create_async()
        .await;

    let tools = session.list_tools().await.expect("tools");
    let names: Vec<_> = tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, vec!["weather", "gmail_find_email"]);
    assert_eq!(tools[0].input_schema["properties"]["city"]["type"], "string");
    assert_eq!(tools[1].description, "");
    first_page.assert_async().await;
    second_page.assert_async().await;
}

#[tokio::test]
async fn call_tool_reads_reply_from_event_stream() {
    let mut server = Server::new_async().await;
    let (session, _handshake) = connected(&mut server).await;

    let reply = rpc_result(
        "req-2",
        json!({"content": [{"type": "text", "text": "{\"temp\":21}"}], "isError": false}),
    );
    let body = format!(
        "event: message\ndata: {}\n\nevent: message\ndata: {reply}\n\n",
        json!({"jsonrpc": "2.0", "method": "notifications/message", "params": {"level": "info"}})
    );
    let call = server
        .mock("POST", "/mcp")
        .match_header("mcp-session-id", SESSION_ID)
        .match_body(Matcher::PartialJson(json!({
            "method": "tools/call",
            "params": {"name": "weather", "arguments": {"city": "Oslo"}}
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let blocks = session
        .call_tool("weather", json!({"city": "Oslo"}))
        .await
        .expect("call");
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].kind, "text");
    assert_eq!(blocks[0].text.as_deref(), Some("{\"temp\":21}"));
    call.assert_async().await;
}

#[tokio::test]
async fn tool_error_result_is_a_failure() {
    let mut server = Server::new_async().await;
    let (session, _handshake) = connected(&mut server).await;

    let _call = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(json!({"method": "tools/call"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(
            "req-2",
            json!({"content": [{"type": "text", "text": "city not found"}], "isError": true}),
        ))
        .create_async()
        .await;

    let err = session
        .call_tool("weather", json!({"city": "Atlantis"}))
        .await
        .expect_err("must fail");
    match err {
        ToolInvokeError::ToolFailed { tool, message, .. } => {
            assert_eq!(tool, "weather");
            assert_eq!(message, "city not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn json_rpc_error_is_reported() {
    let mut server = Server::new_async().await;
    let (session, _handshake) = connected(&mut server).await;

    let _call = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(json!({"method": "tools/call"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "id": "req-2",
                "error": {"code": -32602, "message": "Unknown tool: nope"}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let err = session
        .call_tool("nope", json!({}))
        .await
        .expect_err("must fail");
    assert!(matches!(err, ToolInvokeError::Rpc { code: -32602, .. }));
}

#[tokio::test]
async fn close_deletes_the_remote_session() {
    let mut server = Server::new_async().await;
    let (mut session, _handshake) = connected(&mut server).await;

    let delete = server
        .mock("DELETE", "/mcp")
        .match_header("mcp-session-id", SESSION_ID)
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    session.close().await.expect("close");
    assert!(!session.is_connected());
    assert_eq!(session.session_id(), None);
    delete.assert_async().await;

    session.close().await.expect("second close is a no-op");
    delete.assert_async().await;
}

#[tokio::test]
async fn close_accepts_method_not_allowed() {
    let mut server = Server::new_async().await;
    let (mut session, _handshake) = connected(&mut server).await;

    let _delete = server
        .mock("DELETE", "/mcp")
        .with_status(405)
        .create_async()
        .await;

    session.close().await.expect("405 is accepted");
    assert!(!session.is_connected());
}

#[tokio::test]
async fn failed_initialize_leaves_session_closed() {
    let mut server = Server::new_async().await;
    let _init = server
        .mock("POST", "/mcp")
        .with_status(503)
        .with_body("upstream unavailable")
        .create_async()
        .await;

    let mut session = StreamableHttpSession::new(format!("{}/mcp", server.url()));
    let err = session.connect().await.expect_err("must fail");
    assert!(matches!(err, ToolInvokeError::Status { status: 503, .. }));
    assert!(!session.is_connected());
}

#[tokio::test]
async fn event_stream_skips_comments_and_non_json_data() {
    let mut server = Server::new_async().await;
    let (session, _handshake) = connected(&mut server).await;

    let reply = rpc_result(
        "req-2",
        json!({"content": [{"type": "text", "text": "{\"ok\":true}"}]}),
    );
    let body = format!(
        ": keep-alive\r\n\r\nevent: ping\r\ndata: not json\r\n\r\nid: 7\r\ndata: {reply}\r\n\r\n"
    );
    let _call = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(json!({"method": "tools/call"})))
        .with_status(200)
        .with_header("content-type", "text/event-stream; charset=utf-8")
        .with_body(body)
        .create_async()
        .await;

    let blocks = session
        .call_tool("weather", json!({}))
        .await
        .expect("call");
    assert_eq!(blocks[0].text.as_deref(), Some("{\"ok\":true}"));
}

#[tokio::test]
async fn event_stream_without_matching_reply_is_missing_response() {
    let mut server = Server::new_async().await;
    let (session, _handshake) = connected(&mut server).await;

    let body = format!("data: {}\n\n", rpc_result("req-99", json!({})));
    let _call = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(json!({"method": "tools/call"})))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let err = session
        .call_tool("weather", json!({}))
        .await
        .expect_err("must fail");
    assert!(matches!(err, ToolInvokeError::MissingResponse { ref id, .. } if id == "req-2"));
}

#[tokio::test]
async fn list_tools_stops_when_cursors_cycle() {
    let mut server = Server::new_async().await;
    let (session, _handshake) = connected(&mut server).await;

    let page = |id: &str, tool: &str, next: &str| {
        rpc_result(
            id,
            json!({"tools": [{"name": tool, "inputSchema": {"type": "object"}}], "nextCursor": next}),
        )
    };
    let first = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(json!({"id": "req-2", "method": "tools/list"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page("req-2", "alpha", "a"))
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(
            json!({"id": "req-3", "params": {"cursor": "a"}}),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page("req-3", "beta", "b"))
        .expect(1)
        .create_async()
        .await;
    let third = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(
            json!({"id": "req-4", "params": {"cursor": "b"}}),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page("req-4", "gamma", "a"))
        .expect(1)
        .create_async()
        .await;

    let tools = session.list_tools().await.expect("tools");
    let names: Vec<_> = tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    first.assert_async().await;
    second.assert_async().await;
    third.assert_async().await;
}
