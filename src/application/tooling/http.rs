use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::ToolInvokeError;
use super::interface::{ToolContent, ToolSession};
use crate::config::AppConfig;
use crate::types::ToolDescriptor;

pub const PROTOCOL_VERSION: &str = "2025-06-18";
pub const SESSION_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_HEADER: &str = "mcp-protocol-version";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

#[derive(Debug, Clone)]
struct SessionState {
    session_id: Option<String>,
    protocol_version: String,
}

/// MCP client over the streamable HTTP transport.
///
/// Every JSON-RPC message is POSTed to the server URL. Replies come back
/// either as a JSON body or as a `text/event-stream` body carrying the reply
/// among other server messages.
pub struct StreamableHttpSession {
    http: Client,
    url: String,
    state: Option<SessionState>,
    id_counter: AtomicU64,
}

impl StreamableHttpSession {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(url, Client::new())
    }

    pub fn with_client(url: impl Into<String>, client: Client) -> Self {
        Self {
            http: client,
            url: url.into(),
            state: None,
            id_counter: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ToolInvokeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()
            .map_err(|err| ToolInvokeError::Transport {
                server: config.mcp_server_url.clone(),
                message: err.to_string(),
            })?;
        Ok(Self::with_client(config.mcp_server_url.clone(), client))
    }

    pub fn session_id(&self) -> Option<&str> {
        self.state.as_ref().and_then(|state| state.session_id.as_deref())
    }

    fn next_id(&self) -> String {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("req-{id}")
    }

    fn with_session_headers(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.state {
            Some(state) => {
                let builder = builder.header(PROTOCOL_HEADER, state.protocol_version.as_str());
                match &state.session_id {
                    Some(id) => builder.header(SESSION_HEADER, id.as_str()),
                    None => builder,
                }
            }
            None => builder,
        }
    }

    async fn post_message(&self, payload: &Value) -> Result<Response, ToolInvokeError> {
        let builder = self
            .http
            .post(&self.url)
            .header(ACCEPT, ACCEPT_BOTH)
            .json(payload);
        let response = self
            .with_session_headers(builder)
            .send()
            .await
            .map_err(|err| self.transport_error(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolInvokeError::Status {
                server: self.url.clone(),
                status: status.as_u16(),
                message: body.trim().to_string(),
            });
        }
        Ok(response)
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<Value, ToolInvokeError> {
        let id = self.next_id();
        debug!(server = %self.url, method, id = %id, "Sending MCP request");
        let response = self.post_message(&request_payload(&id, method, params)).await?;
        self.read_reply(response, &id).await
    }

    async fn send_notification(&self, method: &str, params: Value) -> Result<(), ToolInvokeError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        debug!(server = %self.url, method, "Sending MCP notification");
        self.post_message(&payload).await.map(|_| ())
    }

    async fn read_reply(&self, response: Response, id: &str) -> Result<Value, ToolInvokeError> {
        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));
        let missing = || ToolInvokeError::MissingResponse {
            server: self.url.clone(),
            id: id.to_string(),
        };

        if !is_stream {
            let body = response
                .text()
                .await
                .map_err(|err| self.transport_error(err.to_string()))?;
            let value: Value =
                serde_json::from_str(&body).map_err(|source| ToolInvokeError::InvalidJson {
                    server: self.url.clone(),
                    source,
                })?;
            let reply = select_reply(flatten_batch(value), id).ok_or_else(missing)?;
            return self.reply_result(reply);
        }

        // The server may keep the stream open after replying; stop at the reply.
        let mut events = response.bytes_stream().eventsource();
        while let Some(event) = events.next().await {
            let event = event.map_err(|err| self.transport_error(err.to_string()))?;
            let Ok(value) = serde_json::from_str::<Value>(&event.data) else {
                debug!(server = %self.url, event = %event.event, "Skipping non-JSON stream event");
                continue;
            };
            if let Some(reply) = select_reply(flatten_batch(value), id) {
                return self.reply_result(reply);
            }
        }
        Err(missing())
    }

    fn reply_result(&self, mut message: Value) -> Result<Value, ToolInvokeError> {
        if let Some(error) = message.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
            let text = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(ToolInvokeError::Rpc {
                server: self.url.clone(),
                code,
                message: text,
            });
        }
        Ok(message
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    fn transport_error(&self, message: impl Into<String>) -> ToolInvokeError {
        ToolInvokeError::Transport {
            server: self.url.clone(),
            message: message.into(),
        }
    }

    fn ensure_connected(&self) -> Result<(), ToolInvokeError> {
        if self.state.is_some() {
            Ok(())
        } else {
            Err(ToolInvokeError::NotConnected {
                server: self.url.clone(),
            })
        }
    }
}

#[async_trait]
impl ToolSession for StreamableHttpSession {
    async fn connect(&mut self) -> Result<(), ToolInvokeError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {}
        });
        let id = self.next_id();
        debug!(server = %self.url, id = %id, "Sending MCP initialize");
        let response = self
            .post_message(&request_payload(&id, "initialize", params))
            .await?;
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let result = self.read_reply(response, &id).await?;
        let protocol_version = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION)
            .to_string();

        self.state = Some(SessionState {
            session_id,
            protocol_version,
        });
        if let Err(err) = self
            .send_notification("notifications/initialized", json!({}))
            .await
        {
            self.state = None;
            return Err(err);
        }

        info!(
            server = %self.url,
            session = self.session_id().unwrap_or("<none>"),
            "MCP session established"
        );
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolInvokeError> {
        self.ensure_connected()?;
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();
        loop {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let result = self.send_request("tools/list", params).await?;
            if let Some(entries) = result.get("tools").and_then(Value::as_array) {
                tools.extend(entries.iter().filter_map(ToolDescriptor::from_listing));
            }
            match result.get("nextCursor").and_then(Value::as_str) {
                Some(next) if !next.is_empty() && seen.insert(next.to_string()) => {
                    cursor = Some(next.to_string());
                }
                Some(next) if !next.is_empty() => {
                    warn!(server = %self.url, cursor = next, "MCP server repeated a tool list cursor");
                    break;
                }
                _ => break,
            }
        }
        debug!(server = %self.url, count = tools.len(), "Fetched MCP tool list");
        Ok(tools)
    }

    async fn call_tool(
        &self,
        tool: &str,
        arguments: Value,
    ) -> Result<Vec<ToolContent>, ToolInvokeError> {
        self.ensure_connected()?;
        let params = json!({
            "name": tool,
            "arguments": match arguments {
                Value::Null => Value::Object(Default::default()),
                other => other,
            }
        });
        let mut result = self.send_request("tools/call", params).await?;
        let content = result
            .get_mut("content")
            .map(Value::take)
            .unwrap_or_else(|| Value::Array(Vec::new()));
        let blocks: Vec<ToolContent> =
            serde_json::from_value(content).map_err(|source| ToolInvokeError::InvalidJson {
                server: self.url.clone(),
                source,
            })?;

        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            let message = blocks
                .iter()
                .filter_map(|block| block.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n");
            return Err(ToolInvokeError::ToolFailed {
                server: self.url.clone(),
                tool: tool.to_string(),
                message,
            });
        }
        Ok(blocks)
    }

    fn is_connected(&self) -> bool {
        self.state.is_some()
    }

    async fn close(&mut self) -> Result<(), ToolInvokeError> {
        let Some(state) = self.state.take() else {
            return Ok(());
        };
        let Some(session_id) = state.session_id else {
            return Ok(());
        };

        let response = self
            .http
            .delete(&self.url)
            .header(SESSION_HEADER, session_id.as_str())
            .header(PROTOCOL_HEADER, state.protocol_version.as_str())
            .send()
            .await
            .map_err(|err| self.transport_error(err.to_string()))?;
        let status = response.status();
        if status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED {
            debug!(server = %self.url, session = %session_id, %status, "MCP session released");
            Ok(())
        } else {
            warn!(server = %self.url, session = %session_id, %status, "MCP server refused session release");
            Err(ToolInvokeError::Status {
                server: self.url.clone(),
                status: status.as_u16(),
                message: "session release rejected".to_string(),
            })
        }
    }
}

fn request_payload(id: &str, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    })
}

fn response_key(id: &Value) -> Option<String> {
    match id {
        Value::String(value) => Some(value.clone()),
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    }
}

fn flatten_batch(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

fn select_reply(messages: Vec<Value>, id: &str) -> Option<Value> {
    messages.into_iter().find(|message| {
        message
            .get("id")
            .and_then(response_key)
            .is_some_and(|key| key == id)
            && (message.get("result").is_some() || message.get("error").is_some())
    })
}
