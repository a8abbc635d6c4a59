use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::error::ToolInvokeError;
use crate::types::ToolDescriptor;

/// One block of a `tools/call` result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolContent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
        }
    }
}

/// A stateful session with a remote tool server.
///
/// `connect` must succeed before any other call; `close` releases the remote
/// session and leaves the value reusable for a fresh `connect`.
#[async_trait]
pub trait ToolSession: Send + Sync {
    async fn connect(&mut self) -> Result<(), ToolInvokeError>;

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolInvokeError>;

    async fn call_tool(
        &self,
        tool: &str,
        arguments: Value,
    ) -> Result<Vec<ToolContent>, ToolInvokeError>;

    fn is_connected(&self) -> bool;

    async fn close(&mut self) -> Result<(), ToolInvokeError>;
}
