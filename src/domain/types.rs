use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a replayed input message; the agent only ever replays user turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
}

/// A tool as advertised by the remote MCP server through `tools/list`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Reads one entry of a `tools/list` result. Entries without a name are
    /// not callable and yield `None`.
    pub fn from_listing(entry: &Value) -> Option<Self> {
        let name = entry.get("name").and_then(Value::as_str)?;
        let description = entry
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let input_schema = entry.get("inputSchema").cloned().unwrap_or(Value::Null);
        Some(Self::new(name, description, input_schema))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Function,
}

/// Function tool in the shape the Responses API expects in its `tools` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCatalogEntry {
    #[serde(rename = "type")]
    pub kind: ToolKind,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A `function_call` output item. The same structure is echoed back to the
/// model as part of the continuation, so `id` and `status` are kept when the
/// model supplied them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub call_id: String,
    pub name: String,
    pub arguments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl FunctionCall {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: None,
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
            status: None,
        }
    }
}

/// The two shapes of model output this agent understands.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    FunctionCall(FunctionCall),
    DirectAnswer { text: String },
}

/// One element of the `input` list submitted to the Responses API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    Message { role: MessageRole, content: String },
    FunctionCall(FunctionCall),
    FunctionCallOutput { call_id: String, output: String },
}
