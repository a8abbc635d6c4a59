use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolInvokeError {
    #[error("MCP server '{server}' has no open session")]
    NotConnected { server: String },
    #[error("MCP server '{server}' transport error: {message}")]
    Transport { server: String, message: String },
    #[error("MCP server '{server}' answered with HTTP status {status}: {message}")]
    Status {
        server: String,
        status: u16,
        message: String,
    },
    #[error("MCP server '{server}' returned invalid JSON: {source}")]
    InvalidJson {
        server: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("MCP server '{server}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },
    #[error("MCP server '{server}' sent no response for request '{id}'")]
    MissingResponse { server: String, id: String },
    #[error("tool '{tool}' on MCP server '{server}' reported an error: {message}")]
    ToolFailed {
        server: String,
        tool: String,
        message: String,
    },
}
