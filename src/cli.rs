use std::path::PathBuf;

use clap::Parser;

use crate::config::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(
    name = "mcp-responses-agent",
    version,
    about = "Chat with an OpenAI model that can call tools on a remote MCP server"
)]
pub struct Cli {
    /// TOML configuration file (defaults to config/agent.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub model: Option<String>,
    /// Streamable HTTP endpoint of the MCP server
    #[arg(long)]
    pub server_url: Option<String>,
    /// Base URL of the Responses API
    #[arg(long)]
    pub base_url: Option<String>,
    #[arg(long)]
    pub instructions: Option<String>,
    /// Request timeout in seconds for both HTTP clients
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            model: self.model.clone(),
            instructions: self.instructions.clone(),
            mcp_server_url: self.server_url.clone(),
            openai_base_url: self.base_url.clone(),
            request_timeout_secs: self.timeout,
            insecure_tls: self.insecure,
        }
    }
}
