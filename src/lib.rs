pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::{catalog, client, console, session, tooling};
pub use cli::Cli;
pub use config::{AppConfig, ConfigOverrides};
pub use domain::types;
pub use infrastructure::model;

use client::{ClientConfig, TurnResolver};
use console::TerminalConsole;
use model::OpenAIResponsesClient;
use session::SessionDriver;
use std::error::Error;
use std::io;
use std::sync::Once;
use tooling::StreamableHttpSession;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

static TRACING: Once = Once::new();

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    init_tracing(cli.verbose);
    info!("Starting mcp-responses-agent");
    debug!(config = ?cli.config, "CLI arguments parsed");

    let config = AppConfig::load(cli.config.as_deref(), &cli.overrides())?;
    debug!(?config, "Configuration resolved");

    let provider = OpenAIResponsesClient::from_config(&config)?;
    let resolver = TurnResolver::new(
        provider,
        ClientConfig::new(config.model.clone()).with_instructions(config.instructions.clone()),
    );
    let mut session = StreamableHttpSession::from_config(&config)?;
    let mut console = TerminalConsole::new();
    console.clear()?;

    let summary = SessionDriver::new(resolver)
        .run(&mut session, &mut console)
        .await?;
    info!(
        answered = summary.answered,
        failed = summary.failed,
        "Agent exited"
    );
    Ok(())
}

/// Installs the global subscriber once. Logs go to stderr so they never
/// interleave with the transcript on stdout.
pub fn init_tracing(verbose: bool) {
    TRACING.call_once(|| {
        let default_level = if verbose { "debug" } else { "warn" };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(io::stderr)
            .init();
    });
}
