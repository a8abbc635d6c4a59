use crate::catalog::adapt;
use crate::client::TurnResolver;
use crate::console::{Console, Notice};
use crate::model::ResponsesApi;
use crate::tooling::{ToolInvokeError, ToolSession};
use crate::types::ToolCatalogEntry;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const EXIT_KEYWORDS: [&str; 3] = ["exit", "quit", "bye"];

pub fn is_exit_keyword(line: &str) -> bool {
    let trimmed = line.trim();
    EXIT_KEYWORDS
        .iter()
        .any(|keyword| trimmed.eq_ignore_ascii_case(keyword))
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to the MCP server: {0}")]
    Connect(#[source] ToolInvokeError),
    #[error("failed to fetch the tool catalog: {0}")]
    Catalog(#[source] ToolInvokeError),
    #[error("console I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub answered: usize,
    pub failed: usize,
}

/// Owns the remote session for the lifetime of the interactive loop.
pub struct SessionDriver<P: ResponsesApi> {
    resolver: TurnResolver<P>,
}

impl<P: ResponsesApi> SessionDriver<P> {
    pub fn new(resolver: TurnResolver<P>) -> Self {
        Self { resolver }
    }

    /// Connects, runs the read loop until an exit keyword or end of input,
    /// and releases the session exactly once if the connect succeeded.
    pub async fn run<S, C>(&self, session: &mut S, console: &mut C) -> Result<SessionSummary, SessionError>
    where
        S: ToolSession + ?Sized,
        C: Console,
    {
        console.notify(Notice::Connecting);
        session.connect().await.map_err(SessionError::Connect)?;
        console.notify(Notice::Connected {
            is_connected: session.is_connected(),
        });

        let outcome = self.drive(&*session, console).await;

        if let Err(err) = session.close().await {
            warn!(%err, "failed to release MCP session");
        }
        outcome
    }

    async fn drive<S, C>(&self, session: &S, console: &mut C) -> Result<SessionSummary, SessionError>
    where
        S: ToolSession + ?Sized,
        C: Console,
    {
        let descriptors = session.list_tools().await.map_err(SessionError::Catalog)?;
        console.notify(Notice::Tools {
            names: descriptors.iter().map(|tool| tool.name.clone()).collect(),
        });
        let catalog: Vec<ToolCatalogEntry> = adapt(&descriptors);
        info!(tools = catalog.len(), "Tool catalog ready");

        let mut summary = SessionSummary::default();
        loop {
            let Some(line) = console.read_line().await? else {
                debug!("End of input reached");
                console.notify(Notice::Exit);
                break;
            };
            if is_exit_keyword(&line) {
                console.notify(Notice::Exit);
                break;
            }
            let user_turn = line.trim();
            if user_turn.is_empty() {
                continue;
            }

            console.notify(Notice::AssistantPrompt);
            match self
                .resolver
                .resolve(session, &catalog, user_turn, &mut *console)
                .await
            {
                Ok(text) => {
                    summary.answered += 1;
                    console.notify(Notice::Answer { text });
                }
                Err(err) => {
                    summary.failed += 1;
                    debug!(category = err.category(), %err, "Turn failed");
                    console.notify(Notice::Error {
                        category: err.category(),
                        message: err.user_message(),
                    });
                }
            }
        }
        info!(
            answered = summary.answered,
            failed = summary.failed,
            "Session finished"
        );
        Ok(summary)
    }
}
