use crate::console::{Notice, NoticeSink};
use crate::model::{ModelError, ModelInput, ModelRequest, ResponsesApi};
use crate::tooling::{InvocationError, ToolInvokeError, ToolSession, invoke};
use crate::types::{FunctionCall, InputItem, MessageRole, ModelOutput, ToolCatalogEntry};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub model: String,
    pub instructions: Option<String>,
}

impl ClientConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("remote tool call failed: {0}")]
    RemoteTool(#[source] ToolInvokeError),
    #[error("tool '{tool}' returned a malformed result: {reason}")]
    MalformedResult { tool: String, reason: String },
    #[error("arguments for tool '{tool}' are not a JSON object: {reason}")]
    ArgumentParse { tool: String, reason: String },
    #[error("model requested another tool call ('{tool}') after the tool result")]
    UnsupportedChainedCall { tool: String },
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<InvocationError> for TurnError {
    fn from(value: InvocationError) -> Self {
        match value {
            InvocationError::Remote(err) => TurnError::RemoteTool(err),
            InvocationError::Malformed { tool, reason } => {
                TurnError::MalformedResult { tool, reason }
            }
        }
    }
}

impl TurnError {
    pub fn category(&self) -> &'static str {
        match self {
            TurnError::RemoteTool(_) => "RemoteToolError",
            TurnError::MalformedResult { .. } => "MalformedResultError",
            TurnError::ArgumentParse { .. } => "ArgumentParseError",
            TurnError::UnsupportedChainedCall { .. } => "UnsupportedChainedCallError",
            TurnError::Model(_) => "ModelApiError",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            TurnError::RemoteTool(err) => format!("The tool server rejected the call: {err}"),
            TurnError::MalformedResult { tool, reason } => {
                format!("Tool '{tool}' answered with data that could not be used ({reason}).")
            }
            TurnError::ArgumentParse { tool, reason } => {
                format!("The model sent unusable arguments for '{tool}' ({reason}).")
            }
            TurnError::UnsupportedChainedCall { tool } => format!(
                "The model wanted to call '{tool}' after the first tool; only one tool call per question is supported."
            ),
            TurnError::Model(err) => err.user_message(),
        }
    }
}

/// Resolves one user turn against the model, running at most one tool call.
pub struct TurnResolver<P: ResponsesApi> {
    provider: P,
    config: ClientConfig,
}

impl<P: ResponsesApi> TurnResolver<P> {
    pub fn new(provider: P, config: ClientConfig) -> Self {
        Self { provider, config }
    }

    pub async fn resolve<S>(
        &self,
        session: &S,
        catalog: &[ToolCatalogEntry],
        user_turn: &str,
        notices: &mut dyn NoticeSink,
    ) -> Result<String, TurnError>
    where
        S: ToolSession + ?Sized,
    {
        info!(
            model = self.config.model.as_str(),
            tools = catalog.len(),
            "Submitting user turn"
        );
        let first = self
            .provider
            .create(ModelRequest {
                model: self.config.model.clone(),
                input: ModelInput::Text(user_turn.to_string()),
                instructions: self.config.instructions.clone(),
                tools: catalog.to_vec(),
            })
            .await?;

        let call = match first.last_output()? {
            ModelOutput::DirectAnswer { text } => {
                debug!("Model answered directly");
                return Ok(text);
            }
            ModelOutput::FunctionCall(call) => call,
        };

        let arguments = parse_arguments(&call)?;
        notices.notify(Notice::ToolExecution {
            tool: call.name.clone(),
        });
        notices.notify(Notice::ToolArguments {
            arguments: arguments.clone(),
        });
        info!(tool = call.name.as_str(), call_id = call.call_id.as_str(), "Invoking tool");
        let output = invoke(session, &call.name, arguments).await?;

        let continuation = build_continuation(user_turn, call, output);
        let second = self
            .provider
            .create(ModelRequest {
                model: self.config.model.clone(),
                input: ModelInput::Items(continuation),
                instructions: self.config.instructions.clone(),
                tools: Vec::new(),
            })
            .await?;

        match second.last_output()? {
            ModelOutput::DirectAnswer { text } => Ok(text),
            ModelOutput::FunctionCall(chained) => Err(TurnError::UnsupportedChainedCall {
                tool: chained.name,
            }),
        }
    }
}

fn parse_arguments(call: &FunctionCall) -> Result<Value, TurnError> {
    let argument_error = |reason: String| TurnError::ArgumentParse {
        tool: call.name.clone(),
        reason,
    };
    match serde_json::from_str::<Value>(&call.arguments) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(argument_error(format!("expected an object, got {other}"))),
        Err(err) => Err(argument_error(err.to_string())),
    }
}

/// Input for the second model call: the user's message, the echoed function
/// call, and its output under the same `call_id`.
pub fn build_continuation(user_turn: &str, call: FunctionCall, output: String) -> Vec<InputItem> {
    let call_id = call.call_id.clone();
    vec![
        InputItem::Message {
            role: MessageRole::User,
            content: user_turn.to_string(),
        },
        InputItem::FunctionCall(call),
        InputItem::FunctionCallOutput { call_id, output },
    ]
}
