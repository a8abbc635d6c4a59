use crate::config::AppConfig;
use crate::types::{FunctionCall, InputItem, ModelOutput, ToolCatalogEntry};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const RESPONSES_PATH: &str = "/v1/responses";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModelInput {
    Text(String),
    Items(Vec<InputItem>),
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub input: ModelInput,
    pub instructions: Option<String>,
    pub tools: Vec<ToolCatalogEntry>,
}

/// Body returned by the Responses API.
///
/// Output items stay as raw JSON: only the last one is ever read, so earlier
/// items of kinds this agent does not model (reasoning, web search, ...) must
/// not make the whole response undecodable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub output: Vec<Value>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("network error while calling the model API: {0}")]
    Network(#[from] reqwest::Error),
    #[error("model API returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("no API key configured for the model API")]
    MissingApiKey,
    #[error("model API returned invalid response: {0}")]
    InvalidResponse(String),
    #[error("model returned an unrecognized output item of type '{kind}'")]
    UnrecognizedOutput { kind: String },
}

impl ModelError {
    pub fn invalid_response(message: impl Into<String>) -> Self {
        ModelError::InvalidResponse(message.into())
    }

    pub fn user_message(&self) -> String {
        match self {
            ModelError::Network(err) => {
                if err.is_connect() {
                    "Could not reach the model API. Check the network and the configured base URL."
                        .to_string()
                } else if err.is_timeout() {
                    "The model API did not answer in time. Try again shortly.".to_string()
                } else {
                    format!("Network error while contacting the model API: {err}")
                }
            }
            ModelError::Status { status, message } => match StatusCode::from_u16(*status) {
                Ok(StatusCode::UNAUTHORIZED) | Ok(StatusCode::FORBIDDEN) => {
                    format!("The model API rejected the credentials ({status}): {message}")
                }
                Ok(StatusCode::TOO_MANY_REQUESTS) => {
                    format!("The model API is rate limiting requests: {message}")
                }
                _ => format!("The model API failed with status {status}: {message}"),
            },
            ModelError::MissingApiKey => {
                "No API key configured. Set OPENAI_API_KEY or api_key in the config file."
                    .to_string()
            }
            ModelError::InvalidResponse(message) => {
                format!("The model API sent a response that could not be processed: {message}")
            }
            ModelError::UnrecognizedOutput { kind } => {
                format!("The model answered with an unsupported output item ('{kind}').")
            }
        }
    }
}

impl ModelResponse {
    /// Classifies the last element of `output`.
    ///
    /// Earlier items are discarded on purpose: the agent acts only on the
    /// model's final decision for the turn.
    pub fn last_output(&self) -> Result<ModelOutput, ModelError> {
        let item = self
            .output
            .last()
            .ok_or_else(|| ModelError::invalid_response("response contained no output items"))?;
        let kind = item
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("<missing>");

        match kind {
            "function_call" => serde_json::from_value::<FunctionCall>(item.clone())
                .map(ModelOutput::FunctionCall)
                .map_err(|err| {
                    ModelError::invalid_response(format!("malformed function_call item: {err}"))
                }),
            "message" => {
                let message: OutputMessage = serde_json::from_value(item.clone()).map_err(|err| {
                    ModelError::invalid_response(format!("malformed message item: {err}"))
                })?;
                let text = message
                    .content
                    .into_iter()
                    .next()
                    .and_then(|part| part.text.or(part.refusal))
                    .ok_or_else(|| ModelError::invalid_response("message item carried no text"))?;
                Ok(ModelOutput::DirectAnswer { text })
            }
            other => Err(ModelError::UnrecognizedOutput {
                kind: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OutputMessage {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[async_trait]
pub trait ResponsesApi: Send + Sync {
    async fn create(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}

#[derive(Clone)]
pub struct OpenAIResponsesClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAIResponsesClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_client(base_url, api_key, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, api_key: impl Into<String>, client: Client) -> Self {
        Self {
            http: client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()?;
        Ok(Self::with_client(
            config.openai_base_url.clone(),
            config.api_key.clone(),
            client,
        ))
    }

    fn endpoint(&self, path: &str) -> String {
        let trimmed = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{trimmed}/{path}")
    }
}

#[async_trait]
impl ResponsesApi for OpenAIResponsesClient {
    async fn create(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        if self.api_key.trim().is_empty() {
            return Err(ModelError::MissingApiKey);
        }
        let url = self.endpoint(RESPONSES_PATH);
        let payload = ResponsesPayload::from(&request);
        info!(
            model = request.model.as_str(),
            url = %url,
            tools = request.tools.len(),
            "Sending request to model API"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let body = response.text().await?;
        let parsed: ModelResponse = serde_json::from_str(&body)
            .map_err(|err| ModelError::invalid_response(format!("undecodable body: {err}")))?;
        debug!(
            response_id = parsed.id.as_deref(),
            items = parsed.output.len(),
            "Received response from model API"
        );
        Ok(parsed)
    }
}

#[derive(Debug, Serialize)]
struct ResponsesPayload<'a> {
    model: &'a str,
    input: &'a ModelInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolCatalogEntry],
}

impl<'a> From<&'a ModelRequest> for ResponsesPayload<'a> {
    fn from(value: &'a ModelRequest) -> Self {
        Self {
            model: &value.model,
            input: &value.input,
            instructions: value.instructions.as_deref(),
            tools: &value.tools,
        }
    }
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no error details".to_string()
            } else {
                trimmed.to_string()
            }
        })
}
