use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::error::ToolInvokeError;
use super::interface::{ToolContent, ToolSession};

/// Tool whose results are reduced to a subject/body digest before they are
/// handed back to the model.
pub const MAIL_SEARCH_TOOL: &str = "gmail_find_email";

const SUBJECT_POINTER: &str = "/results/0/raw/payload/headers/Subject";
const BODY_POINTER: &str = "/results/0/body_plain";

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error(transparent)]
    Remote(#[from] ToolInvokeError),
    #[error("tool '{tool}' returned a malformed result: {reason}")]
    Malformed { tool: String, reason: String },
}

impl InvocationError {
    fn malformed(tool: &str, reason: impl Into<String>) -> Self {
        InvocationError::Malformed {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmailDigest<'a> {
    subject: &'a str,
    body: &'a str,
}

/// Performs exactly one `tools/call` and returns the payload as JSON text.
pub async fn invoke<S>(session: &S, tool: &str, arguments: Value) -> Result<String, InvocationError>
where
    S: ToolSession + ?Sized,
{
    let blocks = session.call_tool(tool, arguments).await?;
    let text = first_text(tool, &blocks)?;
    let output = shape_output(tool, text)?;
    debug!(tool, bytes = output.len(), "Tool result ready for the model");
    Ok(output)
}

fn first_text<'a>(tool: &str, blocks: &'a [ToolContent]) -> Result<&'a str, InvocationError> {
    let block = blocks
        .first()
        .ok_or_else(|| InvocationError::malformed(tool, "result has no content blocks"))?;
    block.text.as_deref().ok_or_else(|| {
        InvocationError::malformed(
            tool,
            format!("first content block ('{}') carries no text", block.kind),
        )
    })
}

/// Validates the payload as JSON and applies the mail digest projection for
/// [`MAIL_SEARCH_TOOL`]. Any other tool's text is returned unchanged.
pub fn shape_output(tool: &str, text: &str) -> Result<String, InvocationError> {
    let payload: Value = serde_json::from_str(text)
        .map_err(|err| InvocationError::malformed(tool, format!("payload is not JSON: {err}")))?;
    if tool != MAIL_SEARCH_TOOL {
        return Ok(text.to_string());
    }

    let digest = EmailDigest {
        subject: string_at(tool, &payload, SUBJECT_POINTER)?,
        body: string_at(tool, &payload, BODY_POINTER)?,
    };
    serde_json::to_string(&digest)
        .map_err(|err| InvocationError::malformed(tool, format!("digest encoding failed: {err}")))
}

fn string_at<'a>(tool: &str, payload: &'a Value, pointer: &str) -> Result<&'a str, InvocationError> {
    match payload.pointer(pointer) {
        Some(Value::String(text)) => Ok(text),
        Some(_) => Err(InvocationError::malformed(
            tool,
            format!("value at '{pointer}' is not a string"),
        )),
        None => Err(InvocationError::malformed(
            tool,
            format!("missing value at '{pointer}'"),
        )),
    }
}
