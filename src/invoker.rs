//! Remote tool invocation and result normalization.

use serde::Serialize;

use crate::error::McpError;
use crate::protocol::{rpc_code, CallToolResult, ContentItem, METHOD_TOOLS_CALL};
use crate::session::Session;

/// Normalized outcome of a successful tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResult {
    pub success: bool,
    pub result: serde_json::Value,
}

impl InvocationResult {
    pub fn into_value(self) -> serde_json::Value {
        serde_json::json!({ "success": self.success, "result": self.result })
    }
}

/// Call a remote tool through a connected session.
///
/// Arguments pass through untouched. JSON-RPC error codes map onto the
/// tool error taxonomy; transport failures surface as execution failures
/// while the supervisor observes the liveness change independently.
pub async fn invoke(
    session: &Session,
    tool_name: &str,
    arguments: serde_json::Value,
) -> Result<InvocationResult, McpError> {
    tracing::debug!(endpoint = %session.endpoint(), tool = tool_name, "invoking remote tool");

    let params = serde_json::json!({ "name": tool_name, "arguments": arguments });
    let reply = session
        .call(METHOD_TOOLS_CALL, params)
        .await
        .map_err(|error| classify_call_error(session, tool_name, error))?;

    let result: CallToolResult = serde_json::from_value(reply).map_err(|error| {
        McpError::protocol_malformed(format!("undecodable tools/call reply: {error}"))
            .with_context("tool", tool_name)
    })?;

    normalize(tool_name, result)
}

fn classify_call_error(session: &Session, tool_name: &str, error: McpError) -> McpError {
    match &error {
        McpError::ProtocolError { code, message, .. } => match *code {
            rpc_code::METHOD_NOT_FOUND => McpError::tool_not_found(tool_name)
                .with_context("endpoint", session.endpoint().to_string()),
            rpc_code::INVALID_PARAMS => McpError::tool_invalid_params(tool_name, message),
            code => McpError::tool_execution_failed(tool_name, message)
                .with_context("rpc_code", code),
        },
        McpError::NotConnected { .. } | McpError::Cancelled { .. } => error,
        other if other.kind() == crate::error::ErrorKind::Transport => {
            McpError::tool_execution_failed(tool_name, error.to_string())
                .with_context("cause", "transport")
        }
        _ => error,
    }
}

/// Normalize the content items of a `tools/call` reply.
fn normalize(tool_name: &str, reply: CallToolResult) -> Result<InvocationResult, McpError> {
    if reply.is_error == Some(true) {
        let text = reply
            .content
            .iter()
            .filter(|item| item.is_text())
            .filter_map(|item| item.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        let message = if text.is_empty() {
            "tool reported an error result".to_string()
        } else {
            text
        };
        return Err(McpError::tool_execution_failed(tool_name, message));
    }

    let mut content = reply.content;
    let result = match content.len() {
        0 => serde_json::Value::Null,
        1 => item_value(content.remove(0))?,
        _ => serde_json::Value::Array(
            content
                .into_iter()
                .map(item_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
    };

    Ok(InvocationResult {
        success: true,
        result,
    })
}

fn item_value(item: ContentItem) -> Result<serde_json::Value, McpError> {
    if item.is_text() {
        Ok(serde_json::Value::String(item.text.unwrap_or_default()))
    } else {
        Ok(serde_json::to_value(item)?)
    }
}
