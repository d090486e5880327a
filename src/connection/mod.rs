//! Connection seam between sessions and transports.
//!
//! A [`Connection`] is one live JSON-RPC 2.0 channel to an MCP server; a
//! [`ConnectionFactory`] produces connections for an [`Endpoint`]. The
//! session core only ever sees these traits, so hosts can supply their own
//! transport implementations.

mod factory;
mod http;
mod stdio;

pub use factory::StdConnectionFactory;
pub use http::HttpConnection;
pub use stdio::StdioConnection;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoint;
use crate::error::McpError;

/// Options for establishing a connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Deadline for establishing the connection.
    pub deadline: Option<Duration>,
    /// Cancellation signal propagated into the transport.
    pub cancel: CancellationToken,
    /// Extra headers, honored by transports that carry them (http).
    pub headers: HashMap<String, String>,
}

/// One live JSON-RPC channel.
#[async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    /// Issue a JSON-RPC request and await the matching response.
    ///
    /// A JSON-RPC `error` member maps to [`McpError::ProtocolError`].
    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, McpError>;

    /// Fire-and-forget JSON-RPC notification (no `id`).
    async fn notify(&self, method: &str, params: serde_json::Value) -> Result<(), McpError>;

    /// Release transport resources. Idempotent.
    async fn close(&self) -> Result<(), McpError>;

    /// Whether the transport is still usable. Flips to false on transport
    /// loss or after [`Connection::close`].
    fn is_open(&self) -> bool;
}

/// Produces a live connection for an endpoint.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: ConnectOptions,
    ) -> Result<std::sync::Arc<dyn Connection>, McpError>;
}

/// Decode a JSON-RPC response frame into its result, mapping an `error`
/// member to [`McpError::ProtocolError`].
pub(crate) fn decode_rpc_result(frame: &serde_json::Value) -> Result<serde_json::Value, McpError> {
    if let Some(error) = frame.get("error") {
        let code = error.get("code").and_then(|code| code.as_i64()).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(|message| message.as_str())
            .unwrap_or("unknown error");
        return Err(McpError::protocol_error(code, message));
    }
    match frame.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(McpError::protocol_malformed(
            "response carries neither result nor error",
        )),
    }
}
