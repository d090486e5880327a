//! Error taxonomy for the MCP client core.
//!
//! Four kinds (transport, capability, tool, protocol) plus cancellation.
//! Every error carries a stable string code, a redacted message, and a
//! sanitized context map. The stable codes are part of the external
//! surface; do not rename them.

mod redact;

pub use redact::{redact_text, redact_value, MAX_MESSAGE_LEN};

use std::collections::BTreeMap;

use thiserror::Error;

/// Broad error kind used for retry and circuit decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Capability,
    Tool,
    Protocol,
    Cancelled,
}

/// Sanitized key/value context attached to an error.
///
/// Values are redacted on insertion, so a context map never holds raw
/// URLs, paths, addresses, or emails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext(BTreeMap<String, serde_json::Value>);

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), redact_value(&value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

/// Primary error type for all MCP client operations.
#[derive(Debug, Clone, Error)]
pub enum McpError {
    // Transport
    #[error("connect timed out after {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64, context: ErrorContext },

    #[error("connection refused: {message}")]
    ConnectionRefused { message: String, context: ErrorContext },

    #[error("connection lost: {message}")]
    ConnectionLost { message: String, context: ErrorContext },

    #[error("reconnection failed after {attempts} attempts")]
    ReconnectExhausted { attempts: u32, context: ErrorContext },

    #[error("session is not connected")]
    NotConnected { context: ErrorContext },

    // Capability
    #[error("server requires prompts support; this client is tools-only")]
    PromptsNotSupported { context: ErrorContext },

    #[error("server requires resources support; this client is tools-only")]
    ResourcesNotSupported { context: ErrorContext },

    #[error("server advertises unsupported capabilities: {}", .keys.join(", "))]
    UnsupportedCapabilities { keys: Vec<String>, context: ErrorContext },

    #[error("invalid initialize response: {message}")]
    InvalidCapabilities { message: String, context: ErrorContext },

    // Tool
    #[error("tool discovery failed: {message}")]
    ToolDiscoveryFailed { message: String, context: ErrorContext },

    #[error("tool not found: {tool_name}")]
    ToolNotFound { tool_name: String, context: ErrorContext },

    #[error("invalid parameters for tool {tool_name}: {message}")]
    ToolInvalidParams {
        tool_name: String,
        message: String,
        context: ErrorContext,
    },

    #[error("tool {tool_name} failed: {message}")]
    ToolExecutionFailed {
        tool_name: String,
        message: String,
        context: ErrorContext,
    },

    #[error("tool registration failed: {message}")]
    ToolRegistrationFailed { message: String, context: ErrorContext },

    // Protocol
    #[error("malformed JSON-RPC payload: {message}")]
    ProtocolMalformed { message: String, context: ErrorContext },

    #[error("JSON-RPC error {code}: {message}")]
    ProtocolError {
        code: i64,
        message: String,
        context: ErrorContext,
    },

    #[error("operation cancelled")]
    Cancelled { context: ErrorContext },
}

impl McpError {
    pub fn connect_timeout(timeout_ms: u64) -> Self {
        Self::ConnectTimeout {
            timeout_ms,
            context: ErrorContext::new(),
        }
    }

    pub fn connection_refused(message: impl AsRef<str>) -> Self {
        Self::ConnectionRefused {
            message: redact_text(message.as_ref()),
            context: ErrorContext::new(),
        }
    }

    pub fn connection_lost(message: impl AsRef<str>) -> Self {
        Self::ConnectionLost {
            message: redact_text(message.as_ref()),
            context: ErrorContext::new(),
        }
    }

    pub fn reconnect_exhausted(attempts: u32) -> Self {
        Self::ReconnectExhausted {
            attempts,
            context: ErrorContext::new(),
        }
    }

    pub fn not_connected() -> Self {
        Self::NotConnected {
            context: ErrorContext::new(),
        }
    }

    pub fn prompts_not_supported() -> Self {
        Self::PromptsNotSupported {
            context: ErrorContext::new(),
        }
    }

    pub fn resources_not_supported() -> Self {
        Self::ResourcesNotSupported {
            context: ErrorContext::new(),
        }
    }

    pub fn unsupported_capabilities(mut keys: Vec<String>) -> Self {
        keys.sort();
        let context = ErrorContext::new().with(
            "capabilities",
            serde_json::Value::Array(
                keys.iter()
                    .map(|key| serde_json::Value::String(key.clone()))
                    .collect(),
            ),
        );
        Self::UnsupportedCapabilities { keys, context }
    }

    pub fn invalid_capabilities(message: impl AsRef<str>) -> Self {
        Self::InvalidCapabilities {
            message: redact_text(message.as_ref()),
            context: ErrorContext::new(),
        }
    }

    pub fn tool_discovery_failed(message: impl AsRef<str>) -> Self {
        Self::ToolDiscoveryFailed {
            message: redact_text(message.as_ref()),
            context: ErrorContext::new(),
        }
    }

    pub fn tool_not_found(tool_name: impl Into<String>) -> Self {
        Self::ToolNotFound {
            tool_name: tool_name.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn tool_invalid_params(tool_name: impl Into<String>, message: impl AsRef<str>) -> Self {
        Self::ToolInvalidParams {
            tool_name: tool_name.into(),
            message: redact_text(message.as_ref()),
            context: ErrorContext::new(),
        }
    }

    pub fn tool_execution_failed(tool_name: impl Into<String>, message: impl AsRef<str>) -> Self {
        Self::ToolExecutionFailed {
            tool_name: tool_name.into(),
            message: redact_text(message.as_ref()),
            context: ErrorContext::new(),
        }
    }

    pub fn tool_registration_failed(message: impl AsRef<str>) -> Self {
        Self::ToolRegistrationFailed {
            message: redact_text(message.as_ref()),
            context: ErrorContext::new(),
        }
    }

    pub fn protocol_malformed(message: impl AsRef<str>) -> Self {
        Self::ProtocolMalformed {
            message: redact_text(message.as_ref()),
            context: ErrorContext::new(),
        }
    }

    pub fn protocol_error(code: i64, message: impl AsRef<str>) -> Self {
        Self::ProtocolError {
            code,
            message: redact_text(message.as_ref()),
            context: ErrorContext::new(),
        }
    }

    pub fn cancelled() -> Self {
        Self::Cancelled {
            context: ErrorContext::new(),
        }
    }

    /// Attach a sanitized context entry.
    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context_mut().insert(key, value);
        self
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::ConnectTimeout { context, .. }
            | Self::ConnectionRefused { context, .. }
            | Self::ConnectionLost { context, .. }
            | Self::ReconnectExhausted { context, .. }
            | Self::NotConnected { context }
            | Self::PromptsNotSupported { context }
            | Self::ResourcesNotSupported { context }
            | Self::UnsupportedCapabilities { context, .. }
            | Self::InvalidCapabilities { context, .. }
            | Self::ToolDiscoveryFailed { context, .. }
            | Self::ToolNotFound { context, .. }
            | Self::ToolInvalidParams { context, .. }
            | Self::ToolExecutionFailed { context, .. }
            | Self::ToolRegistrationFailed { context, .. }
            | Self::ProtocolMalformed { context, .. }
            | Self::ProtocolError { context, .. }
            | Self::Cancelled { context } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::ConnectTimeout { context, .. }
            | Self::ConnectionRefused { context, .. }
            | Self::ConnectionLost { context, .. }
            | Self::ReconnectExhausted { context, .. }
            | Self::NotConnected { context }
            | Self::PromptsNotSupported { context }
            | Self::ResourcesNotSupported { context }
            | Self::UnsupportedCapabilities { context, .. }
            | Self::InvalidCapabilities { context, .. }
            | Self::ToolDiscoveryFailed { context, .. }
            | Self::ToolNotFound { context, .. }
            | Self::ToolInvalidParams { context, .. }
            | Self::ToolExecutionFailed { context, .. }
            | Self::ToolRegistrationFailed { context, .. }
            | Self::ProtocolMalformed { context, .. }
            | Self::ProtocolError { context, .. }
            | Self::Cancelled { context } => context,
        }
    }

    /// Classify this error into a kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectTimeout { .. }
            | Self::ConnectionRefused { .. }
            | Self::ConnectionLost { .. }
            | Self::ReconnectExhausted { .. }
            | Self::NotConnected { .. } => ErrorKind::Transport,
            Self::PromptsNotSupported { .. }
            | Self::ResourcesNotSupported { .. }
            | Self::UnsupportedCapabilities { .. }
            | Self::InvalidCapabilities { .. } => ErrorKind::Capability,
            Self::ToolDiscoveryFailed { .. }
            | Self::ToolNotFound { .. }
            | Self::ToolInvalidParams { .. }
            | Self::ToolExecutionFailed { .. }
            | Self::ToolRegistrationFailed { .. } => ErrorKind::Tool,
            Self::ProtocolMalformed { .. } | Self::ProtocolError { .. } => ErrorKind::Protocol,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Stable machine-readable code. Part of the external surface.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectTimeout { .. } => "transport_connect_timeout",
            Self::ConnectionRefused { .. } => "transport_connection_refused",
            Self::ConnectionLost { .. } => "transport_connection_lost",
            Self::ReconnectExhausted { .. } => "transport_reconnect_exhausted",
            Self::NotConnected { .. } => "transport_not_connected",
            Self::PromptsNotSupported { .. } => "capability_prompts_not_supported",
            Self::ResourcesNotSupported { .. } => "capability_resources_not_supported",
            Self::UnsupportedCapabilities { .. } => "capability_unsupported",
            Self::InvalidCapabilities { .. } => "capability_invalid",
            Self::ToolDiscoveryFailed { .. } => "tool_discovery_failed",
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::ToolInvalidParams { .. } => "tool_invalid_params",
            Self::ToolExecutionFailed { .. } => "tool_execution_failed",
            Self::ToolRegistrationFailed { .. } => "tool_registration_failed",
            Self::ProtocolMalformed { .. } => "protocol_malformed",
            Self::ProtocolError { .. } => "protocol_error",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether the reconnect supervisor may retry after this error.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. }
                | Self::ConnectionRefused { .. }
                | Self::ConnectionLost { .. }
        )
    }

    /// Whether this error counts toward the endpoint circuit breaker.
    pub fn bumps_circuit(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. }
                | Self::ConnectionRefused { .. }
                | Self::ConnectionLost { .. }
                | Self::ProtocolMalformed { .. }
        )
    }
}

impl From<serde_json::Error> for McpError {
    fn from(error: serde_json::Error) -> Self {
        Self::protocol_malformed(error.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, McpError>;
