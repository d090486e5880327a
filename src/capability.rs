//! Capability negotiation for the tools-only surface.
//!
//! The client always sends the fixed tools-only capability set; the server
//! reply is validated strictly, rejecting any endpoint that advertises
//! support for anything beyond tools.

use serde_json::Value;

use crate::error::McpError;
use crate::protocol::{
    ClientCapabilities, ClientInfo, InitializeParams, ServerInfo, PROTOCOL_VERSION,
};

/// Everything the session keeps from a validated `initialize` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiatedServer {
    pub server_info: ServerInfo,
    pub protocol_version: String,
    pub instructions: Option<String>,
}

/// Build the `initialize` parameters for the given client identity.
pub fn initialize_params(client_info: ClientInfo) -> InitializeParams {
    InitializeParams {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: ClientCapabilities::tools_only(),
        client_info,
    }
}

/// Validate an `initialize` result against the tools-only rules.
///
/// Rules are applied in order; the first failure wins:
/// 1. `capabilities`, `serverInfo`, and `protocolVersion` must be present.
/// 2. `capabilities.tools.supported` must be the boolean `true`.
/// 3. `prompts.supported == true` is rejected.
/// 4. `resources.supported == true` is rejected.
/// 5. Any other capability object with `supported == true` is rejected,
///    carrying the offending keys.
///
/// Capability values that are not objects, or objects without a
/// `supported` field, are ignored.
pub fn validate_initialize_result(result: &Value) -> Result<NegotiatedServer, McpError> {
    let capabilities = result
        .get("capabilities")
        .ok_or_else(|| McpError::invalid_capabilities("missing capabilities"))?;
    let server_info = result
        .get("serverInfo")
        .ok_or_else(|| McpError::invalid_capabilities("missing serverInfo"))?;
    let protocol_version = result
        .get("protocolVersion")
        .and_then(|value| value.as_str())
        .ok_or_else(|| McpError::invalid_capabilities("missing protocolVersion"))?;

    let capabilities = capabilities
        .as_object()
        .ok_or_else(|| McpError::invalid_capabilities("capabilities is not an object"))?;

    if !supports(capabilities.get("tools")) {
        return Err(McpError::invalid_capabilities(
            "server does not support tools",
        ));
    }
    if supports(capabilities.get("prompts")) {
        return Err(McpError::prompts_not_supported());
    }
    if supports(capabilities.get("resources")) {
        return Err(McpError::resources_not_supported());
    }

    let offending: Vec<String> = capabilities
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "tools" | "prompts" | "resources"))
        .filter(|(_, value)| supports(Some(value)))
        .map(|(key, _)| key.clone())
        .collect();
    if !offending.is_empty() {
        return Err(McpError::unsupported_capabilities(offending));
    }

    let server_info: ServerInfo = serde_json::from_value(server_info.clone())
        .map_err(|error| McpError::invalid_capabilities(format!("invalid serverInfo: {error}")))?;
    let instructions = result
        .get("instructions")
        .and_then(|value| value.as_str())
        .map(str::to_string);

    Ok(NegotiatedServer {
        server_info,
        protocol_version: protocol_version.to_string(),
        instructions,
    })
}

/// `true` iff the value is an object whose `supported` field is the
/// boolean `true`.
fn supports(value: Option<&Value>) -> bool {
    value
        .and_then(|value| value.as_object())
        .and_then(|object| object.get("supported"))
        .map(|supported| supported == &Value::Bool(true))
        .unwrap_or(false)
}
