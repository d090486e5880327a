//! Remote tool discovery and shape translation.
//!
//! `tools/list` replies are validated structurally, then each remote
//! descriptor is translated into the host shape under the `mcp_` name
//! prefix. The reverse translation exists for symmetry; a pure JSON
//! Schema survives the round-trip byte-identical.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::McpError;
use crate::protocol::{empty_object_schema, RemoteToolDescriptor, METHOD_TOOLS_LIST};
use crate::router::{HostToolDescriptor, HostToolParameters};
use crate::session::Session;

/// Prefix for every MCP-owned name in the host router. Underscore, never
/// a colon: several providers reject `:` in tool names.
pub const MCP_TOOL_PREFIX: &str = "mcp_";

fn tool_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("tool name pattern compiles"))
}

/// Host-visible name for a remote tool.
pub fn host_tool_name(remote_name: &str) -> String {
    format!("{MCP_TOOL_PREFIX}{remote_name}")
}

/// List the tools advertised by the remote server.
///
/// The reply must carry a `tools` array whose entries each have a string
/// `name`; anything else fails discovery. RPC-level errors pass through
/// unchanged.
pub async fn list_remote(session: &Session) -> Result<Vec<RemoteToolDescriptor>, McpError> {
    let reply = session
        .call(METHOD_TOOLS_LIST, serde_json::json!({}))
        .await?;

    let tools = reply
        .get("tools")
        .and_then(|tools| tools.as_array())
        .ok_or_else(|| {
            McpError::tool_discovery_failed("tools/list reply carries no tools array")
                .with_context("endpoint", session.endpoint().to_string())
        })?;

    let mut descriptors = Vec::with_capacity(tools.len());
    for entry in tools {
        if entry.get("name").and_then(|name| name.as_str()).is_none() {
            return Err(
                McpError::tool_discovery_failed("tool entry lacks a string name")
                    .with_context("endpoint", session.endpoint().to_string()),
            );
        }
        let descriptor: RemoteToolDescriptor = serde_json::from_value(entry.clone())
            .map_err(|error| {
                McpError::tool_discovery_failed(format!("undecodable tool entry: {error}"))
            })?;
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}

/// Translate a remote descriptor into the host shape.
///
/// The host name gains the `mcp_` prefix, a missing input schema becomes
/// the empty object schema, and present schemas pass through verbatim.
/// Names that are empty or carry characters outside `[A-Za-z0-9_-]` are
/// rejected.
pub fn to_host_descriptor(remote: &RemoteToolDescriptor) -> Result<HostToolDescriptor, McpError> {
    if !tool_name_pattern().is_match(&remote.name) {
        return Err(
            McpError::tool_discovery_failed("tool name has invalid characters")
                .with_context("tool", remote.name.clone()),
        );
    }

    let schema = remote
        .input_schema
        .clone()
        .unwrap_or_else(empty_object_schema);

    Ok(HostToolDescriptor {
        name: host_tool_name(&remote.name),
        description: remote.description.clone(),
        parameters: HostToolParameters::Schema(schema),
        output_schema: remote.output_schema.clone(),
    })
}

/// Translate a host descriptor back into the remote shape.
///
/// Strips the `mcp_` prefix when present. A host tool without a
/// serializable schema gets the permissive object schema.
pub fn to_remote_descriptor(host: &HostToolDescriptor) -> RemoteToolDescriptor {
    let name = host
        .name
        .strip_prefix(MCP_TOOL_PREFIX)
        .unwrap_or(&host.name)
        .to_string();

    RemoteToolDescriptor {
        name,
        description: host.description.clone(),
        input_schema: Some(host.parameters.to_schema()),
        output_schema: host.output_schema.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn remote(name: &str, schema: Option<serde_json::Value>) -> RemoteToolDescriptor {
        RemoteToolDescriptor {
            name: name.into(),
            description: Some(format!("{name} tool")),
            input_schema: schema,
            output_schema: None,
        }
    }

    #[test]
    fn host_names_carry_the_mcp_prefix() {
        assert_eq!(host_tool_name("echo"), "mcp_echo");
    }

    #[test]
    fn translation_defaults_a_missing_schema() {
        let host = to_host_descriptor(&remote("echo", None))
            .expect("translation should succeed");
        assert_eq!(host.name, "mcp_echo");
        assert_eq!(
            host.parameters,
            HostToolParameters::Schema(json!({
                "type": "object",
                "properties": {},
                "required": [],
            }))
        );
    }

    #[test]
    fn translation_preserves_a_present_schema_verbatim() {
        let schema = json!({
            "type": "object",
            "properties": { "message": { "type": "string" } },
            "required": ["message"],
        });
        let host = to_host_descriptor(&remote("echo", Some(schema.clone())))
            .expect("translation should succeed");
        assert_eq!(host.parameters, HostToolParameters::Schema(schema));
    }

    #[test]
    fn invalid_names_are_rejected() {
        for name in ["", "bad name", "ns:tool", "a/b", "tool!"] {
            let descriptor = RemoteToolDescriptor {
                name: name.into(),
                description: None,
                input_schema: None,
                output_schema: None,
            };
            let err = to_host_descriptor(&descriptor)
                .expect_err("invalid name should be rejected");
            assert!(matches!(err, McpError::ToolDiscoveryFailed { .. }), "{name}");
        }
    }

    #[test]
    fn round_trip_preserves_name_description_and_schema() {
        let schema = json!({
            "type": "object",
            "properties": { "q": { "type": "string" } },
            "required": ["q"],
        });
        let original = remote("search", Some(schema));
        let host = to_host_descriptor(&original).expect("translation should succeed");
        let back = to_remote_descriptor(&host);

        assert_eq!(back.name, original.name);
        assert_eq!(back.description, original.description);
        assert_eq!(back.input_schema, original.input_schema);
    }

    #[test]
    fn dynamic_host_parameters_reverse_to_a_permissive_schema() {
        let host = HostToolDescriptor {
            name: "mcp_native".into(),
            description: None,
            parameters: HostToolParameters::Dynamic,
            output_schema: None,
        };
        let back = to_remote_descriptor(&host);
        assert_eq!(
            back.input_schema,
            Some(json!({ "type": "object", "additionalProperties": true }))
        );
    }
}
