//! Host tool-router capability.
//!
//! The MCP core integrates with the host through exactly three operations:
//! `register`, `unregister`, and `has_tool`. Hosts bring their own router;
//! [`InMemoryToolRouter`] is a reference implementation for tests and
//! simple embeddings.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::McpError;
use crate::protocol::permissive_object_schema;

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Additional metadata supplied by the host.
    pub metadata: serde_json::Value,
}

/// Arguments handed to a registered tool.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// The raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.value.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|value| value.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.value.get(key).and_then(|value| value.as_bool())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.value.get(key).and_then(|value| value.as_i64())
    }

    /// Deserialize the entire argument object into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.value.clone())
    }
}

/// How a host tool describes its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum HostToolParameters {
    /// A JSON Schema, preserved verbatim through translation.
    Schema(serde_json::Value),
    /// Programmatic validation with no serializable schema.
    Dynamic,
}

impl HostToolParameters {
    /// The schema for wire use; dynamic validators become a permissive
    /// object schema.
    pub fn to_schema(&self) -> serde_json::Value {
        match self {
            Self::Schema(schema) => schema.clone(),
            Self::Dynamic => permissive_object_schema(),
        }
    }
}

/// A tool as visible to the host router.
#[derive(Debug, Clone, PartialEq)]
pub struct HostToolDescriptor {
    /// Host-visible name. MCP-owned registrations always use the
    /// `mcp_` prefix (underscore, never a colon: several providers reject
    /// `:` in tool names).
    pub name: String,
    pub description: Option<String>,
    pub parameters: HostToolParameters,
    pub output_schema: Option<serde_json::Value>,
}

/// Handler bound to a registered tool.
pub type ToolHandler = Arc<
    dyn Fn(ToolArguments, ToolContext) -> BoxFuture<'static, Result<serde_json::Value, McpError>>
        + Send
        + Sync,
>;

/// Wrap an async closure as a [`ToolHandler`].
pub fn tool_handler<F, Fut>(handler: F) -> ToolHandler
where
    F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<serde_json::Value, McpError>> + Send + 'static,
{
    Arc::new(move |args, ctx| Box::pin(handler(args, ctx)))
}

/// The host's process-wide registry of callable tools.
#[async_trait]
pub trait ToolRouter: Send + Sync {
    async fn register(
        &self,
        name: &str,
        descriptor: HostToolDescriptor,
        handler: ToolHandler,
    ) -> Result<(), McpError>;

    async fn unregister(&self, name: &str) -> Result<(), McpError>;

    async fn has_tool(&self, name: &str) -> bool;
}

struct RegisteredTool {
    descriptor: HostToolDescriptor,
    handler: ToolHandler,
}

/// Reference router backed by a map.
#[derive(Default)]
pub struct InMemoryToolRouter {
    tools: tokio::sync::Mutex<HashMap<String, RegisteredTool>>,
}

impl InMemoryToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a registered tool. Used by hosts that route calls directly.
    pub async fn invoke(
        &self,
        name: &str,
        args: ToolArguments,
        ctx: ToolContext,
    ) -> Result<serde_json::Value, McpError> {
        let handler = {
            let tools = self.tools.lock().await;
            let tool = tools
                .get(name)
                .ok_or_else(|| McpError::tool_not_found(name))?;
            Arc::clone(&tool.handler)
        };
        handler(args, ctx).await
    }

    pub async fn descriptor(&self, name: &str) -> Option<HostToolDescriptor> {
        let tools = self.tools.lock().await;
        tools.get(name).map(|tool| tool.descriptor.clone())
    }

    /// Registered names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let tools = self.tools.lock().await;
        let mut names: Vec<String> = tools.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ToolRouter for InMemoryToolRouter {
    async fn register(
        &self,
        name: &str,
        descriptor: HostToolDescriptor,
        handler: ToolHandler,
    ) -> Result<(), McpError> {
        let mut tools = self.tools.lock().await;
        if tools.contains_key(name) {
            return Err(
                McpError::tool_registration_failed(format!("tool {name} already registered"))
                    .with_context("tool", name),
            );
        }
        tools.insert(name.to_string(), RegisteredTool { descriptor, handler });
        Ok(())
    }

    async fn unregister(&self, name: &str) -> Result<(), McpError> {
        let mut tools = self.tools.lock().await;
        tools.remove(name);
        Ok(())
    }

    async fn has_tool(&self, name: &str) -> bool {
        let tools = self.tools.lock().await;
        tools.contains_key(name)
    }
}
