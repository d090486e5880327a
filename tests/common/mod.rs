//! Shared test doubles: a scriptable MCP server connection and factory.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use razorback::circuit::CircuitRegistry;
use razorback::connection::{ConnectOptions, Connection, ConnectionFactory};
use razorback::endpoint::Endpoint;
use razorback::error::McpError;
use razorback::session::{Session, SessionConfig, SessionState};

pub fn tools_only_initialize() -> serde_json::Value {
    json!({
        "capabilities": { "tools": { "supported": true } },
        "serverInfo": { "name": "S", "version": "1" },
        "protocolVersion": "2025-06-18",
    })
}

pub fn echo_tool_list() -> serde_json::Value {
    json!({
        "tools": [{
            "name": "echo",
            "description": "e",
            "inputSchema": {
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"],
            },
        }],
    })
}

/// Scriptable in-memory MCP server.
#[derive(Debug)]
pub struct MockServer {
    open: AtomicBool,
    initialize_reply: serde_json::Value,
    tool_list: serde_json::Value,
    call_replies: Mutex<VecDeque<Result<serde_json::Value, McpError>>>,
    notifications: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
    tool_calls: AtomicUsize,
}

impl MockServer {
    pub fn tools_only() -> Arc<Self> {
        Self::with_replies(tools_only_initialize(), echo_tool_list())
    }

    pub fn with_replies(
        initialize_reply: serde_json::Value,
        tool_list: serde_json::Value,
    ) -> Arc<Self> {
        Arc::new(Self {
            open: AtomicBool::new(true),
            initialize_reply,
            tool_list,
            call_replies: Mutex::new(VecDeque::new()),
            notifications: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            tool_calls: AtomicUsize::new(0),
        })
    }

    /// Queue an explicit reply for the next `tools/call`.
    pub fn reply_with(&self, reply: Result<serde_json::Value, McpError>) {
        self.call_replies
            .lock()
            .expect("replies lock")
            .push_back(reply);
    }

    /// Simulate transport loss.
    pub fn drop_link(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().expect("notifications lock").clone()
    }

    pub fn list_call_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn tool_call_count(&self) -> usize {
        self.tool_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockServer {
    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        if !self.is_open() {
            return Err(McpError::connection_lost("mock transport is closed"));
        }
        match method {
            "initialize" => Ok(self.initialize_reply.clone()),
            "tools/list" => {
                self.list_calls.fetch_add(1, Ordering::SeqCst);
                Ok(self.tool_list.clone())
            }
            "tools/call" => {
                self.tool_calls.fetch_add(1, Ordering::SeqCst);
                if let Some(reply) = self.call_replies.lock().expect("replies lock").pop_front() {
                    return reply;
                }
                // Default behavior: echo the message argument back as text.
                let text = params["arguments"]["message"]
                    .as_str()
                    .unwrap_or("ok")
                    .to_string();
                Ok(json!({ "content": [{ "type": "text", "text": text }] }))
            }
            _ => Err(McpError::protocol_error(-32601, "method not found")),
        }
    }

    async fn notify(&self, method: &str, _params: serde_json::Value) -> Result<(), McpError> {
        self.notifications
            .lock()
            .expect("notifications lock")
            .push(method.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<(), McpError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Factory handing out scripted connections in order.
pub struct MockFactory {
    plan: Mutex<VecDeque<Result<Arc<MockServer>, McpError>>>,
    connects: AtomicUsize,
}

impl MockFactory {
    pub fn new(plan: Vec<Result<Arc<MockServer>, McpError>>) -> Arc<Self> {
        Arc::new(Self {
            plan: Mutex::new(plan.into()),
            connects: AtomicUsize::new(0),
        })
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn connect(
        &self,
        _endpoint: &Endpoint,
        _options: ConnectOptions,
    ) -> Result<Arc<dyn Connection>, McpError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.plan.lock().expect("plan lock").pop_front() {
            Some(Ok(server)) => Ok(server),
            Some(Err(error)) => Err(error),
            None => Err(McpError::connection_refused("no scripted connection left")),
        }
    }
}

/// Config tuned for fast tests: short delays, no jitter.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        base_retry_delay: Duration::from_millis(10),
        max_retry_delay: Duration::from_millis(100),
        health_check_interval: Duration::from_millis(20),
        capability_timeout: Duration::from_millis(500),
        retry_jitter: false,
        ..SessionConfig::default()
    }
}

/// Build a session over the given factory with an isolated circuit registry.
pub fn test_session(factory: Arc<MockFactory>, config: SessionConfig) -> Arc<Session> {
    Session::with_parts(
        Endpoint::subprocess("mock-server", Vec::new()),
        config,
        factory,
        Arc::new(CircuitRegistry::new()),
        CancellationToken::new(),
    )
}

/// Wait until the session publishes the given state.
pub async fn wait_for_state(session: &Session, target: SessionState) {
    let mut watch = session.state_watch();
    loop {
        if *watch.borrow_and_update() == target {
            return;
        }
        watch.changed().await.expect("state watch should stay alive");
    }
}
