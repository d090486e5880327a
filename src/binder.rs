//! Registration of MCP-discovered tools with the host router.
//!
//! The binder owns every `mcp_`-prefixed name it registers and is the
//! sole mutator of that set. A lifecycle task watches session state and
//! applies the configured failure strategy when the connection drops.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::catalog;
use crate::error::McpError;
use crate::invoker;
use crate::router::{ToolHandler, ToolRouter};
use crate::session::{Session, SessionState};

/// What happens to registrations when the session loses its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailureStrategy {
    /// Remove every owned registration on disconnect; re-discover and
    /// re-register after reconnection.
    ImmediateUnregister,
    /// Keep registrations; invocations fail fast while disconnected and
    /// resume implicitly once the session reconnects.
    MarkUnavailable,
}

/// Bridges one session with the host [`ToolRouter`].
pub struct RegistryBinder {
    session: Arc<Session>,
    router: Arc<dyn ToolRouter>,
    strategy: FailureStrategy,
    /// Host name to remote name, for every registration this binder owns.
    owned: tokio::sync::Mutex<HashMap<String, String>>,
    lifecycle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RegistryBinder {
    pub fn new(
        session: Arc<Session>,
        router: Arc<dyn ToolRouter>,
        strategy: FailureStrategy,
    ) -> Arc<Self> {
        let binder = Arc::new(Self {
            session: Arc::clone(&session),
            router,
            strategy,
            owned: tokio::sync::Mutex::new(HashMap::new()),
            lifecycle: std::sync::Mutex::new(None),
        });

        let task = tokio::spawn(lifecycle(Arc::downgrade(&binder), session.state_watch()));
        *binder.lifecycle.lock().expect("lifecycle lock") = Some(task);
        binder
    }

    pub fn strategy(&self) -> FailureStrategy {
        self.strategy
    }

    /// Discover remote tools and register them under `mcp_<name>`.
    ///
    /// Names this binder already owns are skipped. Individual
    /// registration failures are logged and counted; the whole operation
    /// fails only when discovery returned tools, none registered, and at
    /// least one error was recorded.
    pub async fn register_all(&self) -> Result<usize, McpError> {
        let remotes = catalog::list_remote(&self.session).await?;
        let mut owned = self.owned.lock().await;

        let mut registered = 0usize;
        let mut errors = 0usize;
        for remote in &remotes {
            let host = match catalog::to_host_descriptor(remote) {
                Ok(host) => host,
                Err(error) => {
                    tracing::warn!(tool = %remote.name, error = %error, "skipping untranslatable tool");
                    errors += 1;
                    continue;
                }
            };
            let host_name = host.name.clone();
            if owned.contains_key(&host_name) {
                continue;
            }

            let handler = self.bound_handler(remote.name.clone());
            match self.router.register(&host_name, host, handler).await {
                Ok(()) => {
                    owned.insert(host_name, remote.name.clone());
                    registered += 1;
                }
                Err(error) => {
                    tracing::warn!(tool = %host_name, error = %error, "tool registration failed");
                    errors += 1;
                }
            }
        }

        if !remotes.is_empty() && registered == 0 && errors > 0 {
            return Err(McpError::tool_registration_failed(format!(
                "no tool could be registered ({errors} errors)"
            ))
            .with_context("endpoint", self.session.endpoint().to_string())
            .with_context("errors", errors as u64));
        }

        tracing::debug!(
            endpoint = %self.session.endpoint(),
            registered,
            discovered = remotes.len(),
            "tool registration complete"
        );
        Ok(registered)
    }

    /// Drop every owned registration from the router.
    pub async fn unregister_all(&self) {
        let mut owned = self.owned.lock().await;
        for (host_name, _) in owned.drain() {
            if let Err(error) = self.router.unregister(&host_name).await {
                tracing::warn!(tool = %host_name, error = %error, "unregister failed");
            }
        }
    }

    /// Owned host names, sorted.
    pub async fn owned_names(&self) -> Vec<String> {
        let owned = self.owned.lock().await;
        let mut names: Vec<String> = owned.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop the lifecycle watcher. Registrations are left as they are.
    pub fn shutdown(&self) {
        if let Some(task) = self.lifecycle.lock().expect("lifecycle lock").take() {
            task.abort();
        }
    }

    /// Handler closing over the session and the original remote name.
    fn bound_handler(&self, remote_name: String) -> ToolHandler {
        let session = Arc::clone(&self.session);
        let strategy = self.strategy;
        Arc::new(move |args, _ctx| {
            let session = Arc::clone(&session);
            let remote_name = remote_name.clone();
            Box::pin(async move {
                if strategy == FailureStrategy::MarkUnavailable && !session.is_connected() {
                    return Err(McpError::connection_lost(
                        "tool is unavailable while its session is disconnected",
                    )
                    .with_context("strategy", strategy.to_string())
                    .with_context("tool", remote_name));
                }
                let outcome = invoker::invoke(&session, &remote_name, args.raw().clone()).await?;
                Ok(outcome.into_value())
            })
        })
    }

    async fn on_transition(&self, from: SessionState, to: SessionState) {
        match (self.strategy, to) {
            (
                FailureStrategy::ImmediateUnregister,
                SessionState::Reconnecting | SessionState::Disconnected,
            ) => {
                tracing::debug!(
                    endpoint = %self.session.endpoint(),
                    state = %to,
                    "unregistering tools after connection loss"
                );
                self.unregister_all().await;
            }
            (FailureStrategy::ImmediateUnregister, SessionState::Connected)
                if from == SessionState::Reconnecting =>
            {
                if let Err(error) = self.register_all().await {
                    tracing::warn!(
                        endpoint = %self.session.endpoint(),
                        error = %error,
                        "re-registration after reconnect failed"
                    );
                }
            }
            // MarkUnavailable registrations persist; reconnection restores
            // them implicitly while the binder still tracks them.
            _ => {}
        }
    }
}

async fn lifecycle(binder: Weak<RegistryBinder>, mut states: watch::Receiver<SessionState>) {
    let mut previous = *states.borrow();
    while states.changed().await.is_ok() {
        let current = *states.borrow_and_update();
        let Some(binder) = binder.upgrade() else {
            return;
        };
        binder.on_transition(previous, current).await;
        previous = current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use crate::circuit::CircuitRegistry;
    use crate::connection::{ConnectOptions, Connection, ConnectionFactory};
    use crate::endpoint::Endpoint;
    use crate::protocol::PROTOCOL_VERSION;
    use crate::router::{InMemoryToolRouter, ToolArguments, ToolContext};
    use crate::session::SessionConfig;

    #[derive(Debug)]
    struct MockToolServer {
        open: AtomicBool,
        tools: serde_json::Value,
        call_replies: StdMutex<VecDeque<serde_json::Value>>,
    }

    impl MockToolServer {
        fn new(tools: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                open: AtomicBool::new(true),
                tools,
                call_replies: StdMutex::new(VecDeque::new()),
            })
        }

        fn reply_with(&self, reply: serde_json::Value) {
            self.call_replies
                .lock()
                .expect("replies lock")
                .push_back(reply);
        }
    }

    #[async_trait]
    impl Connection for MockToolServer {
        async fn call(
            &self,
            method: &str,
            _params: serde_json::Value,
        ) -> Result<serde_json::Value, McpError> {
            match method {
                "initialize" => Ok(json!({
                    "capabilities": { "tools": { "supported": true } },
                    "serverInfo": { "name": "S", "version": "1" },
                    "protocolVersion": PROTOCOL_VERSION,
                })),
                "tools/list" => Ok(self.tools.clone()),
                "tools/call" => Ok(self
                    .call_replies
                    .lock()
                    .expect("replies lock")
                    .pop_front()
                    .unwrap_or_else(|| json!({
                        "content": [{ "type": "text", "text": "ok" }],
                    }))),
                _ => Err(McpError::protocol_error(-32601, "method not found")),
            }
        }

        async fn notify(&self, _method: &str, _params: serde_json::Value) -> Result<(), McpError> {
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

    struct ServerFactory {
        servers: StdMutex<VecDeque<Arc<MockToolServer>>>,
    }

    #[async_trait]
    impl ConnectionFactory for ServerFactory {
        async fn connect(
            &self,
            _endpoint: &Endpoint,
            _options: ConnectOptions,
        ) -> Result<Arc<dyn Connection>, McpError> {
            match self.servers.lock().expect("servers lock").pop_front() {
                Some(server) => Ok(server),
                None => Err(McpError::connection_refused("no scripted server left")),
            }
        }
    }

    fn echo_tools() -> serde_json::Value {
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

    async fn connected_session(servers: Vec<Arc<MockToolServer>>) -> Arc<Session> {
        let factory = Arc::new(ServerFactory {
            servers: StdMutex::new(servers.into()),
        });
        let session = Session::with_parts(
            Endpoint::subprocess("mock-server", Vec::new()),
            SessionConfig {
                base_retry_delay: Duration::from_millis(10),
                health_check_interval: Duration::from_millis(20),
                retry_jitter: false,
                ..SessionConfig::default()
            },
            factory,
            Arc::new(CircuitRegistry::new()),
            CancellationToken::new(),
        );
        session.connect().await.expect("session should connect");
        session
    }

    #[tokio::test]
    async fn register_all_exposes_prefixed_tools() {
        let session = connected_session(vec![MockToolServer::new(echo_tools())]).await;
        let router = Arc::new(InMemoryToolRouter::new());
        let binder = RegistryBinder::new(
            Arc::clone(&session),
            Arc::clone(&router) as Arc<dyn ToolRouter>,
            FailureStrategy::ImmediateUnregister,
        );

        let registered = binder.register_all().await.expect("registration should succeed");
        assert_eq!(registered, 1);
        assert_eq!(router.names().await, vec!["mcp_echo".to_string()]);
        assert_eq!(binder.owned_names().await, vec!["mcp_echo".to_string()]);

        binder.shutdown();
        session.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn register_all_skips_names_it_already_owns() {
        let session = connected_session(vec![MockToolServer::new(echo_tools())]).await;
        let router = Arc::new(InMemoryToolRouter::new());
        let binder = RegistryBinder::new(
            Arc::clone(&session),
            Arc::clone(&router) as Arc<dyn ToolRouter>,
            FailureStrategy::ImmediateUnregister,
        );

        binder.register_all().await.expect("first registration should succeed");
        let second = binder
            .register_all()
            .await
            .expect("second registration should succeed");
        assert_eq!(second, 0);
        assert_eq!(router.names().await.len(), 1);

        binder.shutdown();
        session.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn empty_discovery_registers_nothing_without_error() {
        let session =
            connected_session(vec![MockToolServer::new(json!({ "tools": [] }))]).await;
        let router = Arc::new(InMemoryToolRouter::new());
        let binder = RegistryBinder::new(
            Arc::clone(&session),
            Arc::clone(&router) as Arc<dyn ToolRouter>,
            FailureStrategy::ImmediateUnregister,
        );

        let registered = binder
            .register_all()
            .await
            .expect("empty discovery should not fail");
        assert_eq!(registered, 0);
        assert!(router.names().await.is_empty());

        binder.shutdown();
        session.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn zero_successes_with_errors_fail_the_registration() {
        let server = MockToolServer::new(json!({
            "tools": [{ "name": "bad name" }, { "name": "ns:tool" }],
        }));
        let session = connected_session(vec![server]).await;
        let router = Arc::new(InMemoryToolRouter::new());
        let binder = RegistryBinder::new(
            Arc::clone(&session),
            Arc::clone(&router) as Arc<dyn ToolRouter>,
            FailureStrategy::ImmediateUnregister,
        );

        let err = binder
            .register_all()
            .await
            .expect_err("all-invalid discovery should fail");
        assert!(matches!(err, McpError::ToolRegistrationFailed { .. }));
        assert!(router.names().await.is_empty());

        binder.shutdown();
        session.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn partial_success_is_not_a_failure() {
        let server = MockToolServer::new(json!({
            "tools": [{ "name": "echo" }, { "name": "bad name" }],
        }));
        let session = connected_session(vec![server]).await;
        let router = Arc::new(InMemoryToolRouter::new());
        let binder = RegistryBinder::new(
            Arc::clone(&session),
            Arc::clone(&router) as Arc<dyn ToolRouter>,
            FailureStrategy::ImmediateUnregister,
        );

        let registered = binder
            .register_all()
            .await
            .expect("partial success should pass");
        assert_eq!(registered, 1);
        assert_eq!(router.names().await, vec!["mcp_echo".to_string()]);

        binder.shutdown();
        session.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn bound_handler_invokes_the_remote_tool() {
        let server = MockToolServer::new(echo_tools());
        server.reply_with(json!({ "content": [{ "type": "text", "text": "hi" }] }));
        let session = connected_session(vec![server]).await;
        let router = Arc::new(InMemoryToolRouter::new());
        let binder = RegistryBinder::new(
            Arc::clone(&session),
            Arc::clone(&router) as Arc<dyn ToolRouter>,
            FailureStrategy::ImmediateUnregister,
        );
        binder.register_all().await.expect("registration should succeed");

        let result = router
            .invoke(
                "mcp_echo",
                ToolArguments::new(json!({ "message": "hi" })),
                ToolContext::default(),
            )
            .await
            .expect("bound handler should reach the remote tool");
        assert_eq!(result, json!({ "success": true, "result": "hi" }));

        binder.shutdown();
        session.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn unregister_all_restores_the_router() {
        let session = connected_session(vec![MockToolServer::new(echo_tools())]).await;
        let router = Arc::new(InMemoryToolRouter::new());
        let binder = RegistryBinder::new(
            Arc::clone(&session),
            Arc::clone(&router) as Arc<dyn ToolRouter>,
            FailureStrategy::ImmediateUnregister,
        );

        binder.register_all().await.expect("registration should succeed");
        binder.unregister_all().await;

        assert!(router.names().await.is_empty());
        assert!(binder.owned_names().await.is_empty());

        binder.shutdown();
        session.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn mark_unavailable_fails_fast_while_disconnected() {
        let server = MockToolServer::new(echo_tools());
        let session = connected_session(vec![Arc::clone(&server)]).await;
        let router = Arc::new(InMemoryToolRouter::new());
        let binder = RegistryBinder::new(
            Arc::clone(&session),
            Arc::clone(&router) as Arc<dyn ToolRouter>,
            FailureStrategy::MarkUnavailable,
        );
        binder.register_all().await.expect("registration should succeed");

        session.close().await.expect("close should succeed");
        // Registration persists across the disconnect.
        assert!(router.has_tool("mcp_echo").await);

        let err = router
            .invoke(
                "mcp_echo",
                ToolArguments::new(json!({ "message": "hi" })),
                ToolContext::default(),
            )
            .await
            .expect_err("invocation should fail fast while disconnected");
        assert!(matches!(err, McpError::ConnectionLost { .. }));
        assert_eq!(
            err.context().get("strategy"),
            Some(&json!("mark_unavailable"))
        );

        binder.shutdown();
    }
}
