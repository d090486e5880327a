//! One stateful RPC relationship with one MCP server.
//!
//! A session owns its connection, the state machine spanning connect,
//! negotiate, connected, reconnect, and failed, and the background
//! supervisor that drives health checks and reconnection.

mod config;
mod supervisor;

pub use config::SessionConfig;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capability::{self, NegotiatedServer};
use crate::circuit::CircuitRegistry;
use crate::connection::{ConnectOptions, Connection, ConnectionFactory};
use crate::endpoint::Endpoint;
use crate::error::McpError;
use crate::protocol::{ServerInfo, METHOD_INITIALIZE, NOTIFICATION_INITIALIZED};
use crate::util::{apply_jitter, backoff_delay, with_deadline};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// A successfully negotiated connection, ready to commit.
struct Established {
    connection: Arc<dyn Connection>,
    server: NegotiatedServer,
}

struct SessionInner {
    connection: Option<Arc<dyn Connection>>,
    server: Option<NegotiatedServer>,
    supervisor: Option<JoinHandle<()>>,
    cycle_cancel: Option<CancellationToken>,
    /// Bumped on every close and every fresh connect cycle; fences stale
    /// supervisors and connect attempts out of committing.
    epoch: u64,
}

/// Single-server JSON-RPC gateway with reconnect supervision.
pub struct Session {
    endpoint: Endpoint,
    config: SessionConfig,
    factory: Arc<dyn ConnectionFactory>,
    circuits: Arc<CircuitRegistry>,
    cancel: CancellationToken,
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
    inner: std::sync::Mutex<SessionInner>,
    /// Handle back to the owning `Arc`, for spawning the supervisor.
    self_ref: std::sync::Weak<Session>,
}

impl Session {
    /// Create a session using the process-wide circuit registry.
    pub fn new(
        endpoint: Endpoint,
        config: SessionConfig,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Arc<Self> {
        Self::with_parts(
            endpoint,
            config,
            factory,
            CircuitRegistry::global(),
            CancellationToken::new(),
        )
    }

    /// Create a session with an explicit circuit registry and external
    /// cancellation signal.
    pub fn with_parts(
        endpoint: Endpoint,
        config: SessionConfig,
        factory: Arc<dyn ConnectionFactory>,
        circuits: Arc<CircuitRegistry>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        Arc::new_cyclic(|self_ref| Self {
            endpoint,
            config,
            factory,
            circuits,
            cancel,
            state_tx,
            state_rx,
            inner: std::sync::Mutex::new(SessionInner {
                connection: None,
                server: None,
                supervisor: None,
                cycle_cancel: None,
                epoch: 0,
            }),
            self_ref: self_ref.clone(),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current state snapshot.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state transitions.
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// `true` iff the session is `Connected` and the connection is open.
    pub fn is_connected(&self) -> bool {
        if self.state() != SessionState::Connected {
            return false;
        }
        let inner = self.inner.lock().expect("session lock");
        inner
            .connection
            .as_ref()
            .map(|connection| connection.is_open())
            .unwrap_or(false)
    }

    /// Identity of the negotiated server, when connected.
    pub fn server_info(&self) -> Option<ServerInfo> {
        let inner = self.inner.lock().expect("session lock");
        inner.server.as_ref().map(|server| server.server_info.clone())
    }

    /// Server-provided instructions, when present.
    pub fn instructions(&self) -> Option<String> {
        let inner = self.inner.lock().expect("session lock");
        inner.server.as_ref().and_then(|server| server.instructions.clone())
    }

    /// Connect and negotiate.
    ///
    /// A no-op while already `Connected`. When another task is mid-connect,
    /// waits for that attempt to settle instead of racing it. On transport
    /// failures, retries with backoff up to `max_retries` before entering
    /// `Failed`; capability rejections are terminal immediately.
    pub async fn connect(&self) -> Result<(), McpError> {
        let started = {
            let mut inner = self.inner.lock().expect("session lock");
            match self.state() {
                SessionState::Connected => return Ok(()),
                SessionState::Connecting | SessionState::Reconnecting => None,
                SessionState::Disconnected | SessionState::Failed => {
                    inner.epoch += 1;
                    if let Some(stale) = inner.cycle_cancel.take() {
                        stale.cancel();
                    }
                    if let Some(stale) = inner.supervisor.take() {
                        stale.abort();
                    }
                    let cycle = self.cancel.child_token();
                    inner.cycle_cancel = Some(cycle.clone());
                    self.set_state(SessionState::Connecting);
                    Some((cycle, inner.epoch))
                }
            }
        };

        match started {
            None => self.await_settled().await,
            Some((cycle, epoch)) => self.drive_initial_connect(cycle, epoch).await,
        }
    }

    /// Forward a JSON-RPC request to the live connection.
    ///
    /// Fails fast with `NotConnected` unless the session is `Connected`.
    /// Transport errors surface to the caller; the supervisor reacts to
    /// the liveness change independently.
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let connection = {
            let inner = self.inner.lock().expect("session lock");
            if self.state() != SessionState::Connected {
                return Err(self.not_connected_error());
            }
            match &inner.connection {
                Some(connection) => Arc::clone(connection),
                None => return Err(self.not_connected_error()),
            }
        };
        connection.call(method, params).await
    }

    /// Cancel pending work, stop the supervisor, release the connection,
    /// and transition to `Disconnected`. Safe to call multiple times.
    pub async fn close(&self) -> Result<(), McpError> {
        let (connection, supervisor, cycle) = {
            let mut inner = self.inner.lock().expect("session lock");
            inner.epoch += 1;
            let parts = (
                inner.connection.take(),
                inner.supervisor.take(),
                inner.cycle_cancel.take(),
            );
            inner.server = None;
            self.set_state(SessionState::Disconnected);
            parts
        };

        if let Some(cycle) = cycle {
            cycle.cancel();
        }
        if let Some(supervisor) = supervisor {
            supervisor.abort();
        }
        if let Some(connection) = connection {
            let _ = connection.close().await;
        }
        Ok(())
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(endpoint = %self.endpoint, from = %previous, to = %state, "session state change");
        }
    }

    fn not_connected_error(&self) -> McpError {
        McpError::not_connected()
            .with_context("endpoint", self.endpoint.to_string())
            .with_context("state", self.state().to_string())
    }

    /// Wait for a connect driven by another task to settle.
    async fn await_settled(&self) -> Result<(), McpError> {
        let mut rx = self.state_tx.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                SessionState::Connected => return Ok(()),
                SessionState::Disconnected | SessionState::Failed => {
                    return Err(self.not_connected_error());
                }
                SessionState::Connecting | SessionState::Reconnecting => {
                    if rx.changed().await.is_err() {
                        return Err(self.not_connected_error());
                    }
                }
            }
        }
    }

    async fn drive_initial_connect(
        &self,
        cycle: CancellationToken,
        epoch: u64,
    ) -> Result<(), McpError> {
        match self.attempt(&cycle).await {
            Ok(established) => return self.commit_connected(epoch, established),
            Err(error) => {
                if matches!(error, McpError::Cancelled { .. }) {
                    self.commit_cancelled(epoch);
                    return Err(error);
                }
                self.note_attempt_failure(&error);
                if !error.recoverable() || self.config.max_retries == 0 {
                    self.commit_failed(epoch);
                    return Err(error);
                }
                tracing::warn!(endpoint = %self.endpoint, error = %error, "initial connect failed");
            }
        }

        match self.retry_cycle(&cycle).await {
            Ok(established) => self.commit_connected(epoch, established),
            Err(error) => {
                if matches!(error, McpError::Cancelled { .. }) {
                    self.commit_cancelled(epoch);
                } else {
                    self.commit_failed(epoch);
                }
                Err(error)
            }
        }
    }

    /// One factory + negotiate attempt. The caller owns state transitions.
    async fn attempt(&self, cycle: &CancellationToken) -> Result<Established, McpError> {
        let options = ConnectOptions {
            deadline: Some(self.config.capability_timeout),
            cancel: cycle.clone(),
            headers: self.config.headers.clone(),
        };

        let connection = tokio::select! {
            _ = cycle.cancelled() => return Err(McpError::cancelled()),
            connection = self.factory.connect(&self.endpoint, options) => connection?,
        };

        let params = serde_json::to_value(capability::initialize_params(self.config.client_info()))?;
        let timeout_ms = self.config.capability_timeout.as_millis() as u64;
        let reply = with_deadline(
            self.config.capability_timeout,
            || {
                McpError::connect_timeout(timeout_ms)
                    .with_context("endpoint", self.endpoint.to_string())
                    .with_context("phase", "initialize")
            },
            connection.call(METHOD_INITIALIZE, params),
        )
        .await;

        let reply = match reply {
            Ok(reply) => reply,
            Err(error) => {
                let _ = connection.close().await;
                return Err(error);
            }
        };

        let server = match capability::validate_initialize_result(&reply) {
            Ok(server) => server,
            Err(error) => {
                let _ = connection.close().await;
                return Err(error.with_context("endpoint", self.endpoint.to_string()));
            }
        };

        if let Err(error) = connection
            .notify(NOTIFICATION_INITIALIZED, serde_json::json!({}))
            .await
        {
            let _ = connection.close().await;
            return Err(error);
        }

        Ok(Established { connection, server })
    }

    /// Backoff-gated retry attempts, shared by initial connect and the
    /// supervisor's reconnection path.
    async fn retry_cycle(&self, cycle: &CancellationToken) -> Result<Established, McpError> {
        let policy = self.config.circuit_policy();
        let key = self.endpoint.circuit_key();

        for attempt in 1..=self.config.max_retries {
            if !self.circuits.should_retry(&key, &policy) {
                return Err(McpError::connection_refused("circuit breaker is open")
                    .with_context("endpoint", self.endpoint.to_string())
                    .with_context("breaker_open", true));
            }

            let mut delay = backoff_delay(
                attempt,
                self.config.base_retry_delay,
                self.config.max_retry_delay,
            );
            if self.config.retry_jitter {
                delay = apply_jitter(delay, self.config.jitter_factor);
            }
            tracing::debug!(
                endpoint = %self.endpoint,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "waiting before connect attempt"
            );
            tokio::select! {
                _ = cycle.cancelled() => return Err(McpError::cancelled()),
                _ = tokio::time::sleep(delay) => {}
            }

            match self.attempt(cycle).await {
                Ok(established) => return Ok(established),
                Err(error) => {
                    if matches!(error, McpError::Cancelled { .. }) {
                        return Err(error);
                    }
                    self.note_attempt_failure(&error);
                    if !error.recoverable() {
                        return Err(error);
                    }
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        max_retries = self.config.max_retries,
                        error = %error,
                        "connect attempt failed"
                    );
                }
            }
        }

        Err(McpError::reconnect_exhausted(self.config.max_retries)
            .with_context("endpoint", self.endpoint.to_string()))
    }

    fn note_attempt_failure(&self, error: &McpError) {
        if error.bumps_circuit() {
            self.circuits
                .record_failure(&self.endpoint.circuit_key(), &self.config.circuit_policy());
        }
    }

    /// Commit an established connection, start the supervisor, and reset
    /// the endpoint circuit. Fenced by epoch: a close that happened while
    /// connecting wins, and the fresh connection is discarded.
    fn commit_connected(&self, epoch: u64, established: Established) -> Result<(), McpError> {
        let mut inner = self.inner.lock().expect("session lock");
        if inner.epoch != epoch {
            drop(inner);
            let connection = established.connection;
            tokio::spawn(async move {
                let _ = connection.close().await;
            });
            return Err(McpError::cancelled().with_context("reason", "session closed while connecting"));
        }

        self.circuits.record_success(&self.endpoint.circuit_key());
        inner.connection = Some(Arc::clone(&established.connection));
        inner.server = Some(established.server);
        self.set_state(SessionState::Connected);

        if self.config.health_check_interval > std::time::Duration::ZERO {
            if let (Some(cycle), Some(session)) =
                (inner.cycle_cancel.as_ref(), self.self_ref.upgrade())
            {
                inner.supervisor = Some(supervisor::spawn(
                    session,
                    established.connection,
                    cycle.clone(),
                    epoch,
                ));
            }
        }
        Ok(())
    }

    fn commit_failed(&self, epoch: u64) {
        let mut inner = self.inner.lock().expect("session lock");
        if inner.epoch != epoch {
            return;
        }
        inner.connection = None;
        inner.server = None;
        inner.supervisor = None;
        self.set_state(SessionState::Failed);
    }

    fn commit_cancelled(&self, epoch: u64) {
        let mut inner = self.inner.lock().expect("session lock");
        if inner.epoch != epoch {
            return;
        }
        inner.connection = None;
        inner.server = None;
        self.set_state(SessionState::Disconnected);
    }

    /// Flip `Connected` to `Reconnecting` atomically. Returns false when a
    /// close or a newer connect already moved the machine on.
    fn begin_reconnect(&self, epoch: u64) -> bool {
        let mut inner = self.inner.lock().expect("session lock");
        if inner.epoch != epoch || self.state() != SessionState::Connected {
            return false;
        }
        inner.connection = None;
        inner.server = None;
        self.set_state(SessionState::Reconnecting);
        true
    }
}
