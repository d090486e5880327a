//! Subprocess transport: line-delimited UTF-8 JSON over stdin/stdout.
//!
//! The server process is spawned at connect time and terminated on close
//! with SIGTERM, escalating to SIGKILL when it has not exited within the
//! grace period.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use super::{ConnectOptions, Connection};
use crate::error::McpError;

const KILL_GRACE: Duration = Duration::from_secs(5);

type ResponseSender = oneshot::Sender<Result<serde_json::Value, McpError>>;
type PendingMap = Arc<Mutex<HashMap<u64, ResponseSender>>>;

/// Connection to a local MCP server over its stdin/stdout.
#[derive(Debug)]
pub struct StdioConnection {
    stdin: Mutex<ChildStdin>,
    child: std::sync::Mutex<Option<Child>>,
    reader: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    pending: PendingMap,
    next_id: AtomicU64,
    open: Arc<AtomicBool>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl StdioConnection {
    /// Spawn the server process and start routing its stdout.
    pub async fn spawn(
        command: &str,
        args: &[String],
        options: &ConnectOptions,
    ) -> Result<Self, McpError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| {
                McpError::connection_refused(format!("failed to spawn {command}: {error}"))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            McpError::connection_refused("child process has no stdin handle")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            McpError::connection_refused("child process has no stdout handle")
        })?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(stderr = %line, "mcp server stderr");
                }
            });
        }

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let open = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(route_stdout(stdout, Arc::clone(&pending), Arc::clone(&open)));

        Ok(Self {
            stdin: Mutex::new(stdin),
            child: std::sync::Mutex::new(Some(child)),
            reader: std::sync::Mutex::new(Some(reader)),
            pending,
            next_id: AtomicU64::new(0),
            open,
            closed: AtomicBool::new(false),
            cancel: options.cancel.clone(),
        })
    }

    async fn write_frame(&self, frame: &serde_json::Value) -> Result<(), McpError> {
        let mut line = serde_json::to_string(frame)?;
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        if let Err(error) = stdin.write_all(line.as_bytes()).await {
            self.open.store(false, Ordering::SeqCst);
            return Err(McpError::connection_lost(format!(
                "write to child stdin failed: {error}"
            )));
        }
        stdin
            .flush()
            .await
            .map_err(|error| McpError::connection_lost(format!("flush failed: {error}")))
    }
}

#[async_trait]
impl Connection for StdioConnection {
    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        if !self.is_open() {
            return Err(McpError::connection_lost("transport is closed"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        if let Err(error) = self.write_frame(&frame).await {
            self.pending.lock().await.remove(&id);
            return Err(error);
        }

        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.pending.lock().await.remove(&id);
                Err(McpError::cancelled())
            }
            response = rx => match response {
                Ok(result) => result,
                Err(_) => Err(McpError::connection_lost(
                    "connection closed while awaiting response",
                )),
            },
        }
    }

    async fn notify(&self, method: &str, params: serde_json::Value) -> Result<(), McpError> {
        if !self.is_open() {
            return Err(McpError::connection_lost("transport is closed"));
        }
        let frame = json!({ "jsonrpc": "2.0", "method": method, "params": params });
        self.write_frame(&frame).await
    }

    async fn close(&self) -> Result<(), McpError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.open.store(false, Ordering::SeqCst);

        if let Some(reader) = self.reader.lock().expect("reader lock").take() {
            reader.abort();
        }

        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(McpError::connection_lost("connection closed")));
        }
        drop(pending);

        let child = self.child.lock().expect("child lock").take();
        if let Some(child) = child {
            terminate(child).await;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Route stdout lines to pending requests by JSON-RPC id.
async fn route_stdout(
    stdout: tokio::process::ChildStdout,
    pending: PendingMap,
    open: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let frame: serde_json::Value = match serde_json::from_str(line) {
                    Ok(frame) => frame,
                    Err(error) => {
                        tracing::debug!(%error, "discarding undecodable frame from mcp server");
                        continue;
                    }
                };
                let Some(id) = frame.get("id").and_then(|id| id.as_u64()) else {
                    tracing::debug!("ignoring server frame without a numeric id");
                    continue;
                };
                let Some(tx) = pending.lock().await.remove(&id) else {
                    tracing::debug!(id, "no pending request for response id");
                    continue;
                };
                let _ = tx.send(super::decode_rpc_result(&frame));
            }
            Ok(None) | Err(_) => break,
        }
    }

    open.store(false, Ordering::SeqCst);
    let mut pending = pending.lock().await;
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(McpError::connection_lost("connection closed by peer")));
    }
}

/// SIGTERM, then SIGKILL after the grace period.
async fn terminate(mut child: Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}
