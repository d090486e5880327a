//! Background health checks and reconnection.
//!
//! One supervisor task runs per connected session. It polls connection
//! liveness on the configured interval and, on loss, flips the session to
//! `Reconnecting` and drives the retry cycle. The task is fenced by the
//! session epoch so a close or a newer connect always wins.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Session;
use crate::connection::Connection;
use crate::error::McpError;

pub(super) fn spawn(
    session: Arc<Session>,
    connection: Arc<dyn Connection>,
    cycle: CancellationToken,
    epoch: u64,
) -> JoinHandle<()> {
    tokio::spawn(run(session, connection, cycle, epoch))
}

async fn run(
    session: Arc<Session>,
    connection: Arc<dyn Connection>,
    cycle: CancellationToken,
    epoch: u64,
) {
    let interval = session.config().health_check_interval;

    loop {
        tokio::select! {
            _ = cycle.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        if connection.is_open() {
            continue;
        }

        tracing::warn!(endpoint = %session.endpoint(), "connection liveness lost");
        if !session.begin_reconnect(epoch) {
            return;
        }
        // Abort pending waits on the dead connection.
        let _ = connection.close().await;

        match session.retry_cycle(&cycle).await {
            Ok(established) => {
                if session.commit_connected(epoch, established).is_err() {
                    tracing::debug!(
                        endpoint = %session.endpoint(),
                        "session closed while reconnecting"
                    );
                }
            }
            Err(error) => {
                if matches!(error, McpError::Cancelled { .. }) {
                    tracing::debug!(endpoint = %session.endpoint(), "reconnection cancelled");
                } else {
                    tracing::warn!(
                        endpoint = %session.endpoint(),
                        error = %error,
                        "reconnection gave up"
                    );
                    session.commit_failed(epoch);
                }
            }
        }
        // Either a fresh supervisor now owns the new connection, or the
        // session settled in a terminal state.
        return;
    }
}
