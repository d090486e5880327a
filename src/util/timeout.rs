//! Deadline helper.

use std::future::Future;
use std::time::Duration;

use crate::error::McpError;

/// Wrap a future with a deadline, mapping elapse to the supplied error.
pub async fn with_deadline<T>(
    duration: Duration,
    on_timeout: impl FnOnce() -> McpError,
    future: impl Future<Output = Result<T, McpError>>,
) -> Result<T, McpError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_before_the_deadline() {
        let result = with_deadline(
            Duration::from_secs(1),
            || McpError::connect_timeout(1000),
            async { Ok(42) },
        )
        .await;
        assert_eq!(result.expect("future should complete in time"), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn maps_elapse_to_the_supplied_error() {
        let result: Result<(), _> = with_deadline(
            Duration::from_millis(10),
            || McpError::connect_timeout(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        assert!(matches!(
            result.expect_err("deadline should elapse"),
            McpError::ConnectTimeout { timeout_ms: 10, .. }
        ));
    }
}
