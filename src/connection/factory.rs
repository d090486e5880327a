//! Default connection factory dispatching on endpoint kind.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ConnectOptions, Connection, ConnectionFactory, HttpConnection, StdioConnection};
use crate::endpoint::Endpoint;
use crate::error::McpError;

/// Factory producing [`StdioConnection`] for subprocess endpoints and
/// [`HttpConnection`] for http endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdConnectionFactory;

#[async_trait]
impl ConnectionFactory for StdConnectionFactory {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: ConnectOptions,
    ) -> Result<Arc<dyn Connection>, McpError> {
        match endpoint {
            Endpoint::Http { url } => {
                let connection = HttpConnection::new(url.clone(), &options)?;
                Ok(Arc::new(connection))
            }
            Endpoint::Subprocess { command, args } => {
                let connection = StdioConnection::spawn(command, args, &options).await?;
                Ok(Arc::new(connection))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_command_fails_with_connection_refused() {
        let endpoint = Endpoint::subprocess("definitely-not-a-real-binary", Vec::new());
        let err = StdConnectionFactory
            .connect(&endpoint, ConnectOptions::default())
            .await
            .expect_err("spawn of a missing binary should fail");
        assert!(matches!(err, McpError::ConnectionRefused { .. }));
    }

    #[tokio::test]
    async fn http_endpoints_produce_open_connections() {
        let endpoint = Endpoint::http("http://localhost:9/rpc");
        let connection = StdConnectionFactory
            .connect(&endpoint, ConnectOptions::default())
            .await
            .expect("http connections are established lazily");
        assert!(connection.is_open());
    }
}
