//! HTTP transport: one POST per JSON-RPC request.
//!
//! The envelope travels as the request body with
//! `Content-Type: application/json`; protocol-level errors come back as a
//! 200 response whose body carries the JSON-RPC `error` member.
//! Notifications expect an empty or ignorable body.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{ConnectOptions, Connection};
use crate::error::McpError;

/// Connection to a remote MCP server over HTTP POST.
#[derive(Debug)]
pub struct HttpConnection {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    deadline_ms: Option<u64>,
    open: AtomicBool,
    cancel: CancellationToken,
}

impl HttpConnection {
    pub fn new(url: impl Into<String>, options: &ConnectOptions) -> Result<Self, McpError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &options.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                McpError::connection_refused(format!("invalid header name: {key}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                McpError::connection_refused(format!("invalid header value for {key}"))
            })?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder();
        if let Some(deadline) = options.deadline {
            builder = builder.timeout(deadline);
        }
        let client = builder.build().map_err(|error| {
            McpError::connection_refused(format!("failed to build http client: {error}"))
        })?;

        Ok(Self {
            client,
            url: url.into(),
            headers,
            deadline_ms: options.deadline.map(|deadline| deadline.as_millis() as u64),
            open: AtomicBool::new(true),
            cancel: options.cancel.clone(),
        })
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, McpError> {
        let request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(body);

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(McpError::cancelled()),
            response = request.send() => response,
        };

        let response = response.map_err(|error| {
            self.open.store(false, Ordering::SeqCst);
            if error.is_timeout() {
                McpError::connect_timeout(self.deadline_ms.unwrap_or(0))
            } else if error.is_connect() {
                McpError::connection_refused(error.to_string())
            } else {
                McpError::connection_lost(error.to_string())
            }
        })?;

        if !response.status().is_success() {
            self.open.store(false, Ordering::SeqCst);
            return Err(
                McpError::connection_lost(format!("http status {}", response.status()))
                    .with_context("status", response.status().as_u16()),
            );
        }
        Ok(response)
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        if !self.is_open() {
            return Err(McpError::connection_lost("transport is closed"));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let frame = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let response = self.post(&frame).await?;

        let body: serde_json::Value = response.json().await.map_err(|error| {
            McpError::protocol_malformed(format!("undecodable response body: {error}"))
        })?;

        let response_id = body.get("id").and_then(|value| value.as_str());
        if response_id != Some(id.as_str()) {
            return Err(McpError::protocol_malformed("response id mismatch"));
        }
        super::decode_rpc_result(&body)
    }

    async fn notify(&self, method: &str, params: serde_json::Value) -> Result<(), McpError> {
        if !self.is_open() {
            return Err(McpError::connection_lost("transport is closed"));
        }
        let frame = json!({ "jsonrpc": "2.0", "method": method, "params": params });
        self.post(&frame).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), McpError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
