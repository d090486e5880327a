//! Razorback -- MCP tools-only client core for multi-provider AI bridges.
//!
//! Maintains long-lived JSON-RPC 2.0 sessions with external MCP servers,
//! negotiates a tools-only capability surface, discovers and invokes
//! remote tools, supervises connection health with backoff and a
//! per-endpoint circuit breaker, and registers discovered tools into a
//! host [`router::ToolRouter`] under the `mcp_` name prefix.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use razorback::binder::{FailureStrategy, RegistryBinder};
//! use razorback::connection::StdConnectionFactory;
//! use razorback::endpoint::Endpoint;
//! use razorback::router::InMemoryToolRouter;
//! use razorback::session::{Session, SessionConfig};
//!
//! # async fn run() -> Result<(), razorback::error::McpError> {
//! let session = Session::new(
//!     Endpoint::subprocess("mcp-server", vec!["--stdio".into()]),
//!     SessionConfig::default(),
//!     Arc::new(StdConnectionFactory),
//! );
//! session.connect().await?;
//!
//! let router = Arc::new(InMemoryToolRouter::new());
//! let binder = RegistryBinder::new(
//!     Arc::clone(&session),
//!     router,
//!     FailureStrategy::ImmediateUnregister,
//! );
//! binder.register_all().await?;
//! # Ok(())
//! # }
//! ```

pub mod binder;
pub mod capability;
pub mod catalog;
pub mod circuit;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod invoker;
pub mod protocol;
pub mod router;
pub mod session;
pub mod telemetry;
pub mod util;

pub use binder::{FailureStrategy, RegistryBinder};
pub use circuit::{CircuitPolicy, CircuitRegistry, CircuitState};
pub use connection::{ConnectOptions, Connection, ConnectionFactory, StdConnectionFactory};
pub use endpoint::Endpoint;
pub use error::{ErrorKind, McpError};
pub use invoker::InvocationResult;
pub use router::{HostToolDescriptor, InMemoryToolRouter, ToolArguments, ToolContext, ToolRouter};
pub use session::{Session, SessionConfig, SessionState};
