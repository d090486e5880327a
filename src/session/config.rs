//! Per-session configuration.

use std::collections::HashMap;
use std::time::Duration;

use crate::circuit::CircuitPolicy;
use crate::protocol::ClientInfo;

/// Construction parameters for a [`super::Session`].
///
/// Defaults match the documented config surface; override fields with
/// struct-update syntax:
///
/// ```
/// use razorback::session::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig {
///     max_retries: 5,
///     capability_timeout: Duration::from_secs(2),
///     ..SessionConfig::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Client name advertised during `initialize`.
    pub client_name: String,
    /// Client version advertised during `initialize`.
    pub client_version: String,
    /// Maximum consecutive reconnect attempts without a success.
    pub max_retries: u32,
    /// Base backoff delay; attempt `n` waits `base · 2^(n-1)`.
    pub base_retry_delay: Duration,
    /// Cap on the backoff delay.
    pub max_retry_delay: Duration,
    /// Liveness poll interval. Zero disables health checks entirely.
    pub health_check_interval: Duration,
    /// Deadline for the `initialize` round-trip.
    pub capability_timeout: Duration,
    /// Whether backoff delays get additive uniform jitter.
    pub retry_jitter: bool,
    /// Jitter bound as a fraction of the delay.
    pub jitter_factor: f64,
    /// Consecutive failures that open the endpoint circuit breaker.
    pub circuit_threshold: u32,
    /// Cooldown before an open breaker admits retries again.
    pub circuit_reset: Duration,
    /// Extra headers handed to the connection factory.
    pub headers: HashMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            max_retries: 3,
            base_retry_delay: Duration::from_millis(1000),
            max_retry_delay: Duration::from_millis(30_000),
            health_check_interval: Duration::from_millis(30_000),
            capability_timeout: Duration::from_millis(5000),
            retry_jitter: true,
            jitter_factor: 0.25,
            circuit_threshold: 5,
            circuit_reset: Duration::from_millis(60_000),
            headers: HashMap::new(),
        }
    }
}

impl SessionConfig {
    pub(crate) fn client_info(&self) -> ClientInfo {
        ClientInfo {
            name: self.client_name.clone(),
            version: self.client_version.clone(),
        }
    }

    pub(crate) fn circuit_policy(&self) -> CircuitPolicy {
        CircuitPolicy {
            threshold: self.circuit_threshold,
            reset_after: self.circuit_reset,
        }
    }
}
