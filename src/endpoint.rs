//! Addressable locations of MCP servers.

use serde::{Deserialize, Serialize};

/// Where one MCP server lives: a remote HTTP endpoint or a local
/// subprocess command line. Immutable; also the circuit-breaker key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    Http { url: String },
    Subprocess { command: String, args: Vec<String> },
}

impl Endpoint {
    pub fn http(url: impl Into<String>) -> Self {
        Self::Http { url: url.into() }
    }

    pub fn subprocess(command: impl Into<String>, args: Vec<String>) -> Self {
        Self::Subprocess {
            command: command.into(),
            args,
        }
    }

    pub fn is_subprocess(&self) -> bool {
        matches!(self, Self::Subprocess { .. })
    }

    /// Key under which circuit-breaker state is shared across sessions.
    ///
    /// For http endpoints the key is scheme + host + port so that paths and
    /// query strings do not split breaker state; for subprocess endpoints it
    /// is the full command line.
    pub fn circuit_key(&self) -> String {
        match self {
            Self::Http { url } => match reqwest::Url::parse(url) {
                Ok(parsed) => {
                    let host = parsed.host_str().unwrap_or_default();
                    match parsed.port_or_known_default() {
                        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
                        None => format!("{}://{host}", parsed.scheme()),
                    }
                }
                Err(_) => url.clone(),
            },
            Self::Subprocess { command, args } => {
                if args.is_empty() {
                    command.clone()
                } else {
                    format!("{command} {}", args.join(" "))
                }
            }
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http { .. } => write!(f, "{}", self.circuit_key()),
            Self::Subprocess { command, .. } => write!(f, "subprocess:{command}"),
        }
    }
}
