//! Server descriptor configuration and validation
//!
//! A descriptor is validated once, before any connection attempt; validation
//! failures are fatal configuration errors and never enter the retry loop.

use crate::error::BridgeError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

fn default_true() -> bool {
    true
}

/// Configuration for a single tool server, as stored in a descriptor file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    /// Whether this server participates in discovery
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Transport tag: "stdio", "sse", "streamable_http", "websocket", "multi"
    #[serde(rename = "type", default)]
    pub transport: String,
    /// Sub-server name (required inside a `multi` block)
    #[serde(default)]
    pub name: Option<String>,
    /// Command to execute (stdio)
    #[serde(default)]
    pub command: Option<String>,
    /// Command arguments (stdio)
    #[serde(default)]
    pub args: Option<Vec<String>>,
    /// Environment variables (stdio)
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Endpoint URL (sse / streamable_http / websocket)
    #[serde(default)]
    pub url: Option<String>,
    /// HTTP headers (sse / streamable_http / websocket)
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Sub-server configs (multi)
    #[serde(default)]
    pub servers: Option<Vec<ServerConfig>>,
    /// Retry overrides; unset fields fall back to loader-level defaults
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    #[serde(default)]
    pub retry_delay: Option<f64>,
    #[serde(default)]
    pub retry_max_delay: Option<f64>,
    #[serde(default)]
    pub retry_exponential_base: Option<f64>,
    #[serde(default)]
    pub retry_jitter: Option<bool>,
}

impl ServerConfig {
    /// Parse a descriptor file (JSON, one server per file)
    pub fn from_file(path: &Path) -> Result<Self, BridgeError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            BridgeError::configuration(format!("invalid JSON in {}: {}", path.display(), e))
        })
    }

    /// Effective transport tag; descriptors may omit it, defaulting to stdio
    pub fn transport_tag(&self) -> String {
        if self.transport.is_empty() {
            "stdio".to_string()
        } else {
            self.transport.to_lowercase()
        }
    }

    /// Validate required fields for the declared transport.
    ///
    /// The returned message names the offending field so a caller can fix the
    /// descriptor without reading this code.
    pub fn validate(&self) -> Result<(), BridgeError> {
        match self.transport_tag().as_str() {
            "stdio" => {
                let command = self
                    .command
                    .as_deref()
                    .ok_or_else(|| BridgeError::configuration("stdio config requires 'command' field"))?;
                if command.is_empty() {
                    return Err(BridgeError::configuration("'command' must not be empty"));
                }
                if self.args.is_none() {
                    return Err(BridgeError::configuration("stdio config requires 'args' field"));
                }
            }
            "sse" => {
                let url = self
                    .url
                    .as_deref()
                    .ok_or_else(|| BridgeError::configuration("sse config requires 'url' field"))?;
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(BridgeError::configuration(
                        "'url' must start with http:// or https://",
                    ));
                }
            }
            "streamable_http" | "streamable-http" | "http" => {
                let url = self.url.as_deref().ok_or_else(|| {
                    BridgeError::configuration("streamable_http config requires 'url' field")
                })?;
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(BridgeError::configuration(
                        "'url' must start with http:// or https://",
                    ));
                }
            }
            "websocket" | "ws" | "wss" => {
                let url = self.url.as_deref().ok_or_else(|| {
                    BridgeError::configuration("websocket config requires 'url' field")
                })?;
                if !url.starts_with("ws://") && !url.starts_with("wss://") {
                    return Err(BridgeError::configuration(
                        "'url' must start with ws:// or wss://",
                    ));
                }
            }
            "multi" => {
                let servers = self.servers.as_ref().ok_or_else(|| {
                    BridgeError::configuration("multi config requires 'servers' field")
                })?;
                if servers.is_empty() {
                    return Err(BridgeError::configuration("'servers' list cannot be empty"));
                }

                let mut seen: HashSet<&str> = HashSet::new();
                for (i, sub) in servers.iter().enumerate() {
                    let name = sub.name.as_deref().ok_or_else(|| {
                        BridgeError::configuration(format!("server {} missing 'name' field", i))
                    })?;
                    if !seen.insert(name) {
                        return Err(BridgeError::configuration(format!(
                            "duplicate server name '{}'",
                            name
                        )));
                    }
                    sub.validate().map_err(|e| {
                        let msg = match e {
                            BridgeError::Configuration { message } => message,
                            other => other.to_string(),
                        };
                        BridgeError::configuration(format!("server '{}': {}", name, msg))
                    })?;
                }
            }
            other => {
                return Err(BridgeError::configuration(format!(
                    "unsupported type: '{}'. Supported: stdio, streamable_http, sse, websocket, multi",
                    other
                )));
            }
        }

        Ok(())
    }

    /// Retry policy for this server, overrides layered on `defaults`
    pub fn retry_policy(&self, defaults: &RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.unwrap_or(defaults.max_attempts),
            base_delay: self.retry_delay.unwrap_or(defaults.base_delay),
            max_delay: self.retry_max_delay.unwrap_or(defaults.max_delay),
            exponential_base: self
                .retry_exponential_base
                .unwrap_or(defaults.exponential_base),
            jitter: self.retry_jitter.unwrap_or(defaults.jitter),
        }
    }

    /// Lower a validated config into its transport channel description.
    ///
    /// Callers must run `validate()` first; this only fails on tags
    /// validation would already have rejected.
    pub fn to_transport(&self) -> Result<TransportConfig, BridgeError> {
        match self.transport_tag().as_str() {
            "stdio" => Ok(TransportConfig::Stdio {
                command: self.command.clone().unwrap_or_default(),
                args: self.args.clone().unwrap_or_default(),
                env: self.env.clone(),
            }),
            "sse" => Ok(TransportConfig::Sse {
                url: self.url.clone().unwrap_or_default(),
                headers: self.headers.clone(),
            }),
            "streamable_http" | "streamable-http" | "http" => Ok(TransportConfig::StreamableHttp {
                url: self.url.clone().unwrap_or_default(),
                headers: self.headers.clone(),
            }),
            "websocket" | "ws" | "wss" => Ok(TransportConfig::WebSocket {
                url: self.url.clone().unwrap_or_default(),
                headers: self.headers.clone(),
            }),
            other => Err(BridgeError::configuration(format!(
                "unsupported type: '{}'",
                other
            ))),
        }
    }

    /// Builder-style constructors, mostly for tests and inline configs
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            enabled: true,
            transport: "stdio".to_string(),
            command: Some(command.into()),
            args: Some(args),
            ..Default::default()
        }
    }

    pub fn sse(url: impl Into<String>) -> Self {
        Self {
            enabled: true,
            transport: "sse".to_string(),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn streamable_http(url: impl Into<String>) -> Self {
        Self {
            enabled: true,
            transport: "streamable_http".to_string(),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn websocket(url: impl Into<String>) -> Self {
        Self {
            enabled: true,
            transport: "websocket".to_string(),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn multi(servers: Vec<ServerConfig>) -> Self {
        Self {
            enabled: true,
            transport: "multi".to_string(),
            servers: Some(servers),
            ..Default::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Channel description for a validated single-server config (closed set;
/// the aggregator handles `multi` above this level)
#[derive(Debug, Clone)]
pub enum TransportConfig {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Sse {
        url: String,
        headers: HashMap<String, String>,
    },
    StreamableHttp {
        url: String,
        headers: HashMap<String, String>,
    },
    WebSocket {
        url: String,
        headers: HashMap<String, String>,
    },
}
