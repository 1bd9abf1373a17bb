//! Dynamic tool loading from a declarative composition document
//!
//! The document is YAML; every string value is `${VAR}` env-interpolated
//! before typed parsing. Loading is partial-success throughout: a single
//! entry's failure is logged and the rest of the document still loads.

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::BridgeError;
use crate::factory::create_connection;
use crate::registry::ToolRegistry;
use crate::retry::RetryPolicy;
use crate::tool::CallableTool;
use futures::future::join_all;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

fn default_true() -> bool {
    true
}

fn default_provider() -> String {
    "auto".to_string()
}

/// One entry under `tools:` in the composition document
#[derive(Debug, Clone, Deserialize)]
pub struct ToolEntry {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// `auto`, `internal`, or `mcp_client`
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Descriptor file stem resolved through the catalog
    #[serde(default)]
    pub mcp_config_file: Option<String>,
    /// Inline server config, used instead of a descriptor file
    #[serde(default)]
    pub mcp_config: Option<ServerConfig>,
}

/// One entry under `multi_servers:`
#[derive(Debug, Clone, Deserialize)]
pub struct SuiteEntry {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub servers: Vec<ServerConfig>,
}

/// Loader-wide retry defaults, applied to config fields not explicitly set
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalMcpSettings {
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    #[serde(default)]
    pub retry_delay: Option<f64>,
    #[serde(default)]
    pub retry_max_delay: Option<f64>,
}

impl GlobalMcpSettings {
    fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.retry_attempts.unwrap_or(defaults.max_attempts),
            base_delay: self.retry_delay.unwrap_or(defaults.base_delay),
            max_delay: self.retry_max_delay.unwrap_or(defaults.max_delay),
            ..defaults
        }
    }
}

/// The parsed composition document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompositionDoc {
    #[serde(default)]
    pub tools: BTreeMap<String, ToolEntry>,
    #[serde(default)]
    pub global_mcp_settings: GlobalMcpSettings,
    #[serde(default)]
    pub multi_servers: BTreeMap<String, SuiteEntry>,
}

impl CompositionDoc {
    /// Parse a YAML document, interpolating `${VAR}` in every string value
    /// first. Unset variables are left as-is.
    pub fn from_yaml(raw: &str) -> Result<Self, BridgeError> {
        let mut value: serde_yaml::Value = serde_yaml::from_str(raw)
            .map_err(|e| BridgeError::configuration(format!("invalid YAML: {}", e)))?;
        interpolate_value(&mut value, &|name| std::env::var(name).ok());
        serde_yaml::from_value(value)
            .map_err(|e| BridgeError::configuration(format!("invalid composition document: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self, BridgeError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&raw)
    }
}

/// Replace `${VAR}` in all string leaves of a YAML tree
fn interpolate_value(value: &mut serde_yaml::Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        serde_yaml::Value::String(s) => {
            *s = interpolate_str(s, lookup);
        }
        serde_yaml::Value::Sequence(seq) => {
            for item in seq {
                interpolate_value(item, lookup);
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                interpolate_value(item, lookup);
            }
        }
        _ => {}
    }
}

fn interpolate_str(input: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    // Pattern is fixed; compile failure is impossible
    let pattern = Regex::new(r"\$\{([^}]+)\}").unwrap();
    pattern
        .replace_all(input, |caps: &regex::Captures| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Aggregate view of what a loader currently holds
#[derive(Debug, Clone)]
pub struct LoadSummary {
    pub total_tools: usize,
    pub tool_names: Vec<String>,
    pub active_connections: usize,
}

/// Loads tools from a composition document and owns the resulting
/// connections until `close_all()`
pub struct ToolLoader {
    registry: Arc<ToolRegistry>,
    connections: Vec<Box<dyn Connection>>,
    tools: Vec<CallableTool>,
}

impl ToolLoader {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            connections: Vec::new(),
            tools: Vec::new(),
        }
    }

    pub async fn load_from_file(&mut self, path: &Path) -> Result<(), BridgeError> {
        let doc = CompositionDoc::from_file(path)?;
        self.load(&doc).await
    }

    /// Load every enabled entry. Per-entry failures are logged and skipped;
    /// only a document-level problem returns an error.
    pub async fn load(&mut self, doc: &CompositionDoc) -> Result<(), BridgeError> {
        self.registry.discover()?;
        let defaults = doc.global_mcp_settings.retry_policy();

        // Resolution is synchronous: internal tools instantiate immediately,
        // external entries queue a (name, config) pair to connect below
        let mut pending: Vec<(String, ServerConfig)> = Vec::new();

        for (name, entry) in &doc.tools {
            if !entry.enabled {
                continue;
            }
            match self.resolve_entry(name, entry) {
                Ok(Resolved::Internal(tool)) => {
                    info!(tool = %name, "loaded internal tool");
                    self.tools.push(tool);
                }
                Ok(Resolved::External(config)) => pending.push((name.clone(), config)),
                Err(e) => warn!(tool = %name, %e, "skipping tool"),
            }
        }

        for (name, suite) in &doc.multi_servers {
            if !suite.enabled {
                continue;
            }
            pending.push((name.clone(), ServerConfig::multi(suite.servers.clone())));
        }

        // Independent servers connect concurrently; each failure is its own
        // log line, never an abort
        let results = join_all(pending.into_iter().map(|(name, config)| {
            let defaults = defaults.clone();
            async move {
                let mut connection = match create_connection(&name, &config, &defaults) {
                    Ok(connection) => connection,
                    Err(e) => {
                        warn!(tool = %name, %e, "invalid server config, skipping");
                        return None;
                    }
                };
                match connection.connect().await {
                    Ok(tools) => Some((connection, tools)),
                    Err(e) => {
                        error!(tool = %name, %e, "tool unavailable");
                        None
                    }
                }
            }
        }))
        .await;

        for (connection, mut tools) in results.into_iter().flatten() {
            info!(server = %connection.name(), tools = tools.len(), "loaded external tools");
            self.tools.append(&mut tools);
            self.connections.push(connection);
        }

        Ok(())
    }

    fn resolve_entry(&self, name: &str, entry: &ToolEntry) -> Result<Resolved, BridgeError> {
        let catalog_entry = self.registry.get(name);

        let use_internal = match entry.provider.as_str() {
            "internal" => true,
            "mcp_client" | "external" => false,
            "auto" => catalog_entry.as_ref().is_some_and(|e| e.has_internal()),
            other => {
                return Err(BridgeError::configuration(format!(
                    "unknown provider '{}'",
                    other
                )));
            }
        };

        if use_internal {
            let factory = catalog_entry
                .and_then(|e| e.internal)
                .ok_or_else(|| BridgeError::tool_not_found(name))?;
            return Ok(Resolved::Internal(factory()));
        }

        if let Some(config) = &entry.mcp_config {
            return Ok(Resolved::External(config.clone()));
        }

        // Named descriptor lookup: explicit stem, falling back to the entry's
        // own logical name
        let stem = entry.mcp_config_file.as_deref().unwrap_or(name);
        self.registry
            .get(stem)
            .and_then(|e| e.external)
            .map(|external| Resolved::External(external.config))
            .ok_or_else(|| BridgeError::tool_not_found(stem))
    }

    pub fn get_tools(&self) -> &[CallableTool] {
        &self.tools
    }

    pub fn summary(&self) -> LoadSummary {
        LoadSummary {
            total_tools: self.tools.len(),
            tool_names: self.tools.iter().map(|t| t.name().to_string()).collect(),
            active_connections: self
                .connections
                .iter()
                .filter(|c| c.is_connected())
                .count(),
        }
    }

    /// Close every connection this loader opened, tolerating individual
    /// failures, and drop the loaded tools
    pub async fn close_all(&mut self) {
        for connection in &mut self.connections {
            if let Err(e) = connection.close().await {
                error!(server = %connection.name(), %e, "error closing connection");
            }
        }
        self.connections.clear();
        self.tools.clear();
    }
}

enum Resolved {
    Internal(CallableTool),
    External(ServerConfig),
}
