//! Tool catalog: internal registrations plus external descriptor discovery
//!
//! The catalog maps logical tool names to their available providers.
//! Internal providers are registered in-process; external providers are
//! discovered by scanning a descriptor directory for `*.json` files, keyed by
//! file stem. Discovery is lazy and idempotent; `reload()` forces a rescan.

use crate::config::ServerConfig;
use crate::error::BridgeError;
use crate::tool::CallableTool;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Constructor for an in-process tool implementation
pub type InternalToolFactory = Arc<dyn Fn() -> CallableTool + Send + Sync>;

/// Reference to an external server descriptor
#[derive(Debug, Clone)]
pub struct ExternalRef {
    pub path: PathBuf,
    pub config: ServerConfig,
}

/// One logical tool name and the providers that can supply it
#[derive(Clone)]
pub struct CatalogEntry {
    pub name: String,
    pub internal: Option<InternalToolFactory>,
    pub external: Option<ExternalRef>,
}

impl CatalogEntry {
    pub fn has_internal(&self) -> bool {
        self.internal.is_some()
    }

    pub fn has_external(&self) -> bool {
        self.external.is_some()
    }

    /// Provider tags present for this entry
    pub fn providers(&self) -> Vec<&'static str> {
        let mut tags = Vec::new();
        if self.has_internal() {
            tags.push("internal");
        }
        if self.has_external() {
            tags.push("external");
        }
        tags
    }
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("name", &self.name)
            .field("providers", &self.providers())
            .finish()
    }
}

/// The tool catalog.
///
/// Shared state sits behind a `parking_lot::RwLock`; reads dominate once
/// discovery has run.
pub struct ToolRegistry {
    descriptor_dir: Option<PathBuf>,
    catalog: RwLock<HashMap<String, CatalogEntry>>,
    discovered: RwLock<bool>,
}

impl ToolRegistry {
    /// Registry with no external descriptor directory (internal tools only)
    pub fn new() -> Self {
        Self {
            descriptor_dir: None,
            catalog: RwLock::new(HashMap::new()),
            discovered: RwLock::new(false),
        }
    }

    /// Registry that discovers external servers from `dir`
    pub fn with_descriptor_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            descriptor_dir: Some(dir.into()),
            ..Self::new()
        }
    }

    /// Register an in-process tool implementation under a logical name
    pub fn register_internal(&self, name: impl Into<String>, factory: InternalToolFactory) {
        let name = name.into();
        let mut catalog = self.catalog.write();
        catalog
            .entry(name.clone())
            .or_insert_with(|| CatalogEntry {
                name,
                internal: None,
                external: None,
            })
            .internal = Some(factory);
    }

    /// Scan the descriptor directory, once. Subsequent calls are no-ops
    /// until `reload()`.
    pub fn discover(&self) -> Result<(), BridgeError> {
        {
            let discovered = self.discovered.read();
            if *discovered {
                return Ok(());
            }
        }

        let mut discovered = self.discovered.write();
        if *discovered {
            return Ok(());
        }
        self.scan_descriptors()?;
        *discovered = true;
        Ok(())
    }

    /// Drop all external entries and rescan the descriptor directory.
    /// Internal registrations are untouched.
    pub fn reload(&self) -> Result<(), BridgeError> {
        let mut discovered = self.discovered.write();
        {
            let mut catalog = self.catalog.write();
            catalog.retain(|_, entry| {
                entry.external = None;
                entry.has_internal()
            });
        }
        self.scan_descriptors()?;
        *discovered = true;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<CatalogEntry> {
        self.catalog.read().get(name).cloned()
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        let mut entries: Vec<_> = self.catalog.read().values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn len(&self) -> usize {
        self.catalog.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.read().is_empty()
    }

    fn scan_descriptors(&self) -> Result<(), BridgeError> {
        let Some(dir) = &self.descriptor_dir else {
            return Ok(());
        };

        if !dir.is_dir() {
            debug!(dir = %dir.display(), "descriptor directory absent, skipping scan");
            return Ok(());
        }

        let entries = std::fs::read_dir(dir).map_err(|e| {
            BridgeError::configuration(format!("cannot read {}: {}", dir.display(), e))
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            self.ingest_descriptor(&path);
        }

        Ok(())
    }

    /// A single malformed descriptor is logged and skipped, never fatal to
    /// the scan
    fn ingest_descriptor(&self, path: &Path) {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return;
        };

        let config = match ServerConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), %e, "skipping malformed descriptor");
                return;
            }
        };

        if !config.enabled {
            debug!(name = stem, "descriptor disabled, skipping");
            return;
        }

        let mut catalog = self.catalog.write();
        catalog
            .entry(stem.to_string())
            .or_insert_with(|| CatalogEntry {
                name: stem.to_string(),
                internal: None,
                external: None,
            })
            .external = Some(ExternalRef {
            path: path.to_path_buf(),
            config,
        });
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
