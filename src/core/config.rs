//! Configuration parsing and validation.
//!
//! Gracekeeper configuration is loaded from TOML files with CLI overrides.
//! Every field has a default, so an absent file yields a usable local
//! configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level gracekeeper configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Object-store connection settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Node identity settings.
    #[serde(default)]
    pub node: NodeConfig,

    /// Grace-protocol tunables.
    #[serde(default)]
    pub grace: GraceConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Object-store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend: "memory" is the in-process reference store.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Pool holding the grace and recovery objects.
    #[serde(default = "default_pool")]
    pub pool: String,

    /// Optional namespace within the pool.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Name of the shared grace object.
    #[serde(default = "default_object")]
    pub object: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            pool: default_pool(),
            namespace: None,
            object: default_object(),
        }
    }
}

/// Node identity settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's identifier; defaults to the hostname when unset.
    #[serde(default)]
    pub nodeid: Option<String>,
}

impl NodeConfig {
    /// Resolve the effective nodeid, falling back to the hostname.
    pub fn resolve_nodeid(&self) -> Result<String> {
        if let Some(nodeid) = &self.nodeid {
            return Ok(nodeid.clone());
        }
        let name = hostname::get().context("failed to read hostname for nodeid")?;
        name.into_string()
            .map_err(|_| anyhow::anyhow!("hostname is not valid UTF-8; set node.nodeid"))
    }
}

/// Grace-protocol tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraceConfig {
    /// Cap on node-map entries; a scan past this is treated as corruption.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Notify broadcast timeout in milliseconds.
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,

    /// Base pause between version-conflict retries in milliseconds;
    /// 0 disables the pause.
    #[serde(default = "default_conflict_backoff_ms")]
    pub conflict_backoff_ms: u64,
}

impl Default for GraceConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            notify_timeout_ms: default_notify_timeout_ms(),
            conflict_backoff_ms: default_conflict_backoff_ms(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// CLI overrides applied on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Log level override.
    pub log_level: Option<String>,
    /// Nodeid override.
    pub nodeid: Option<String>,
}

// Default value functions

fn default_backend() -> String {
    "memory".to_string()
}

fn default_pool() -> String {
    "nfs-ganesha".to_string()
}

fn default_object() -> String {
    "grace".to_string()
}

fn default_max_entries() -> usize {
    1024
}

fn default_notify_timeout_ms() -> u64 {
    3000
}

fn default_conflict_backoff_ms() -> u64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(log_level) = &overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(nodeid) = &overrides.nodeid {
            self.node.nodeid = Some(nodeid.clone());
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_store()?;
        self.validate_node()?;
        self.validate_grace()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_store(&self) -> Result<()> {
        if self.store.backend != "memory" {
            anyhow::bail!(
                "store.backend must be 'memory' (external backends connect via the ObjectStore trait), got: {}",
                self.store.backend
            );
        }
        if self.store.pool.is_empty() {
            anyhow::bail!("store.pool must not be empty");
        }
        if self.store.object.is_empty() {
            anyhow::bail!("store.object must not be empty");
        }
        Ok(())
    }

    fn validate_node(&self) -> Result<()> {
        if let Some(nodeid) = &self.node.nodeid {
            if nodeid.is_empty() {
                anyhow::bail!("node.nodeid must not be empty when set");
            }
            if nodeid
                .chars()
                .any(|c| c.is_control() || c.is_whitespace())
            {
                anyhow::bail!("node.nodeid must be a printable token, got: {:?}", nodeid);
            }
        }
        Ok(())
    }

    fn validate_grace(&self) -> Result<()> {
        if self.grace.max_entries == 0 {
            anyhow::bail!("grace.max_entries must be > 0");
        }
        if self.grace.notify_timeout_ms == 0 {
            anyhow::bail!("grace.notify_timeout_ms must be > 0");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                LEVELS,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.store.pool, "nfs-ganesha");
        assert_eq!(config.store.object, "grace");
        assert_eq!(config.grace.max_entries, 1024);
        assert_eq!(config.grace.notify_timeout_ms, 3000);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn sections_parse() {
        let config = Config::from_toml(
            r#"
[store]
object = "grace-test"

[node]
nodeid = "node-1"

[grace]
max_entries = 64
"#,
        )
        .unwrap();
        assert_eq!(config.store.object, "grace-test");
        assert_eq!(config.node.resolve_nodeid().unwrap(), "node-1");
        assert_eq!(config.grace.max_entries, 64);
    }

    #[test]
    fn bad_backend_rejected() {
        assert!(Config::from_toml("[store]\nbackend = \"rados\"\n").is_err());
    }

    #[test]
    fn zero_cap_rejected() {
        assert!(Config::from_toml("[grace]\nmax_entries = 0\n").is_err());
    }

    #[test]
    fn nodeid_with_whitespace_rejected() {
        assert!(Config::from_toml("[node]\nnodeid = \"a b\"\n").is_err());
    }

    #[test]
    fn overrides_apply() {
        let mut config = Config::default();
        config.apply_overrides(&ConfigOverrides {
            log_level: Some("debug".to_string()),
            nodeid: Some("n9".to_string()),
        });
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.node.resolve_nodeid().unwrap(), "n9");
    }

    #[test]
    fn hostname_fallback_resolves() {
        let config = Config::default();
        assert!(!config.node.resolve_nodeid().unwrap().is_empty());
    }
}
