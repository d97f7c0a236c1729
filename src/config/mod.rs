//! Connector Configuration Module
//!
//! Per-server configuration loaded from TOML, replacing every hardcoded
//! endpoint, interval and threshold with an operator-tunable value.
//!
//! ## Loading Order
//!
//! 1. `--config` CLI flag
//! 2. `GAMELINK_CONFIG` environment variable (path to TOML file)
//! 3. `connector.toml` in the current working directory
//! 4. A freshly generated file with a new server code
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! let (cfg, _) = ConnectorConfig::load_or_create(&path, "Lobby")?;
//! config::init(cfg, Some(path));
//!
//! let log_commands = config::get().logging.log_commands;
//! ```
//!
//! `reload()` re-reads the file and swaps the active config atomically.
//! Components that captured values at startup (endpoint, timers, breaker)
//! keep them until restart; `check_non_reloadable()` names those keys.

mod connector_config;
pub mod defaults;
pub mod validation;
pub mod watcher;

pub use connector_config::*;

use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Active connector configuration. Starts as defaults until `init()` runs.
static CONFIG: OnceLock<ArcSwap<ConnectorConfig>> = OnceLock::new();

/// File the active configuration was loaded from (for `reload()`).
static CONFIG_PATH: OnceLock<PathBuf> = OnceLock::new();

fn slot() -> &'static ArcSwap<ConnectorConfig> {
    CONFIG.get_or_init(|| ArcSwap::from_pointee(ConnectorConfig::default()))
}

/// Install the startup configuration and remember where it came from.
///
/// A second call replaces the config but keeps the first path.
pub fn init(config: ConnectorConfig, path: Option<PathBuf>) {
    slot().store(Arc::new(config));
    if let Some(path) = path {
        if CONFIG_PATH.set(path).is_err() {
            tracing::warn!("config::init() called more than once — keeping original config path");
        }
    }
}

/// Current configuration snapshot.
pub fn get() -> Arc<ConnectorConfig> {
    slot().load_full()
}

/// Path the configuration was loaded from, if any.
pub fn path() -> Option<&'static Path> {
    CONFIG_PATH.get().map(PathBuf::as_path)
}

/// A single key whose value differs between two configs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    pub key: String,
    pub old: String,
    pub new: String,
}

impl std::fmt::Display for ConfigChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} -> {}", self.key, self.old, self.new)
    }
}

/// Re-read the config file and swap it in. The old config stays active on error.
pub fn reload() -> Result<Vec<ConfigChange>, ConfigError> {
    let Some(path) = path() else {
        return Ok(Vec::new());
    };

    let fresh = ConnectorConfig::load_from_file(path)?;
    let changes = diff(&get(), &fresh);
    slot().store(Arc::new(fresh));

    for change in &changes {
        tracing::info!(key = %change.key, old = %change.old, new = %change.new, "Config value changed");
    }
    Ok(changes)
}

/// Keys that are read once at startup and need a restart to take effect.
const RESTART_REQUIRED_PREFIXES: &[&str] = &[
    "server.code",
    "web_server.",
    "intervals.",
    "circuit_breaker.",
    "command_execution.",
    "host.",
];

/// Warnings for changes that will not apply until restart.
pub fn check_non_reloadable(changes: &[ConfigChange]) -> Vec<String> {
    changes
        .iter()
        .filter(|c| RESTART_REQUIRED_PREFIXES.iter().any(|p| c.key.starts_with(p)))
        .map(|c| format!("{} changed — restart the connector to apply", c.key))
        .collect()
}

/// Compare two configs leaf by leaf.
pub fn diff(old: &ConnectorConfig, new: &ConnectorConfig) -> Vec<ConfigChange> {
    let before = flatten(old);
    let after = flatten(new);

    after
        .iter()
        .filter_map(|(key, new_value)| {
            let old_value = before.get(key).cloned().unwrap_or_default();
            (old_value != *new_value).then(|| ConfigChange {
                key: key.clone(),
                old: old_value,
                new: new_value.clone(),
            })
        })
        .collect()
}

fn flatten(config: &ConnectorConfig) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Ok(value) = toml::Value::try_from(config) {
        flatten_into(&value, "", &mut out);
    }
    out
}

fn flatten_into(value: &toml::Value, prefix: &str, out: &mut BTreeMap<String, String>) {
    match value.as_table() {
        Some(table) => {
            for (k, v) in table {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten_into(v, &path, out);
            }
        }
        None => {
            out.insert(prefix.to_string(), value.to_string());
        }
    }
}
