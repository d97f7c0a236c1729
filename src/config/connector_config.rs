//! Connector Configuration - server identity, control-plane and schedule settings
//!
//! Every value the connector used to hardcode is a field here. Each section
//! implements `Default` with the values in `defaults.rs`, so a file holding
//! only `[server] code = "..."` is a complete configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one connected game server.
///
/// Located with `ConnectorConfig::locate()` (`$GAMELINK_CONFIG`, then
/// `./connector.toml`); `load_or_create()` writes a fresh file on first run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Server identity registered with the control plane
    #[serde(default)]
    pub server: ServerIdentity,

    /// Control-plane connection settings
    #[serde(default)]
    pub web_server: WebServerConfig,

    /// Timer cadences
    #[serde(default)]
    pub intervals: IntervalConfig,

    /// Breaker / backoff tuning
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Remote command execution limits
    #[serde(default)]
    pub command_execution: CommandExecutionConfig,

    /// Which telemetry channels are enabled
    #[serde(default)]
    pub data_collection: DataCollectionConfig,

    /// Log verbosity switches
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Wrapped server process (standalone mode only)
    #[serde(default)]
    pub host: HostConfig,
}

impl ConnectorConfig {
    /// Resolve the config path from `$GAMELINK_CONFIG` or the working directory.
    ///
    /// Returns `None` when neither points at an existing file.
    pub fn locate() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                return Some(p);
            }
            warn!(path = %path, "GAMELINK_CONFIG points to non-existent file, falling back");
        }

        let local = PathBuf::from(defaults::CONFIG_FILE_NAME);
        local.exists().then_some(local)
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Toml(err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys only warn; invalid values fail.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in &super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents).map_err(ConfigError::Toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file at `path`, generating a fresh one if it does not exist.
    ///
    /// Returns the config and whether it was newly created.
    pub fn load_or_create(path: &Path, server_name: &str) -> Result<(Self, bool), ConfigError> {
        if path.exists() {
            return Ok((Self::load_from_file(path)?, false));
        }

        let config = Self::generate(server_name);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Io(parent.to_path_buf(), e))?;
        }
        config.save_to_file(path)?;
        info!(code = %config.server.code, "Generated new server code");
        info!("Register this code on the control-plane website to link the server.");
        Ok((config, true))
    }

    /// A default config stamped with a newly generated server code.
    pub fn generate(server_name: &str) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        let mut config = Self::default();
        config.server = ServerIdentity {
            code: generate_server_code(),
            name: server_name.to_string(),
            description: "Auto-generated server".to_string(),
            created_at: now.clone(),
            last_updated: now,
        };
        config
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Connector config saved");
        Ok(())
    }

    /// Validate all values, collecting every problem before failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.server.code.trim().is_empty() {
            errors.push("server.code must not be empty".to_string());
        }

        let url = &self.web_server.base_url;
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            errors.push(format!("web_server.base_url must be an http(s) URL (got '{url}')"));
        }
        if self.web_server.request_timeout_secs == 0 {
            errors.push("web_server.request_timeout_secs must be > 0".to_string());
        }
        if self.web_server.connect_timeout_secs == 0 {
            errors.push("web_server.connect_timeout_secs must be > 0".to_string());
        }

        let iv = &self.intervals;
        for (name, value) in [
            ("intervals.poll_secs", iv.poll_secs),
            ("intervals.roster_secs", iv.roster_secs),
            ("intervals.server_info_secs", iv.server_info_secs),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be > 0"));
            }
        }

        let cb = &self.circuit_breaker;
        if cb.failure_threshold == 0 {
            errors.push("circuit_breaker.failure_threshold must be > 0".to_string());
        }
        if cb.backoff_max_secs < cb.backoff_base_secs {
            errors.push(format!(
                "circuit_breaker.backoff_max_secs ({}) must be >= backoff_base_secs ({})",
                cb.backoff_max_secs, cb.backoff_base_secs
            ));
        }

        let ce = &self.command_execution;
        if ce.wait_ceiling_secs == 0 {
            errors.push("command_execution.wait_ceiling_secs must be > 0".to_string());
        }
        if ce.max_command_length == 0 {
            errors.push("command_execution.max_command_length must be > 0".to_string());
        }
        if ce.player_placeholder.is_empty() {
            errors.push("command_execution.player_placeholder must not be empty".to_string());
        }

        if self.host.program.trim().is_empty() {
            errors.push("host.program must not be empty".to_string());
        }

        for w in super::validation::validate_suspicious_values(self) {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Generate a server code of the form `GB-XXXX-XXXX-XXXX` (uppercase hex).
pub fn generate_server_code() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("GB-{}-{}-{}", &hex[0..4], &hex[4..8], &hex[8..12])
}

// ============================================================================
// Error Type
// ============================================================================

/// Why connector.toml could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading or writing the file failed.
    #[error("cannot access {}: {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    /// The file is not valid TOML, or a value has the wrong type.
    #[error("invalid connector config in {}: {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),
    /// Same as `Parse`, for a document that did not come from a file.
    #[error("invalid connector config: {0}")]
    Toml(#[source] toml::de::Error),
    #[error("cannot encode connector config: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// Parsed, but one or more values are out of range.
    #[error("connector config rejected ({} problem(s)){}", .0.len(), bullet_list(.0))]
    Validation(Vec<String>),
}

fn bullet_list(problems: &[String]) -> String {
    problems.iter().map(|p| format!("\n  - {p}")).collect()
}

// ============================================================================
// Server Identity
// ============================================================================

/// Identity of this server as registered with the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerIdentity {
    /// Shared static identifier (`GB-XXXX-XXXX-XXXX`)
    #[serde(default = "default_server_code")]
    pub code: String,

    /// Display name
    #[serde(default = "default_server_name")]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// RFC 3339 creation time of this file
    #[serde(default)]
    pub created_at: String,

    #[serde(default)]
    pub last_updated: String,
}

fn default_server_code() -> String {
    "GB-UNKNOWN".to_string()
}
fn default_server_name() -> String {
    "Unknown Server".to_string()
}

impl Default for ServerIdentity {
    fn default() -> Self {
        Self {
            code: default_server_code(),
            name: default_server_name(),
            description: String::new(),
            created_at: String::new(),
            last_updated: String::new(),
        }
    }
}

// ============================================================================
// Web Server
// ============================================================================

/// Control-plane connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebServerConfig {
    /// Base URL every endpoint path is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Whole-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// TCP connect timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> String {
    defaults::DEFAULT_BASE_URL.to_string()
}
fn default_request_timeout() -> u64 { defaults::REQUEST_TIMEOUT_SECS }
fn default_connect_timeout() -> u64 { defaults::CONNECT_TIMEOUT_SECS }

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl WebServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ============================================================================
// Intervals
// ============================================================================

/// Background timer cadences (seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalConfig {
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,

    #[serde(default = "default_initial_poll_delay")]
    pub initial_poll_delay_secs: u64,

    #[serde(default = "default_roster_secs")]
    pub roster_secs: u64,

    #[serde(default = "default_server_info_secs")]
    pub server_info_secs: u64,
}

fn default_poll_secs() -> u64 { defaults::POLL_INTERVAL_SECS }
fn default_initial_poll_delay() -> u64 { defaults::INITIAL_POLL_DELAY_SECS }
fn default_roster_secs() -> u64 { defaults::ROSTER_INTERVAL_SECS }
fn default_server_info_secs() -> u64 { defaults::SERVER_INFO_INTERVAL_SECS }

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
            initial_poll_delay_secs: default_initial_poll_delay(),
            roster_secs: default_roster_secs(),
            server_info_secs: default_server_info_secs(),
        }
    }
}

// ============================================================================
// Circuit Breaker
// ============================================================================

/// Breaker thresholds shared by every outbound channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Open-circuit cool-down (seconds).
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

fn default_failure_threshold() -> u32 { defaults::BREAKER_FAILURE_THRESHOLD }
fn default_cooldown_secs() -> u64 { defaults::BREAKER_COOLDOWN_SECS }
fn default_backoff_base_secs() -> u64 { defaults::BREAKER_BACKOFF_BASE_SECS }
fn default_backoff_max_secs() -> u64 { defaults::BREAKER_BACKOFF_MAX_SECS }

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_max_secs: default_backoff_max_secs(),
        }
    }
}

// ============================================================================
// Command Execution
// ============================================================================

/// Limits applied to remotely queued commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandExecutionConfig {
    /// How long the poller waits on the host context (seconds).
    #[serde(default = "default_wait_ceiling_secs")]
    pub wait_ceiling_secs: u64,

    /// Longest command (after substitution) that will be scheduled.
    #[serde(default = "default_max_command_length")]
    pub max_command_length: usize,

    /// Token replaced by the acting player's name.
    #[serde(default = "default_player_placeholder")]
    pub player_placeholder: String,
}

fn default_wait_ceiling_secs() -> u64 { defaults::EXECUTION_WAIT_CEILING_SECS }
fn default_max_command_length() -> usize { defaults::MAX_COMMAND_LENGTH }
fn default_player_placeholder() -> String {
    defaults::PLAYER_PLACEHOLDER.to_string()
}

impl Default for CommandExecutionConfig {
    fn default() -> Self {
        Self {
            wait_ceiling_secs: default_wait_ceiling_secs(),
            max_command_length: default_max_command_length(),
            player_placeholder: default_player_placeholder(),
        }
    }
}

impl CommandExecutionConfig {
    pub fn wait_ceiling(&self) -> Duration {
        Duration::from_secs(self.wait_ceiling_secs)
    }
}

// ============================================================================
// Data Collection
// ============================================================================

/// Telemetry channel switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataCollectionConfig {
    #[serde(default = "default_true")]
    pub collect_server_info: bool,

    #[serde(default = "default_true")]
    pub collect_player_list: bool,

    /// Include memory / uptime figures in server info.
    #[serde(default = "default_true")]
    pub collect_performance: bool,

    /// Include the plugin list in server info.
    #[serde(default = "default_true")]
    pub collect_plugins: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DataCollectionConfig {
    fn default() -> Self {
        Self {
            collect_server_info: true,
            collect_player_list: true,
            collect_performance: true,
            collect_plugins: true,
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log executed command strings (otherwise only queue ids are logged).
    #[serde(default = "default_true")]
    pub log_commands: bool,

    /// Log failed exchanges at `warn` (otherwise `debug`).
    #[serde(default = "default_true")]
    pub log_errors: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_commands: true,
            log_errors: true,
        }
    }
}

// ============================================================================
// Host Process
// ============================================================================

/// The dedicated server process wrapped by `gamelink run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Executable to launch.
    #[serde(default = "default_host_program")]
    pub program: String,

    #[serde(default = "default_host_args")]
    pub args: Vec<String>,

    /// Server directory (holds `server.properties`, worlds, plugins).
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Player slots reported when `server.properties` has none.
    #[serde(default = "default_max_players")]
    pub max_players: u32,

    /// Console command sent on shutdown.
    #[serde(default = "default_stop_command")]
    pub stop_command: String,

    /// Seconds to wait for a clean exit before killing the process.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
}

fn default_host_program() -> String {
    "java".to_string()
}
fn default_host_args() -> Vec<String> {
    vec!["-jar".to_string(), "server.jar".to_string(), "nogui".to_string()]
}
fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_max_players() -> u32 { defaults::DEFAULT_MAX_PLAYERS }
fn default_stop_command() -> String {
    defaults::HOST_STOP_COMMAND.to_string()
}
fn default_stop_timeout() -> u64 { defaults::HOST_STOP_TIMEOUT_SECS }

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            program: default_host_program(),
            args: default_host_args(),
            working_dir: default_working_dir(),
            max_players: default_max_players(),
            stop_command: default_stop_command(),
            stop_timeout_secs: default_stop_timeout(),
        }
    }
}

impl HostConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================
