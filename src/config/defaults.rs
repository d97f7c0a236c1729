//! System-wide default constants.
//!
//! Centralises the protocol and timing numbers the connector is built around.
//! Grouped by subsystem for easy discovery. Every tunable here has a matching
//! field in `connector.toml`; the constant is the value used when the key is
//! absent.

// ============================================================================
// Control Plane
// ============================================================================

/// Default control-plane base URL (all endpoint paths are relative to this).
pub const DEFAULT_BASE_URL: &str = "https://gameboy.kr/api/plugins/gameboy-connector";

/// `User-Agent` product token sent with every request.
pub const USER_AGENT_PRODUCT: &str = "GameLink";

/// Header carrying the server code on every request.
pub const SERVER_CODE_HEADER: &str = "X-Server-Code";

/// Whole-request timeout for control-plane calls (seconds).
///
/// Kept short on purpose: a hung backend must not stall the poll cadence.
pub const REQUEST_TIMEOUT_SECS: u64 = 5;

/// TCP connect timeout for control-plane calls (seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 3;

// ============================================================================
// Schedules
// ============================================================================

/// Pending-command poll interval (seconds).
pub const POLL_INTERVAL_SECS: u64 = 5;

/// Delay before the first poll after startup (seconds).
pub const INITIAL_POLL_DELAY_SECS: u64 = 5;

/// Player roster push interval (seconds).
pub const ROSTER_INTERVAL_SECS: u64 = 10;

/// Server info push interval (seconds).
pub const SERVER_INFO_INTERVAL_SECS: u64 = 60;

// ============================================================================
// Circuit Breaker
// ============================================================================

/// Consecutive failures that open the circuit.
pub const BREAKER_FAILURE_THRESHOLD: u32 = 3;

/// How long an open circuit suppresses all calls (seconds).
pub const BREAKER_COOLDOWN_SECS: u64 = 30;

/// First backoff step after a single failure (seconds).
///
/// `backoff = min(BASE * 2^(failures - 1), MAX)`
pub const BREAKER_BACKOFF_BASE_SECS: u64 = 5;

/// Upper bound on the exponential backoff (seconds).
pub const BREAKER_BACKOFF_MAX_SECS: u64 = 60;

// ============================================================================
// Command Execution
// ============================================================================

/// How long the poller waits for the host context to run a command (seconds).
pub const EXECUTION_WAIT_CEILING_SECS: u64 = 5;

/// Longest command (after placeholder substitution) that will be scheduled.
pub const MAX_COMMAND_LENGTH: usize = 1000;

/// Token in a command template replaced by the acting player's name.
pub const PLAYER_PLACEHOLDER: &str = "<player>";

/// Command string that refreshes the roster instead of running on the host.
pub const REFRESH_PLAYERS_COMMAND: &str = "REFRESH_PLAYERS";

/// Output recorded when the host context misses the wait ceiling.
pub const TIMEOUT_OUTPUT: &str = "timeout";

// ============================================================================
// Host Wrapper
// ============================================================================

/// Default player slots reported when `server.properties` has none.
pub const DEFAULT_MAX_PLAYERS: u32 = 20;

/// Console command that asks the wrapped server to save and exit.
pub const HOST_STOP_COMMAND: &str = "stop";

/// Grace period after the stop command before the process is killed.
pub const HOST_STOP_TIMEOUT_SECS: u64 = 30;

/// Ticks per second reported when the host does not measure it.
pub const DEFAULT_TPS: f64 = 20.0;

/// Depth of the host work queue before `submit` callers start to see lag
/// warnings. The queue itself is unbounded; this only drives logging.
pub const HOST_QUEUE_WARN_DEPTH: usize = 32;

/// Public-IP echo services, tried in order.
pub const EXTERNAL_IP_SERVICES: &[&str] = &[
    "https://api.ipify.org",
    "https://ipv4.icanhazip.com",
    "https://checkip.amazonaws.com",
    "https://ifconfig.me/ip",
];

/// How long a resolved external IP is reused before asking again (seconds).
pub const EXTERNAL_IP_CACHE_SECS: u64 = 3_600;

// ============================================================================
// Config Files
// ============================================================================

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "GAMELINK_CONFIG";

/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "connector.toml";

/// Server name written into a freshly generated config.
pub const DEFAULT_SERVER_NAME: &str = "Minecraft Server";
