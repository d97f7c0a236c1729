//! Telemetry produced by a `TelemetryCollector`
//!
//! Field names follow the control plane's camelCase schema.

use serde::{Deserialize, Serialize};

/// One online player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    /// Display name
    pub player_id: String,
    /// Account UUID (hyphenated), empty when not yet known
    pub player_uuid: String,
}

impl PlayerInfo {
    pub fn new(player_id: impl Into<String>, player_uuid: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            player_uuid: player_uuid.into(),
        }
    }
}

/// One installed plugin or mod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub enabled: bool,
}

/// Snapshot of the host server pushed on the server-info cadence.
///
/// Optional fields are omitted from the payload when unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub server_code: String,
    pub server_name: String,

    // Network
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ip: Option<String>,
    pub server_port: u16,

    // Game
    pub motd: String,
    pub version: String,
    pub protocol_version: u32,
    pub max_players: u32,
    pub online_players: u32,
    pub tps: f64,

    // Performance
    /// Milliseconds since the host process started
    pub server_uptime: u64,
    /// Megabytes
    pub used_memory: u64,
    /// Megabytes
    pub total_memory: u64,
    pub memory_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub java_version: Option<String>,
    pub os_info: String,

    // World
    pub gamemode: String,
    pub difficulty: String,
    pub pvp_enabled: bool,
    pub whitelist_enabled: bool,
    pub world_name: String,
    /// Bytes
    pub world_size: u64,
    pub chunks_loaded: u32,

    pub plugins: Vec<PluginInfo>,
    pub op_count: u32,
}

impl ServerInfo {
    /// Set used/total memory (MB) and derive the percentage.
    pub fn set_memory(&mut self, used_mb: u64, total_mb: u64) {
        self.used_memory = used_mb;
        self.total_memory = total_mb;
        self.memory_percentage = if total_mb == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let pct = used_mb as f64 / total_mb as f64 * 100.0;
            (pct * 100.0).round() / 100.0
        };
    }
}
