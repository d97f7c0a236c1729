//! Remote command lifecycle types

use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Command Status
// ============================================================================

/// Wire status of a queued command.
///
/// The control plane creates commands as `queued`; the connector only ever
/// writes `processing`, `completed` or `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl CommandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Queued => "queued",
            CommandStatus::Processing => "processing",
            CommandStatus::Completed => "completed",
            CommandStatus::Failed => "failed",
        }
    }

}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Queued Command
// ============================================================================

/// One entry of the control plane's pending-command list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedCommand {
    #[serde(rename = "id", deserialize_with = "deserialize_queue_id")]
    pub queue_id: u64,

    /// Player the command acts on (substituted into the template).
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub player_name: String,

    /// Command text, possibly containing the player placeholder.
    #[serde(rename = "command_string")]
    pub command_template: String,
}

impl QueuedCommand {
    /// Built-in command that refreshes the roster instead of running on the host.
    pub fn is_refresh_players(&self) -> bool {
        self.command_template.trim() == crate::config::defaults::REFRESH_PLAYERS_COMMAND
    }
}

/// PHP backends frequently emit numeric columns as strings, so accept both.
fn deserialize_queue_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid queue id '{s}'"))),
    }
}

fn deserialize_nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of `GET /pending-commands.php`.
///
/// Entries stay raw until [`entries`](Self::entries) so one bad row cannot
/// reject the whole list.
#[derive(Debug, Clone, Deserialize)]
pub struct PendingCommandsResponse {
    pub status: String,

    #[serde(default)]
    pub pending_commands: Vec<serde_json::Value>,

    #[serde(default)]
    pub message: Option<String>,
}

impl PendingCommandsResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Decode each listed command independently, preserving list order.
    pub fn entries(&self) -> Vec<PendingEntry> {
        self.pending_commands.iter().map(PendingEntry::decode).collect()
    }
}

/// One element of the pending list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingEntry {
    Valid(QueuedCommand),
    /// Undecodable row. `queue_id` is set when its `id` was still readable,
    /// which is enough to report it as failed.
    Malformed {
        queue_id: Option<u64>,
        reason: String,
    },
}

impl PendingEntry {
    fn decode(raw: &serde_json::Value) -> Self {
        match QueuedCommand::deserialize(raw) {
            Ok(command) => Self::Valid(command),
            Err(e) => Self::Malformed {
                queue_id: raw.get("id").and_then(|id| deserialize_queue_id(id).ok()),
                reason: e.to_string(),
            },
        }
    }
}

// ============================================================================
// Execution Outcome
// ============================================================================

/// Result of handing one command to the host. Produced exactly once per
/// observed `QueuedCommand`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    /// Command after placeholder substitution.
    pub executed_command: String,
    pub output: String,
}

impl ExecutionOutcome {
    pub fn succeeded(executed_command: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: true,
            executed_command: executed_command.into(),
            output: output.into(),
        }
    }

    pub fn failed(executed_command: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: false,
            executed_command: executed_command.into(),
            output: output.into(),
        }
    }

    /// Terminal wire status for this outcome.
    pub fn status(&self) -> CommandStatus {
        if self.success {
            CommandStatus::Completed
        } else {
            CommandStatus::Failed
        }
    }
}

/// `execution_result` object attached to terminal status reports.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub player_name: String,
    /// Template as received from the control plane.
    pub command: String,
    pub executed_command: String,
    pub output: String,
    /// RFC 3339 UTC
    pub execution_time: String,
}

impl ExecutionReport {
    pub fn new(command: &QueuedCommand, outcome: &ExecutionOutcome) -> Self {
        Self {
            success: outcome.success,
            player_name: command.player_name.clone(),
            command: command.command_template.clone(),
            executed_command: outcome.executed_command.clone(),
            output: outcome.output.clone(),
            execution_time: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Body of `POST /pending-commands.php`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub queue_id: u64,
    pub status: CommandStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<ExecutionReport>,
}

impl StatusUpdate {
    pub fn processing(queue_id: u64) -> Self {
        Self {
            queue_id,
            status: CommandStatus::Processing,
            execution_result: None,
        }
    }

    pub fn terminal(command: &QueuedCommand, outcome: &ExecutionOutcome) -> Self {
        Self {
            queue_id: command.queue_id,
            status: outcome.status(),
            execution_result: Some(ExecutionReport::new(command, outcome)),
        }
    }

    /// Terminal status with no result body (used for built-in commands).
    pub fn bare(queue_id: u64, status: CommandStatus) -> Self {
        Self {
            queue_id,
            status,
            execution_result: None,
        }
    }
}
