//! Execution Bridge — hand one command to the host and wait, boundedly
//!
//! Always returns an `ExecutionOutcome`; timeouts and host faults become
//! failed outcomes, never errors.

use std::time::Duration;
use tracing::warn;

use super::host::{HostError, HostHandle};
use crate::config::{defaults, CommandExecutionConfig};
use crate::types::ExecutionOutcome;

#[derive(Clone)]
pub struct ExecutionBridge {
    host: HostHandle,
    wait_ceiling: Duration,
    max_command_length: usize,
    placeholder: String,
}

impl ExecutionBridge {
    pub fn new(host: HostHandle, settings: &CommandExecutionConfig) -> Self {
        Self::with_limits(
            host,
            settings.wait_ceiling(),
            settings.max_command_length,
            &settings.player_placeholder,
        )
    }

    pub fn with_limits(
        host: HostHandle,
        wait_ceiling: Duration,
        max_command_length: usize,
        placeholder: &str,
    ) -> Self {
        Self {
            host,
            wait_ceiling,
            max_command_length,
            placeholder: placeholder.to_string(),
        }
    }

    /// Replace every placeholder occurrence with `player_name`.
    pub fn substitute(&self, template: &str, player_name: &str) -> String {
        template.replace(&self.placeholder, player_name)
    }

    /// Run `template` for `player_name` on the host context.
    ///
    /// If the ceiling elapses the scheduled work is left to finish on its own;
    /// its result is discarded.
    pub async fn execute(&self, template: &str, player_name: &str) -> ExecutionOutcome {
        let command = self.substitute(template, player_name);

        if command.trim().is_empty() {
            return ExecutionOutcome::failed(command, "empty command");
        }
        let length = command.chars().count();
        if length > self.max_command_length {
            return ExecutionOutcome::failed(
                command,
                format!("command exceeds {} characters", self.max_command_length),
            );
        }

        let reply = match self.host.schedule(&command) {
            Ok(reply) => reply,
            Err(e) => return ExecutionOutcome::failed(command, e.to_string()),
        };

        match tokio::time::timeout(self.wait_ceiling, reply).await {
            Ok(Ok(Ok(execution))) => ExecutionOutcome {
                success: execution.success,
                executed_command: command,
                output: execution.output,
            },
            Ok(Ok(Err(fault))) => ExecutionOutcome::failed(command, format!("error: {fault}")),
            // Sender dropped without replying: the context shut down mid-queue.
            Ok(Err(_)) => ExecutionOutcome::failed(command, HostError::Closed.to_string()),
            Err(_) => {
                warn!(
                    ceiling_ms = u64::try_from(self.wait_ceiling.as_millis()).unwrap_or(u64::MAX),
                    pending = self.host.pending(),
                    "Host did not finish command in time — reporting timeout"
                );
                ExecutionOutcome::failed(command, defaults::TIMEOUT_OUTPUT)
            }
        }
    }
}
