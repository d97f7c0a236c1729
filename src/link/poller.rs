//! Command Poller — fetch queued commands, run them, acknowledge them
//!
//! One tick:
//!
//! ```text
//! gate ─skip─▶ done
//!   │
//! fetch ─error─▶ record_failure, done
//!   │
//! parse ─bad / status != success─▶ record_failure, done
//!   │ record_success
//!   ▼
//! for each entry, in order:
//!   malformed ? ack failed if it has an id : {
//!     ack processing (best effort)
//!     REFRESH_PLAYERS ? publish roster : bridge.execute
//!     ack completed | failed
//!   }
//! ```
//!
//! Acks are not re-gated mid-tick: once a command has been observed it is
//! always driven to a terminal report attempt.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::breaker::CircuitBreaker;
use super::collector::TelemetryCollector;
use super::protocol::{self, LinkError, ProtocolError};
use super::publisher::TelemetryPublisher;
use super::transport::Transport;
use crate::bridge::ExecutionBridge;
use crate::config;
use crate::types::{
    CommandStatus, ExecutionOutcome, PendingCommandsResponse, PendingEntry, QueuedCommand,
    StatusUpdate,
};

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The breaker skipped this tick.
    pub gated: bool,
    /// The fetch or its payload failed.
    pub fetch_failed: bool,
    pub fetched: usize,
    pub completed: usize,
    pub failed: usize,
    /// Listed entries that could not be decoded. Those carrying an id are
    /// also counted in `failed`.
    pub malformed: usize,
    /// Status reports (processing or terminal) that did not get through.
    pub ack_failures: usize,
}

pub struct CommandPoller {
    transport: Transport,
    breaker: Arc<CircuitBreaker>,
    bridge: ExecutionBridge,
    publisher: TelemetryPublisher,
    collector: Arc<dyn TelemetryCollector>,
}

impl CommandPoller {
    pub fn new(
        transport: Transport,
        breaker: Arc<CircuitBreaker>,
        bridge: ExecutionBridge,
        publisher: TelemetryPublisher,
        collector: Arc<dyn TelemetryCollector>,
    ) -> Self {
        Self {
            transport,
            breaker,
            bridge,
            publisher,
            collector,
        }
    }

    /// Run one poll cycle. Never fails; problems are logged and counted.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        if self.breaker.should_skip() {
            report.gated = true;
            return report;
        }

        let entries = match self.fetch_pending().await {
            Ok(entries) => {
                self.breaker.record_success();
                entries
            }
            Err(e) => {
                self.breaker.record_failure();
                super::log_link_failure("poll", &e);
                report.fetch_failed = true;
                return report;
            }
        };

        report.fetched = entries.len();
        if !entries.is_empty() {
            debug!(count = entries.len(), "Received queued commands");
        }

        for entry in entries {
            match entry {
                PendingEntry::Valid(command) => self.process(&command, &mut report).await,
                PendingEntry::Malformed { queue_id, reason } => {
                    self.reject_malformed(queue_id, &reason, &mut report).await;
                }
            }
        }

        report
    }

    async fn fetch_pending(&self) -> Result<Vec<PendingEntry>, LinkError> {
        let code = self.transport.endpoint().server_code();
        let resp = self
            .transport
            .fetch(protocol::PENDING_COMMANDS_PATH, &[("server_code", code)])
            .await?;

        let parsed: PendingCommandsResponse =
            serde_json::from_str(&resp.body).map_err(ProtocolError::from)?;
        if !parsed.is_success() {
            return Err(ProtocolError::Rejected {
                status: parsed.status,
                message: parsed.message.unwrap_or_default(),
            }
            .into());
        }
        Ok(parsed.entries())
    }

    /// An entry we cannot run. With an id it is closed out as failed so it
    /// does not come back every poll; without one there is nothing to report.
    async fn reject_malformed(&self, queue_id: Option<u64>, reason: &str, report: &mut TickReport) {
        report.malformed += 1;
        let Some(queue_id) = queue_id else {
            warn!(reason, "Skipping pending command without a usable id");
            return;
        };

        warn!(queue_id, reason, "Pending command is malformed, reporting it as failed");
        report.failed += 1;
        if !self
            .acknowledge(&StatusUpdate::bare(queue_id, CommandStatus::Failed))
            .await
        {
            report.ack_failures += 1;
        }
    }

    async fn process(&self, command: &QueuedCommand, report: &mut TickReport) {
        // Execution proceeds even if this report is lost; the terminal
        // status supersedes it.
        if !self.acknowledge(&StatusUpdate::processing(command.queue_id)).await {
            report.ack_failures += 1;
        }

        let (success, update) = if command.is_refresh_players() {
            self.refresh_players(command).await
        } else {
            let outcome = self.run_on_host(command).await;
            (outcome.success, StatusUpdate::terminal(command, &outcome))
        };

        if success {
            report.completed += 1;
        } else {
            report.failed += 1;
        }

        if !self.acknowledge(&update).await {
            report.ack_failures += 1;
        }
    }

    async fn run_on_host(&self, command: &QueuedCommand) -> ExecutionOutcome {
        let logging = config::get().logging.clone();
        let executed = self
            .bridge
            .substitute(&command.command_template, &command.player_name);

        if logging.log_commands {
            info!(
                queue_id = command.queue_id,
                player = %command.player_name,
                command = %executed,
                "Executing remote command"
            );
        } else {
            info!(queue_id = command.queue_id, "Executing remote command");
        }

        let outcome = self
            .bridge
            .execute(&command.command_template, &command.player_name)
            .await;

        if !outcome.success && logging.log_errors {
            warn!(
                queue_id = command.queue_id,
                output = %outcome.output,
                "Remote command failed"
            );
        }
        outcome
    }

    /// Built-in roster refresh: never touches the host context.
    async fn refresh_players(&self, command: &QueuedCommand) -> (bool, StatusUpdate) {
        match self.publisher.refresh_roster(self.collector.as_ref()).await {
            Ok(outcome) => {
                debug!(queue_id = command.queue_id, publish = %outcome, "Roster refreshed on request");
                (true, StatusUpdate::bare(command.queue_id, CommandStatus::Completed))
            }
            Err(e) => {
                warn!(queue_id = command.queue_id, error = %e, "Roster collection failed");
                (false, StatusUpdate::bare(command.queue_id, CommandStatus::Failed))
            }
        }
    }

    /// Report a status change. Feeds the breaker; returns whether the
    /// control plane accepted it. A 2xx whose body is not `success` is a
    /// rejection.
    async fn acknowledge(&self, update: &StatusUpdate) -> bool {
        let delivered: Result<(), LinkError> = match self
            .transport
            .send(protocol::PENDING_COMMANDS_PATH, update)
            .await
        {
            Ok(resp) => protocol::expect_success(&resp).map_err(Into::into),
            Err(e) => Err(e.into()),
        };

        match delivered {
            Ok(()) => {
                self.breaker.record_success();
                true
            }
            Err(e) => {
                self.breaker.record_failure();
                warn!(
                    queue_id = update.queue_id,
                    status = %update.status,
                    error = %e,
                    "Failed to report command status"
                );
                false
            }
        }
    }
}
