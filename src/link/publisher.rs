//! Telemetry Publisher — roster, server info and lifecycle notices
//!
//! Every push is gated by the shared breaker and records its result into it.
//! A 2xx answer counts as delivered; the body is not inspected except by
//! `test_connection`.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::breaker::CircuitBreaker;
use super::collector::TelemetryCollector;
use super::protocol::{
    self, LinkError, RosterPayload, ServerInfoPayload, ShutdownPayload, TestPayload,
};
use super::transport::Transport;
use crate::types::{PlayerInfo, ServerInfo};

/// Result of one publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    /// The breaker said no; nothing went on the wire.
    Skipped,
    Failed,
}

impl std::fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishOutcome::Sent => write!(f, "sent"),
            PublishOutcome::Skipped => write!(f, "skipped"),
            PublishOutcome::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Clone)]
pub struct TelemetryPublisher {
    transport: Transport,
    breaker: Arc<CircuitBreaker>,
}

impl TelemetryPublisher {
    pub fn new(transport: Transport, breaker: Arc<CircuitBreaker>) -> Self {
        Self { transport, breaker }
    }

    pub async fn publish_roster(&self, players: &[PlayerInfo]) -> PublishOutcome {
        let code = self.transport.endpoint().server_code();
        let payload = RosterPayload::new(code, players);
        self.gated_send("roster", protocol::PLAYER_LIST_PATH, &payload).await
    }

    pub async fn publish_server_info(&self, info: &ServerInfo) -> PublishOutcome {
        let code = self.transport.endpoint().server_code();
        let payload = ServerInfoPayload::new(code, info);
        self.gated_send("server_info", protocol::SERVER_INFO_PATH, &payload).await
    }

    /// Tell the control plane this server is going away.
    pub async fn publish_shutdown(&self) -> PublishOutcome {
        let code = self.transport.endpoint().server_code();
        let payload = ShutdownPayload::new(code);
        self.gated_send("shutdown", protocol::SHUTDOWN_PATH, &payload).await
    }

    /// Collect the roster and publish it.
    ///
    /// Collection errors are returned; the publish itself never errors.
    pub async fn refresh_roster(
        &self,
        collector: &dyn TelemetryCollector,
    ) -> anyhow::Result<PublishOutcome> {
        let players = collector.collect_roster().await?;
        Ok(self.publish_roster(&players).await)
    }

    /// Operator check: POST a test envelope and require `status == "success"`.
    ///
    /// Runs even while the circuit is open, but its result still feeds the
    /// breaker so a passing check closes it.
    pub async fn test_connection(&self) -> Result<(), LinkError> {
        let code = self.transport.endpoint().server_code();
        let result = match self.transport.send(protocol::TEST_PATH, &TestPayload::new(code)).await {
            Ok(resp) => protocol::expect_success(&resp).map_err(LinkError::from),
            Err(e) => Err(LinkError::from(e)),
        };

        match &result {
            Ok(()) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        result
    }

    async fn gated_send<T: Serialize + ?Sized>(
        &self,
        channel: &'static str,
        path: &str,
        body: &T,
    ) -> PublishOutcome {
        if self.breaker.should_skip() {
            debug!(channel, "Publish skipped — backing off from control plane");
            return PublishOutcome::Skipped;
        }

        match self.transport.send(path, body).await {
            Ok(_) => {
                self.breaker.record_success();
                debug!(channel, "Telemetry published");
                PublishOutcome::Sent
            }
            Err(e) => {
                self.breaker.record_failure();
                super::log_link_failure(channel, &LinkError::from(e));
                PublishOutcome::Failed
            }
        }
    }
}
