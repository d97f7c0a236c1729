//! Telemetry source seam

use async_trait::async_trait;

use crate::types::{PlayerInfo, ServerInfo};

/// Supplies roster and server snapshots to the publisher.
///
/// Implementations may block briefly (file reads, directory walks) but must
/// not touch the host's serialized execution context.
#[async_trait]
pub trait TelemetryCollector: Send + Sync {
    /// Players currently online, in join order.
    async fn collect_roster(&self) -> anyhow::Result<Vec<PlayerInfo>>;

    /// Full server snapshot.
    async fn collect_server_snapshot(&self) -> anyhow::Result<ServerInfo>;
}
