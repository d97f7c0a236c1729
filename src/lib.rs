//! GameLink: game server ↔ control plane connector
//!
//! Bridges a live game server to a remote HTTP control plane: pushes roster
//! and server telemetry, polls for remotely queued commands, runs them on the
//! server's single-writer execution context and reports the outcome.
//!
//! ## Architecture
//!
//! - **Transport**: one bounded HTTP/JSON exchange
//! - **Circuit Breaker**: shared backoff gate in front of every outbound call
//! - **Telemetry Publisher**: roster / server info / shutdown pushes
//! - **Command Poller**: poll → execute → acknowledge
//! - **Execution Bridge**: `oneshot` handoff onto the host context with a
//!   wait ceiling
//! - **Host wrapper**: runs a dedicated server process as the host

pub mod bridge;
pub mod config;
pub mod host;
pub mod link;
pub mod types;

// Re-export configuration
pub use config::ConnectorConfig;

// Re-export commonly used types
pub use types::{
    CommandStatus, ExecutionOutcome, PlayerInfo, PluginInfo, QueuedCommand, RemoteEndpoint,
    ServerInfo,
};

// Re-export the link
pub use link::{
    CircuitBreaker, CommandPoller, LinkError, ProtocolError, PublishOutcome, TelemetryCollector,
    TelemetryPublisher, TickReport, Transport, TransportError,
};

// Re-export the bridge
pub use bridge::{
    host_channel, ExecutionBridge, HostCommandExecutor, HostContext, HostError, HostExecution,
    HostHandle,
};
