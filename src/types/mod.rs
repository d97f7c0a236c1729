//! Shared data structures for the control-plane link
//!
//! - `RemoteEndpoint`: who we are and where the control plane lives
//! - `QueuedCommand` / `CommandStatus` / `ExecutionOutcome`: the remote
//!   command lifecycle
//! - `PlayerInfo` / `ServerInfo`: telemetry produced by the host collector

mod command;
mod endpoint;
mod telemetry;

pub use command::*;
pub use endpoint::*;
pub use telemetry::*;
