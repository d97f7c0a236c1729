//! Handoff between background tasks and the host's serialized context.
//!
//! - `host`: the context inbox (`HostContext`), its cloneable sender
//!   (`HostHandle`) and the `HostCommandExecutor` capability
//! - `execution`: `ExecutionBridge`, which schedules one command and waits
//!   on a `oneshot` up to a ceiling

pub mod execution;
pub mod host;

pub use execution::ExecutionBridge;
pub use host::{
    host_channel, HostCommandExecutor, HostContext, HostError, HostExecution, HostHandle, HostJob,
};
