//! Standalone host wrapper
//!
//! Runs a dedicated game server as a child process and plays the host's part
//! of the link: its stdin is the serialized execution context, its stdout is
//! the source of roster events, and its directory is the source of the
//! server snapshot.

pub mod collector;
pub mod console;
pub mod process;
pub mod properties;
pub mod roster;
pub mod system;
pub mod versions;

pub use collector::ProcessCollector;
pub use process::HostProcess;
pub use roster::RosterTracker;
