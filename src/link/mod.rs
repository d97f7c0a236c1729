//! Control-plane link
//!
//! Everything that talks to the remote control plane:
//!
//! - **Transport**: one bounded HTTP exchange
//! - **CircuitBreaker**: shared backoff gate fed by every exchange
//! - **TelemetryPublisher**: roster / server info / shutdown pushes
//! - **CommandPoller**: poll → execute → acknowledge
//! - **scheduler**: the interval loops that drive the above

pub mod breaker;
pub mod collector;
pub mod poller;
pub mod protocol;
pub mod publisher;
pub mod scheduler;
pub mod transport;

pub use breaker::{BreakerSettings, BreakerSnapshot, CircuitBreaker};
pub use collector::TelemetryCollector;
pub use poller::{CommandPoller, TickReport};
pub use protocol::{LinkError, ProtocolError};
pub use publisher::{PublishOutcome, TelemetryPublisher};
pub use scheduler::{run_poll_loop, run_roster_loop, run_server_info_loop};
pub use transport::{RawResponse, Transport, TransportError};

/// Log a failed exchange at `warn`, or `debug` when `logging.log_errors` is off.
pub(crate) fn log_link_failure(channel: &'static str, error: &LinkError) {
    let timeout = matches!(error, LinkError::Transport(e) if e.is_timeout());
    if crate::config::get().logging.log_errors {
        tracing::warn!(channel, timeout, error = %error, "Control plane exchange failed");
    } else {
        tracing::debug!(channel, timeout, error = %error, "Control plane exchange failed");
    }
}
