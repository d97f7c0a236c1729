//! Control-plane wire protocol: endpoint paths, request envelopes and
//! response classification.

use serde::{Deserialize, Serialize};

use super::transport::{RawResponse, TransportError};
use crate::types::{PlayerInfo, ServerInfo};

// ============================================================================
// Endpoints
// ============================================================================

pub const PLAYER_LIST_PATH: &str = "/plugin-player-list.php";
pub const SERVER_INFO_PATH: &str = "/plugin-server-info.php";
pub const TEST_PATH: &str = "/plugin-test.php";
pub const SHUTDOWN_PATH: &str = "/server-shutdown.php";
/// GET lists queued commands, POST reports a status change.
pub const PENDING_COMMANDS_PATH: &str = "/pending-commands.php";

// ============================================================================
// Errors
// ============================================================================

/// A 2xx response whose payload cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed response body: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("control plane reported status '{status}': {message}")]
    Rejected { status: String, message: String },
}

/// Any failed exchange, as seen by the publisher and poller.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

// ============================================================================
// Request Envelopes
// ============================================================================

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Serialize)]
pub struct RosterPayload<'a> {
    pub server_code: &'a str,
    pub timestamp: String,
    pub online_players: &'a [PlayerInfo],
    pub total_players: usize,
}

impl<'a> RosterPayload<'a> {
    pub fn new(server_code: &'a str, players: &'a [PlayerInfo]) -> Self {
        Self {
            server_code,
            timestamp: now_rfc3339(),
            online_players: players,
            total_players: players.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ServerInfoPayload<'a> {
    pub server_code: &'a str,
    pub timestamp: String,
    pub server_info: &'a ServerInfo,
}

impl<'a> ServerInfoPayload<'a> {
    pub fn new(server_code: &'a str, server_info: &'a ServerInfo) -> Self {
        Self {
            server_code,
            timestamp: now_rfc3339(),
            server_info,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TestPayload<'a> {
    pub server_code: &'a str,
    pub timestamp: String,
    pub test: bool,
}

impl<'a> TestPayload<'a> {
    pub fn new(server_code: &'a str) -> Self {
        Self {
            server_code,
            timestamp: now_rfc3339(),
            test: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ShutdownPayload<'a> {
    pub server_code: &'a str,
    pub timestamp: String,
    pub action: &'static str,
}

impl<'a> ShutdownPayload<'a> {
    pub fn new(server_code: &'a str) -> Self {
        Self {
            server_code,
            timestamp: now_rfc3339(),
            action: "server_shutdown",
        }
    }
}

// ============================================================================
// Response Classification
// ============================================================================

/// Minimal `{status, message}` acknowledgement shape.
#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// Require a JSON body with `status == "success"`.
pub fn expect_success(resp: &RawResponse) -> Result<(), ProtocolError> {
    let envelope: StatusEnvelope = serde_json::from_str(&resp.body)?;
    if envelope.status == "success" {
        Ok(())
    } else {
        Err(ProtocolError::Rejected {
            status: envelope.status,
            message: envelope.message.unwrap_or_default(),
        })
    }
}
