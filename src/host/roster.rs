//! Roster tracking from the wrapped server's console output
//!
//! The server announces joins, leaves and account UUIDs on stdout. The tracker
//! keeps the online list in join order and signals a `Notify` on every change
//! so the roster publisher can push immediately.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use crate::types::PlayerInfo;

/// A console line the tracker cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleLine {
    Uuid { name: String, uuid: String },
    Joined(String),
    Left(String),
    Version(String),
}

/// Compiled console patterns.
#[derive(Debug)]
pub struct ConsolePatterns {
    joined: Regex,
    left: Regex,
    uuid: Regex,
    version: Regex,
}

impl ConsolePatterns {
    pub fn new() -> Result<Self, regex::Error> {
        // Names must follow the log prefix directly so chat like
        // "<Ann> Bob joined the game" is not mistaken for a join.
        Ok(Self {
            joined: Regex::new(r"(?:^|\]:\s*)(?P<name>[A-Za-z0-9_.]{1,16}) joined the game\s*$")?,
            left: Regex::new(r"(?:^|\]:\s*)(?P<name>[A-Za-z0-9_.]{1,16}) left the game\s*$")?,
            uuid: Regex::new(
                r"UUID of player (?P<name>[A-Za-z0-9_.]{1,16}) is (?P<uuid>[0-9a-fA-F]{8}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{12})",
            )?,
            version: Regex::new(r"(?i)starting minecraft server version (?P<version>\S+)")?,
        })
    }

    pub fn parse(&self, line: &str) -> Option<ConsoleLine> {
        if let Some(c) = self.uuid.captures(line) {
            return Some(ConsoleLine::Uuid {
                name: c["name"].to_string(),
                uuid: c["uuid"].to_lowercase(),
            });
        }
        if let Some(c) = self.joined.captures(line) {
            return Some(ConsoleLine::Joined(c["name"].to_string()));
        }
        if let Some(c) = self.left.captures(line) {
            return Some(ConsoleLine::Left(c["name"].to_string()));
        }
        self.version
            .captures(line)
            .map(|c| ConsoleLine::Version(c["version"].to_string()))
    }
}

#[derive(Debug, Default)]
struct RosterState {
    online: Vec<PlayerInfo>,
    /// UUIDs announced during login, keyed by name.
    uuids: HashMap<String, String>,
    version: Option<String>,
}

pub struct RosterTracker {
    patterns: ConsolePatterns,
    state: Mutex<RosterState>,
    changed: Arc<Notify>,
}

impl RosterTracker {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            patterns: ConsolePatterns::new()?,
            state: Mutex::new(RosterState::default()),
            changed: Arc::new(Notify::new()),
        })
    }

    /// Fires after every join or leave.
    pub fn change_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.changed)
    }

    fn lock(&self) -> MutexGuard<'_, RosterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed one console line. Returns what it recognised.
    pub fn observe(&self, line: &str) -> Option<ConsoleLine> {
        let parsed = self.patterns.parse(line)?;
        let mut state = self.lock();

        match &parsed {
            ConsoleLine::Uuid { name, uuid } => {
                state.uuids.insert(name.clone(), uuid.clone());
            }
            ConsoleLine::Joined(name) => {
                let uuid = state.uuids.get(name).cloned().unwrap_or_default();
                state.online.retain(|p| &p.player_id != name);
                state.online.push(PlayerInfo::new(name.clone(), uuid));
                drop(state);
                tracing::info!(player = %name, "Player joined");
                self.changed.notify_one();
            }
            ConsoleLine::Left(name) => {
                let before = state.online.len();
                state.online.retain(|p| &p.player_id != name);
                state.uuids.remove(name);
                let removed = state.online.len() != before;
                drop(state);
                if removed {
                    tracing::info!(player = %name, "Player left");
                    self.changed.notify_one();
                }
            }
            ConsoleLine::Version(version) => {
                state.version = Some(version.clone());
            }
        }
        Some(parsed)
    }

    pub fn players(&self) -> Vec<PlayerInfo> {
        self.lock().online.clone()
    }

    pub fn version(&self) -> Option<String> {
        self.lock().version.clone()
    }

    /// Forget everyone (the server stopped).
    pub fn clear(&self) {
        let mut state = self.lock();
        let had_players = !state.online.is_empty();
        state.online.clear();
        state.uuids.clear();
        drop(state);
        if had_players {
            self.changed.notify_one();
        }
    }
}
