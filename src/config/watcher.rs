//! connector.toml hot reload
//!
//! Polls the file's (mtime, size) fingerprint. A changed fingerprint must hold
//! still for one settle period before the file is re-read, so half-written
//! saves are never parsed.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ConfigChange;

const CHECK_EVERY: Duration = Duration::from_secs(2);
const SETTLE: Duration = Duration::from_millis(500);

/// Outcome of one reload attempt.
#[derive(Debug)]
pub enum ConfigEvent {
    /// The new file is active; these leaves changed.
    Reloaded(Vec<ConfigChange>),
    /// The new file was rejected and the previous config stays active.
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: SystemTime,
    len: u64,
}

fn fingerprint(path: &Path) -> Option<Fingerprint> {
    let meta = std::fs::metadata(path).ok()?;
    Some(Fingerprint {
        modified: meta.modified().ok()?,
        len: meta.len(),
    })
}

/// Watch `path` and reload the global config whenever it changes.
///
/// Stops on cancellation or when nobody is listening on `tx`.
pub async fn run_config_watcher(
    path: PathBuf,
    tx: mpsc::Sender<ConfigEvent>,
    cancel: CancellationToken,
) {
    info!(path = %path.display(), "👀 Watching config for changes");

    let mut seen = fingerprint(&path);
    let mut missing_logged = false;
    let mut ticker = tokio::time::interval(CHECK_EVERY);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(current) = fingerprint(&path) else {
            if !missing_logged {
                warn!(path = %path.display(), "Config file unreadable — keeping active config");
                missing_logged = true;
            }
            continue;
        };
        missing_logged = false;

        if seen == Some(current) {
            continue;
        }

        tokio::time::sleep(SETTLE).await;
        if fingerprint(&path) != Some(current) {
            // Still being written; pick it up next check.
            continue;
        }
        seen = Some(current);

        let event = match super::reload() {
            Ok(changes) => {
                for note in super::check_non_reloadable(&changes) {
                    warn!("{note}");
                }
                ConfigEvent::Reloaded(changes)
            }
            Err(e) => ConfigEvent::Error(e.to_string()),
        };

        if tx.send(event).await.is_err() {
            break;
        }
    }
    debug!("Config watcher stopped");
}
