//! Background timers: command polling, roster and server-info pushes
//!
//! Each loop runs its tick as a separate task and awaits it, so a panic in
//! one tick is logged and the next tick still fires. Ticks of the same loop
//! never overlap.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::collector::TelemetryCollector;
use super::poller::CommandPoller;
use super::publisher::TelemetryPublisher;
use crate::config;

fn interval(every: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Poll for queued commands every `every`, after `initial_delay`.
pub async fn run_poll_loop(
    poller: Arc<CommandPoller>,
    every: Duration,
    initial_delay: Duration,
    cancel: CancellationToken,
) {
    tokio::select! {
        () = cancel.cancelled() => return,
        () = tokio::time::sleep(initial_delay) => {}
    }
    info!(every_secs = every.as_secs(), "📥 Command poller started");

    let mut interval = interval(every);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let poller = Arc::clone(&poller);
        match tokio::spawn(async move { poller.tick().await }).await {
            Ok(report) if report.fetched > 0 => {
                info!(
                    fetched = report.fetched,
                    completed = report.completed,
                    failed = report.failed,
                    malformed = report.malformed,
                    ack_failures = report.ack_failures,
                    "Command poll finished"
                );
            }
            Ok(report) if report.gated => debug!("Command poll skipped — backing off"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Command poll tick aborted"),
        }
    }
    debug!("Command poller stopped");
}

/// Push the roster every `every`, and immediately whenever `trigger` fires.
pub async fn run_roster_loop(
    publisher: TelemetryPublisher,
    collector: Arc<dyn TelemetryCollector>,
    every: Duration,
    trigger: Option<Arc<Notify>>,
    cancel: CancellationToken,
) {
    let trigger = trigger.unwrap_or_default();
    let mut interval = interval(every);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
            () = trigger.notified() => debug!("Roster change — publishing now"),
        }

        if !config::get().data_collection.collect_player_list {
            continue;
        }

        let publisher = publisher.clone();
        let collector = Arc::clone(&collector);
        let tick = tokio::spawn(async move { publisher.refresh_roster(collector.as_ref()).await });
        match tick.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "Roster collection failed"),
            Err(e) => warn!(error = %e, "Roster tick aborted"),
        }
    }
    debug!("Roster publisher stopped");
}

/// Push a server snapshot every `every`.
pub async fn run_server_info_loop(
    publisher: TelemetryPublisher,
    collector: Arc<dyn TelemetryCollector>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut interval = interval(every);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        if !config::get().data_collection.collect_server_info {
            continue;
        }

        let publisher = publisher.clone();
        let collector = Arc::clone(&collector);
        let tick = tokio::spawn(async move {
            let info = collector.collect_server_snapshot().await?;
            anyhow::Ok(publisher.publish_server_info(&info).await)
        });
        match tick.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "Server snapshot collection failed"),
            Err(e) => warn!(error = %e, "Server info tick aborted"),
        }
    }
    debug!("Server info publisher stopped");
}
