//! Command Sync Integration Tests
//!
//! Runs the poller and publisher against an in-process axum backend bound to
//! 127.0.0.1:0. The host context is a plain closure driven on a std thread,
//! the way an embedded host with its own main thread drives it.

use anyhow::bail;
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use gamelink::bridge::{host_channel, ExecutionBridge, HostExecution, HostHandle};
use gamelink::config::WebServerConfig;
use gamelink::link::{
    self, BreakerSettings, CircuitBreaker, CommandPoller, PublishOutcome, TelemetryCollector,
    TelemetryPublisher, Transport,
};
use gamelink::types::{PlayerInfo, RemoteEndpoint, ServerInfo};

const CODE: &str = "GB-TEST-0000-0001";

// ============================================================================
// Mock control plane
// ============================================================================

#[derive(Default)]
struct Backend {
    /// Body served by `GET /pending-commands.php`.
    pending: Mutex<Value>,
    /// Every POST as (path, body), in arrival order.
    posts: Mutex<Vec<(String, Value)>>,
    /// `X-Server-Code` header of every request.
    header_codes: Mutex<Vec<String>>,
    polls: AtomicUsize,
    /// Answer everything with 503.
    down: AtomicBool,
}

impl Backend {
    fn posts_to(&self, path: &str) -> Vec<Value> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, body)| body.clone())
            .collect()
    }

    fn note_header(&self, headers: &HeaderMap) {
        let code = headers
            .get("x-server-code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.header_codes.lock().unwrap().push(code);
    }
}

type Reply = (StatusCode, Json<Value>);

fn unavailable() -> Reply {
    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "error"})))
}

async fn list_pending(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    backend.polls.fetch_add(1, Ordering::SeqCst);
    backend.note_header(&headers);
    if backend.down.load(Ordering::SeqCst) {
        return unavailable();
    }
    if query.get("server_code").map(String::as_str) != Some(CODE) {
        return (StatusCode::BAD_REQUEST, Json(json!({"status": "error", "message": "no code"})));
    }
    let body = backend.pending.lock().unwrap().clone();
    (StatusCode::OK, Json(body))
}

/// Status reports.
///
/// - queue id 2: terminal report answered with 500
/// - queue id 4: processing report answered with 500
/// - queue id 9: terminal report answered 200 with an error payload
async fn acknowledge(
    State(backend): State<Arc<Backend>>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    backend.note_header(&headers);
    if backend.down.load(Ordering::SeqCst) {
        return unavailable();
    }
    let terminal = body["status"] == "completed" || body["status"] == "failed";
    let queue_id = body["queue_id"].as_u64();
    backend.posts.lock().unwrap().push((uri.path().to_string(), body));
    match (queue_id, terminal) {
        (Some(2), true) | (Some(4), false) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"status": "error"})))
        }
        (Some(9), true) => (
            StatusCode::OK,
            Json(json!({"status": "error", "message": "unknown queue id"})),
        ),
        _ => (StatusCode::OK, Json(json!({"status": "success"}))),
    }
}

async fn record(
    State(backend): State<Arc<Backend>>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    backend.note_header(&headers);
    if backend.down.load(Ordering::SeqCst) {
        return unavailable();
    }
    backend.posts.lock().unwrap().push((uri.path().to_string(), body));
    (StatusCode::OK, Json(json!({"status": "success"})))
}

async fn spawn_backend(pending: Value) -> (String, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    *backend.pending.lock().unwrap() = pending;

    let app = Router::new()
        .route("/pending-commands.php", get(list_pending).post(acknowledge))
        .route("/plugin-player-list.php", post(record))
        .route("/plugin-server-info.php", post(record))
        .route("/plugin-test.php", post(record))
        .route("/server-shutdown.php", post(record))
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), backend)
}

// ============================================================================
// Fakes
// ============================================================================

/// Host context on its own thread. Records every command it runs.
///
/// `slow ...` sleeps 500ms, `boom` faults, anything else succeeds.
fn spawn_host(calls: Arc<Mutex<Vec<String>>>) -> HostHandle {
    let (handle, context) = host_channel();
    std::thread::spawn(move || {
        let mut executor = move |command: &str| -> anyhow::Result<HostExecution> {
            calls.lock().unwrap().push(command.to_string());
            if command.starts_with("slow") {
                std::thread::sleep(Duration::from_millis(500));
            }
            if command == "boom" {
                bail!("boom exploded");
            }
            Ok(HostExecution {
                success: true,
                output: format!("ran {command}"),
            })
        };
        context.run_blocking(&mut executor);
    });
    handle
}

struct FakeCollector {
    players: Vec<PlayerInfo>,
    broken: bool,
}

#[async_trait]
impl TelemetryCollector for FakeCollector {
    async fn collect_roster(&self) -> anyhow::Result<Vec<PlayerInfo>> {
        if self.broken {
            bail!("roster unavailable");
        }
        Ok(self.players.clone())
    }

    async fn collect_server_snapshot(&self) -> anyhow::Result<ServerInfo> {
        Ok(ServerInfo {
            server_code: CODE.to_string(),
            online_players: u32::try_from(self.players.len()).unwrap(),
            ..ServerInfo::default()
        })
    }
}

fn two_players() -> Arc<FakeCollector> {
    Arc::new(FakeCollector {
        players: vec![
            PlayerInfo::new("Ann", "00000000-0000-0000-0000-00000000000a"),
            PlayerInfo::new("Bob", "00000000-0000-0000-0000-00000000000b"),
        ],
        broken: false,
    })
}

fn transport(base_url: &str) -> Transport {
    let settings = WebServerConfig {
        base_url: base_url.to_string(),
        request_timeout_secs: 2,
        connect_timeout_secs: 1,
    };
    Transport::new(RemoteEndpoint::new(base_url, CODE), &settings).unwrap()
}

struct Rig {
    poller: Arc<CommandPoller>,
    publisher: TelemetryPublisher,
    breaker: Arc<CircuitBreaker>,
    calls: Arc<Mutex<Vec<String>>>,
}

fn rig(
    base_url: &str,
    ceiling: Duration,
    settings: BreakerSettings,
    collector: Arc<dyn TelemetryCollector>,
) -> Rig {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let host = spawn_host(Arc::clone(&calls));
    let transport = transport(base_url);
    let breaker = Arc::new(CircuitBreaker::new(settings));
    let publisher = TelemetryPublisher::new(transport.clone(), Arc::clone(&breaker));
    let bridge = ExecutionBridge::with_limits(host, ceiling, 256, "<player>");
    let poller = Arc::new(CommandPoller::new(
        transport,
        Arc::clone(&breaker),
        bridge,
        publisher.clone(),
        collector,
    ));
    Rig {
        poller,
        publisher,
        breaker,
        calls,
    }
}

fn quick_breaker() -> BreakerSettings {
    BreakerSettings {
        failure_threshold: 1,
        cooldown: Duration::from_secs(60),
        backoff_base: Duration::from_secs(60),
        backoff_max: Duration::from_secs(60),
    }
}

// ============================================================================
// Polling and execution
// ============================================================================

#[tokio::test]
async fn tick_runs_commands_in_order_and_acknowledges_each() {
    let (base, backend) = spawn_backend(json!({
        "status": "success",
        "pending_commands": [
            {"id": 42, "player_name": "Ann", "command_string": "give <player> apple"},
            {"id": "2", "player_name": "Bob", "command_string": "say hi <player>"},
            {"id": 3, "player_name": "", "command_string": "boom"}
        ]
    }))
    .await;
    let rig = rig(&base, Duration::from_secs(2), BreakerSettings::default(), two_players());

    let report = rig.poller.tick().await;

    assert_eq!(report.fetched, 3);
    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.ack_failures, 1, "terminal ack for id 2 is rejected");
    assert_eq!(
        *rig.calls.lock().unwrap(),
        vec!["give Ann apple", "say hi Bob", "boom"]
    );

    let acks = backend.posts_to("/pending-commands.php");
    let sequence: Vec<(u64, &str)> = acks
        .iter()
        .map(|a| (a["queue_id"].as_u64().unwrap(), a["status"].as_str().unwrap()))
        .collect();
    assert_eq!(
        sequence,
        vec![
            (42, "processing"),
            (42, "completed"),
            (2, "processing"),
            (2, "completed"),
            (3, "processing"),
            (3, "failed"),
        ]
    );

    assert!(acks[0].get("execution_result").is_none());
    let first = &acks[1]["execution_result"];
    assert_eq!(first["success"], true);
    assert_eq!(first["command"], "give <player> apple");
    assert_eq!(first["executed_command"], "give Ann apple");
    assert_eq!(first["player_name"], "Ann");
    assert_eq!(first["output"], "ran give Ann apple");
    assert_eq!(acks[5]["execution_result"]["output"], "error: boom exploded");

    assert!(backend.header_codes.lock().unwrap().iter().all(|c| c == CODE));
}

fn ack_sequence(backend: &Backend) -> Vec<(u64, String)> {
    backend
        .posts_to("/pending-commands.php")
        .iter()
        .map(|a| (a["queue_id"].as_u64().unwrap(), a["status"].as_str().unwrap().to_string()))
        .collect()
}

#[tokio::test]
async fn slow_host_is_reported_as_timeout_and_the_tick_moves_on() {
    let (base, backend) = spawn_backend(json!({
        "status": "success",
        "pending_commands": [
            {"id": 5, "player_name": "Ann", "command_string": "slow save-all"},
            {"id": 6, "player_name": "Ann", "command_string": "say done <player>"}
        ]
    }))
    .await;
    // The slow command takes 500ms; the next one waits behind it for the rest.
    let rig = rig(&base, Duration::from_millis(400), BreakerSettings::default(), two_players());

    let report = rig.poller.tick().await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(
        ack_sequence(&backend),
        vec![
            (5, "processing".to_string()),
            (5, "failed".to_string()),
            (6, "processing".to_string()),
            (6, "completed".to_string()),
        ]
    );
    let acks = backend.posts_to("/pending-commands.php");
    assert_eq!(acks[1]["execution_result"]["output"], "timeout");
    assert_eq!(acks[1]["execution_result"]["success"], false);
    assert_eq!(acks[3]["execution_result"]["output"], "ran say done Ann");
    assert_eq!(*rig.calls.lock().unwrap(), vec!["slow save-all", "say done Ann"]);
}

#[tokio::test]
async fn lost_processing_report_does_not_stop_execution() {
    let (base, backend) = spawn_backend(json!({
        "status": "success",
        "pending_commands": [{"id": 4, "player_name": "Bob", "command_string": "kick <player>"}]
    }))
    .await;
    let rig = rig(&base, Duration::from_secs(2), BreakerSettings::default(), two_players());

    let report = rig.poller.tick().await;

    assert_eq!(report.completed, 1);
    assert_eq!(report.ack_failures, 1);
    assert_eq!(*rig.calls.lock().unwrap(), vec!["kick Bob"]);
    assert_eq!(
        ack_sequence(&backend),
        vec![(4, "processing".to_string()), (4, "completed".to_string())]
    );
    // Poll and terminal report succeeded after the lost one.
    assert_eq!(rig.breaker.snapshot().consecutive_failures, 0);
}

#[tokio::test]
async fn status_report_with_error_payload_counts_as_failure() {
    let (base, backend) = spawn_backend(json!({
        "status": "success",
        "pending_commands": [{"id": 9, "player_name": "Ann", "command_string": "say hi"}]
    }))
    .await;
    let rig = rig(&base, Duration::from_secs(2), quick_breaker(), two_players());

    let report = rig.poller.tick().await;

    assert_eq!(report.completed, 1);
    assert_eq!(report.ack_failures, 1, "200 with status=error is not delivered");
    assert_eq!(ack_sequence(&backend).len(), 2);
    let breaker = rig.breaker.snapshot();
    assert_eq!(breaker.consecutive_failures, 1);
    assert!(breaker.circuit_open);
}

#[tokio::test]
async fn malformed_entries_are_contained() {
    let (base, backend) = spawn_backend(json!({
        "status": "success",
        "pending_commands": [
            {"id": 11, "player_name": "Ann", "command_string": "say first"},
            {"id": "12", "player_name": "Bob"},
            {"player_name": "Bob", "command_string": "say orphan"},
            {"id": 13, "player_name": "Ann", "command_string": "say last"}
        ]
    }))
    .await;
    let rig = rig(&base, Duration::from_secs(2), BreakerSettings::default(), two_players());

    let report = rig.poller.tick().await;

    assert!(!report.fetch_failed);
    assert_eq!(report.fetched, 4);
    assert_eq!(report.malformed, 2);
    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 1, "only the entry with an id can be reported");
    assert_eq!(*rig.calls.lock().unwrap(), vec!["say first", "say last"]);
    assert_eq!(
        ack_sequence(&backend),
        vec![
            (11, "processing".to_string()),
            (11, "completed".to_string()),
            (12, "failed".to_string()),
            (13, "processing".to_string()),
            (13, "completed".to_string()),
        ]
    );
    let bad = &backend.posts_to("/pending-commands.php")[2];
    assert!(bad.get("execution_result").is_none());
    assert_eq!(rig.breaker.snapshot().consecutive_failures, 0);
}

#[tokio::test]
async fn empty_queue_sends_no_acks() {
    let (base, backend) = spawn_backend(json!({"status": "success", "pending_commands": []})).await;
    let rig = rig(&base, Duration::from_secs(2), BreakerSettings::default(), two_players());

    let report = rig.poller.tick().await;

    assert_eq!(report.fetched, 0);
    assert!(!report.fetch_failed);
    assert!(backend.posts.lock().unwrap().is_empty());
    assert_eq!(backend.polls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// REFRESH_PLAYERS
// ============================================================================

#[tokio::test]
async fn refresh_players_publishes_roster_without_touching_host() {
    let (base, backend) = spawn_backend(json!({
        "status": "success",
        "pending_commands": [{"id": 7, "player_name": null, "command_string": "REFRESH_PLAYERS"}]
    }))
    .await;
    let rig = rig(&base, Duration::from_secs(2), BreakerSettings::default(), two_players());

    let report = rig.poller.tick().await;

    assert_eq!(report.completed, 1);
    assert!(rig.calls.lock().unwrap().is_empty());

    let order: Vec<String> = backend
        .posts
        .lock()
        .unwrap()
        .iter()
        .map(|(path, _)| path.clone())
        .collect();
    assert_eq!(
        order,
        vec![
            "/pending-commands.php",
            "/plugin-player-list.php",
            "/pending-commands.php"
        ]
    );

    let roster = &backend.posts_to("/plugin-player-list.php")[0];
    assert_eq!(roster["server_code"], CODE);
    assert_eq!(roster["total_players"], 2);
    assert_eq!(roster["online_players"][0]["playerId"], "Ann");

    let done = &backend.posts_to("/pending-commands.php")[1];
    assert_eq!(done["status"], "completed");
    assert!(done.get("execution_result").is_none());
}

#[tokio::test]
async fn refresh_players_fails_when_roster_cannot_be_collected() {
    let (base, backend) = spawn_backend(json!({
        "status": "success",
        "pending_commands": [{"id": 8, "command_string": "REFRESH_PLAYERS"}]
    }))
    .await;
    let broken = Arc::new(FakeCollector {
        players: Vec::new(),
        broken: true,
    });
    let rig = rig(&base, Duration::from_secs(2), BreakerSettings::default(), broken);

    let report = rig.poller.tick().await;

    assert_eq!(report.failed, 1);
    assert!(backend.posts_to("/plugin-player-list.php").is_empty());
    let acks = backend.posts_to("/pending-commands.php");
    assert_eq!(acks[1]["status"], "failed");
}

// ============================================================================
// Circuit breaker gating
// ============================================================================

#[tokio::test]
async fn open_circuit_skips_polls_and_publishes() {
    let (base, backend) = spawn_backend(json!({"status": "success"})).await;
    backend.down.store(true, Ordering::SeqCst);
    let rig = rig(&base, Duration::from_secs(2), quick_breaker(), two_players());

    let first = rig.poller.tick().await;
    assert!(first.fetch_failed);
    assert!(rig.breaker.snapshot().circuit_open);

    let second = rig.poller.tick().await;
    assert!(second.gated);
    assert_eq!(backend.polls.load(Ordering::SeqCst), 1, "gated tick stays off the wire");

    let players = vec![PlayerInfo::new("Ann", "a")];
    assert_eq!(rig.publisher.publish_roster(&players).await, PublishOutcome::Skipped);
    assert_eq!(rig.publisher.publish_shutdown().await, PublishOutcome::Skipped);
}

#[tokio::test]
async fn rejected_poll_counts_as_failure() {
    let (base, backend) = spawn_backend(json!({
        "status": "error",
        "message": "unknown server code"
    }))
    .await;
    let rig = rig(&base, Duration::from_secs(2), BreakerSettings::default(), two_players());

    let report = rig.poller.tick().await;

    assert!(report.fetch_failed);
    assert_eq!(report.fetched, 0);
    assert_eq!(rig.breaker.snapshot().consecutive_failures, 1);
    assert!(backend.posts.lock().unwrap().is_empty());
}

// ============================================================================
// Publisher
// ============================================================================

#[tokio::test]
async fn publisher_posts_telemetry_envelopes() {
    let (base, backend) = spawn_backend(json!({"status": "success"})).await;
    let rig = rig(&base, Duration::from_secs(2), BreakerSettings::default(), two_players());

    let info = ServerInfo {
        server_code: CODE.to_string(),
        tps: 19.5,
        ..ServerInfo::default()
    };
    assert_eq!(rig.publisher.publish_server_info(&info).await, PublishOutcome::Sent);
    assert_eq!(rig.publisher.publish_shutdown().await, PublishOutcome::Sent);

    let snapshot = &backend.posts_to("/plugin-server-info.php")[0];
    assert_eq!(snapshot["server_code"], CODE);
    assert_eq!(snapshot["server_info"]["tps"], 19.5);
    assert!(snapshot["timestamp"].as_str().is_some());

    let shutdown = &backend.posts_to("/server-shutdown.php")[0];
    assert_eq!(shutdown["action"], "server_shutdown");
}

#[tokio::test]
async fn test_connection_closes_an_open_circuit() {
    let (base, backend) = spawn_backend(json!({"status": "success"})).await;
    backend.down.store(true, Ordering::SeqCst);
    let rig = rig(&base, Duration::from_secs(2), quick_breaker(), two_players());

    assert!(rig.publisher.test_connection().await.is_err());
    assert!(rig.breaker.snapshot().circuit_open);

    backend.down.store(false, Ordering::SeqCst);
    rig.publisher.test_connection().await.unwrap();
    assert!(!rig.breaker.snapshot().circuit_open);

    let ping = &backend.posts_to("/plugin-test.php")[0];
    assert_eq!(ping["test"], true);
    assert_eq!(ping["server_code"], CODE);
}

// ============================================================================
// Scheduler
// ============================================================================

#[tokio::test]
async fn poll_loop_ticks_until_cancelled() {
    let (base, backend) = spawn_backend(json!({"status": "success", "pending_commands": []})).await;
    let rig = rig(&base, Duration::from_secs(2), BreakerSettings::default(), two_players());
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(link::run_poll_loop(
        Arc::clone(&rig.poller),
        Duration::from_millis(50),
        Duration::ZERO,
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("poll loop did not stop")
        .unwrap();

    assert!(backend.polls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn roster_loop_publishes_on_change_signal() {
    let (base, backend) = spawn_backend(json!({"status": "success"})).await;
    let rig = rig(&base, Duration::from_secs(2), BreakerSettings::default(), two_players());
    let cancel = CancellationToken::new();
    let trigger = Arc::new(tokio::sync::Notify::new());

    let handle = tokio::spawn(link::run_roster_loop(
        rig.publisher.clone(),
        two_players(),
        Duration::from_secs(3600),
        Some(Arc::clone(&trigger)),
        cancel.clone(),
    ));

    // The first interval tick fires immediately; wait for it, then poke.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let before = backend.posts_to("/plugin-player-list.php").len();
    trigger.notify_one();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let after = backend.posts_to("/plugin-player-list.php").len();

    cancel.cancel();
    handle.await.unwrap();
    assert_eq!(after, before + 1);
}
