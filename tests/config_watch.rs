//! Hot reload through the file watcher.
//!
//! Lives in its own test binary because it installs the process-wide config.

use std::time::Duration;

use gamelink::config::{self, watcher::ConfigEvent, ConnectorConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn next_event(rx: &mut mpsc::Receiver<ConfigEvent>) -> ConfigEvent {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("watcher produced no event")
        .expect("watcher channel closed")
}

#[tokio::test]
async fn watcher_reports_rejected_and_accepted_edits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("connector.toml");
    let (original, _) = ConnectorConfig::load_or_create(&path, "Lobby").unwrap();
    config::init(original.clone(), Some(path.clone()));

    let (tx, mut rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(config::watcher::run_config_watcher(
        path.clone(),
        tx,
        cancel.clone(),
    ));
    // Let the watcher take its baseline fingerprint first.
    tokio::time::sleep(Duration::from_millis(300)).await;

    std::fs::write(&path, "[intervals\npoll_secs = ").unwrap();
    match next_event(&mut rx).await {
        ConfigEvent::Error(reason) => assert!(reason.contains("connector.toml")),
        other => panic!("expected a rejected reload, got {other:?}"),
    }
    assert_eq!(config::get().server.code, original.server.code);

    let mut edited = original.clone();
    edited.logging.log_commands = !original.logging.log_commands;
    edited.save_to_file(&path).unwrap();
    match next_event(&mut rx).await {
        ConfigEvent::Reloaded(changes) => {
            assert!(changes.iter().any(|c| c.key == "logging.log_commands"));
        }
        other => panic!("expected a reload, got {other:?}"),
    }
    assert_eq!(config::get().logging.log_commands, edited.logging.log_commands);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .unwrap()
        .unwrap();
}
