//! Config Tests
//!
//! File-level behaviour of connector.toml: typo warnings, first-run
//! generation, and hot reload through the global config slot.

use gamelink::config::{self, validation, ConnectorConfig};

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_interval_key_suggests_correction() {
    let toml_str = r#"
[intervals]
pol_secs = 3
"#;
    let warnings = validation::validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].field.contains("pol_secs"));
    assert_eq!(warnings[0].suggestion.as_deref(), Some("intervals.poll_secs"));
}

#[test]
fn full_generated_file_has_no_unknown_keys() {
    let toml_str = ConnectorConfig::generate("Lobby").to_toml().unwrap();
    assert!(validation::validate_unknown_keys(&toml_str).is_empty());
}

#[test]
fn unknown_keys_do_not_block_loading() {
    let toml_str = r#"
[server]
code = "GB-AAAA-BBBB-CCCC"
nmae = "typo"

[web_server]
base_url = "https://panel.example.net/api"
"#;
    let config = ConnectorConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.server.code, "GB-AAAA-BBBB-CCCC");
    assert_eq!(config.web_server.base_url, "https://panel.example.net/api");
}

#[test]
fn invalid_values_fail_with_every_problem_listed() {
    let toml_str = r#"
[web_server]
base_url = "panel.example.net"

[command_execution]
wait_ceiling_secs = 0

[host]
program = ""
"#;
    let err = ConnectorConfig::from_toml_str(toml_str).unwrap_err().to_string();
    assert!(err.contains("web_server.base_url"));
    assert!(err.contains("wait_ceiling_secs"));
    assert!(err.contains("host.program"));
}

// ============================================================================
// First Run + Hot Reload
// ============================================================================

#[test]
fn generated_file_reloads_with_live_and_restart_only_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("connector.toml");

    let (config, created) = ConnectorConfig::load_or_create(&path, "Creative").unwrap();
    assert!(created);
    assert!(config.server.code.starts_with("GB-"));
    config::init(config.clone(), Some(path.clone()));
    assert_eq!(config::path(), Some(path.as_path()));
    assert!(config::get().logging.log_commands);

    let mut edited = config.clone();
    edited.logging.log_commands = false;
    edited.intervals.poll_secs = 15;
    edited.save_to_file(&path).unwrap();

    let changes = config::reload().unwrap();
    let keys: Vec<&str> = changes.iter().map(|c| c.key.as_str()).collect();
    assert!(keys.contains(&"logging.log_commands"));
    assert!(keys.contains(&"intervals.poll_secs"));
    assert!(!config::get().logging.log_commands);

    let restart = config::check_non_reloadable(&changes);
    assert_eq!(restart.len(), 1);
    assert!(restart[0].contains("intervals.poll_secs"));

    // A broken edit leaves the previous config active.
    std::fs::write(&path, "[intervals\npoll_secs = ").unwrap();
    assert!(config::reload().is_err());
    assert_eq!(config::get().intervals.poll_secs, 15);
}
