//! Config linting: unknown keys (with "did you mean" hints) and values that
//! parse fine but are likely mistakes. Nothing here rejects a file.

use std::collections::HashSet;

/// A non-fatal config finding.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.suggestion {
            Some(s) => write!(f, "{} (did you mean '{s}'?)", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Fields per section. Keep in step with connector_config.rs.
const SECTIONS: &[(&str, &[&str])] = &[
    ("server", &["code", "name", "description", "created_at", "last_updated"]),
    ("web_server", &["base_url", "request_timeout_secs", "connect_timeout_secs"]),
    (
        "intervals",
        &["poll_secs", "initial_poll_delay_secs", "roster_secs", "server_info_secs"],
    ),
    (
        "circuit_breaker",
        &["failure_threshold", "cooldown_secs", "backoff_base_secs", "backoff_max_secs"],
    ),
    (
        "command_execution",
        &["wait_ceiling_secs", "max_command_length", "player_placeholder"],
    ),
    (
        "data_collection",
        &["collect_server_info", "collect_player_list", "collect_performance", "collect_plugins"],
    ),
    ("logging", &["log_commands", "log_errors"]),
    (
        "host",
        &["program", "args", "working_dir", "max_players", "stop_command", "stop_timeout_secs"],
    ),
];

/// Every valid dotted key, sections included.
pub fn known_config_keys() -> HashSet<String> {
    SECTIONS
        .iter()
        .flat_map(|(section, fields)| {
            std::iter::once((*section).to_string())
                .chain(fields.iter().map(move |f| format!("{section}.{f}")))
        })
        .collect()
}

/// Dotted paths of every table key in `value`. Arrays are leaves.
pub fn walk_toml_keys(value: &toml::Value) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![(String::new(), value)];
    while let Some((prefix, node)) = stack.pop() {
        let Some(table) = node.as_table() else { continue };
        for (key, child) in table {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            if child.is_table() {
                stack.push((path.clone(), child));
            }
            out.push(path);
        }
    }
    out
}

/// Levenshtein distance over chars, one row of state.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = (above + 1)
                .min(row[j] + 1)
                .min(diagonal + usize::from(ca != cb));
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Closest known key within 3 edits. Ties go to the alphabetically first.
pub fn suggest_correction(unknown: &str, known: &HashSet<String>) -> Option<String> {
    known
        .iter()
        .map(|k| (edit_distance(unknown, k), k))
        .filter(|(d, _)| *d <= 3)
        .min()
        .map(|(_, k)| k.clone())
}

/// Warnings for keys in `raw_toml` that no config field reads.
///
/// Syntax errors yield nothing here; serde reports them when the file loads.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    let mut unknown: Vec<String> = walk_toml_keys(&value)
        .into_iter()
        .filter(|key| !known.contains(key))
        .collect();
    unknown.sort();

    unknown
        .into_iter()
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Suspicious Values
// ============================================================================

/// Values that are legal but probably not what the operator wants.
pub fn validate_suspicious_values(config: &super::ConnectorConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |field: &str, message: String| {
        warnings.push(ValidationWarning {
            field: field.to_string(),
            message,
            suggestion: None,
        });
    };

    if config.server.code == "GB-UNKNOWN" {
        warn(
            "server.code",
            "server.code is the placeholder 'GB-UNKNOWN' — the control plane will not recognise this server".to_string(),
        );
    }
    if config.web_server.base_url.starts_with("http://") {
        warn(
            "web_server.base_url",
            "web_server.base_url uses plain http — the server code travels unencrypted".to_string(),
        );
    }
    if config.web_server.request_timeout_secs > 30 {
        warn(
            "web_server.request_timeout_secs",
            format!(
                "web_server.request_timeout_secs = {} — a hung backend will stall command polling for that long",
                config.web_server.request_timeout_secs
            ),
        );
    }
    if config.intervals.poll_secs > 60 {
        warn(
            "intervals.poll_secs",
            format!(
                "intervals.poll_secs = {} — queued commands may wait over a minute before running",
                config.intervals.poll_secs
            ),
        );
    }
    if config.command_execution.wait_ceiling_secs > 30 {
        warn(
            "command_execution.wait_ceiling_secs",
            format!(
                "command_execution.wait_ceiling_secs = {} — one slow command delays every command behind it",
                config.command_execution.wait_ceiling_secs
            ),
        );
    }

    warnings
}
