//! Game version → network protocol number

/// Protocol reported when the version is unknown (newest in the table).
pub const DEFAULT_PROTOCOL: u32 = 765;

const PROTOCOLS: &[(&str, u32)] = &[
    ("1.20.4", 765),
    ("1.20.3", 765),
    ("1.20.2", 764),
    ("1.20.1", 763),
    ("1.20", 763),
    ("1.19.4", 762),
    ("1.19.3", 761),
    ("1.19.2", 760),
    ("1.19.1", 759),
    ("1.19", 759),
    ("1.18.2", 758),
    ("1.18.1", 757),
    ("1.18", 757),
    ("1.17.1", 756),
    ("1.17", 755),
    ("1.16.5", 754),
    ("1.16.4", 754),
    ("1.16.3", 753),
    ("1.16.2", 751),
    ("1.16.1", 736),
    ("1.16", 735),
];

/// Look up the protocol number for a version string such as `1.20.4` or
/// `git-Paper-496 (MC: 1.20.4)`.
pub fn protocol_for(version: &str) -> u32 {
    let bare = extract_mc_version(version).unwrap_or(version);
    PROTOCOLS
        .iter()
        .find(|(v, _)| *v == bare)
        .map_or(DEFAULT_PROTOCOL, |(_, p)| *p)
}

/// Pull `1.20.4` out of `... (MC: 1.20.4)`.
fn extract_mc_version(version: &str) -> Option<&str> {
    let start = version.find("MC: ")? + 4;
    let rest = &version[start..];
    let end = rest.find(')').unwrap_or(rest.len());
    Some(rest[..end].trim())
}
