//! Host system facts: memory, addresses, disk usage, installed plugins

use anyhow::Context;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use walkdir::WalkDir;

use crate::types::PluginInfo;

// ============================================================================
// OS / Memory
// ============================================================================

/// `linux 6.1.0 (x86_64)` style description.
pub fn os_info() -> String {
    let release = std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if release.is_empty() {
        format!("{} ({})", std::env::consts::OS, std::env::consts::ARCH)
    } else {
        format!(
            "{} {} ({})",
            std::env::consts::OS,
            release,
            std::env::consts::ARCH
        )
    }
}

/// Resident memory of `pid` in MB, from `/proc/<pid>/status`.
pub fn process_rss_mb(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    parse_kb_field(&status, "VmRSS:").map(|kb| kb / 1024)
}

/// Total system memory in MB, from `/proc/meminfo`.
pub fn total_memory_mb() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_kb_field(&meminfo, "MemTotal:").map(|kb| kb / 1024)
}

/// Find `<field>   12345 kB` and return the number.
fn parse_kb_field(text: &str, field: &str) -> Option<u64> {
    text.lines()
        .find_map(|line| line.strip_prefix(field))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
}

// ============================================================================
// Addresses
// ============================================================================

/// Address of the interface that routes to the internet.
///
/// Connecting a UDP socket only selects a route; nothing is sent.
pub fn internal_ip() -> Option<String> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then(|| ip.to_string())
}

/// A globally routable IPv4 address, as echo services should return.
pub fn is_public_ipv4(ip: Ipv4Addr) -> bool {
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        // 100.64.0.0/10 carrier-grade NAT
        || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xC0) == 64))
}

/// Ask each echo service in turn; the first public IPv4 wins.
pub async fn discover_external_ip(http: &reqwest::Client, services: &[&str]) -> Option<String> {
    for service in services {
        let body = match http.get(*service).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            Ok(resp) => {
                debug!(service, status = resp.status().as_u16(), "IP echo service refused");
                None
            }
            Err(e) => {
                debug!(service, error = %e, "IP echo service unreachable");
                None
            }
        };

        if let Some(IpAddr::V4(ip)) = body.and_then(|b| b.trim().parse::<IpAddr>().ok()) {
            if is_public_ipv4(ip) {
                return Some(ip.to_string());
            }
        }
    }
    None
}

/// Short-timeout client for the echo services.
pub fn echo_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .connect_timeout(Duration::from_secs(2))
        .build()
        .context("building IP echo client")
}

// ============================================================================
// Files
// ============================================================================

/// Total size of every file under `dir`, in bytes. Unreadable entries are
/// skipped and symlinks are not followed.
pub fn dir_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

/// Plugins from `<dir>/plugins/*.jar`, sorted by name.
///
/// `Name-1.2.3.jar` yields name `Name`, version `1.2.3`.
pub fn scan_plugins(dir: &Path) -> Vec<PluginInfo> {
    let Ok(entries) = std::fs::read_dir(dir.join("plugins")) else {
        return Vec::new();
    };

    let mut plugins: Vec<PluginInfo> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let is_jar = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"));
            if !is_jar {
                return None;
            }
            let stem = path.file_stem()?.to_string_lossy().to_string();
            Some(split_plugin_name(&stem))
        })
        .collect();
    plugins.sort_by(|a, b| a.name.cmp(&b.name));
    plugins
}

fn split_plugin_name(stem: &str) -> PluginInfo {
    let split = stem
        .rfind(&['-', '_'][..])
        .filter(|&i| stem[i + 1..].starts_with(|c: char| c.is_ascii_digit()));

    match split {
        Some(i) => PluginInfo {
            name: stem[..i].to_string(),
            version: stem[i + 1..].to_string(),
            enabled: true,
        },
        None => PluginInfo {
            name: stem.to_string(),
            version: "unknown".to_string(),
            enabled: true,
        },
    }
}

/// Number of entries in `<dir>/ops.json`.
pub fn op_count(dir: &Path) -> u32 {
    std::fs::read_to_string(dir.join("ops.json"))
        .ok()
        .and_then(|raw| serde_json::from_str::<Vec<serde_json::Value>>(&raw).ok())
        .map_or(0, |ops| u32::try_from(ops.len()).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kb_field_parsing() {
        let status = "Name:\tjava\nVmRSS:\t  2097152 kB\nThreads:\t40\n";
        assert_eq!(parse_kb_field(status, "VmRSS:"), Some(2_097_152));
        assert_eq!(parse_kb_field(status, "MemTotal:"), None);
    }

    #[test]
    fn public_ipv4_filter() {
        assert!(is_public_ipv4(Ipv4Addr::new(203, 0, 114, 7)));
        assert!(is_public_ipv4(Ipv4Addr::new(8, 8, 8, 8)));
        assert!(!is_public_ipv4(Ipv4Addr::new(192, 168, 1, 10)));
        assert!(!is_public_ipv4(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(!is_public_ipv4(Ipv4Addr::new(127, 0, 0, 1)));
        assert!(!is_public_ipv4(Ipv4Addr::new(100, 72, 0, 1)));
        assert!(!is_public_ipv4(Ipv4Addr::new(203, 0, 113, 7)));
    }

    #[test]
    fn plugin_names_and_versions() {
        assert_eq!(
            split_plugin_name("EssentialsX-2.20.1"),
            PluginInfo { name: "EssentialsX".into(), version: "2.20.1".into(), enabled: true }
        );
        assert_eq!(split_plugin_name("WorldEdit").version, "unknown");
        assert_eq!(split_plugin_name("Multi-Word-Plugin").name, "Multi-Word-Plugin");
    }

    #[test]
    fn directory_scans() {
        let dir = tempfile::tempdir().unwrap();
        let world = dir.path().join("world").join("region");
        std::fs::create_dir_all(&world).unwrap();
        std::fs::write(world.join("r.0.0.mca"), vec![0u8; 4096]).unwrap();
        std::fs::write(dir.path().join("world").join("level.dat"), vec![0u8; 100]).unwrap();

        let plugins = dir.path().join("plugins");
        std::fs::create_dir_all(&plugins).unwrap();
        std::fs::write(plugins.join("Vault-1.7.3.jar"), b"").unwrap();
        std::fs::write(plugins.join("config.yml"), b"").unwrap();

        std::fs::write(dir.path().join("ops.json"), r#"[{"name":"Ann"},{"name":"Bob"}]"#).unwrap();

        assert_eq!(dir_size(&dir.path().join("world")), 4196);
        let found = scan_plugins(dir.path());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Vault");
        assert_eq!(op_count(dir.path()), 2);
        assert_eq!(op_count(&dir.path().join("missing")), 0);
    }

    #[cfg(unix)]
    #[test]
    fn dir_size_does_not_follow_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let world = dir.path().join("world");
        std::fs::create_dir_all(&world).unwrap();
        std::fs::write(world.join("level.dat"), vec![0u8; 100]).unwrap();

        let outside = dir.path().join("backups");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("old.zip"), vec![0u8; 5000]).unwrap();
        std::os::unix::fs::symlink(&outside, world.join("backups")).unwrap();
        std::os::unix::fs::symlink(&world, world.join("loop")).unwrap();

        assert_eq!(dir_size(&world), 100);
        assert_eq!(dir_size(&dir.path().join("missing")), 0);
    }
}
