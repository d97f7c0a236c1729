//! `TelemetryCollector` for a wrapped server process
//!
//! Roster and version come from the console (`RosterTracker`); everything
//! else is read from the server directory and the OS on each snapshot.

use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::properties::ServerProperties;
use super::roster::RosterTracker;
use super::{system, versions};
use crate::config::{self, defaults, ConnectorConfig};
use crate::link::TelemetryCollector;
use crate::types::{PlayerInfo, PluginInfo, ServerInfo};

/// Facts read from disk in one blocking pass.
struct DiskFacts {
    properties: ServerProperties,
    world_size: u64,
    plugins: Vec<PluginInfo>,
    op_count: u32,
}

pub struct ProcessCollector {
    server_code: String,
    server_name: String,
    working_dir: PathBuf,
    fallback_max_players: u32,
    roster: Arc<RosterTracker>,
    pid: Option<u32>,
    started_at: Instant,
    echo: reqwest::Client,
    /// Last external-IP lookup and when it was made.
    external_ip: Mutex<Option<(Instant, Option<String>)>>,
}

impl ProcessCollector {
    pub fn new(config: &ConnectorConfig, roster: Arc<RosterTracker>, pid: Option<u32>) -> anyhow::Result<Self> {
        Ok(Self {
            server_code: config.server.code.clone(),
            server_name: config.server.name.clone(),
            working_dir: config.host.working_dir.clone(),
            fallback_max_players: config.host.max_players,
            roster,
            pid,
            started_at: Instant::now(),
            echo: system::echo_client()?,
            external_ip: Mutex::new(None),
        })
    }

    async fn external_ip(&self) -> Option<String> {
        let mut cached = self.external_ip.lock().await;
        let ttl = Duration::from_secs(defaults::EXTERNAL_IP_CACHE_SECS);
        if let Some((at, ip)) = cached.as_ref() {
            if at.elapsed() < ttl {
                return ip.clone();
            }
        }

        let ip = system::discover_external_ip(&self.echo, defaults::EXTERNAL_IP_SERVICES).await;
        if ip.is_none() {
            tracing::debug!("No IP echo service returned a public IPv4 address");
        }
        *cached = Some((Instant::now(), ip.clone()));
        ip
    }

    async fn read_disk(&self, with_plugins: bool) -> anyhow::Result<DiskFacts> {
        let dir = self.working_dir.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<DiskFacts> {
            let properties = ServerProperties::load(&dir)?;
            let world_size = system::dir_size(&dir.join(properties.level_name()));
            let plugins = if with_plugins {
                system::scan_plugins(&dir)
            } else {
                Vec::new()
            };
            Ok(DiskFacts {
                world_size,
                plugins,
                op_count: system::op_count(&dir),
                properties,
            })
        })
        .await
        .context("disk scan task panicked")?
    }
}

#[async_trait]
impl TelemetryCollector for ProcessCollector {
    async fn collect_roster(&self) -> anyhow::Result<Vec<PlayerInfo>> {
        Ok(self.roster.players())
    }

    async fn collect_server_snapshot(&self) -> anyhow::Result<ServerInfo> {
        let collection = config::get().data_collection.clone();
        let disk = self.read_disk(collection.collect_plugins).await?;
        let props = &disk.properties;
        let players = self.roster.players();
        let version = self.roster.version().unwrap_or_else(|| "unknown".to_string());

        let mut info = ServerInfo {
            server_code: self.server_code.clone(),
            server_name: self.server_name.clone(),
            internal_ip: system::internal_ip(),
            external_ip: self.external_ip().await,
            server_port: props.server_port(),
            motd: props.motd().to_string(),
            protocol_version: versions::protocol_for(&version),
            version,
            max_players: props.max_players().unwrap_or(self.fallback_max_players),
            online_players: u32::try_from(players.len()).unwrap_or(u32::MAX),
            tps: defaults::DEFAULT_TPS,
            os_info: system::os_info(),
            gamemode: props.gamemode().to_string(),
            difficulty: props.difficulty().to_string(),
            pvp_enabled: props.pvp(),
            whitelist_enabled: props.white_list(),
            world_name: props.level_name().to_string(),
            world_size: disk.world_size,
            plugins: disk.plugins,
            op_count: disk.op_count,
            ..ServerInfo::default()
        };

        if collection.collect_performance {
            info.server_uptime = u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
            let used = self.pid.and_then(system::process_rss_mb).unwrap_or(0);
            let total = system::total_memory_mb().unwrap_or(0);
            info.set_memory(used, total);
        }

        Ok(info)
    }
}
