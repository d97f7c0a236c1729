//! GameLink - game server ↔ control plane connector
//!
//! Wraps a dedicated game server process and links it to the control plane.
//!
//! # Usage
//!
//! ```bash
//! # Generate connector.toml with a fresh server code
//! gamelink init
//!
//! # Start the server and the connector
//! gamelink run
//!
//! # Check that the control plane accepts our server code
//! gamelink test
//! ```
//!
//! # Environment Variables
//!
//! - `GAMELINK_CONFIG`: Path to connector.toml (overridden by `--config`)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gamelink::bridge::{host_channel, ExecutionBridge};
use gamelink::config::{self, defaults, watcher, ConnectorConfig};
use gamelink::host::{process, HostProcess, ProcessCollector, RosterTracker};
use gamelink::link::{
    self, BreakerSettings, CircuitBreaker, CommandPoller, TelemetryCollector, TelemetryPublisher,
    Transport,
};
use gamelink::types::RemoteEndpoint;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "gamelink")]
#[command(about = "Links a game server to its web control plane")]
#[command(version)]
struct CliArgs {
    /// Path to connector.toml (default: $GAMELINK_CONFIG, then ./connector.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Start the game server and the connector (default)
    Run,

    /// Send one test request to the control plane
    Test,

    /// Print the server code and connection settings
    Info,

    /// Generate a config file with a new server code
    Init {
        /// Display name for this server
        #[arg(long, default_value = defaults::DEFAULT_SERVER_NAME)]
        name: String,
        /// Replace an existing config file (issues a new server code)
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    CommandPoller,
    RosterPublisher,
    ServerInfoPublisher,
    ConfigWatcher,
    GameServer,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::CommandPoller => write!(f, "CommandPoller"),
            TaskName::RosterPublisher => write!(f, "RosterPublisher"),
            TaskName::ServerInfoPublisher => write!(f, "ServerInfoPublisher"),
            TaskName::ConfigWatcher => write!(f, "ConfigWatcher"),
            TaskName::GameServer => write!(f, "GameServer"),
        }
    }
}

// ============================================================================
// Config Resolution
// ============================================================================

fn resolve_config_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(ConnectorConfig::locate)
        .unwrap_or_else(|| PathBuf::from(defaults::CONFIG_FILE_NAME))
}

/// Load an existing config; `test` and `info` never create one.
fn load_existing(path: &Path) -> Result<ConnectorConfig> {
    if !path.exists() {
        bail!(
            "{} not found — run `gamelink init` to generate one",
            path.display()
        );
    }
    let config = ConnectorConfig::load_from_file(path)?;
    config::init(config.clone(), Some(path.to_path_buf()));
    Ok(config)
}

fn build_publisher(config: &ConnectorConfig) -> Result<(Transport, Arc<CircuitBreaker>, TelemetryPublisher)> {
    let endpoint = RemoteEndpoint::from_config(config);
    let transport = Transport::new(endpoint, &config.web_server)?;
    let breaker = Arc::new(CircuitBreaker::new(BreakerSettings::from(&config.circuit_breaker)));
    let publisher = TelemetryPublisher::new(transport.clone(), Arc::clone(&breaker));
    Ok((transport, breaker, publisher))
}

// ============================================================================
// Subcommands
// ============================================================================

fn run_init(path: &Path, name: &str, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists — pass --force to replace it with a new server code",
            path.display()
        );
    }
    let config = ConnectorConfig::generate(name);
    config.save_to_file(path)?;

    println!("Server code: {}", config.server.code);
    println!("Config file: {}", path.display());
    println!("Register this code on the control-plane website to link the server.");
    Ok(())
}

fn run_info(path: &Path) -> Result<()> {
    let config = load_existing(path)?;
    let iv = &config.intervals;

    println!("GameLink {}", env!("CARGO_PKG_VERSION"));
    println!("  Server code:    {}", config.server.code);
    println!("  Server name:    {}", config.server.name);
    println!("  Control plane:  {}", config.web_server.base_url);
    println!("  Config file:    {}", path.display());
    println!(
        "  Intervals:      poll {}s (first after {}s), roster {}s, server info {}s",
        iv.poll_secs, iv.initial_poll_delay_secs, iv.roster_secs, iv.server_info_secs
    );
    println!(
        "  Host command:   {} {}",
        config.host.program,
        config.host.args.join(" ")
    );
    Ok(())
}

async fn run_test(path: &Path) -> Result<()> {
    let config = load_existing(path)?;
    let (_, _, publisher) = build_publisher(&config)?;

    info!(code = %config.server.code, "Testing control plane connection");
    match publisher.test_connection().await {
        Ok(()) => {
            println!("✓ Control plane accepted server code {}", config.server.code);
            Ok(())
        }
        Err(e) => bail!("connection test failed: {e}"),
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("🔒 Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("🔒 Supervisor: Task failed with error: {:#}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("🔒 Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("🔒 Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Wait for the remaining tasks to wind down after cancellation.
async fn drain_tasks(task_set: &mut JoinSet<Result<TaskName>>, deadline: Duration) {
    let drained = tokio::time::timeout(deadline, async {
        while let Some(result) = task_set.join_next().await {
            match result {
                Ok(Ok(task_name)) => info!("🔒 Supervisor: Task {} stopped", task_name),
                Ok(Err(e)) => warn!("🔒 Supervisor: Task failed during shutdown: {:#}", e),
                Err(e) => warn!("🔒 Supervisor: Task panicked during shutdown: {}", e),
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!("🔒 Supervisor: Tasks still running after {}s — abandoning them", deadline.as_secs());
        task_set.abort_all();
    }
}

// ============================================================================
// Connector
// ============================================================================

async fn run_connector(path: PathBuf, cancel_token: CancellationToken) -> Result<()> {
    let (config, created) = ConnectorConfig::load_or_create(&path, defaults::DEFAULT_SERVER_NAME)?;
    config::init(config.clone(), Some(path.clone()));

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  GameLink {}", env!("CARGO_PKG_VERSION"));
    info!("  Server: {} ({})", config.server.name, config.server.code);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if created {
        warn!("🆕 New server code generated: {}", config.server.code);
        warn!("   Register it on the control-plane website, then restart if commands do not arrive.");
    }

    let (transport, breaker, publisher) = build_publisher(&config)?;

    // Host side: child process, console writer, output reader, operator input
    let roster = Arc::new(RosterTracker::new().context("compiling console patterns")?);
    let (server, stdin, stdout) = HostProcess::spawn(&config.host)?;
    let (host, context) = host_channel();
    // Detached; the operator-input thread holds a handle until exit.
    process::spawn_console_writer(context, stdin);
    process::spawn_console_reader(stdout, Arc::clone(&roster));
    process::spawn_operator_input(host.clone()).context("starting operator input")?;

    let collector: Arc<dyn TelemetryCollector> =
        Arc::new(ProcessCollector::new(&config, Arc::clone(&roster), server.pid())?);
    let bridge = ExecutionBridge::new(host.clone(), &config.command_execution);
    let poller = Arc::new(CommandPoller::new(
        transport,
        breaker,
        bridge,
        publisher.clone(),
        Arc::clone(&collector),
    ));

    match publisher.test_connection().await {
        Ok(()) => info!("✓ Control plane accepted server code"),
        Err(e) => warn!(error = %e, "⚠️  Control plane test failed — will keep retrying in the background"),
    }

    info!("🔒 Supervisor: Initializing task monitoring");
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    let iv = &config.intervals;
    let poll_every = Duration::from_secs(iv.poll_secs);
    let poll_delay = Duration::from_secs(iv.initial_poll_delay_secs);
    let roster_every = Duration::from_secs(iv.roster_secs);
    let info_every = Duration::from_secs(iv.server_info_secs);

    // Task 1: Game server lifecycle
    let server_cancel = cancel_token.clone();
    let server_host = host.clone();
    let host_settings = config.host.clone();
    task_set.spawn(async move {
        server.supervise(server_host, host_settings, server_cancel).await?;
        Ok(TaskName::GameServer)
    });

    // Task 2: Command poller
    let poll_cancel = cancel_token.clone();
    task_set.spawn(async move {
        link::run_poll_loop(poller, poll_every, poll_delay, poll_cancel).await;
        Ok(TaskName::CommandPoller)
    });

    // Task 3: Roster publisher (also fires on join/leave)
    let roster_cancel = cancel_token.clone();
    let roster_publisher = publisher.clone();
    let roster_collector = Arc::clone(&collector);
    let roster_signal = roster.change_signal();
    task_set.spawn(async move {
        link::run_roster_loop(
            roster_publisher,
            roster_collector,
            roster_every,
            Some(roster_signal),
            roster_cancel,
        )
        .await;
        Ok(TaskName::RosterPublisher)
    });

    // Task 4: Server info publisher
    let info_cancel = cancel_token.clone();
    let info_publisher = publisher.clone();
    task_set.spawn(async move {
        link::run_server_info_loop(
            info_publisher,
            collector,
            info_every,
            info_cancel,
        )
        .await;
        Ok(TaskName::ServerInfoPublisher)
    });

    // Task 5: Config hot-reload
    let watch_cancel = cancel_token.clone();
    task_set.spawn(async move {
        let (tx, mut rx) = mpsc::channel(8);
        let drain = async {
            while let Some(event) = rx.recv().await {
                match event {
                    watcher::ConfigEvent::Reloaded(changes) => {
                        info!(changed = changes.len(), "🔄 Config reloaded");
                    }
                    watcher::ConfigEvent::Error(reason) => {
                        error!(%reason, "Rejected edited config — previous config stays active");
                    }
                }
            }
        };
        tokio::join!(watcher::run_config_watcher(path, tx, watch_cancel), drain);
        Ok(TaskName::ConfigWatcher)
    });

    let outcome = run_supervisor(&mut task_set, cancel_token.clone()).await;

    // Everything follows the game server down; give it time to save.
    cancel_token.cancel();
    drain_tasks(&mut task_set, config.host.stop_timeout() + Duration::from_secs(5)).await;

    info!("📤 Sending shutdown notice to control plane");
    let notice = publisher.publish_shutdown().await;
    info!(result = %notice, "Shutdown notice");

    outcome
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // Server console output owns stdout; logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let path = resolve_config_path(args.config);

    match args.command.unwrap_or(SubCommand::Run) {
        SubCommand::Init { name, force } => run_init(&path, &name, force),
        SubCommand::Info => run_info(&path),
        SubCommand::Test => run_test(&path).await,
        SubCommand::Run => {
            // Graceful shutdown via Ctrl+C
            let cancel_token = CancellationToken::new();
            let shutdown_token = cancel_token.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("🛑 Received Ctrl+C, initiating shutdown...");
                shutdown_token.cancel();
            });

            run_connector(path, cancel_token).await?;
            info!("👋 GameLink stopped");
            Ok(())
        }
    }
}
