//! Wrapped server process
//!
//! - **console writer** (task): drains `HostContext` into the child's stdin
//! - **console reader** (task): echoes child stdout and feeds the roster tracker
//! - **operator input** (thread): forwards lines typed on our stdin to the
//!   host context
//!
//! `supervise` watches for exit and drives a graceful stop.

use anyhow::{bail, Context};
use std::io::BufRead;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::console::serve_console;
use super::roster::RosterTracker;
use crate::bridge::{HostContext, HostHandle};
use crate::config::HostConfig;

pub struct HostProcess {
    child: Child,
    program: String,
}

impl HostProcess {
    /// Launch the server with piped stdin/stdout. Stderr is inherited.
    pub fn spawn(host: &HostConfig) -> anyhow::Result<(Self, ChildStdin, ChildStdout)> {
        if !host.working_dir.is_dir() {
            bail!(
                "host.working_dir '{}' is not a directory",
                host.working_dir.display()
            );
        }

        let mut child = Command::new(&host.program)
            .args(&host.args)
            .current_dir(&host.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start '{}'", host.program))?;

        let stdin = child.stdin.take().context("child stdin was not piped")?;
        let stdout = child.stdout.take().context("child stdout was not piped")?;

        info!(program = %host.program, pid = child.id(), "🚀 Game server started");
        Ok((
            Self {
                child,
                program: host.program.clone(),
            },
            stdin,
            stdout,
        ))
    }

    /// `None` once the process has been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Resolve when the process exits. Cancel safe.
    pub async fn wait_exit(&mut self) -> anyhow::Result<ExitStatus> {
        self.child.wait().await.context("waiting for server process")
    }

    /// Ask the server to stop through its console, then kill it after `grace`.
    pub async fn stop(
        &mut self,
        host: &HostHandle,
        stop_command: &str,
        grace: Duration,
    ) -> anyhow::Result<ExitStatus> {
        if let Err(e) = host.submit(stop_command) {
            warn!(error = %e, "Could not send stop command — killing server");
        } else {
            info!(command = stop_command, grace_secs = grace.as_secs(), "Stopping game server");
            if let Ok(status) = tokio::time::timeout(grace, self.wait_exit()).await {
                return status;
            }
            warn!(program = %self.program, "Server did not exit in time — killing it");
        }

        self.child.start_kill().context("killing server process")?;
        self.wait_exit().await
    }

    /// Run until the server exits on its own or `cancel` fires.
    ///
    /// Cancels `cancel` on the way out so the rest of the connector follows
    /// the server down.
    pub async fn supervise(
        mut self,
        host: HostHandle,
        settings: HostConfig,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let exited = tokio::select! {
            status = self.wait_exit() => Some(status?),
            () = cancel.cancelled() => None,
        };

        let status = match exited {
            Some(status) => {
                info!(%status, "Game server exited");
                status
            }
            None => {
                let status = self
                    .stop(&host, &settings.stop_command, settings.stop_timeout())
                    .await?;
                info!(%status, "Game server stopped");
                status
            }
        };

        cancel.cancel();
        if !status.success() {
            debug!(code = ?status.code(), "Server exit status was not zero");
        }
        Ok(())
    }
}

/// Drain the host context into the server's stdin.
pub fn spawn_console_writer(context: HostContext, stdin: ChildStdin) -> JoinHandle<()> {
    tokio::spawn(serve_console(context, stdin))
}

/// Echo server output and feed each line to the roster tracker. The roster
/// is cleared when the output closes.
pub fn spawn_console_reader(stdout: ChildStdout, roster: Arc<RosterTracker>) -> JoinHandle<()> {
    tokio::spawn(async move {
        pump_console(stdout, &roster, tokio::io::stdout()).await;
        roster.clear();
        debug!("Server output closed");
    })
}

/// Copy lines from `source` to `echo`, observing each one. Lossy on bad UTF-8.
pub async fn pump_console<R, W>(source: R, roster: &RosterTracker, mut echo: W)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(&['\r', '\n'][..]);
                let _ = echo.write_all(format!("{line}\n").as_bytes()).await;
                let _ = echo.flush().await;
                roster.observe(line);
            }
            Err(e) => {
                warn!(error = %e, "Reading server output failed");
                break;
            }
        }
    }
}

/// Forward operator console input to the host context.
///
/// The thread is detached: blocking stdin reads cannot be interrupted, and
/// the process exits around it.
pub fn spawn_operator_input(host: HostHandle) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("operator-input".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if host.submit(&line).is_err() {
                    break;
                }
            }
        })?;
    Ok(())
}
