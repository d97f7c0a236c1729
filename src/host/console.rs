//! Server console: one command line per unit of work on the server's stdin

use anyhow::{bail, Context};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::bridge::{HostContext, HostExecution};

/// The line actually written for `command`.
///
/// The console takes commands without the chat slash, and a line break would
/// smuggle a second command in.
pub fn console_line(command: &str) -> anyhow::Result<&str> {
    if command.contains(&['\n', '\r'][..]) {
        bail!("command contains a line break");
    }
    Ok(command.trim().trim_start_matches('/'))
}

/// Write one command to the console and flush it.
pub async fn write_command<W>(console: &mut W, command: &str) -> anyhow::Result<HostExecution>
where
    W: AsyncWrite + Unpin,
{
    let line = console_line(command)?;
    let mut framed = Vec::with_capacity(line.len() + 1);
    framed.extend_from_slice(line.as_bytes());
    framed.push(b'\n');

    console
        .write_all(&framed)
        .await
        .context("writing to server console")?;
    console.flush().await.context("flushing server console")?;

    Ok(HostExecution {
        success: true,
        output: "sent to server console".to_string(),
    })
}

/// Drive the host context into the console until every handle is dropped.
///
/// This task is the only writer, so commands never interleave.
pub async fn serve_console<W>(mut context: HostContext, mut console: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(job) = context.next_job().await {
        let result = write_command(&mut console, job.command()).await;
        job.finish(result);
    }
    debug!("Server console closed");
}
