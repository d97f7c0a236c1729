//! Host execution context
//!
//! The host owns exactly one serialized context (a game's main thread, a
//! console writer). `HostContext` is that context's inbox; `HostHandle` is the
//! cloneable sender every other task uses to schedule work onto it. Each unit
//! of work carries a `oneshot` sender that resolves exactly once.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::defaults::HOST_QUEUE_WARN_DEPTH;

/// What the host reports for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostExecution {
    pub success: bool,
    pub output: String,
}

/// Runs commands inside the host's serialized context.
///
/// Only ever called from the thread or task driving `HostContext`, so
/// implementations may hold non-thread-safe host state.
pub trait HostCommandExecutor {
    fn run_on_host_context(&mut self, command: &str) -> anyhow::Result<HostExecution>;
}

impl<F> HostCommandExecutor for F
where
    F: FnMut(&str) -> anyhow::Result<HostExecution>,
{
    fn run_on_host_context(&mut self, command: &str) -> anyhow::Result<HostExecution> {
        self(command)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum HostError {
    /// The host context has shut down; nothing can be scheduled.
    #[error("host context unavailable")]
    Closed,
    /// The executor returned an error.
    #[error("{0}")]
    Fault(String),
    #[error("host panicked: {0}")]
    Panicked(String),
}

pub type HostReply = Result<HostExecution, HostError>;

struct HostTask {
    command: String,
    /// `None` for fire-and-forget submissions.
    respond_to: Option<oneshot::Sender<HostReply>>,
}

/// Create a connected handle / context pair.
pub fn host_channel() -> (HostHandle, HostContext) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    (
        HostHandle {
            tx,
            pending: Arc::clone(&pending),
        },
        HostContext { rx, pending },
    )
}

// ============================================================================
// Handle (any task)
// ============================================================================

/// Schedules work onto the host context. Never blocks.
#[derive(Clone)]
pub struct HostHandle {
    tx: mpsc::UnboundedSender<HostTask>,
    pending: Arc<AtomicUsize>,
}

impl HostHandle {
    /// Enqueue `command` and return the receiver its result arrives on.
    pub fn schedule(&self, command: &str) -> Result<oneshot::Receiver<HostReply>, HostError> {
        let (respond_to, reply) = oneshot::channel();
        self.enqueue(HostTask {
            command: command.to_string(),
            respond_to: Some(respond_to),
        })?;
        Ok(reply)
    }

    /// Enqueue `command` without waiting for its result.
    pub fn submit(&self, command: &str) -> Result<(), HostError> {
        self.enqueue(HostTask {
            command: command.to_string(),
            respond_to: None,
        })
    }

    /// Units of work queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    fn enqueue(&self, task: HostTask) -> Result<(), HostError> {
        // Count before sending so the context can never decrement first.
        let depth = self.pending.fetch_add(1, Ordering::Relaxed) + 1;
        if self.tx.send(task).is_err() {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            return Err(HostError::Closed);
        }
        if depth % HOST_QUEUE_WARN_DEPTH == 0 {
            warn!(depth, "Host context is falling behind — commands are queueing up");
        }
        Ok(())
    }
}

// ============================================================================
// Context (host side)
// ============================================================================

/// The host's end of the channel. Drive it from the serialized context with
/// one of the `run*` methods, or take jobs one at a time with `next_job`.
pub struct HostContext {
    rx: mpsc::UnboundedReceiver<HostTask>,
    pending: Arc<AtomicUsize>,
}

impl HostContext {
    /// Block the current thread, running work until every handle is dropped.
    ///
    /// Must not be called from inside an async runtime.
    pub fn run_blocking<E: HostCommandExecutor + ?Sized>(mut self, executor: &mut E) {
        while let Some(task) = self.rx.blocking_recv() {
            self.job(task).execute(executor);
        }
        debug!("Host context closed");
    }

    /// Run everything currently queued without waiting. For hosts that pump
    /// the queue from their own tick loop. Returns the number of units run.
    pub fn run_pending<E: HostCommandExecutor + ?Sized>(&mut self, executor: &mut E) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            self.job(task).execute(executor);
            ran += 1;
        }
        ran
    }

    /// Wait for the next unit of work. `None` once every handle is dropped.
    ///
    /// For async hosts; the caller must finish one job before taking the next.
    pub async fn next_job(&mut self) -> Option<HostJob> {
        let task = self.rx.recv().await?;
        Some(self.job(task))
    }

    fn job(&self, task: HostTask) -> HostJob {
        HostJob {
            command: task.command,
            respond_to: task.respond_to,
            pending: Some(Arc::clone(&self.pending)),
        }
    }
}

/// One unit of work taken off the context.
///
/// Finishing or dropping it releases its slot in the pending count. A job
/// dropped unfinished leaves its waiter with `HostError::Closed`.
pub struct HostJob {
    command: String,
    respond_to: Option<oneshot::Sender<HostReply>>,
    pending: Option<Arc<AtomicUsize>>,
}

impl HostJob {
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Report the result. Executor errors become `HostError::Fault`.
    pub fn finish(self, result: anyhow::Result<HostExecution>) {
        self.complete(result.map_err(|e| HostError::Fault(format!("{e:#}"))));
    }

    fn execute<E: HostCommandExecutor + ?Sized>(self, executor: &mut E) {
        let reply = match catch_unwind(AssertUnwindSafe(|| executor.run_on_host_context(&self.command))) {
            Ok(Ok(execution)) => Ok(execution),
            Ok(Err(e)) => Err(HostError::Fault(format!("{e:#}"))),
            Err(payload) => Err(HostError::Panicked(panic_message(payload.as_ref()))),
        };
        self.complete(reply);
    }

    fn complete(mut self, reply: HostReply) {
        self.release();

        if let Err(ref e) = reply {
            debug!(error = %e, "Host command faulted");
        }

        // The waiter may have timed out and gone; the work still counts as done.
        if let Some(tx) = self.respond_to.take() {
            let _ = tx.send(reply);
        }
    }

    fn release(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

impl Drop for HostJob {
    fn drop(&mut self) {
        self.release();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
