//! Background parsing worker.
//!
//! Runs the CPU-bound parse on tokio's blocking pool and reports back over an
//! `mpsc` channel: zero or more [`WorkerMessage::Progress`] messages followed
//! by exactly one [`WorkerMessage::Finished`]. Nothing is shared with the
//! caller; the text moves in and the result moves out.

use std::any::Any;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use billing_core::error::{BillingError, Result};
use billing_data::pipeline::{analyze_csv, AnalysisResult};
use billing_data::reader::{ParseOptions, ParseProgress};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Channel capacity; the parser blocks when the consumer falls this far
/// behind.
pub(crate) const MESSAGE_BUFFER: usize = 16;

// ── Public types ──────────────────────────────────────────────────────────────

/// One message on the worker channel.
#[derive(Debug)]
pub enum WorkerMessage {
    Progress(ParseProgress),
    /// Terminal message; nothing follows it.
    Finished(Result<AnalysisResult>),
}

/// Sending half handed to a running job.
pub struct ProgressSink {
    tx: mpsc::Sender<WorkerMessage>,
    cancelled: Arc<AtomicBool>,
}

impl ProgressSink {
    /// Forward `progress`; `Break` once the job was aborted or nobody is
    /// listening any more.
    pub fn report(&self, progress: ParseProgress) -> ControlFlow<()> {
        if self.cancelled.load(Ordering::Acquire) {
            debug!(processed = progress.processed, "parse job aborted; stopping parse");
            return ControlFlow::Break(());
        }
        match self.tx.blocking_send(WorkerMessage::Progress(progress)) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => {
                debug!("progress receiver dropped; stopping parse");
                ControlFlow::Break(())
            }
        }
    }
}

// ── ParseWorker ───────────────────────────────────────────────────────────────

/// Spawns parse jobs.
///
/// ```no_run
/// # async fn demo(text: String) {
/// use billing_runtime::worker::{ParseWorker, WorkerMessage};
///
/// let (mut rx, _handle) = ParseWorker::default().start(text);
/// while let Some(message) = rx.recv().await {
///     if let WorkerMessage::Finished(result) = message {
///         println!("ok: {}", result.is_ok());
///     }
/// }
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseWorker {
    options: ParseOptions,
}

impl ParseWorker {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Parse `text` in the background. Must be called inside a tokio runtime.
    pub fn start(self, text: String) -> (mpsc::Receiver<WorkerMessage>, JobHandle) {
        let options = self.options;
        spawn_job(move |sink| analyze_csv(&text, &options, |progress| sink.report(progress)))
    }
}

/// Run `job` on the blocking pool with the worker message protocol.
///
/// A panic inside `job` is delivered as a terminal [`BillingError::Worker`].
pub fn spawn_job<F>(job: F) -> (mpsc::Receiver<WorkerMessage>, JobHandle)
where
    F: FnOnce(&ProgressSink) -> Result<AnalysisResult> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
    let cancelled = Arc::new(AtomicBool::new(false));
    let sink = ProgressSink {
        tx: tx.clone(),
        cancelled: Arc::clone(&cancelled),
    };

    let handle = tokio::spawn(async move {
        let outcome = match tokio::task::spawn_blocking(move || job(&sink)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let reason = panic_message(e.into_panic());
                warn!(%reason, "parse job panicked");
                Err(BillingError::Worker(reason))
            }
            Err(e) => Err(BillingError::Worker(e.to_string())),
        };

        if tx.send(WorkerMessage::Finished(outcome)).await.is_err() {
            debug!("result receiver dropped; discarding parse result");
        }
    });

    (rx, JobHandle { handle, cancelled })
}

// ── JobHandle ─────────────────────────────────────────────────────────────────

/// Handle to a running parse job.
///
/// Aborting stops delivery of the terminal message and flags the blocking
/// parse, which returns at its next progress report.
#[derive(Debug)]
pub struct JobHandle {
    handle: JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
}

impl JobHandle {
    pub fn abort(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.handle.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
