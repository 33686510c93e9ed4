//! Upload boundary: file in, structured outcome out.
//!
//! [`process_upload`] never returns an error. Every failure becomes an
//! [`UploadOutcome`] with `success == false` and a user-facing message.

use std::path::Path;

use billing_core::error::BillingError;
use billing_core::formatting::format_number;
use billing_core::models::Report;
use billing_data::pipeline::{AnalysisMetadata, AnalysisResult};
use billing_data::reader::{read_usage_file, ParseOptions, ParseProgress};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::worker::{JobHandle, ParseWorker, WorkerMessage};

// ── UploadOutcome ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human-readable summary of a successful upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Records that landed in a bucket.
    pub rows_processed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AnalysisMetadata>,
}

impl UploadOutcome {
    pub fn succeeded(result: AnalysisResult) -> Self {
        let rows = result.rows_processed();
        Self {
            success: true,
            error: None,
            message: Some(format!("Successfully processed {} rows", format_number(rows as f64, 0))),
            rows_processed: rows,
            report: Some(result.report),
            metadata: Some(result.metadata),
        }
    }

    pub fn failed(error: &BillingError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            message: None,
            rows_processed: 0,
            report: None,
            metadata: None,
        }
    }

    fn from_result(result: billing_core::Result<AnalysisResult>) -> Self {
        match result {
            Ok(result) => Self::succeeded(result),
            Err(e) => {
                warn!(error = %e, "upload failed");
                Self::failed(&e)
            }
        }
    }
}

// ── UploadSession ─────────────────────────────────────────────────────────────

/// Owns at most one in-flight parse. Starting a new upload aborts the
/// previous job so its result can never arrive after the newer one.
#[derive(Debug, Default)]
pub struct UploadSession {
    worker: ParseWorker,
    active: Option<JobHandle>,
    generation: u64,
}

impl UploadSession {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            worker: ParseWorker::new(options),
            active: None,
            generation: 0,
        }
    }

    /// Number of uploads started so far; identifies the latest one.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start parsing `text`, superseding any job still running.
    pub fn begin(&mut self, text: String) -> UploadJob {
        if let Some(previous) = self.active.take() {
            if !previous.is_finished() {
                info!(generation = self.generation, "superseding in-flight upload");
            }
            previous.abort();
        }

        self.generation += 1;
        let (receiver, handle) = self.worker.start(text);
        self.active = Some(handle);
        UploadJob {
            generation: self.generation,
            receiver,
        }
    }

    /// Abort the in-flight job, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.abort();
        }
    }
}

/// Receiving end of one upload.
#[derive(Debug)]
pub struct UploadJob {
    generation: u64,
    receiver: mpsc::Receiver<WorkerMessage>,
}

impl UploadJob {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Next worker message, or `None` once the worker is gone.
    pub async fn next(&mut self) -> Option<WorkerMessage> {
        self.receiver.recv().await
    }

    /// Drive the job to its terminal message, forwarding progress.
    pub async fn finish<F>(mut self, mut on_progress: F) -> UploadOutcome
    where
        F: FnMut(ParseProgress),
    {
        while let Some(message) = self.next().await {
            match message {
                WorkerMessage::Progress(progress) => on_progress(progress),
                WorkerMessage::Finished(result) => return UploadOutcome::from_result(result),
            }
        }
        UploadOutcome::failed(&BillingError::Worker(
            "upload was cancelled before it finished".to_string(),
        ))
    }
}

// ── process_upload ────────────────────────────────────────────────────────────

/// Validate, read and parse the file at `path`.
///
/// The extension is checked before anything is read. Unreadable, undecodable
/// or blank files, and files with no categorizable rows, all fail.
pub async fn process_upload<F>(path: &Path, options: ParseOptions, on_progress: F) -> UploadOutcome
where
    F: FnMut(ParseProgress),
{
    let text = match read_usage_file(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "rejected upload");
            return UploadOutcome::failed(&e);
        }
    };

    let mut session = UploadSession::new(options);
    let outcome = session.begin(text).finish(on_progress).await;
    if outcome.success {
        info!(
            path = %path.display(),
            rows = outcome.rows_processed,
            "upload processed"
        );
    }
    outcome
}

// ── Tests ─────────────────────────────────────────────────────────────────────
