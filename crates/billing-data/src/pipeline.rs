//! End-to-end analysis: text in, [`Report`] out.
//!
//! Parsing is the only slow step, so it is the only one that reports
//! progress. Everything after it is a pure function of the buckets.

use std::ops::ControlFlow;
use std::path::Path;
use std::time::Instant;

use billing_core::error::Result;
use billing_core::models::Report;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::reader::{parse_usage_csv, read_usage_file, ParseOptions, ParseProgress};
use crate::report::assemble_report;

// ── Public types ──────────────────────────────────────────────────────────────

/// Counters and timing produced alongside a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    /// RFC 3339 timestamp of when the analysis finished.
    pub generated_at: String,
    /// Non-blank data lines in the export.
    pub rows_in_file: usize,
    /// Lines that produced a usage record.
    pub rows_parsed: usize,
    /// Records that landed in a service bucket.
    pub rows_categorized: usize,
    pub parse_time_seconds: f64,
}

/// The complete output of [`analyze_csv`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub report: Report,
    pub metadata: AnalysisMetadata,
}

impl AnalysisResult {
    /// Records across all buckets; what the upload boundary reports as
    /// processed rows.
    pub fn rows_processed(&self) -> usize {
        self.report.buckets.total_records()
    }
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Parse, categorize and assemble a report from export text.
///
/// Fails with `EmptyFile` on blank text and `NoBillingData` when no row
/// could be categorized.
pub fn analyze_csv<F>(text: &str, options: &ParseOptions, on_progress: F) -> Result<AnalysisResult>
where
    F: FnMut(ParseProgress) -> ControlFlow<()>,
{
    let parse_start = Instant::now();
    let outcome = parse_usage_csv(text, options, on_progress)?;
    let parse_time = parse_start.elapsed().as_secs_f64();

    let metadata = AnalysisMetadata {
        generated_at: Utc::now().to_rfc3339(),
        rows_in_file: outcome.rows_in_file,
        rows_parsed: outcome.rows_parsed,
        rows_categorized: outcome.rows_categorized,
        parse_time_seconds: parse_time,
    };
    let report = assemble_report(outcome.buckets)?;

    info!(
        organization = %report.organization,
        rows = metadata.rows_categorized,
        parse_time_seconds = metadata.parse_time_seconds,
        "usage export analyzed"
    );

    Ok(AnalysisResult { report, metadata })
}

/// [`read_usage_file`] followed by [`analyze_csv`].
pub fn analyze_file<F>(path: &Path, options: &ParseOptions, on_progress: F) -> Result<AnalysisResult>
where
    F: FnMut(ParseProgress) -> ControlFlow<()>,
{
    let text = read_usage_file(path)?;
    analyze_csv(&text, options, on_progress)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
