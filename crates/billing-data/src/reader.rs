//! Usage export loading and row parsing.
//!
//! Reads a comma-separated usage export, resolves its header through
//! [`Schema`], turns every data line into a [`UsageRecord`] and sorts it into
//! a service bucket. Row-level problems (short rows, missing essentials,
//! unknown products) are skipped one by one and never abort the file.

use std::ops::ControlFlow;
use std::path::Path;

use billing_core::error::{BillingError, Result};
use billing_core::models::{optional_text, Buckets, UsageRecord};
use csv::StringRecord;
use tracing::{debug, warn};

use crate::categorizer::CategorizePolicy;
use crate::schema::{CanonicalField, Schema};

pub use billing_core::settings::DEFAULT_CHUNK_SIZE;

// ── Public types ──────────────────────────────────────────────────────────────

/// A parsed row before categorization: the record plus the product text it
/// was filed under.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub product: String,
    pub record: UsageRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub chunk_size: usize,
    pub policy: CategorizePolicy,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            policy: CategorizePolicy::Product,
        }
    }
}

/// Rows handled so far out of the data rows in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseProgress {
    pub processed: usize,
    pub total: usize,
}

/// Result of a full parse.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub buckets: Buckets,
    pub schema: Schema,
    /// Non-blank data lines in the file (header excluded).
    pub rows_in_file: usize,
    /// Rows that produced a [`UsageRecord`].
    pub rows_parsed: usize,
    /// Rows that landed in a bucket.
    pub rows_categorized: usize,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Read an export from disk into text.
///
/// Rejects non-`.csv` paths, unreadable files, non-UTF-8 content and files
/// that are blank.
pub fn read_usage_file(path: &Path) -> Result<String> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if !is_csv {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        return Err(BillingError::UnsupportedExtension(name));
    }

    let bytes = std::fs::read(path).map_err(|source| BillingError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|e| BillingError::Decode(e.to_string()))?;
    if text.trim().is_empty() {
        return Err(BillingError::EmptyFile);
    }

    debug!(path = %path.display(), bytes = text.len(), "read usage export");
    Ok(text)
}

/// Parse a whole export and categorize every row.
///
/// `on_progress` is called every `options.chunk_size` rows and once at the
/// end; returning [`ControlFlow::Break`] stops the parse with an error.
pub fn parse_usage_csv<F>(text: &str, options: &ParseOptions, mut on_progress: F) -> Result<ParseOutcome>
where
    F: FnMut(ParseProgress) -> ControlFlow<()>,
{
    if text.trim().is_empty() {
        return Err(BillingError::EmptyFile);
    }

    let total = count_data_lines(text);
    let mut reader = csv_reader(text, true);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| clean_field(h).to_string())
        .collect();
    let schema = Schema::resolve(&headers);
    if !schema.has_required_fields() {
        warn!(
            missing = ?schema.missing_required_fields(),
            "header lacks required columns; every row will be skipped"
        );
    }

    let chunk_size = options.chunk_size.max(1);
    let mut buckets = Buckets::default();
    let mut processed = 0usize;
    let mut rows_parsed = 0usize;
    let mut rows_categorized = 0usize;

    for result in reader.records() {
        processed += 1;
        match result {
            Ok(raw) => {
                if let Some(row) = parse_record(&raw, &schema) {
                    rows_parsed += 1;
                    if let Some(kind) = options.policy.apply(&row.product, &row.record.sku) {
                        rows_categorized += 1;
                        buckets.push(kind, row.record);
                    }
                }
            }
            Err(e) => debug!(row = processed, error = %e, "skipping unreadable row"),
        }

        if processed % chunk_size == 0 {
            let progress = ParseProgress {
                processed: processed.min(total),
                total,
            };
            if on_progress(progress).is_break() {
                return Err(BillingError::Worker("parse cancelled".to_string()));
            }
        }
    }

    if processed == 0 || processed % chunk_size != 0 {
        let _ = on_progress(ParseProgress {
            processed: total,
            total,
        });
    }

    debug!(
        rows_in_file = total,
        rows_parsed, rows_categorized, "parsed usage export"
    );

    Ok(ParseOutcome {
        buckets,
        schema,
        rows_in_file: total,
        rows_parsed,
        rows_categorized,
    })
}

/// Parse one raw data line against `schema`. `None` means the row is skipped.
pub fn parse_line(line: &str, schema: &Schema) -> Option<ParsedRow> {
    let mut reader = csv_reader(line, false);
    let raw = reader.records().next()?.ok()?;
    parse_record(&raw, schema)
}

/// Parse one split row against `schema`.
///
/// Skips rows shorter than the header and rows missing date, product or
/// SKU. Unparseable numbers become `0`.
pub fn parse_record(raw: &StringRecord, schema: &Schema) -> Option<ParsedRow> {
    if raw.len() < schema.width() {
        return None;
    }

    let date = cell(raw, schema, CanonicalField::Date);
    let product = cell(raw, schema, CanonicalField::Product);
    let sku = cell(raw, schema, CanonicalField::Sku);
    if date.is_empty() || product.is_empty() || sku.is_empty() {
        return None;
    }

    let record = UsageRecord {
        date: date.to_string(),
        cost: parse_number(cell(raw, schema, CanonicalField::Cost)),
        quantity: parse_number(cell(raw, schema, CanonicalField::Quantity)),
        sku: sku.to_string(),
        organization: optional_text(cell(raw, schema, CanonicalField::Organization)),
        repository: optional_text(cell(raw, schema, CanonicalField::Repository)),
        cost_center: optional_text(cell(raw, schema, CanonicalField::CostCenter)),
    };

    Some(ParsedRow {
        product: product.to_string(),
        record,
    })
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Embedded commas inside quotes are not special: quoting is off and the
/// surrounding quote characters are stripped per field instead.
fn csv_reader(text: &str, has_headers: bool) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .quoting(false)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes())
}

fn count_data_lines(text: &str) -> usize {
    text.lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .count()
}

fn clean_field(raw: &str) -> &str {
    raw.trim_start_matches('\u{feff}')
        .trim()
        .trim_matches('"')
        .trim()
}

fn cell<'r>(raw: &'r StringRecord, schema: &Schema, field: CanonicalField) -> &'r str {
    schema
        .index(field)
        .and_then(|idx| raw.get(idx))
        .map(clean_field)
        .unwrap_or("")
}

fn parse_number(text: &str) -> f64 {
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::models::BucketKind;
    use std::io::Write;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
Date,Product,SKU,Quantity,Net_Amount,Organization,Repository_Slug
2024-01-05,Actions,Linux,120,4.80,acme,acme/web
2024-01-06,Actions,Actions - Storage,2,0.50,acme,acme/web
2024-01-06,Packages,npm,10,1.00,acme,acme/api
";

    fn parse(text: &str) -> ParseOutcome {
        parse_usage_csv(text, &ParseOptions::default(), |_| ControlFlow::Continue(()))
            .expect("parse should succeed")
    }

    fn sample_schema() -> Schema {
        Schema::resolve(&[
            "Date",
            "Product",
            "SKU",
            "Quantity",
            "Net_Amount",
            "Organization",
            "Repository_Slug",
        ])
    }

    fn write_file(dir: &Path, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    // ── parse_usage_csv ───────────────────────────────────────────────────────

    #[test]
    fn test_parse_sample_export() {
        let outcome = parse(SAMPLE);

        assert_eq!(outcome.rows_in_file, 3);
        assert_eq!(outcome.rows_categorized, 3);

        let minutes = outcome.buckets.get(BucketKind::ActionsMinutes);
        assert_eq!(minutes.len(), 1);
        assert!((minutes[0].cost - 4.80).abs() < 1e-9);
        assert!((minutes[0].quantity - 120.0).abs() < 1e-9);
        assert_eq!(minutes[0].organization.as_deref(), Some("acme"));
        assert_eq!(minutes[0].repository.as_deref(), Some("acme/web"));

        let storage = outcome.buckets.get(BucketKind::ActionsStorage);
        assert_eq!(storage.len(), 1);
        assert!((storage[0].cost - 0.50).abs() < 1e-9);

        let packages = outcome.buckets.get(BucketKind::Packages);
        assert_eq!(packages.len(), 1);
        assert!((packages[0].cost - 1.00).abs() < 1e-9);
    }

    #[test]
    fn test_short_row_skipped_without_disturbing_others() {
        let text = "\
Date,Product,SKU,Quantity,Net_Amount,Organization,Repository_Slug
2024-01-05,Actions,Linux,120,4.80,acme,acme/web
2024-01-05,Actions,Linux,999
2024-01-07,Actions,Windows,30,2.40,acme,acme/api
";
        let outcome = parse(text);
        let minutes = outcome.buckets.get(BucketKind::ActionsMinutes);

        assert_eq!(outcome.rows_in_file, 3);
        assert_eq!(outcome.rows_parsed, 2);
        assert_eq!(minutes.len(), 2);
        assert_eq!(minutes[0].date, "2024-01-05");
        assert_eq!(minutes[1].date, "2024-01-07");
        let total: f64 = minutes.iter().map(|r| r.quantity).sum();
        assert!((total - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_required_column_yields_no_rows() {
        let text = "Date,Quantity,Net_Amount\n2024-01-05,1,2.0\n";
        let outcome = parse(text);
        assert!(!outcome.schema.has_required_fields());
        assert_eq!(outcome.rows_parsed, 0);
        assert!(outcome.buckets.is_empty());
    }

    #[test]
    fn test_uncategorizable_rows_dropped() {
        let text = "\
date,product,sku,quantity,net_amount
2024-01-05,git_lfs,bandwidth,1,0.10
2024-01-05,actions,larger runner,1,0.10
2024-01-05,copilot,Copilot Business,1,19.00
";
        let outcome = parse(text);
        assert_eq!(outcome.rows_parsed, 3);
        assert_eq!(outcome.rows_categorized, 1);
        assert_eq!(outcome.buckets.get(BucketKind::Copilot).len(), 1);
    }

    #[test]
    fn test_sku_policy_applies_during_parse() {
        let text = "date,product,sku,quantity,net_amount\n2024-01-05,unknown,Copilot seat,1,19\n";
        let options = ParseOptions {
            policy: CategorizePolicy::Sku,
            ..ParseOptions::default()
        };
        let outcome =
            parse_usage_csv(text, &options, |_| ControlFlow::Continue(())).unwrap();
        assert_eq!(outcome.buckets.get(BucketKind::Copilot).len(), 1);
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let text = "date,product,sku,quantity,net_amount\n\n2024-01-05,packages,npm,1,1\n\n";
        let outcome = parse(text);
        assert_eq!(outcome.rows_in_file, 1);
        assert_eq!(outcome.buckets.get(BucketKind::Packages).len(), 1);
    }

    #[test]
    fn test_crlf_line_endings() {
        let text = "date,product,sku,quantity,net_amount\r\n2024-01-05,packages,npm,1,1.5\r\n";
        let outcome = parse(text);
        let packages = outcome.buckets.get(BucketKind::Packages);
        assert_eq!(packages.len(), 1);
        assert!((packages[0].cost - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_text_is_error() {
        let result = parse_usage_csv("  \n", &ParseOptions::default(), |_| {
            ControlFlow::Continue(())
        });
        assert!(matches!(result, Err(BillingError::EmptyFile)));
    }

    #[test]
    fn test_progress_reported_per_chunk() {
        let mut text = String::from("date,product,sku,quantity,net_amount\n");
        for day in 1..=25 {
            text.push_str(&format!("2024-01-{day:02},packages,npm,1,1\n"));
        }
        let options = ParseOptions {
            chunk_size: 10,
            ..ParseOptions::default()
        };

        let mut updates = Vec::new();
        parse_usage_csv(&text, &options, |p| {
            updates.push(p);
            ControlFlow::Continue(())
        })
        .unwrap();

        let processed: Vec<usize> = updates.iter().map(|p| p.processed).collect();
        assert_eq!(processed, vec![10, 20, 25]);
        assert!(updates.iter().all(|p| p.total == 25));
    }

    #[test]
    fn test_progress_break_stops_parse() {
        let mut text = String::from("date,product,sku,quantity,net_amount\n");
        for _ in 0..30 {
            text.push_str("2024-01-01,packages,npm,1,1\n");
        }
        let options = ParseOptions {
            chunk_size: 10,
            ..ParseOptions::default()
        };

        let mut calls = 0;
        let result = parse_usage_csv(&text, &options, |_| {
            calls += 1;
            ControlFlow::Break(())
        });
        assert!(matches!(result, Err(BillingError::Worker(_))));
        assert_eq!(calls, 1);
    }

    // ── parse_line / parse_record ─────────────────────────────────────────────

    #[test]
    fn test_parse_line_strips_quotes_and_whitespace() {
        let row = parse_line(
            r#" "2024-01-05" , "Actions" ,"Linux", "120" ,"4.80","acme","acme/web""#,
            &sample_schema(),
        )
        .expect("row should parse");
        assert_eq!(row.product, "Actions");
        assert_eq!(row.record.date, "2024-01-05");
        assert_eq!(row.record.sku, "Linux");
        assert!((row.record.quantity - 120.0).abs() < 1e-9);
        assert_eq!(row.record.organization.as_deref(), Some("acme"));
    }

    #[test]
    fn test_parse_line_non_numeric_defaults_to_zero() {
        let row = parse_line(
            "2024-01-05,Actions,Linux,lots,NaN,acme,acme/web",
            &sample_schema(),
        )
        .unwrap();
        assert_eq!(row.record.quantity, 0.0);
        assert_eq!(row.record.cost, 0.0);
    }

    #[test]
    fn test_parse_line_missing_essentials_skipped() {
        let schema = sample_schema();
        assert!(parse_line(",Actions,Linux,1,1,acme,acme/web", &schema).is_none());
        assert!(parse_line("2024-01-05,,Linux,1,1,acme,acme/web", &schema).is_none());
        assert!(parse_line("2024-01-05,Actions,\"\",1,1,acme,acme/web", &schema).is_none());
    }

    #[test]
    fn test_parse_line_empty_optional_fields_are_absent() {
        let row = parse_line("2024-01-05,Actions,Linux,1,1,,", &sample_schema()).unwrap();
        assert!(row.record.organization.is_none());
        assert!(row.record.repository.is_none());
        assert!(row.record.cost_center.is_none());
    }

    #[test]
    fn test_parse_line_absent_optional_columns() {
        let schema = Schema::resolve(&["date", "product", "sku"]);
        let row = parse_line("2024-01-05,packages,npm", &schema).unwrap();
        assert_eq!(row.record.cost, 0.0);
        assert_eq!(row.record.quantity, 0.0);
        assert!(row.record.organization.is_none());
    }

    // ── read_usage_file ───────────────────────────────────────────────────────

    #[test]
    fn test_read_usage_file_accepts_csv() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "usage.CSV", SAMPLE.as_bytes());
        let text = read_usage_file(&path).unwrap();
        assert!(text.starts_with("Date,Product"));
    }

    #[test]
    fn test_read_usage_file_rejects_extension() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "usage.xlsx", SAMPLE.as_bytes());
        let err = read_usage_file(&path).unwrap_err();
        assert!(matches!(err, BillingError::UnsupportedExtension(ref name) if name == "usage.xlsx"));
    }

    #[test]
    fn test_read_usage_file_rejects_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "usage.csv", &[0xff, 0xfe, 0x00, 0x41]);
        assert!(matches!(
            read_usage_file(&path),
            Err(BillingError::Decode(_))
        ));
    }

    #[test]
    fn test_read_usage_file_rejects_empty() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "usage.csv", b"\n  \n");
        assert!(matches!(read_usage_file(&path), Err(BillingError::EmptyFile)));
    }

    #[test]
    fn test_read_usage_file_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.csv");
        assert!(matches!(
            read_usage_file(&path),
            Err(BillingError::FileRead { .. })
        ));
    }
}
