//! Plain-text and JSON renderings of a processed upload.

use std::fmt::Write;

use billing_core::formatting::{format_amount, format_metric, format_number, percentage};
use billing_core::models::{Breakdown, BucketKind, Report};
use billing_data::aggregator::TopNResult;
use billing_data::filter::FilterState;
use billing_data::view::BucketView;
use billing_runtime::upload::UploadOutcome;
use serde_json::{json, Value};

/// JSON document for `--output json`. Raw bucket records are left out; the
/// view carries the aggregated series instead.
pub fn render_json(
    outcome: &UploadOutcome,
    report: &Report,
    bucket: Option<BucketKind>,
    filter: &FilterState,
    view: &BucketView,
) -> Value {
    json!({
        "success": outcome.success,
        "message": outcome.message,
        "rowsProcessed": outcome.rows_processed,
        "metadata": outcome.metadata,
        "organization": report.organization,
        "period": report.period,
        "monthlySummary": report.monthly_summary,
        "bucketCounts": report
            .buckets
            .iter()
            .map(|(kind, records)| (kind.as_str().to_string(), json!(records.len())))
            .collect::<serde_json::Map<String, Value>>(),
        "bucket": bucket.map_or("all", BucketKind::as_str),
        "filter": filter,
        "view": view,
    })
}

/// Human-readable summary for `--output summary`.
pub fn render_summary(
    report: &Report,
    bucket: Option<BucketKind>,
    filter: &FilterState,
    view: &BucketView,
) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "Organization: {}", report.organization);
    let _ = writeln!(out, "Period:       {} to {}", report.period.start, report.period.end);
    let _ = writeln!(out);

    let _ = writeln!(out, "Monthly summary");
    let _ = writeln!(
        out,
        "  {:<8} {:>12} {:>12} {:>12} {:>12}",
        "Month", "Actions", "Packages", "Storage", "Total"
    );
    for month in &report.monthly_summary {
        let _ = writeln!(
            out,
            "  {:<8} {:>12} {:>12} {:>12} {:>12}",
            month.month,
            format_amount(month.actions),
            format_amount(month.packages),
            format_amount(month.storage),
            format_amount(month.total),
        );
    }
    let _ = writeln!(out);

    let breakdown = view.breakdown;
    let _ = writeln!(
        out,
        "Bucket: {}  ({} records, breakdown: {})",
        bucket.map_or("all", BucketKind::as_str),
        format_number(view.record_count as f64, 0),
        breakdown
    );
    if !filter.is_unfiltered() {
        let _ = writeln!(out, "Filter: {}", describe_filter(filter));
    }
    let _ = writeln!(out, "  Total cost:     {}", format_amount(view.totals.cost));
    let _ = writeln!(
        out,
        "  Total quantity: {}",
        format_metric(view.totals.quantity, Breakdown::Quantity)
    );

    write_top(&mut out, "Top repositories", &view.by_repository, view.headline());
    write_top(&mut out, "Top organizations", &view.by_organization, view.headline());
    write_top(&mut out, "Top SKUs", &view.by_sku, view.headline());

    out
}

fn write_top(out: &mut String, title: &str, top: &TopNResult, whole: f64) {
    if top.series.is_empty() {
        return;
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{title} ({} distinct)", top.distinct_keys);
    for series in &top.series {
        let value = series.metric(top.breakdown);
        let label = if series.is_others {
            format!("{} (other)", series.name)
        } else {
            series.name.clone()
        };
        let _ = writeln!(
            out,
            "  {:<40} {:>14} {:>6.1}%",
            label,
            format_metric(value, top.breakdown),
            percentage(value, whole, 1)
        );
    }
}

fn describe_filter(filter: &FilterState) -> String {
    let mut parts = Vec::new();
    if let Some(start) = &filter.date_range.start {
        parts.push(format!("from {start}"));
    }
    if let Some(end) = &filter.date_range.end {
        parts.push(format!("to {end}"));
    }
    if let Some(organization) = &filter.organization {
        parts.push(format!("organization={organization}"));
    }
    if let Some(repository) = &filter.repository {
        parts.push(format!("repository={repository}"));
    }
    if let Some(cost_center) = &filter.cost_center {
        parts.push(format!("cost_center={cost_center}"));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::models::{Buckets, UsageRecord};
    use billing_data::aggregator::AggregationConfig;
    use billing_data::report::assemble_report;

    fn report() -> Report {
        let mut buckets = Buckets::default();
        buckets.push(
            BucketKind::ActionsMinutes,
            UsageRecord::new("2024-01-05", "linux", 4.8, 120.0)
                .with_organization("acme")
                .with_repository("acme/web"),
        );
        buckets.push(
            BucketKind::ActionsStorage,
            UsageRecord::new("2024-01-05", "storage", 0.5, 2.0)
                .with_organization("acme")
                .with_repository("acme/web"),
        );
        buckets.push(
            BucketKind::Packages,
            UsageRecord::new("2024-01-06", "npm", 1.0, 10.0)
                .with_organization("acme")
                .with_repository("acme/lib"),
        );
        assemble_report(buckets).unwrap()
    }

    fn all_view(report: &Report, filter: &FilterState) -> BucketView {
        let records: Vec<&UsageRecord> = report.buckets.all_records().collect();
        BucketView::build(&records, filter, &AggregationConfig::default())
    }

    #[test]
    fn test_render_summary_contents() {
        let report = report();
        let filter = FilterState::default();
        let text = render_summary(&report, None, &filter, &all_view(&report, &filter));

        assert!(text.contains("Organization: acme"));
        assert!(text.contains("Period:       2024-01-05 to 2024-01-06"));
        assert!(text.contains("2024-01"));
        assert!(text.contains("6.30"));
        assert!(text.contains("Top repositories (2 distinct)"));
        assert!(text.contains("acme/web"));
        assert!(!text.contains("Filter:"));
    }

    #[test]
    fn test_render_summary_shows_active_filter() {
        let report = report();
        let filter = FilterState {
            repository: Some("acme/lib".to_string()),
            ..FilterState::default()
        };
        let text = render_summary(&report, None, &filter, &all_view(&report, &filter));
        assert!(text.contains("Filter: repository=acme/lib"));
        assert!(text.contains("(1 records"));
    }

    #[test]
    fn test_render_json_shape() {
        let report = report();
        let filter = FilterState::default();
        let view = all_view(&report, &filter);
        let outcome = UploadOutcome::failed(&billing_core::BillingError::EmptyFile);

        let json = render_json(&outcome, &report, Some(BucketKind::Packages), &filter, &view);
        assert_eq!(json["organization"], "acme");
        assert_eq!(json["bucket"], "packages");
        assert_eq!(json["bucketCounts"]["actionsMinutes"], 1);
        assert_eq!(json["monthlySummary"][0]["month"], "2024-01");
        assert_eq!(json["view"]["recordCount"], 3);
        assert!(json.get("buckets").is_none());
    }
}
