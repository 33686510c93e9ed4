//! Report assembly from categorized buckets.

use std::collections::{BTreeMap, HashMap};

use billing_core::error::{BillingError, Result};
use billing_core::models::{BucketKind, Buckets, MonthlySummary, Period, Report, UsageRecord, UNKNOWN_KEY};
use tracing::debug;

/// Build the full report, or [`BillingError::NoBillingData`] when every
/// bucket is empty.
pub fn assemble_report(buckets: Buckets) -> Result<Report> {
    let Some(period) = period(&buckets) else {
        return Err(BillingError::NoBillingData);
    };

    let organization = primary_organization(buckets.all_records())
        .unwrap_or_else(|| UNKNOWN_KEY.to_string());
    let monthly_summary = monthly_summary(&buckets);

    debug!(
        organization = %organization,
        start = %period.start,
        end = %period.end,
        months = monthly_summary.len(),
        records = buckets.total_records(),
        "assembled report"
    );

    Ok(Report {
        organization,
        period,
        monthly_summary,
        buckets,
    })
}

/// One entry per distinct `YYYY-MM` across all buckets, ascending.
///
/// Only Actions minutes, Actions storage and Packages costs are summed; a
/// month that only has Copilot or Codespaces rows still appears, with zeros.
pub fn monthly_summary(buckets: &Buckets) -> Vec<MonthlySummary> {
    let mut months: BTreeMap<&str, MonthlySummary> = BTreeMap::new();

    for (kind, records) in buckets.iter() {
        for record in records {
            let month = record.month();
            let entry = months.entry(month).or_insert_with(|| MonthlySummary {
                month: month.to_string(),
                ..MonthlySummary::default()
            });
            match kind {
                BucketKind::ActionsMinutes => entry.actions += record.cost,
                BucketKind::ActionsStorage => entry.storage += record.cost,
                BucketKind::Packages => entry.packages += record.cost,
                BucketKind::Copilot | BucketKind::Codespaces => {}
            }
        }
    }

    months
        .into_values()
        .map(|mut summary| {
            summary.total = summary.actions + summary.packages + summary.storage;
            summary
        })
        .collect()
}

/// Lexicographic min and max `date` across all buckets.
pub fn period(buckets: &Buckets) -> Option<Period> {
    let mut dates = buckets.all_records().map(|record| record.date.as_str());
    let first = dates.next()?;
    let (start, end) = dates.fold((first, first), |(start, end), date| {
        (start.min(date), end.max(date))
    });
    Some(Period {
        start: start.to_string(),
        end: end.to_string(),
    })
}

/// Most frequent organization; ties go to the one seen first. Records without
/// an organization do not vote.
pub fn primary_organization<'a>(records: impl Iterator<Item = &'a UsageRecord>) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, record) in records.enumerate() {
        if let Some(organization) = record.organization.as_deref() {
            counts.entry(organization).or_insert((0, position)).0 += 1;
        }
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(organization, _)| organization.to_string())
}
