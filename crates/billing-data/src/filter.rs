//! Conjunctive record filtering and the option queries that back it.

use std::borrow::Borrow;
use std::collections::BTreeSet;

use billing_core::models::{Breakdown, UsageRecord};
use serde::{Deserialize, Serialize};

/// Selection value meaning "no constraint", same as leaving a filter unset.
pub const ALL_SENTINEL: &str = "all";

/// Inclusive date bounds compared lexicographically against ISO dates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// The user's current filter and breakdown selection.
///
/// Passed by reference into every filtering/aggregation call; there is no
/// ambient copy of it anywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub date_range: DateRange,
    pub organization: Option<String>,
    pub cost_center: Option<String>,
    pub repository: Option<String>,
    pub breakdown: Breakdown,
}

impl FilterState {
    /// `true` when no predicate constrains the records.
    pub fn is_unfiltered(&self) -> bool {
        active(&self.date_range.start).is_none()
            && active(&self.date_range.end).is_none()
            && active(&self.organization).is_none()
            && active(&self.cost_center).is_none()
            && active(&self.repository).is_none()
    }

    /// Evaluate every active predicate against `record`.
    pub fn matches(&self, record: &UsageRecord) -> bool {
        // Equality predicates first: they discard the most rows.
        if let Some(repository) = active(&self.repository) {
            if record.repository.as_deref() != Some(repository) {
                return false;
            }
        }
        if let Some(organization) = active(&self.organization) {
            if record.organization.as_deref() != Some(organization) {
                return false;
            }
        }
        if let Some(cost_center) = active(&self.cost_center) {
            if record.cost_center.as_deref() != Some(cost_center) {
                return false;
            }
        }
        if let Some(start) = active(&self.date_range.start) {
            if record.date.as_str() < start {
                return false;
            }
        }
        if let Some(end) = active(&self.date_range.end) {
            if record.date.as_str() > end {
                return false;
            }
        }
        true
    }

    /// Change the organization filter and drop a repository selection that is
    /// not offered under the new organization.
    pub fn select_organization<R: Borrow<UsageRecord>>(
        &mut self,
        organization: Option<String>,
        records: &[R],
    ) {
        self.organization = organization;
        if let Some(repository) = active(&self.repository) {
            let options = repositories_for_organization(records, active(&self.organization));
            if !options.iter().any(|option| option == repository) {
                self.repository = None;
            }
        }
    }
}

/// Records satisfying `filter`, in their original relative order.
pub fn apply_filters<'a, R: Borrow<UsageRecord>>(
    records: &'a [R],
    filter: &FilterState,
) -> Vec<&'a UsageRecord> {
    if filter.is_unfiltered() {
        return records.iter().map(as_record).collect();
    }
    records
        .iter()
        .map(as_record)
        .filter(|record| filter.matches(record))
        .collect()
}

/// Sorted distinct organizations present in `records`.
pub fn distinct_organizations<R: Borrow<UsageRecord>>(records: &[R]) -> Vec<String> {
    distinct(records.iter().map(|r| as_record(r).organization.as_deref()))
}

/// Sorted distinct cost centers present in `records`.
pub fn distinct_cost_centers<R: Borrow<UsageRecord>>(records: &[R]) -> Vec<String> {
    distinct(records.iter().map(|r| as_record(r).cost_center.as_deref()))
}

/// Repository options for an organization selection: the sorted distinct
/// repositories of records belonging to `organization`, or nothing when no
/// organization is selected.
pub fn repositories_for_organization<R: Borrow<UsageRecord>>(
    records: &[R],
    organization: Option<&str>,
) -> Vec<String> {
    let Some(organization) = organization.filter(|o| !o.is_empty() && *o != ALL_SENTINEL) else {
        return Vec::new();
    };
    distinct(
        records
            .iter()
            .map(as_record)
            .filter(|record| record.organization.as_deref() == Some(organization))
            .map(|record| record.repository.as_deref()),
    )
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Pin the `Borrow` target so owned and borrowed record slices read the same.
pub(crate) fn as_record<R: Borrow<UsageRecord>>(record: &R) -> &UsageRecord {
    record.borrow()
}

/// A selection is inactive when unset, blank or the `"all"` sentinel.
fn active(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != ALL_SENTINEL)
}

fn distinct<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<String> {
    values
        .flatten()
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}
