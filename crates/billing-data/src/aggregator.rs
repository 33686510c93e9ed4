//! Usage aggregation for charting.
//!
//! Every function here is a pure function of a record slice and its
//! parameters. Slices may hold owned records or references (the output of
//! [`apply_filters`](crate::filter::apply_filters)), so the same code serves a
//! whole bucket and a filtered subset.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use billing_core::models::{Breakdown, Totals, UsageRecord, UNKNOWN_KEY};
use chrono::NaiveDate;
use serde::Serialize;

use crate::filter::as_record;

pub use billing_core::settings::{DEFAULT_MAX_POINTS, DEFAULT_SKU_TOP_N, DEFAULT_TOP_N};

/// Display name of the residual series.
pub const OTHERS_KEY: &str = "Others";

// ── Configuration ─────────────────────────────────────────────────────────────

/// Whether the by-date series may be computed from a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum SamplingMode {
    /// Every record contributes.
    Exact,
    /// Above `max_points` records, keep one record every `ceil(n / max_points)`
    /// positions after sorting by date.
    #[serde(rename_all = "camelCase")]
    Sampled { max_points: usize },
}

impl Default for SamplingMode {
    fn default() -> Self {
        SamplingMode::Sampled {
            max_points: DEFAULT_MAX_POINTS,
        }
    }
}

/// Immutable parameters for one aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationConfig {
    /// Named repository/organization series before folding into "Others".
    pub top_n: usize,
    /// Named SKU series.
    pub sku_top_n: usize,
    pub sampling: SamplingMode,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            sku_top_n: DEFAULT_SKU_TOP_N,
            sampling: SamplingMode::default(),
        }
    }
}

/// Record attribute used as a grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupField {
    Repository,
    Organization,
    Sku,
}

impl GroupField {
    /// Grouping key of `record`; absent values group under `"Unknown"`.
    pub fn key(self, record: &UsageRecord) -> &str {
        let value = match self {
            GroupField::Repository => record.repository.as_deref(),
            GroupField::Organization => record.organization.as_deref(),
            GroupField::Sku => Some(record.sku.as_str()),
        };
        value.filter(|v| !v.is_empty()).unwrap_or(UNKNOWN_KEY)
    }
}

// ── Result types ──────────────────────────────────────────────────────────────

/// Totals for a single date, with distinct-value counts instead of lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatePoint {
    pub date: String,
    pub cost: f64,
    pub quantity: f64,
    pub repository_count: usize,
    pub organization_count: usize,
    pub sku_count: usize,
}

/// One named series, or the synthetic residual when `is_others` is set.
///
/// A repository literally called `"Others"` is a named series with
/// `is_others == false`; both display under the same label.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSeries {
    pub name: String,
    pub is_others: bool,
    pub cost: f64,
    pub quantity: f64,
}

impl GroupSeries {
    fn named(name: String, totals: Totals) -> Self {
        Self {
            name,
            is_others: false,
            cost: totals.cost,
            quantity: totals.quantity,
        }
    }

    fn others(totals: Totals) -> Self {
        Self {
            name: OTHERS_KEY.to_string(),
            is_others: true,
            cost: totals.cost,
            quantity: totals.quantity,
        }
    }

    fn zeroed(&self) -> Self {
        Self {
            name: self.name.clone(),
            is_others: self.is_others,
            cost: 0.0,
            quantity: 0.0,
        }
    }

    pub fn totals(&self) -> Totals {
        Totals {
            cost: self.cost,
            quantity: self.quantity,
        }
    }

    pub fn metric(&self, breakdown: Breakdown) -> f64 {
        self.totals().metric(breakdown)
    }
}

/// Top-N + Others reduction over one grouping field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopNResult {
    pub field: GroupField,
    pub breakdown: Breakdown,
    /// Named series ranked by the breakdown metric, then "Others" if any key
    /// was folded.
    pub series: Vec<GroupSeries>,
    /// Distinct keys before folding ("Unknown" included).
    pub distinct_keys: usize,
}

impl TopNResult {
    pub fn named(&self) -> impl Iterator<Item = &GroupSeries> {
        self.series.iter().filter(|s| !s.is_others)
    }

    pub fn others(&self) -> Option<&GroupSeries> {
        self.series.iter().find(|s| s.is_others)
    }

    /// Sum over every series, residual included.
    pub fn total(&self) -> Totals {
        let mut total = Totals::default();
        for series in &self.series {
            total.add(&series.totals());
        }
        total
    }
}

/// One date of a stacked chart: overall totals plus one cell per series of
/// the [`TopNResult`] it was built from, in the same order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyGroupRow {
    pub date: String,
    pub total: f64,
    pub total_quantity: f64,
    pub series: Vec<GroupSeries>,
}

// ── Aggregations ──────────────────────────────────────────────────────────────

/// Exact cost and quantity over every record. Never sampled.
pub fn totals<R: Borrow<UsageRecord>>(records: &[R]) -> Totals {
    let mut totals = Totals::default();
    for record in records.iter().map(as_record) {
        totals.add_record(record);
    }
    totals
}

/// Per-key totals in first-encountered key order.
pub fn key_totals<R: Borrow<UsageRecord>>(records: &[R], field: GroupField) -> Vec<(String, Totals)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut totals: Vec<(String, Totals)> = Vec::new();

    for record in records.iter().map(as_record) {
        let key = field.key(record);
        let slot = *index.entry(key).or_insert_with(|| {
            totals.push((key.to_string(), Totals::default()));
            totals.len() - 1
        });
        totals[slot].1.add_record(record);
    }

    totals
}

/// Keep the `n` highest-ranked keys and fold the rest into "Others".
///
/// Ranking is by `breakdown`, descending; equal totals keep the order in
/// which their keys were first seen.
pub fn top_n<R: Borrow<UsageRecord>>(
    records: &[R],
    field: GroupField,
    breakdown: Breakdown,
    n: usize,
) -> TopNResult {
    let mut ranked = key_totals(records, field);
    let distinct_keys = ranked.len();

    // `sort_by` is stable, which is what gives the first-seen tie-break.
    ranked.sort_by(|a, b| b.1.metric(breakdown).total_cmp(&a.1.metric(breakdown)));
    let folded = if ranked.len() > n {
        ranked.split_off(n)
    } else {
        Vec::new()
    };

    let mut series: Vec<GroupSeries> = ranked
        .into_iter()
        .map(|(name, totals)| GroupSeries::named(name, totals))
        .collect();

    if !folded.is_empty() {
        let mut rest = Totals::default();
        for (_, totals) in &folded {
            rest.add(totals);
        }
        series.push(GroupSeries::others(rest));
    }

    TopNResult {
        field,
        breakdown,
        series,
        distinct_keys,
    }
}

pub fn by_repository<R: Borrow<UsageRecord>>(
    records: &[R],
    breakdown: Breakdown,
    config: &AggregationConfig,
) -> TopNResult {
    top_n(records, GroupField::Repository, breakdown, config.top_n)
}

pub fn by_organization<R: Borrow<UsageRecord>>(
    records: &[R],
    breakdown: Breakdown,
    config: &AggregationConfig,
) -> TopNResult {
    top_n(records, GroupField::Organization, breakdown, config.top_n)
}

pub fn by_sku<R: Borrow<UsageRecord>>(
    records: &[R],
    breakdown: Breakdown,
    config: &AggregationConfig,
) -> TopNResult {
    top_n(records, GroupField::Sku, breakdown, config.sku_top_n)
}

#[derive(Default)]
struct DayAccumulator<'a> {
    totals: Totals,
    repositories: HashSet<&'a str>,
    organizations: HashSet<&'a str>,
    skus: HashSet<&'a str>,
}

/// Group by exact `date` string, ascending.
///
/// With [`SamplingMode::Sampled`] the grouping runs over
/// [`sample_by_date`], so totals derived from the result are approximate.
pub fn by_date<R: Borrow<UsageRecord>>(records: &[R], sampling: SamplingMode) -> Vec<DatePoint> {
    let mut days: BTreeMap<&str, DayAccumulator> = BTreeMap::new();

    for record in sample_by_date(records, sampling) {
        let day = days.entry(record.date.as_str()).or_default();
        day.totals.add_record(record);
        if let Some(repository) = record.repository.as_deref() {
            day.repositories.insert(repository);
        }
        if let Some(organization) = record.organization.as_deref() {
            day.organizations.insert(organization);
        }
        if !record.sku.is_empty() {
            day.skus.insert(record.sku.as_str());
        }
    }

    days.into_iter()
        .map(|(date, day)| DatePoint {
            date: date.to_string(),
            cost: day.totals.cost,
            quantity: day.totals.quantity,
            repository_count: day.repositories.len(),
            organization_count: day.organizations.len(),
            sku_count: day.skus.len(),
        })
        .collect()
}

/// The records a by-date pass will see.
///
/// Exact mode, or an input within `max_points`, returns every record in
/// input order. Otherwise the records are sorted by date and every
/// `ceil(n / max_points)`-th one is kept, starting from the first.
pub fn sample_by_date<R: Borrow<UsageRecord>>(
    records: &[R],
    sampling: SamplingMode,
) -> Vec<&UsageRecord> {
    let mut view: Vec<&UsageRecord> = records.iter().map(as_record).collect();
    let SamplingMode::Sampled { max_points } = sampling else {
        return view;
    };
    if max_points == 0 || view.len() <= max_points {
        return view;
    }

    let step = view.len().div_ceil(max_points);
    view.sort_by(|a, b| a.date.cmp(&b.date));
    view.into_iter().step_by(step).collect()
}

/// Stacked-series matrix: one row per date with a cell for every series in
/// `top`. Records whose key was folded count toward the "Others" cell.
///
/// Rows are ordered by calendar date, not by the date string.
pub fn daily_group_matrix<R: Borrow<UsageRecord>>(records: &[R], top: &TopNResult) -> Vec<DailyGroupRow> {
    let named: HashMap<&str, usize> = top
        .series
        .iter()
        .enumerate()
        .filter(|(_, series)| !series.is_others)
        .map(|(idx, series)| (series.name.as_str(), idx))
        .collect();
    let others = top.series.iter().position(|series| series.is_others);
    let template: Vec<GroupSeries> = top.series.iter().map(GroupSeries::zeroed).collect();

    let mut rows: HashMap<&str, DailyGroupRow> = HashMap::new();
    for record in records.iter().map(as_record) {
        let row = rows
            .entry(record.date.as_str())
            .or_insert_with(|| DailyGroupRow {
                date: record.date.clone(),
                total: 0.0,
                total_quantity: 0.0,
                series: template.clone(),
            });
        row.total += record.cost;
        row.total_quantity += record.quantity;

        let slot = named.get(top.field.key(record)).copied().or(others);
        if let Some(slot) = slot {
            row.series[slot].cost += record.cost;
            row.series[slot].quantity += record.quantity;
        }
    }

    let mut rows: Vec<DailyGroupRow> = rows.into_values().collect();
    rows.sort_by(|a, b| compare_dates(&a.date, &b.date));
    rows
}

/// Calendar date of an export date string (date part of a timestamp too).
pub fn date_value(date: &str) -> Option<NaiveDate> {
    const FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

    let day = date.trim().split(['T', ' ']).next().unwrap_or_default();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(day, fmt).ok())
}

/// Unparseable dates sort first; equal calendar dates fall back to the text.
fn compare_dates(a: &str, b: &str) -> Ordering {
    date_value(a)
        .cmp(&date_value(b))
        .then_with(|| a.cmp(b))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
