use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BillingError;

/// Placeholder key used by aggregations for records without a grouping value.
pub const UNKNOWN_KEY: &str = "Unknown";

/// Turn a raw cell into an optional value: empty (after trimming) means absent.
pub fn optional_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ── UsageRecord ───────────────────────────────────────────────────────────────

/// One billed line item read from a usage export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// ISO-like date string, compared lexicographically.
    pub date: String,
    /// Net amount billed for the line (currency-agnostic).
    pub cost: f64,
    /// Units consumed (minutes, GB, seats, ...).
    pub quantity: f64,
    /// Free-text service identifier.
    pub sku: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_center: Option<String>,
}

impl UsageRecord {
    pub fn new(date: impl Into<String>, sku: impl Into<String>, cost: f64, quantity: f64) -> Self {
        Self {
            date: date.into(),
            cost,
            quantity,
            sku: sku.into(),
            organization: None,
            repository: None,
            cost_center: None,
        }
    }

    pub fn with_organization(mut self, organization: &str) -> Self {
        self.organization = optional_text(organization);
        self
    }

    pub fn with_repository(mut self, repository: &str) -> Self {
        self.repository = optional_text(repository);
        self
    }

    pub fn with_cost_center(mut self, cost_center: &str) -> Self {
        self.cost_center = optional_text(cost_center);
        self
    }

    /// Year-month key (`"YYYY-MM"`): the first seven characters of `date`.
    pub fn month(&self) -> &str {
        match self.date.char_indices().nth(7) {
            Some((idx, _)) => &self.date[..idx],
            None => &self.date,
        }
    }

    /// Value of the metric selected by `breakdown`.
    pub fn metric(&self, breakdown: Breakdown) -> f64 {
        match breakdown {
            Breakdown::Cost => self.cost,
            Breakdown::Quantity => self.quantity,
        }
    }
}

// ── Breakdown ─────────────────────────────────────────────────────────────────

/// Metric used to rank and display aggregated series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Breakdown {
    #[default]
    Cost,
    Quantity,
}

impl Breakdown {
    pub fn as_str(self) -> &'static str {
        match self {
            Breakdown::Cost => "cost",
            Breakdown::Quantity => "quantity",
        }
    }
}

impl fmt::Display for Breakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Breakdown {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cost" => Ok(Breakdown::Cost),
            "quantity" => Ok(Breakdown::Quantity),
            other => Err(BillingError::Config(format!("unknown breakdown: {other}"))),
        }
    }
}

// ── Totals ────────────────────────────────────────────────────────────────────

/// Fixed-shape `{cost, quantity}` accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub cost: f64,
    pub quantity: f64,
}

impl Totals {
    pub fn add_record(&mut self, record: &UsageRecord) {
        self.cost += record.cost;
        self.quantity += record.quantity;
    }

    pub fn add(&mut self, other: &Totals) {
        self.cost += other.cost;
        self.quantity += other.quantity;
    }

    pub fn metric(&self, breakdown: Breakdown) -> f64 {
        match breakdown {
            Breakdown::Cost => self.cost,
            Breakdown::Quantity => self.quantity,
        }
    }
}

// ── Buckets ───────────────────────────────────────────────────────────────────

/// The five service categories a usage record can be sorted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BucketKind {
    ActionsMinutes,
    ActionsStorage,
    Packages,
    Copilot,
    Codespaces,
}

impl BucketKind {
    /// All buckets in their canonical iteration order.
    pub const ALL: [BucketKind; 5] = [
        BucketKind::ActionsMinutes,
        BucketKind::ActionsStorage,
        BucketKind::Packages,
        BucketKind::Copilot,
        BucketKind::Codespaces,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BucketKind::ActionsMinutes => "actionsMinutes",
            BucketKind::ActionsStorage => "actionsStorage",
            BucketKind::Packages => "packages",
            BucketKind::Copilot => "copilot",
            BucketKind::Codespaces => "codespaces",
        }
    }
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BucketKind {
    type Err = BillingError;

    /// Accepts the camelCase name as well as snake/kebab spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        BucketKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().to_lowercase() == folded)
            .ok_or_else(|| BillingError::Config(format!("unknown bucket: {s}")))
    }
}

/// Categorized usage records, one ordered sequence per [`BucketKind`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buckets {
    pub actions_minutes: Vec<UsageRecord>,
    pub actions_storage: Vec<UsageRecord>,
    pub packages: Vec<UsageRecord>,
    pub copilot: Vec<UsageRecord>,
    pub codespaces: Vec<UsageRecord>,
}

impl Buckets {
    pub fn get(&self, kind: BucketKind) -> &[UsageRecord] {
        match kind {
            BucketKind::ActionsMinutes => &self.actions_minutes,
            BucketKind::ActionsStorage => &self.actions_storage,
            BucketKind::Packages => &self.packages,
            BucketKind::Copilot => &self.copilot,
            BucketKind::Codespaces => &self.codespaces,
        }
    }

    /// Append `record` to the bucket named by `kind`.
    pub fn push(&mut self, kind: BucketKind, record: UsageRecord) {
        let bucket = match kind {
            BucketKind::ActionsMinutes => &mut self.actions_minutes,
            BucketKind::ActionsStorage => &mut self.actions_storage,
            BucketKind::Packages => &mut self.packages,
            BucketKind::Copilot => &mut self.copilot,
            BucketKind::Codespaces => &mut self.codespaces,
        };
        bucket.push(record);
    }

    /// Iterate `(kind, records)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (BucketKind, &[UsageRecord])> {
        BucketKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    /// Every record across all buckets, bucket by bucket.
    pub fn all_records(&self) -> impl Iterator<Item = &UsageRecord> {
        self.iter().flat_map(|(_, records)| records.iter())
    }

    pub fn total_records(&self) -> usize {
        self.iter().map(|(_, records)| records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_records() == 0
    }
}

// ── Report ────────────────────────────────────────────────────────────────────

/// Per-month cost totals for the legacy summary.
///
/// Copilot and Codespaces costs are not part of this summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    /// `"YYYY-MM"`.
    pub month: String,
    pub actions: f64,
    pub packages: f64,
    pub storage: f64,
    pub total: f64,
}

/// Inclusive date span covered by a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: String,
    pub end: String,
}

/// The artifact produced by one successful parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Most frequent organization across all records.
    pub organization: String,
    pub period: Period,
    pub monthly_summary: Vec<MonthlySummary>,
    pub buckets: Buckets,
}
