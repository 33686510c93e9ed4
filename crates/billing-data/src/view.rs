//! Everything a chart panel needs for one bucket under one filter state.

use std::borrow::Borrow;

use billing_core::models::{Breakdown, Totals, UsageRecord};
use serde::Serialize;

use crate::aggregator::{
    by_date, by_organization, by_repository, by_sku, daily_group_matrix, totals, AggregationConfig,
    DailyGroupRow, DatePoint, TopNResult,
};
use crate::filter::{apply_filters, FilterState};

/// Aggregations of a filtered record set.
///
/// `totals` is always exact; `by_date` may be sampled depending on the
/// [`AggregationConfig`] it was built with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketView {
    pub breakdown: Breakdown,
    /// Records left after filtering.
    pub record_count: usize,
    pub totals: Totals,
    pub by_date: Vec<DatePoint>,
    pub by_repository: TopNResult,
    pub by_organization: TopNResult,
    pub by_sku: TopNResult,
    /// Stacked daily series over the repository Top-N.
    pub daily_by_repository: Vec<DailyGroupRow>,
}

impl BucketView {
    pub fn build<R: Borrow<UsageRecord>>(
        records: &[R],
        filter: &FilterState,
        config: &AggregationConfig,
    ) -> Self {
        let filtered = apply_filters(records, filter);
        let breakdown = filter.breakdown;
        let by_repository = by_repository(&filtered, breakdown, config);
        let daily_by_repository = daily_group_matrix(&filtered, &by_repository);

        Self {
            breakdown,
            record_count: filtered.len(),
            totals: totals(&filtered),
            by_date: by_date(&filtered, config.sampling),
            by_organization: by_organization(&filtered, breakdown, config),
            by_sku: by_sku(&filtered, breakdown, config),
            by_repository,
            daily_by_repository,
        }
    }

    /// The headline figure for the selected breakdown.
    pub fn headline(&self) -> f64 {
        self.totals.metric(self.breakdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::SamplingMode;

    fn records() -> Vec<UsageRecord> {
        (0..12)
            .map(|i| {
                UsageRecord::new(format!("2024-01-{:02}", i % 4 + 1), "linux", 1.0 + i as f64, 10.0)
                    .with_organization(if i % 3 == 0 { "org-b" } else { "org-a" })
                    .with_repository(&format!("repo-{}", i % 5))
            })
            .collect()
    }

    #[test]
    fn test_build_unfiltered() {
        let data = records();
        let view = BucketView::build(&data, &FilterState::default(), &AggregationConfig::default());

        assert_eq!(view.record_count, 12);
        assert!((view.totals.cost - 78.0).abs() < 1e-9);
        assert_eq!(view.by_date.len(), 4);
        assert_eq!(view.by_repository.series.len(), 5);
        assert_eq!(view.by_organization.series.len(), 2);
        assert_eq!(view.daily_by_repository.len(), 4);
        assert!((view.headline() - 78.0).abs() < 1e-9);
    }

    #[test]
    fn test_build_applies_filter_and_breakdown() {
        let data = records();
        let filter = FilterState {
            organization: Some("org-b".to_string()),
            breakdown: Breakdown::Quantity,
            ..FilterState::default()
        };
        let config = AggregationConfig {
            top_n: 1,
            sampling: SamplingMode::Exact,
            ..AggregationConfig::default()
        };
        let view = BucketView::build(&data, &filter, &config);

        assert_eq!(view.record_count, 4);
        assert_eq!(view.breakdown, Breakdown::Quantity);
        assert!((view.headline() - 40.0).abs() < 1e-9);
        assert_eq!(view.by_organization.series.len(), 1);
        assert!((view.by_repository.total().quantity - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_build_empty_selection() {
        let data = records();
        let filter = FilterState {
            repository: Some("missing".to_string()),
            ..FilterState::default()
        };
        let view = BucketView::build(&data, &filter, &AggregationConfig::default());
        assert_eq!(view.record_count, 0);
        assert!(view.by_date.is_empty());
        assert!(view.by_repository.series.is_empty());
        assert!(view.daily_by_repository.is_empty());
    }
}
