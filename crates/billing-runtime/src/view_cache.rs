//! Memoized bucket views.
//!
//! Re-renders that do not change the report, bucket, filter or aggregation
//! settings get the previous [`BucketView`] back instead of a recomputation.
//! A single entry is kept; any change of key rebuilds it.

use std::sync::Arc;

use billing_core::models::{BucketKind, Report, UsageRecord};
use billing_data::aggregator::AggregationConfig;
use billing_data::filter::FilterState;
use billing_data::view::BucketView;
use tracing::debug;

struct CacheEntry {
    /// Held so the pointer comparison below can never see a reused address.
    report: Arc<Report>,
    bucket: Option<BucketKind>,
    filter: FilterState,
    config: AggregationConfig,
    view: Arc<BucketView>,
}

impl CacheEntry {
    fn matches(
        &self,
        report: &Arc<Report>,
        bucket: Option<BucketKind>,
        filter: &FilterState,
        config: &AggregationConfig,
    ) -> bool {
        Arc::ptr_eq(&self.report, report)
            && self.bucket == bucket
            && &self.filter == filter
            && &self.config == config
    }
}

/// Single-entry memo keyed on report identity, bucket, filter state and
/// aggregation config.
#[derive(Default)]
pub struct ViewCache {
    entry: Option<CacheEntry>,
    hits: u64,
    misses: u64,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// View of `bucket` (every bucket when `None`) under `filter`.
    pub fn get_or_build(
        &mut self,
        report: &Arc<Report>,
        bucket: Option<BucketKind>,
        filter: &FilterState,
        config: &AggregationConfig,
    ) -> Arc<BucketView> {
        if let Some(entry) = &self.entry {
            if entry.matches(report, bucket, filter, config) {
                self.hits += 1;
                debug!(bucket = ?bucket, "returning cached bucket view");
                return Arc::clone(&entry.view);
            }
        }

        self.misses += 1;
        let view = Arc::new(build_view(report, bucket, filter, config));
        debug!(
            bucket = ?bucket,
            records = view.record_count,
            "bucket view rebuilt"
        );
        self.entry = Some(CacheEntry {
            report: Arc::clone(report),
            bucket,
            filter: filter.clone(),
            config: *config,
            view: Arc::clone(&view),
        });
        view
    }

    /// Drop the cached view, e.g. when a new report replaces the old one.
    pub fn invalidate(&mut self) {
        self.entry = None;
        debug!("view cache invalidated");
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

fn build_view(
    report: &Report,
    bucket: Option<BucketKind>,
    filter: &FilterState,
    config: &AggregationConfig,
) -> BucketView {
    match bucket {
        Some(kind) => BucketView::build(report.buckets.get(kind), filter, config),
        None => {
            let records: Vec<&UsageRecord> = report.buckets.all_records().collect();
            BucketView::build(&records, filter, config)
        }
    }
}
