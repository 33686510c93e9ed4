use billing_core::models::{Report, UsageRecord};
use billing_core::settings::Settings;
use billing_data::aggregator::{AggregationConfig, SamplingMode};
use billing_data::categorizer::CategorizePolicy;
use billing_data::filter::{DateRange, FilterState};
use billing_data::reader::ParseOptions;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Initialise the global `tracing` subscriber on stderr, keeping stdout for
/// the report itself.
///
/// `RUST_LOG` wins over `log_level` when set.
pub fn setup_logging(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level_directive(log_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false);

    tracing_subscriber::registry().with(filter).with(layer).init();

    Ok(())
}

/// Map the CLI's upper-case level names onto `EnvFilter` directives.
fn level_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "ERROR" => "error".to_string(),
        other => other.to_lowercase(),
    }
}

// ── Settings → pipeline parameters ─────────────────────────────────────────────

pub fn parse_options(settings: &Settings) -> ParseOptions {
    ParseOptions {
        chunk_size: settings.chunk_size,
        policy: if settings.categorize_by_sku() {
            CategorizePolicy::Sku
        } else {
            CategorizePolicy::Product
        },
    }
}

pub fn aggregation_config(settings: &Settings) -> AggregationConfig {
    AggregationConfig {
        top_n: settings.top_n,
        sku_top_n: settings.sku_top_n,
        sampling: if settings.exact {
            SamplingMode::Exact
        } else {
            SamplingMode::Sampled {
                max_points: settings.max_points,
            }
        },
    }
}

/// Build the filter selection from the command line. A `--repository` that
/// does not exist under `--organization` is dropped with a warning.
pub fn filter_state(settings: &Settings, report: &Report) -> FilterState {
    let mut filter = FilterState {
        date_range: DateRange {
            start: settings.start.clone(),
            end: settings.end.clone(),
        },
        cost_center: settings.cost_center.clone(),
        repository: settings.repository.clone(),
        breakdown: settings.breakdown(),
        ..FilterState::default()
    };

    if settings.organization.is_none() {
        return filter;
    }

    let records: Vec<&UsageRecord> = report.buckets.all_records().collect();
    filter.select_organization(settings.organization.clone(), &records);

    if filter.repository.is_none() && settings.repository.is_some() {
        tracing::warn!(
            repository = ?settings.repository,
            organization = ?settings.organization,
            "repository is not part of the selected organization; ignoring it"
        );
    }
    filter
}

// ── Tests ──────────────────────────────────────────────────────────────────────
