mod bootstrap;
mod summary;

use std::sync::Arc;

use anyhow::{bail, Result};
use billing_core::settings::Settings;
use billing_runtime::upload::process_upload;
use billing_runtime::view_cache::ViewCache;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();
    bootstrap::setup_logging(&settings.log_level)?;

    tracing::info!("billing-usage v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        file = %settings.file.display(),
        breakdown = %settings.breakdown,
        bucket = %settings.bucket,
        categorize = %settings.categorize,
        "processing usage export"
    );

    let options = bootstrap::parse_options(&settings);
    let mut outcome = process_upload(&settings.file, options, |progress| {
        tracing::debug!(
            processed = progress.processed,
            total = progress.total,
            "parse progress"
        );
    })
    .await;

    let Some(report) = outcome.report.take() else {
        if settings.output == "json" {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        let reason = outcome.error.unwrap_or_else(|| "upload failed".to_string());
        bail!(reason);
    };
    if let Some(message) = &outcome.message {
        tracing::info!("{message}");
    }

    let report = Arc::new(report);
    let bucket = settings.bucket();
    let filter = bootstrap::filter_state(&settings, &report);
    let config = bootstrap::aggregation_config(&settings);

    let mut cache = ViewCache::new();
    let view = cache.get_or_build(&report, bucket, &filter, &config);

    match settings.output.as_str() {
        "json" => {
            let document = summary::render_json(&outcome, &report, bucket, &filter, &view);
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        _ => print!("{}", summary::render_summary(&report, bucket, &filter, &view)),
    }

    Ok(())
}
