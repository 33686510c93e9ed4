use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::{Breakdown, BucketKind};

/// Named repository/organization series before folding into "Others".
pub const DEFAULT_TOP_N: usize = 10;
/// Named SKU series.
pub const DEFAULT_SKU_TOP_N: usize = 6;
/// Record count above which the by-date series is sampled.
pub const DEFAULT_MAX_POINTS: usize = 1000;
/// Lines parsed between two progress reports.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Categorize and aggregate a billing usage export
#[derive(Parser, Debug, Clone)]
#[command(
    name = "billing-usage",
    about = "Categorize and aggregate a billing usage export",
    version
)]
pub struct Settings {
    /// Usage export to process (.csv)
    pub file: PathBuf,

    /// Metric used to rank and display series
    #[arg(long, default_value = "cost", value_parser = ["cost", "quantity"])]
    pub breakdown: String,

    /// Number of named repository/organization series before folding into "Others"
    #[arg(long, default_value_t = DEFAULT_TOP_N, value_parser = clap::value_parser!(usize))]
    pub top_n: usize,

    /// Number of named SKU series
    #[arg(long, default_value_t = DEFAULT_SKU_TOP_N)]
    pub sku_top_n: usize,

    /// Maximum records fed into the by-date series before sampling kicks in
    #[arg(long, default_value_t = DEFAULT_MAX_POINTS)]
    pub max_points: usize,

    /// Disable sampling of the by-date series
    #[arg(long)]
    pub exact: bool,

    /// Earliest date to include (inclusive, ISO form)
    #[arg(long)]
    pub start: Option<String>,

    /// Latest date to include (inclusive, ISO form)
    #[arg(long)]
    pub end: Option<String>,

    /// Only include records from this organization
    #[arg(long)]
    pub organization: Option<String>,

    /// Only include records from this repository
    #[arg(long)]
    pub repository: Option<String>,

    /// Only include records from this cost center
    #[arg(long)]
    pub cost_center: Option<String>,

    /// Bucket to aggregate
    #[arg(long, default_value = "all", value_parser = [
        "all", "actionsMinutes", "actionsStorage", "packages", "copilot", "codespaces",
    ])]
    pub bucket: String,

    /// Categorization policy
    #[arg(long, default_value = "product", value_parser = ["product", "sku"])]
    pub categorize: String,

    /// Output format
    #[arg(long, default_value = "summary", value_parser = ["json", "summary"])]
    pub output: String,

    /// Lines parsed between progress updates
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_parser = clap::value_parser!(usize))]
    pub chunk_size: usize,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Display preferences persisted to `~/.billing-usage/last_used.json`.
///
/// Filters are deliberately absent: every upload starts unfiltered.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku_top_n: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_points: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl LastUsedParams {
    /// `~/.billing-usage/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".billing-usage").join("last_used.json")
    }

    /// Load persisted params; `Default` when the file is absent or corrupt.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(params) => params,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "ignoring unreadable last-used params");
                Self::default()
            }
        }
    }

    /// Atomically write params to `path`, creating parent directories.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at `path` if it exists.
    pub fn clear_at(path: &std::path::Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments and merge last-used params for flags that were not
    /// given explicitly, then persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Same as [`Settings::load_with_last_used`] with explicit args and config
    /// path so tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!(error = %e, "failed to clear saved configuration");
            }
            return settings;
        }

        let last = LastUsedParams::load_from(config_path);

        // clap keys args by field name (underscores), not the flag spelling.
        if !is_arg_explicitly_set(&matches, "breakdown") {
            if let Some(v) = last.breakdown {
                settings.breakdown = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "top_n") {
            if let Some(v) = last.top_n {
                settings.top_n = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "sku_top_n") {
            if let Some(v) = last.sku_top_n {
                settings.sku_top_n = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "max_points") {
            if let Some(v) = last.max_points {
                settings.max_points = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "output") {
            if let Some(v) = last.output {
                settings.output = v;
            }
        }

        let params = LastUsedParams::from(&settings);
        if let Err(e) = params.save_to(config_path) {
            tracing::debug!(error = %e, "failed to persist last-used params");
        }

        settings
    }

    /// Active breakdown; unknown persisted values fall back to cost.
    pub fn breakdown(&self) -> Breakdown {
        self.breakdown.parse().unwrap_or_default()
    }

    /// Selected bucket, or `None` for `"all"`.
    pub fn bucket(&self) -> Option<BucketKind> {
        if self.bucket == "all" {
            None
        } else {
            self.bucket.parse().ok()
        }
    }

    /// `true` when SKU-only categorization was requested.
    pub fn categorize_by_sku(&self) -> bool {
        self.categorize == "sku"
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            breakdown: Some(s.breakdown.clone()),
            top_n: Some(s.top_n),
            sku_top_n: Some(s.sku_top_n),
            max_points: Some(s.max_points),
            output: Some(s.output.clone()),
        }
    }
}

/// Returns `true` when `name` was supplied explicitly on the command line.
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tmp_config_path(tmp: &TempDir) -> PathBuf {
        LastUsedParams::config_path_in(tmp.path())
    }

    fn args(list: &[&str]) -> Vec<std::ffi::OsString> {
        list.iter().map(|s| (*s).into()).collect()
    }

    // ── LastUsedParams ────────────────────────────────────────────────────────

    #[test]
    fn test_last_used_params_save_load() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        let params = LastUsedParams {
            breakdown: Some("quantity".to_string()),
            top_n: Some(5),
            sku_top_n: Some(3),
            max_points: Some(250),
            output: Some("json".to_string()),
        };

        params.save_to(&path).expect("save");
        assert_eq!(LastUsedParams::load_from(&path), params);
    }

    #[test]
    fn test_last_used_params_missing_or_corrupt_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        assert_eq!(LastUsedParams::load_from(&path), LastUsedParams::default());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(LastUsedParams::load_from(&path), LastUsedParams::default());
    }

    #[test]
    fn test_last_used_params_clear() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&path).expect("save");
        assert!(path.exists());

        LastUsedParams::clear_at(&path).expect("clear");
        assert!(!path.exists());
        // Clearing a missing file is not an error.
        LastUsedParams::clear_at(&path).expect("clear again");
    }

    // ── CLI parsing ───────────────────────────────────────────────────────────

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::parse_from(["billing-usage", "usage.csv"]);
        assert_eq!(settings.file, PathBuf::from("usage.csv"));
        assert_eq!(settings.breakdown(), Breakdown::Cost);
        assert_eq!(settings.top_n, DEFAULT_TOP_N);
        assert_eq!(settings.sku_top_n, DEFAULT_SKU_TOP_N);
        assert_eq!(settings.max_points, DEFAULT_MAX_POINTS);
        assert_eq!(settings.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(settings.bucket().is_none());
        assert!(!settings.categorize_by_sku());
    }

    #[test]
    fn test_settings_filters_and_bucket() {
        let settings = Settings::parse_from([
            "billing-usage",
            "usage.csv",
            "--organization",
            "acme",
            "--repository",
            "acme/web",
            "--bucket",
            "actionsStorage",
            "--categorize",
            "sku",
        ]);
        assert_eq!(settings.organization.as_deref(), Some("acme"));
        assert_eq!(settings.repository.as_deref(), Some("acme/web"));
        assert_eq!(settings.bucket(), Some(BucketKind::ActionsStorage));
        assert!(settings.categorize_by_sku());
    }

    #[test]
    fn test_settings_rejects_unknown_breakdown() {
        let result =
            Settings::try_parse_from(["billing-usage", "usage.csv", "--breakdown", "tokens"]);
        assert!(result.is_err());
    }

    // ── load_with_last_used ───────────────────────────────────────────────────

    #[test]
    fn test_load_with_last_used_merges_persisted_values() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            breakdown: Some("quantity".to_string()),
            top_n: Some(4),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings =
            Settings::load_with_last_used_impl(args(&["billing-usage", "usage.csv"]), &config_path);
        assert_eq!(settings.breakdown(), Breakdown::Quantity);
        assert_eq!(settings.top_n, 4);
        assert_eq!(settings.sku_top_n, DEFAULT_SKU_TOP_N);
    }

    #[test]
    fn test_load_with_last_used_cli_overrides_persisted() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            breakdown: Some("quantity".to_string()),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings = Settings::load_with_last_used_impl(
            args(&["billing-usage", "usage.csv", "--breakdown", "cost"]),
            &config_path,
        );
        assert_eq!(settings.breakdown(), Breakdown::Cost);
    }

    #[test]
    fn test_load_with_last_used_persists_after_run() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        Settings::load_with_last_used_impl(
            args(&["billing-usage", "usage.csv", "--top-n", "3", "--output", "json"]),
            &config_path,
        );

        let loaded = LastUsedParams::load_from(&config_path);
        assert_eq!(loaded.top_n, Some(3));
        assert_eq!(loaded.output.as_deref(), Some("json"));
    }

    #[test]
    fn test_load_with_last_used_clear_removes_file() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&config_path).expect("save");

        Settings::load_with_last_used_impl(
            args(&["billing-usage", "usage.csv", "--clear"]),
            &config_path,
        );
        assert!(!config_path.exists());
    }

    #[test]
    fn test_load_with_last_used_debug_overrides_log_level() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        let settings = Settings::load_with_last_used_impl(
            args(&["billing-usage", "usage.csv", "--debug"]),
            &config_path,
        );
        assert_eq!(settings.log_level, "DEBUG");
    }
}
