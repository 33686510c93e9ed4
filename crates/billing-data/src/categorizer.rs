//! Sorting usage rows into service buckets.
//!
//! Two policies exist. [`categorize`] trusts the product column and uses the
//! SKU only to split Actions into minutes and storage. [`categorize_by_sku`]
//! ignores the product and works from SKU substrings alone. Both are partial:
//! a row that matches nothing is dropped, never an error.

use billing_core::models::BucketKind;
use serde::{Deserialize, Serialize};

const MINUTES_RUNNER_TOKENS: &[&str] = &["linux", "windows", "macos", "self_hosted"];
const MINUTES_SKU_TOKENS: &[&str] = &["action", "minute", "linux", "windows", "macos"];

/// Which categorization policy a parse should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategorizePolicy {
    /// Product column first, SKU only for the Actions split.
    #[default]
    Product,
    /// SKU substrings only.
    Sku,
}

impl CategorizePolicy {
    pub fn apply(self, product: &str, sku: &str) -> Option<BucketKind> {
        match self {
            CategorizePolicy::Product => categorize(product, sku),
            CategorizePolicy::Sku => categorize_by_sku(sku),
        }
    }
}

/// Product-based policy. Within Actions, storage is tested before the runner
/// OS tokens so `"Actions - Storage"` lands in the storage bucket.
pub fn categorize(product: &str, sku: &str) -> Option<BucketKind> {
    let product = product.trim().to_lowercase();
    let sku = sku.to_lowercase();

    match product.as_str() {
        "actions" => {
            if sku.contains("storage") {
                Some(BucketKind::ActionsStorage)
            } else if contains_any(&sku, MINUTES_RUNNER_TOKENS) {
                Some(BucketKind::ActionsMinutes)
            } else {
                None
            }
        }
        "packages" => Some(BucketKind::Packages),
        "copilot" => Some(BucketKind::Copilot),
        "codespaces" => Some(BucketKind::Codespaces),
        _ => None,
    }
}

/// SKU-only policy for rows whose product is missing or untrusted.
pub fn categorize_by_sku(sku: &str) -> Option<BucketKind> {
    let sku = sku.to_lowercase();

    if sku.contains("storage") {
        Some(BucketKind::ActionsStorage)
    } else if contains_any(&sku, MINUTES_SKU_TOKENS) {
        Some(BucketKind::ActionsMinutes)
    } else if sku.contains("package") {
        Some(BucketKind::Packages)
    } else if sku.contains("copilot") {
        Some(BucketKind::Copilot)
    } else if sku.contains("codespace") {
        Some(BucketKind::Codespaces)
    } else {
        None
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── categorize ────────────────────────────────────────────────────────────

    #[test]
    fn test_actions_storage_takes_precedence_over_minutes() {
        assert_eq!(
            categorize("actions", "actions - storage"),
            Some(BucketKind::ActionsStorage)
        );
        assert_eq!(
            categorize("Actions", "GitHub Actions - Storage"),
            Some(BucketKind::ActionsStorage)
        );
        // Storage wins even when a runner OS token is present too.
        assert_eq!(
            categorize("actions", "linux storage"),
            Some(BucketKind::ActionsStorage)
        );
    }

    #[test]
    fn test_actions_runner_skus_are_minutes() {
        for sku in ["Linux", "Windows 4-core", "macOS 12-core", "self_hosted_linux"] {
            assert_eq!(
                categorize("actions", sku),
                Some(BucketKind::ActionsMinutes),
                "sku {sku}"
            );
        }
    }

    #[test]
    fn test_actions_unrecognized_sku_dropped() {
        assert_eq!(categorize("actions", "larger runner surcharge"), None);
    }

    #[test]
    fn test_other_products() {
        assert_eq!(categorize("Packages", "npm"), Some(BucketKind::Packages));
        assert_eq!(
            categorize("copilot", "Copilot Business"),
            Some(BucketKind::Copilot)
        );
        assert_eq!(
            categorize(" CODESPACES ", "compute 2-core"),
            Some(BucketKind::Codespaces)
        );
        assert_eq!(categorize("git_lfs", "storage"), None);
        assert_eq!(categorize("", "linux"), None);
    }

    // ── categorize_by_sku ─────────────────────────────────────────────────────

    #[test]
    fn test_sku_policy_order() {
        assert_eq!(
            categorize_by_sku("Actions - Storage"),
            Some(BucketKind::ActionsStorage)
        );
        assert_eq!(
            categorize_by_sku("Actions Linux"),
            Some(BucketKind::ActionsMinutes)
        );
        assert_eq!(
            categorize_by_sku("compute minutes"),
            Some(BucketKind::ActionsMinutes)
        );
        assert_eq!(
            categorize_by_sku("Packages data transfer"),
            Some(BucketKind::Packages)
        );
        assert_eq!(
            categorize_by_sku("Copilot Enterprise"),
            Some(BucketKind::Copilot)
        );
        assert_eq!(
            categorize_by_sku("Codespace prebuild"),
            Some(BucketKind::Codespaces)
        );
        assert_eq!(categorize_by_sku("git lfs bandwidth"), None);
    }

    #[test]
    fn test_policy_dispatch() {
        assert_eq!(
            CategorizePolicy::Product.apply("unknown", "copilot seat"),
            None
        );
        assert_eq!(
            CategorizePolicy::Sku.apply("unknown", "copilot seat"),
            Some(BucketKind::Copilot)
        );
    }
}
