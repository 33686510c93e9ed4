//! Shared foundation for the billing usage pipeline.
//!
//! Holds the data model (usage records, service buckets, reports), the
//! file-level error taxonomy, CLI configuration and number formatting used by
//! the data, runtime and binary crates.

pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;

pub use error::{BillingError, Result};
