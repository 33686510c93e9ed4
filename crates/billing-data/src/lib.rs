//! Data layer for billing usage exports.
//!
//! Resolves export headers, parses and categorizes rows into service
//! buckets, filters and aggregates records for charting, and assembles the
//! top-level report.

pub mod aggregator;
pub mod categorizer;
pub mod filter;
pub mod pipeline;
pub mod reader;
pub mod report;
pub mod schema;
pub mod view;

pub use billing_core as core;
