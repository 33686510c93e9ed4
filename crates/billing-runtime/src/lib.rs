//! Runtime layer for billing usage analysis.
//!
//! Moves parsing off the caller's task, owns the upload boundary and
//! memoizes the aggregated views handed to presentation.

pub mod upload;
pub mod view_cache;
pub mod worker;

pub use billing_core as core;
pub use billing_data as data;
