//! The tally Tracker Service.
//!
//! Owns every [`SubmissionRecord`](tally_core::record::SubmissionRecord),
//! fans submissions and status polls out to the registered
//! [`TargetAdapter`](tally_core::adapter::TargetAdapter)s, applies the retry
//! policy and answers queries. Records are locked individually; work on
//! different records never contends.

mod sweep;
mod tracker;

pub mod config;
pub mod error;
pub mod manual;
pub mod query;
pub mod registry;
pub mod report;

pub use config::TrackerConfig;
pub use error::{Error, Result};
pub use registry::AdapterRegistry;
pub use sweep::SweepReport;
pub use tracker::Tracker;

#[cfg(test)]
mod tests;
