//! Core types and trait definitions for the tally submission tracker.
//!
//! This crate is deliberately free of runtime, HTTP and database
//! dependencies. It holds the per-target state machine, the record
//! aggregation rules and the two seams other crates plug into: the
//! [`adapter::TargetAdapter`] capability and the [`store::RecordStore`]
//! persistence backend.

pub mod adapter;
pub mod error;
pub mod record;
pub mod store;
pub mod submission;
pub mod target;

pub use error::{Error, Result};
