//! Core types and trait definitions for Tally.
//!
//! This crate is deliberately free of HTTP and database dependencies. It holds
//! the survey/response model, question-schema normalisation, date-range
//! filtering and the aggregation engine.

pub mod analytics;
pub mod error;
pub mod range;
pub mod response;
pub mod store;
pub mod survey;

pub use error::{Error, Result};
