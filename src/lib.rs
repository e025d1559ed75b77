//! Evaluation engine for arbitrage book buying.
//!
//! [`domain`] holds the pure engine: identifier validation, price channel
//! extraction, stockout analysis, sales velocity, fees and the decision
//! table. [`infra`] talks to the price tracker and persists listings, and
//! [`app`] ties the two together into a sequential batch run.

pub mod app;
pub mod domain;
pub mod infra;
pub mod util;

pub use app::{BatchError, BatchReport, BatchRunner, SnapshotSource};
pub use domain::{evaluate, Decision, EngineConfig, EvaluationResult, Isbn, Listing, ProductSnapshot};
