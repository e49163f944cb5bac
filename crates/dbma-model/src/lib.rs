//! Data model for the migration-assessment transformation engine.
//!
//! Everything here is configuration-facing and polars-free: rule definitions
//! with their compatibility windows, per-run outcomes, the table schema
//! registry with its reconciliation modes, and run parameters.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod outcome;
pub mod params;
pub mod rule;
pub mod schema;

pub use config::TransformerConfig;
pub use error::{ModelError, Result};
pub use outcome::{OutcomeStatus, RuleOutcome, RuleOutcomes, SkipReason};
pub use params::{Parameters, RunParameters};
pub use rule::{ActionDetails, Rule, RuleAction, RuleKind, RuleSet, version_in_window, version_prefix};
pub use schema::{ColumnSpec, SchemaConfig, SchemaMode, SchemaRegistry, clean_header};
