//! CLI library components for the migration-assessment transformer.

#![deny(unsafe_code)]

pub mod logging;
pub mod pipeline;
