//! Rule-driven transformation engine: expression evaluation, pivoting,
//! rule scheduling, and produced-file emission over the table registry.

#![deny(unsafe_code)]

pub mod data_utils;
pub mod emit;
pub mod eval;
pub mod executor;
pub mod loader;
pub mod reshape;
pub mod value;

pub use emit::{EmitOptions, emit_table, write_table_csv};
pub use eval::{EvalContext, evaluate, evaluate_guard, run_statements};
pub use executor::{Executor, ExecutorState};
pub use loader::{RecordingLoader, WarehouseLoader, handoff_produced_files};
pub use reshape::{ReshapeSpec, reshape};
pub use value::Value;
