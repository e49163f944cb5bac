//! Sandboxed rule expression evaluation.
//!
//! The public entry points enforce the containment contract: the primary
//! expression is tried first, any failure falls back to the secondary
//! expression, and any failure there yields null. Nothing evaluated here can
//! abort a run.

mod interp;
mod parser;

use anyhow::Result;
use tracing::debug;

pub use interp::EvalContext;
pub(crate) use interp::{column_from_value, resolve_column as resolve_column_name};

use crate::value::Value;

fn try_eval(src: &str, ctx: &mut EvalContext<'_>) -> Result<Value> {
    interp::run_program(src, ctx)
}

/// Primary-then-fallback-then-null evaluation. Never fails.
pub fn evaluate(primary: &str, fallback: &str, ctx: &mut EvalContext<'_>) -> Value {
    match try_eval(primary, ctx) {
        Ok(value) => value,
        Err(primary_err) => {
            debug!(error = %primary_err, expression = primary, "primary expression failed");
            match try_eval(fallback, ctx) {
                Ok(value) => value,
                Err(fallback_err) => {
                    debug!(error = %fallback_err, expression = fallback, "fallback expression failed");
                    Value::Null
                }
            }
        }
    }
}

/// Guard evaluation: `Some(bool)` on success, `None` when the guard itself
/// cannot be evaluated (the caller skips the rule in that case).
pub fn evaluate_guard(guard: &str, ctx: &mut EvalContext<'_>) -> Option<bool> {
    match try_eval(guard, ctx) {
        Ok(value) => Some(value.truthy()),
        Err(err) => {
            debug!(error = %err, expression = guard, "guard expression failed");
            None
        }
    }
}

/// Run a statement program for its side effects, surfacing errors to the
/// caller. Used by FREESTYLE rules, which have no fallback expression.
pub fn run_statements(src: &str, ctx: &mut EvalContext<'_>) -> Result<Value> {
    try_eval(src, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbma_ingest::TableRegistry;
    use std::collections::BTreeMap;

    #[test]
    fn fallback_law() {
        let mut registry = TableRegistry::new();
        let variables = BTreeMap::new();
        let mut ctx = EvalContext {
            registry: &mut registry,
            variables: &variables,
        };
        let value = evaluate("1/0", "99", &mut ctx);
        assert_eq!(value.as_number(), Some(99.0));

        let value = evaluate("1/0", "1/0", &mut ctx);
        assert!(value.is_null());
    }

    #[test]
    fn empty_expressions_follow_the_chain() {
        let mut registry = TableRegistry::new();
        let variables = BTreeMap::new();
        let mut ctx = EvalContext {
            registry: &mut registry,
            variables: &variables,
        };
        assert_eq!(evaluate("", "7", &mut ctx).as_number(), Some(7.0));
        assert!(evaluate("", "", &mut ctx).is_null());
    }

    #[test]
    fn guard_errors_yield_none() {
        let mut registry = TableRegistry::new();
        let variables = BTreeMap::new();
        let mut ctx = EvalContext {
            registry: &mut registry,
            variables: &variables,
        };
        assert_eq!(evaluate_guard("1 == 1", &mut ctx), Some(true));
        assert_eq!(evaluate_guard("0", &mut ctx), Some(false));
        assert_eq!(evaluate_guard("tables['missing']", &mut ctx), None);
    }
}
