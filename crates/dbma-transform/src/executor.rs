//! Rule executor and scheduler.
//!
//! Each pass sweeps the rule set in ascending priority (declaration order on
//! ties), gates every rule immediately before dispatch, and records a
//! structured outcome per rule. Rule failures never abort the run: they
//! surface as FAILED outcomes, and gating mismatches as SKIPPED outcomes with
//! the failing check as the reason.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use tracing::{debug, info, warn};

use dbma_ingest::TableRegistry;
use dbma_model::{
    ActionDetails, Parameters, Rule, RuleAction, RuleKind, RuleOutcome, RuleOutcomes, RuleSet,
    RunParameters, SchemaRegistry, SkipReason, version_in_window,
};

use crate::emit::{EmitOptions, emit_table};
use crate::eval::{EvalContext, column_from_value, evaluate, evaluate_guard, resolve_column_name, run_statements};
use crate::loader::WarehouseLoader;
use crate::reshape::{ReshapeSpec, reshape};
use crate::value::Value;

/// Mutable run state threaded through every pass: variables produced by
/// VARIABLE rules, the idempotence set, and the produced-file list handed to
/// the loader at the end.
#[derive(Debug, Default)]
pub struct ExecutorState {
    pub variables: BTreeMap<String, Value>,
    pub executed: BTreeSet<String>,
    pub produced_files: Vec<PathBuf>,
}

pub struct Executor<'a> {
    pub registry: &'a mut TableRegistry,
    pub schema: &'a mut SchemaRegistry,
    pub run: &'a RunParameters,
    pub emit: &'a EmitOptions,
    pub loader: &'a mut dyn WarehouseLoader,
    pub state: &'a mut ExecutorState,
}

impl Executor<'_> {
    /// Run every rule of one execution group, in priority order.
    pub fn run_group(&mut self, group: &str, rules: &RuleSet) -> RuleOutcomes {
        let ids: Vec<String> = rules.ids_by_priority().iter().map(|id| (*id).to_string()).collect();
        self.run_ids(group, rules, &ids)
    }

    /// Run exactly one rule (the reshape pass drives single reshape-defining
    /// rules this way).
    pub fn run_single(&mut self, rule_id: &str, group: &str, rules: &RuleSet) -> RuleOutcomes {
        self.run_ids(group, rules, &[rule_id.to_string()])
    }

    fn run_ids(&mut self, group: &str, rules: &RuleSet, ids: &[String]) -> RuleOutcomes {
        let mut outcomes = RuleOutcomes::new();
        for id in ids {
            let Some(rule) = rules.get(id) else {
                warn!(rule = %id, "rule id not present in the configuration");
                continue;
            };

            if !rule.is_enabled() {
                warn!(rule = %id, "rule is disabled");
                outcomes.insert(id.clone(), RuleOutcome::skipped(SkipReason::Status));
                continue;
            }
            if !rule.execution_group.trim().eq_ignore_ascii_case(group.trim()) {
                outcomes.insert(id.clone(), RuleOutcome::skipped(SkipReason::ExecutionGroup));
                continue;
            }
            match self.version_gate(rule) {
                Ok(None) => {}
                Ok(Some(reason)) => {
                    warn!(rule = %id, reason = %reason, "rule outside its compatibility window");
                    outcomes.insert(id.clone(), RuleOutcome::skipped(reason));
                    continue;
                }
                Err(err) => {
                    warn!(rule = %id, error = %err, "gating failed");
                    outcomes.insert(id.clone(), RuleOutcome::failed(err.to_string()));
                    self.state.executed.insert(id.clone());
                    continue;
                }
            }
            if self.state.executed.contains(id) {
                debug!(rule = %id, "already executed in this run");
                continue;
            }

            info!(rule = %id, priority = rule.priority, "processing rule");
            if let Some(outcome) = self.dispatch(id, rule) {
                self.state.executed.insert(id.clone());
                outcomes.insert(id.clone(), outcome);
            }
        }
        outcomes
    }

    /// On-demand reshape pass: every `table:rule_id` pair runs the defining
    /// rule as a single-rule group "0" sweep, then pivots the table into
    /// `<table>_RS` and materializes it.
    pub fn run_reshape_pass(&mut self, parameters: &Parameters, rules: &RuleSet) -> RuleOutcomes {
        let mut outcomes = RuleOutcomes::new();
        for (table, rule_id) in parameters.reshape_pairs() {
            let pass = self.run_single(&rule_id, "0", rules);
            let outcome = pass.get(&rule_id).cloned();
            outcomes.extend(pass);

            if !self.registry.contains(&table) {
                warn!(table = %table, "no ingested data to reshape");
                continue;
            }
            match outcome {
                Some(outcome) if outcome.status == dbma_model::OutcomeStatus::Executed => {}
                Some(outcome) => {
                    warn!(rule = %rule_id, status = %outcome.status, "reshape-defining rule did not execute");
                    continue;
                }
                None => {
                    warn!(rule = %rule_id, "reshape-defining rule produced no outcome");
                    continue;
                }
            }
            let Some(spec_value) = self.state.variables.get(&table.to_uppercase())
                .or_else(|| self.state.variables.get(&table))
            else {
                warn!(table = %table, "no reshape parameters were produced for this table");
                continue;
            };
            let spec = match ReshapeSpec::from_value(spec_value) {
                Ok(spec) => spec,
                Err(err) => {
                    warn!(table = %table, error = %err, "reshape parameters are malformed");
                    continue;
                }
            };
            let Some(source) = self.registry.get(&table).cloned() else {
                continue;
            };
            let wide = match reshape(&source, &spec) {
                Ok(wide) => wide,
                Err(err) => {
                    warn!(table = %table, error = %err, "could not reshape table");
                    continue;
                }
            };
            let reshaped_name = format!("{}_rs", table.to_lowercase());
            self.registry.insert(&reshaped_name, wide.clone());
            self.emit_and_track(&wide, &reshaped_name, spec.store.as_deref());
        }
        outcomes
    }

    fn version_gate(&self, rule: &Rule) -> dbma_model::Result<Option<SkipReason>> {
        if !version_in_window(
            &self.run.db_version,
            &rule.min_db_version,
            &rule.max_db_version,
        )? {
            return Ok(Some(SkipReason::DbVersion));
        }
        if !version_in_window(
            &self.run.collection_version,
            &rule.min_sql_script_version,
            &rule.max_sql_script_version,
        )? {
            return Ok(Some(SkipReason::SqlScriptVersion));
        }
        Ok(None)
    }

    /// Dispatch one gated rule. `None` means the rule stepped aside without an
    /// outcome (false guard, missing table) and stays eligible for later
    /// passes.
    fn dispatch(&mut self, id: &str, rule: &Rule) -> Option<RuleOutcome> {
        match (&rule.kind, &rule.action) {
            (RuleKind::Variable, RuleAction::Create) => Some(self.create_variable(rule)),
            (RuleKind::Number | RuleKind::Freestyle, RuleAction::AddOrUpdateColumn) => {
                self.add_or_update_column(id, rule)
            }
            (RuleKind::Freestyle, RuleAction::CreateOrReplaceDataframe) => {
                self.create_or_replace(id, rule)
            }
            (RuleKind::Freestyle, RuleAction::Freestyle) => self.freestyle(id, rule),
            (RuleKind::CreateView, RuleAction::ExecuteSql) => Some(self.create_view(rule)),
            (kind, action) => {
                debug!(rule = %id, kind = ?kind, action = ?action, "no dispatch for this type/action pair");
                None
            }
        }
    }

    fn eval_ctx(&mut self) -> EvalContext<'_> {
        EvalContext {
            registry: &mut *self.registry,
            variables: &self.state.variables,
        }
    }

    fn create_variable(&mut self, rule: &Rule) -> RuleOutcome {
        let varname = rule.action_details.varname.to_uppercase();
        match coerce_value(&rule.action_details) {
            Ok(value) => {
                self.state.variables.insert(varname, value);
                RuleOutcome::executed()
            }
            Err(err) => {
                self.state.variables.insert(varname, Value::Null);
                RuleOutcome::failed(err.to_string())
            }
        }
    }

    fn add_or_update_column(&mut self, id: &str, rule: &Rule) -> Option<RuleOutcome> {
        let details = &rule.action_details;
        if let Some(guard) = details.ifcondition1.as_deref().filter(|g| !g.trim().is_empty()) {
            match evaluate_guard(guard, &mut self.eval_ctx()) {
                None => {
                    warn!(rule = %id, "guard could not be evaluated; skipping rule");
                    return None;
                }
                Some(false) => {
                    warn!(rule = %id, "guard is false; skipping rule");
                    return None;
                }
                Some(true) => {}
            }
        }

        let value = evaluate(&details.expr1, &details.if_error, &mut self.eval_ctx());
        if !self.registry.contains(&details.dataframe_name) {
            warn!(
                rule = %id,
                table = %details.dataframe_name,
                "target table not found; skipping rule"
            );
            return None;
        }
        if let Err(err) = self.store_column(&details.dataframe_name, &details.column_name, value) {
            return Some(RuleOutcome::failed(err.to_string()));
        }

        let target = if details.target_dataframe_name.trim().is_empty() {
            details.dataframe_name.clone()
        } else {
            details.target_dataframe_name.clone()
        };
        let Some(frame) = self.registry.get(&details.dataframe_name).cloned() else {
            return None;
        };
        self.registry.insert(&target, frame.clone());
        self.emit_and_track(&frame, &target, details.store.as_deref());
        Some(RuleOutcome::executed())
    }

    fn create_or_replace(&mut self, id: &str, rule: &Rule) -> Option<RuleOutcome> {
        let details = &rule.action_details;
        let value = evaluate(&details.expr1, &details.if_error, &mut self.eval_ctx());
        let Value::Frame(frame) = value else {
            warn!(
                rule = %id,
                "expression did not produce a table; skipping rule"
            );
            return None;
        };
        self.registry.insert(&details.dataframe_name, frame.clone());
        self.emit_and_track(&frame, &details.dataframe_name, details.store.as_deref());
        Some(RuleOutcome::executed())
    }

    fn freestyle(&mut self, id: &str, rule: &Rule) -> Option<RuleOutcome> {
        let details = &rule.action_details;
        if let Err(err) = run_statements(&details.expr1, &mut self.eval_ctx()) {
            warn!(rule = %id, error = %err, "freestyle expression failed; skipping rule");
            return None;
        }
        let Some(frame) = self.registry.get(&details.target_dataframe_name).cloned() else {
            warn!(
                rule = %id,
                table = %details.target_dataframe_name,
                "freestyle target table not found after evaluation"
            );
            return None;
        };
        self.emit_and_track(&frame, &details.target_dataframe_name, details.store.as_deref());
        Some(RuleOutcome::executed())
    }

    fn create_view(&mut self, rule: &Rule) -> RuleOutcome {
        let details = &rule.action_details;
        if details.target_object_name.trim().is_empty() {
            return RuleOutcome::failed("CREATE VIEW rule without target_object_name".to_string());
        }
        match self
            .loader
            .create_view(&details.target_object_name, &details.expr1)
        {
            Ok(()) => RuleOutcome::executed(),
            Err(err) => RuleOutcome::failed(err.to_string()),
        }
    }

    fn store_column(&mut self, table: &str, column: &str, value: Value) -> Result<()> {
        let frame = self
            .registry
            .get_mut(table)
            .ok_or_else(|| anyhow!("unknown table '{table}'"))?;
        if column.trim().is_empty() {
            bail!("rule has no column_name");
        }
        let height = frame.height();
        let name = resolve_column_name(frame, column).unwrap_or_else(|| column.to_uppercase());
        let new_column = column_from_value(&name, value, height)?;
        frame.with_column(new_column)?;
        Ok(())
    }

    fn emit_and_track(&mut self, frame: &polars::prelude::DataFrame, table: &str, store: Option<&str>) {
        match emit_table(frame, table, store, self.emit, self.schema) {
            Ok(Some(path)) => self.state.produced_files.push(path),
            Ok(None) => {}
            Err(err) => {
                warn!(table = %table, error = %err, "could not materialize table");
            }
        }
    }
}

/// VARIABLE rule coercion: the declared datatype interprets the raw `value`
/// field.
fn coerce_value(details: &ActionDetails) -> Result<Value> {
    let raw = match &details.value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match details.datatype.trim().to_uppercase().as_str() {
        "DICTIONARY" => {
            if details.value.is_object() {
                return Ok(Value::from_json(&details.value));
            }
            let parsed: serde_json::Value = serde_json::from_str(raw.trim())?;
            Ok(Value::from_json(&parsed))
        }
        "LIST" => Ok(Value::List(
            raw.split(',').map(|item| Value::Str(item.to_string())).collect(),
        )),
        "STRING" => Ok(Value::Str(raw)),
        "NUMBER" => Ok(Value::Number(raw.trim().parse::<f64>()?)),
        other => bail!("unsupported variable datatype '{other}'"),
    }
}
