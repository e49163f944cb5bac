//! Integration tests for the rule scheduler: ordering, idempotence, and the
//! full ingest-free pass sequence.

use polars::prelude::{Column, DataFrame};
use proptest::prelude::*;
use tempfile::TempDir;

use dbma_ingest::TableRegistry;
use dbma_model::{OutcomeStatus, RuleSet, RunParameters, SchemaRegistry};
use dbma_transform::{EmitOptions, Executor, ExecutorState, RecordingLoader};

fn run_params() -> RunParameters {
    RunParameters {
        collection_key: "121_2.0.3_host.db.20220131.csv".to_string(),
        db_version: "121".to_string(),
        collection_version: "2.0.3".to_string(),
        import_comment: String::new(),
    }
}

fn emit_options(dir: &TempDir) -> EmitOptions {
    EmitOptions {
        files_location: dir.path().to_path_buf(),
        collection_key: "121_2.0.3_host.db.20220131.csv".to_string(),
        delimiter: b';',
    }
}

fn variable_rule(priority: i64, value: &str) -> String {
    format!(
        r#"{{
            "priority": {priority}, "status": "ENABLED", "execution_group": "1",
            "type": "VARIABLE", "action": "CREATE",
            "min_db_version": "111", "max_db_version": "999",
            "min_sql_script_version": "0.0.1", "max_sql_script_version": "9.9.9",
            "action_details": {{"varname": "WINNER", "datatype": "STRING", "value": "{value}"}}
        }}"#
    )
}

fn run_winner(priorities: &[i64]) -> Option<String> {
    let entries: Vec<String> = priorities
        .iter()
        .enumerate()
        .map(|(idx, priority)| format!(r#""rule{idx}": {}"#, variable_rule(*priority, &format!("value{idx}"))))
        .collect();
    let rules: RuleSet = serde_json::from_str(&format!("{{{}}}", entries.join(","))).unwrap();

    let dir = TempDir::new().unwrap();
    let mut registry = TableRegistry::new();
    let mut schema = SchemaRegistry::new();
    let run = run_params();
    let emit = emit_options(&dir);
    let mut loader = RecordingLoader::default();
    let mut state = ExecutorState::default();
    let mut executor = Executor {
        registry: &mut registry,
        schema: &mut schema,
        run: &run,
        emit: &emit,
        loader: &mut loader,
        state: &mut state,
    };
    executor.run_group("1", &rules);
    state
        .variables
        .get("WINNER")
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

proptest! {
    /// With all rules writing the same variable, the highest-priority rule is
    /// dispatched last and its value wins. Declaration order breaks ties.
    #[test]
    fn highest_priority_rule_writes_last(priorities in proptest::collection::vec(0i64..1000, 1..8)) {
        let winner = run_winner(&priorities).expect("at least one rule executed");
        let max = *priorities.iter().max().expect("non-empty");
        // Ties resolve to the later declaration, which is the last index
        // holding the maximum priority.
        let expected_idx = priorities
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == max)
            .map(|(idx, _)| idx)
            .next_back()
            .expect("non-empty");
        prop_assert_eq!(winner, format!("value{}", expected_idx));
    }
}

#[test]
fn two_pass_run_reaches_both_groups_once() {
    let config = r#"{
        "prep": {
            "priority": 1, "status": "ENABLED", "execution_group": "1",
            "type": "NUMBER", "action": "ADD_OR_UPDATE_COLUMN",
            "min_db_version": "111", "max_db_version": "999",
            "min_sql_script_version": "0.0.1", "max_sql_script_version": "9.9.9",
            "action_details": {
                "expr1": "tables['HOSTDETAILS']['CORES'] * 2",
                "if_error": "0",
                "dataframe_name": "HOSTDETAILS",
                "column_name": "VCORES",
                "target_dataframe_name": "hostdetails_calc",
                "store": "CSV_ONLY"
            }
        },
        "view": {
            "priority": 2, "status": "ENABLED", "execution_group": "2",
            "type": "CREATE VIEW", "action": "EXECUTE_SQL",
            "min_db_version": "111", "max_db_version": "999",
            "min_sql_script_version": "0.0.1", "max_sql_script_version": "9.9.9",
            "action_details": {
                "target_object_name": "vhostdetails",
                "expr1": "SELECT * FROM hostdetails_calc"
            }
        }
    }"#;
    let rules: RuleSet = serde_json::from_str(config).unwrap();

    let dir = TempDir::new().unwrap();
    let mut registry = TableRegistry::new();
    registry.insert(
        "HOSTDETAILS",
        DataFrame::new(vec![
            Column::new("HOST".into(), vec!["a", "b"]),
            Column::new("CORES".into(), vec!["4", "8"]),
        ])
        .unwrap(),
    );
    let mut schema = SchemaRegistry::new();
    let run = run_params();
    let emit = emit_options(&dir);
    let mut loader = RecordingLoader::default();
    let mut state = ExecutorState::default();

    let (first, second) = {
        let mut executor = Executor {
            registry: &mut registry,
            schema: &mut schema,
            run: &run,
            emit: &emit,
            loader: &mut loader,
            state: &mut state,
        };
        (
            executor.run_group("1", &rules),
            executor.run_group("2", &rules),
        )
    };

    assert_eq!(first.get("prep").unwrap().status, OutcomeStatus::Executed);
    // Group-2 rules show up as group skips in the first pass.
    assert_eq!(first.get("view").unwrap().status, OutcomeStatus::Skipped);
    assert_eq!(second.get("view").unwrap().status, OutcomeStatus::Executed);
    assert_eq!(state.produced_files.len(), 1);
    assert!(std::fs::metadata(&state.produced_files[0]).is_ok());
    assert_eq!(loader.views.len(), 1);

    // Neither rule may run again once marked executed.
    let mut executor = Executor {
        registry: &mut registry,
        schema: &mut schema,
        run: &run,
        emit: &emit,
        loader: &mut loader,
        state: &mut state,
    };
    let repeat = executor.run_group("1", &rules);
    assert!(!repeat.contains_key("prep"));
}
