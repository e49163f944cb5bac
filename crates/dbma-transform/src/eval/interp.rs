//! Tree-walking interpreter over the parsed expression AST.
//!
//! All failures are ordinary `Err` values; the `evaluate` wrapper in the
//! parent module turns them into the fallback chain. Expressions read and
//! write the live table registry through `tables["name"]` references and see
//! every variable produced by earlier rules in the pass.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow, bail};
use polars::prelude::{BooleanChunked, Column, DataFrame, NewChunkedArray};

use dbma_ingest::TableRegistry;

use crate::data_utils::{any_to_f64, any_to_string};
use crate::value::Value;

use super::parser::{AssignTarget, BinaryOp, Expr, Stmt, UnaryOp, parse_program};

pub struct EvalContext<'a> {
    pub registry: &'a mut TableRegistry,
    pub variables: &'a BTreeMap<String, Value>,
}

/// Parse and run a whole program; the result is the value of the last
/// statement (assignments yield null).
pub fn run_program(src: &str, ctx: &mut EvalContext<'_>) -> Result<Value> {
    let program = parse_program(src)?;
    let mut last = Value::Null;
    for stmt in &program {
        last = exec_stmt(stmt, ctx)?;
    }
    Ok(last)
}

fn exec_stmt(stmt: &Stmt, ctx: &mut EvalContext<'_>) -> Result<Value> {
    match stmt {
        Stmt::Expr(expr) => eval_expr(expr, ctx),
        Stmt::Assign { target, value } => {
            let value = eval_expr(value, ctx)?;
            assign(target, value, ctx)?;
            Ok(Value::Null)
        }
    }
}

fn assign(target: &AssignTarget, value: Value, ctx: &mut EvalContext<'_>) -> Result<()> {
    match &target.column {
        None => {
            let Value::Frame(frame) = value else {
                bail!(
                    "table assignment requires a frame, found {}",
                    value.type_name()
                );
            };
            ctx.registry.insert(&target.table, frame);
            Ok(())
        }
        Some(column) => {
            let frame = ctx
                .registry
                .get_mut(&target.table)
                .ok_or_else(|| anyhow!("unknown table '{}'", target.table))?;
            let height = frame.height();
            let name = resolve_column(frame, column).unwrap_or_else(|| column.to_uppercase());
            let new_column = column_from_value(&name, value, height)?;
            frame.with_column(new_column)?;
            Ok(())
        }
    }
}

/// Builds a full-height column from a scalar (broadcast), a list, or an
/// existing column of matching height.
pub(crate) fn column_from_value(name: &str, value: Value, height: usize) -> Result<Column> {
    let column = match value {
        Value::Column(column) => {
            if column.len() != height && column.len() != 1 {
                bail!(
                    "column length {} does not match table height {height}",
                    column.len()
                );
            }
            let mut column = if column.len() == 1 && height != 1 {
                column.new_from_index(0, height)
            } else {
                column
            };
            column.rename(name.into());
            column
        }
        Value::Number(n) => Column::new(name.into(), vec![n; height]),
        Value::Str(s) => Column::new(name.into(), vec![s; height]),
        Value::Bool(b) => Column::new(name.into(), vec![b; height]),
        Value::Null => Column::new(name.into(), vec![None::<String>; height]),
        Value::List(items) => {
            if items.len() != height {
                bail!("list length {} does not match table height {height}", items.len());
            }
            let values: Vec<Option<String>> = items
                .iter()
                .map(|item| {
                    if item.is_null() {
                        None
                    } else {
                        Some(item.to_string())
                    }
                })
                .collect();
            Column::new(name.into(), values)
        }
        other => bail!("cannot store a {} in a column", other.type_name()),
    };
    Ok(column)
}

fn eval_expr(expr: &Expr, ctx: &mut EvalContext<'_>) -> Result<Value> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Ident(name) => ctx
            .variables
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("unknown variable '{name}'")),
        Expr::Table(name) => {
            let frame = ctx
                .registry
                .get(name)
                .ok_or_else(|| anyhow!("unknown table '{name}'"))?;
            Ok(Value::Frame(frame.clone()))
        }
        Expr::ColumnRef { table, column } => {
            let frame = ctx
                .registry
                .get(table)
                .ok_or_else(|| anyhow!("unknown table '{table}'"))?;
            let name = resolve_column(frame, column)
                .ok_or_else(|| anyhow!("unknown column '{column}' in table '{table}'"))?;
            Ok(Value::Column(frame.column(&name)?.clone()))
        }
        Expr::Unary { op, expr } => {
            let value = eval_expr(expr, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                UnaryOp::Neg => {
                    let n = value
                        .as_number()
                        .ok_or_else(|| anyhow!("cannot negate a {}", value.type_name()))?;
                    Ok(Value::Number(-n))
                }
            }
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, ctx),
        Expr::Call { name, args } => {
            let args: Vec<Value> = args
                .iter()
                .map(|arg| eval_expr(arg, ctx))
                .collect::<Result<_>>()?;
            call_function(name, args)
        }
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, ctx: &mut EvalContext<'_>) -> Result<Value> {
    if op == BinaryOp::Or {
        let lhs = eval_expr(left, ctx)?;
        if lhs.truthy() {
            return Ok(Value::Bool(true));
        }
        return Ok(Value::Bool(eval_expr(right, ctx)?.truthy()));
    }
    if op == BinaryOp::And {
        let lhs = eval_expr(left, ctx)?;
        if !lhs.truthy() {
            return Ok(Value::Bool(false));
        }
        return Ok(Value::Bool(eval_expr(right, ctx)?.truthy()));
    }

    let lhs = eval_expr(left, ctx)?;
    let rhs = eval_expr(right, ctx)?;
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&lhs, &rhs)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, lhs, rhs)
        }
        BinaryOp::Or | BinaryOp::And => unreachable!("handled above"),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        _ => match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Result<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
        return a
            .partial_cmp(&b)
            .ok_or_else(|| anyhow!("cannot order NaN"));
    }
    if let (Value::Str(a), Value::Str(b)) = (lhs, rhs) {
        return Ok(a.cmp(b));
    }
    bail!(
        "cannot compare {} with {}",
        lhs.type_name(),
        rhs.type_name()
    )
}

fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    match (&lhs, &rhs) {
        (Value::Str(a), Value::Str(b)) if op == BinaryOp::Add => {
            return Ok(Value::Str(format!("{a}{b}")));
        }
        (Value::Column(_), _) | (_, Value::Column(_)) => {
            return columnwise(op, lhs, rhs);
        }
        _ => {}
    }
    let a = lhs
        .as_number()
        .ok_or_else(|| anyhow!("left operand is not numeric ({})", lhs.type_name()))?;
    let b = rhs
        .as_number()
        .ok_or_else(|| anyhow!("right operand is not numeric ({})", rhs.type_name()))?;
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                bail!("division by zero");
            }
            a / b
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                bail!("modulo by zero");
            }
            a % b
        }
        _ => unreachable!("non-arithmetic op"),
    };
    Ok(Value::Number(result))
}

/// Elementwise arithmetic over columns; non-numeric cells and zero divisors
/// become null cells rather than failures.
fn columnwise(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    let (name, length) = match (&lhs, &rhs) {
        (Value::Column(column), _) | (_, Value::Column(column)) => {
            (column.name().to_string(), column.len())
        }
        _ => unreachable!("caller checked for a column operand"),
    };
    if let (Value::Column(a), Value::Column(b)) = (&lhs, &rhs)
        && a.len() != b.len()
    {
        bail!("column lengths differ: {} vs {}", a.len(), b.len());
    }

    let left_values = numeric_cells(&lhs, length);
    let right_values = numeric_cells(&rhs, length);
    let combined: Vec<Option<f64>> = left_values
        .iter()
        .zip(right_values.iter())
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => match op {
                BinaryOp::Add => Some(a + b),
                BinaryOp::Sub => Some(a - b),
                BinaryOp::Mul => Some(a * b),
                BinaryOp::Div => (*b != 0.0).then(|| a / b),
                BinaryOp::Mod => (*b != 0.0).then(|| a % b),
                _ => None,
            },
            _ => None,
        })
        .collect();
    Ok(Value::Column(Column::new(name.as_str().into(), combined)))
}

fn numeric_cells(value: &Value, length: usize) -> Vec<Option<f64>> {
    match value {
        Value::Column(column) => (0..column.len())
            .map(|idx| column.get(idx).ok().and_then(any_to_f64))
            .collect(),
        other => vec![other.as_number(); length],
    }
}

fn call_function(name: &str, args: Vec<Value>) -> Result<Value> {
    match name {
        "sum" => Ok(Value::Number(numbers_of(one_arg(name, args)?)?.iter().sum())),
        "avg" => {
            let numbers = numbers_of(one_arg(name, args)?)?;
            if numbers.is_empty() {
                bail!("avg of an empty column");
            }
            Ok(Value::Number(numbers.iter().sum::<f64>() / numbers.len() as f64))
        }
        "min" => fold_numbers(name, args, f64::min),
        "max" => fold_numbers(name, args, f64::max),
        "count" => {
            let value = one_arg(name, args)?;
            let count = match &value {
                Value::Column(column) => column.len(),
                Value::Frame(frame) => frame.height(),
                Value::List(items) => items.len(),
                Value::Str(s) => s.len(),
                other => bail!("count of a {}", other.type_name()),
            };
            Ok(Value::Number(count as f64))
        }
        "abs" => {
            let n = number_arg(name, one_arg(name, args)?)?;
            Ok(Value::Number(n.abs()))
        }
        "round" => {
            let mut args = args.into_iter();
            let n = number_arg(name, args.next().unwrap_or(Value::Null))?;
            let digits = match args.next() {
                Some(value) => number_arg(name, value)? as i32,
                None => 0,
            };
            let factor = 10f64.powi(digits);
            Ok(Value::Number((n * factor).round() / factor))
        }
        "coalesce" => Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null)),
        "if" => {
            let mut args = args.into_iter();
            let (Some(cond), Some(then), Some(otherwise)) =
                (args.next(), args.next(), args.next())
            else {
                bail!("if expects three arguments");
            };
            Ok(if cond.truthy() { then } else { otherwise })
        }
        "upper" | "lower" => {
            let value = one_arg(name, args)?;
            let s = value
                .as_str()
                .ok_or_else(|| anyhow!("{name} expects a string"))?;
            Ok(Value::Str(if name == "upper" {
                s.to_uppercase()
            } else {
                s.to_lowercase()
            }))
        }
        "concat" => {
            let mut joined = String::new();
            for arg in &args {
                joined.push_str(&arg.to_string());
            }
            Ok(Value::Str(joined))
        }
        "contains" => {
            let mut args = args.into_iter();
            let (Some(haystack), Some(needle)) = (args.next(), args.next()) else {
                bail!("contains expects two arguments");
            };
            match (&haystack, &needle) {
                (Value::Str(h), Value::Str(n)) => Ok(Value::Bool(h.contains(n.as_str()))),
                (Value::Column(column), Value::Str(n)) => {
                    let found = (0..column.len()).any(|idx| {
                        column
                            .get(idx)
                            .map(|cell| any_to_string(cell) == *n)
                            .unwrap_or(false)
                    });
                    Ok(Value::Bool(found))
                }
                _ => bail!("contains expects string or column arguments"),
            }
        }
        "is_null" => Ok(Value::Bool(one_arg(name, args)?.is_null())),
        "select" => {
            let mut args = args.into_iter();
            let frame = frame_arg(name, args.next().unwrap_or(Value::Null))?;
            let mut names = Vec::new();
            for arg in args {
                let wanted = arg
                    .as_str()
                    .ok_or_else(|| anyhow!("select expects column name strings"))?
                    .to_string();
                let resolved = resolve_column(&frame, &wanted)
                    .ok_or_else(|| anyhow!("unknown column '{wanted}'"))?;
                names.push(resolved);
            }
            Ok(Value::Frame(frame.select(names)?))
        }
        "filter" => {
            let mut args = args.into_iter();
            let frame = frame_arg(name, args.next().unwrap_or(Value::Null))?;
            let (Some(column), Some(wanted)) = (args.next(), args.next()) else {
                bail!("filter expects a frame, a column name, and a value");
            };
            let column = column
                .as_str()
                .ok_or_else(|| anyhow!("filter expects a column name string"))?;
            let resolved = resolve_column(&frame, column)
                .ok_or_else(|| anyhow!("unknown column '{column}'"))?;
            let target = wanted.to_string();
            let cells = frame.column(&resolved)?;
            let mask: Vec<bool> = (0..cells.len())
                .map(|idx| {
                    cells
                        .get(idx)
                        .map(|cell| any_to_string(cell) == target)
                        .unwrap_or(false)
                })
                .collect();
            let mask = BooleanChunked::from_slice("mask".into(), &mask);
            Ok(Value::Frame(frame.filter(&mask)?))
        }
        "head" => {
            let mut args = args.into_iter();
            let frame = frame_arg(name, args.next().unwrap_or(Value::Null))?;
            let n = number_arg(name, args.next().unwrap_or(Value::Null))?;
            if n < 0.0 {
                bail!("head expects a non-negative count");
            }
            Ok(Value::Frame(frame.head(Some(n as usize))))
        }
        "rename" => {
            let mut args = args.into_iter();
            let mut frame = frame_arg(name, args.next().unwrap_or(Value::Null))?;
            let (Some(from), Some(to)) = (args.next(), args.next()) else {
                bail!("rename expects a frame and two column names");
            };
            let from = from
                .as_str()
                .ok_or_else(|| anyhow!("rename expects column name strings"))?;
            let to = to
                .as_str()
                .ok_or_else(|| anyhow!("rename expects column name strings"))?
                .to_string();
            let resolved = resolve_column(&frame, from)
                .ok_or_else(|| anyhow!("unknown column '{from}'"))?;
            frame.rename(&resolved, to.into())?;
            Ok(Value::Frame(frame))
        }
        other => bail!("unknown function '{other}'"),
    }
}

fn one_arg(name: &str, args: Vec<Value>) -> Result<Value> {
    let mut args = args.into_iter();
    let (Some(value), None) = (args.next(), args.next()) else {
        bail!("{name} expects exactly one argument");
    };
    Ok(value)
}

fn number_arg(name: &str, value: Value) -> Result<f64> {
    value
        .as_number()
        .ok_or_else(|| anyhow!("{name} expects a number, found {}", value.type_name()))
}

fn frame_arg(name: &str, value: Value) -> Result<DataFrame> {
    match value {
        Value::Frame(frame) => Ok(frame),
        other => bail!("{name} expects a frame, found {}", other.type_name()),
    }
}

fn fold_numbers(name: &str, args: Vec<Value>, f: fn(f64, f64) -> f64) -> Result<Value> {
    let numbers = if args.len() == 1 {
        numbers_of(args.into_iter().next().unwrap_or(Value::Null))?
    } else {
        args.iter()
            .map(|value| {
                value
                    .as_number()
                    .ok_or_else(|| anyhow!("{name} expects numbers"))
            })
            .collect::<Result<Vec<f64>>>()?
    };
    let mut iter = numbers.into_iter();
    let first = iter.next().with_context(|| format!("{name} of nothing"))?;
    Ok(Value::Number(iter.fold(first, f)))
}

/// Numeric cells of a column (nulls and unparseable strings dropped) or a
/// list of numbers.
fn numbers_of(value: Value) -> Result<Vec<f64>> {
    match value {
        Value::Column(column) => Ok((0..column.len())
            .filter_map(|idx| column.get(idx).ok().and_then(any_to_f64))
            .collect()),
        Value::List(items) => items
            .iter()
            .map(|item| {
                item.as_number()
                    .ok_or_else(|| anyhow!("non-numeric list item"))
            })
            .collect(),
        Value::Number(n) => Ok(vec![n]),
        other => bail!("expected a column or list, found {}", other.type_name()),
    }
}

/// Case-insensitive column lookup, preserving the stored spelling.
pub(crate) fn resolve_column(frame: &DataFrame, wanted: &str) -> Option<String> {
    frame
        .get_columns()
        .iter()
        .map(|column| column.name().as_str())
        .find(|name| name.eq_ignore_ascii_case(wanted))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TableRegistry {
        let mut registry = TableRegistry::new();
        let frame = DataFrame::new(vec![
            Column::new("HOUR".into(), vec!["0", "1", "2"]),
            Column::new("PERC90".into(), vec!["20", "18", "18"]),
        ])
        .unwrap();
        registry.insert("metrics", frame);
        registry
    }

    fn eval(src: &str, registry: &mut TableRegistry) -> Result<Value> {
        let variables = BTreeMap::new();
        let mut ctx = EvalContext {
            registry,
            variables: &variables,
        };
        run_program(src, &mut ctx)
    }

    #[test]
    fn arithmetic_and_precedence() {
        let mut registry = TableRegistry::new();
        let value = eval("1 + 2 * 3", &mut registry).unwrap();
        assert_eq!(value.as_number(), Some(7.0));
    }

    #[test]
    fn division_by_zero_fails() {
        let mut registry = TableRegistry::new();
        assert!(eval("1/0", &mut registry).is_err());
    }

    #[test]
    fn aggregates_read_registry_columns() {
        let mut registry = registry();
        let value = eval("sum(tables['metrics']['PERC90'])", &mut registry).unwrap();
        assert_eq!(value.as_number(), Some(56.0));
        let value = eval("max(tables['metrics']['perc90'])", &mut registry).unwrap();
        assert_eq!(value.as_number(), Some(20.0));
    }

    #[test]
    fn column_assignment_mutates_the_table() {
        let mut registry = registry();
        eval(
            "tables['metrics']['DOUBLED'] = tables['metrics']['PERC90'] * 2",
            &mut registry,
        )
        .unwrap();
        let frame = registry.get("metrics").unwrap();
        let column = frame.column("DOUBLED").unwrap();
        assert_eq!(any_to_f64(column.get(0).unwrap()), Some(40.0));
    }

    #[test]
    fn scalar_assignment_broadcasts() {
        let mut registry = registry();
        eval("tables['metrics']['SOURCE'] = 'awr'", &mut registry).unwrap();
        let frame = registry.get("metrics").unwrap();
        assert_eq!(frame.column("SOURCE").unwrap().len(), 3);
    }

    #[test]
    fn filter_and_count_compose() {
        let mut registry = registry();
        let value = eval(
            "count(filter(tables['metrics'], 'PERC90', '18'))",
            &mut registry,
        )
        .unwrap();
        assert_eq!(value.as_number(), Some(2.0));
    }

    #[test]
    fn unknown_table_is_an_error() {
        let mut registry = TableRegistry::new();
        assert!(eval("tables['missing']", &mut registry).is_err());
    }

    #[test]
    fn statements_run_in_sequence() {
        let mut registry = registry();
        let value = eval(
            "tables['metrics']['X'] = 1; sum(tables['metrics']['X'])",
            &mut registry,
        )
        .unwrap();
        assert_eq!(value.as_number(), Some(3.0));
    }
}
