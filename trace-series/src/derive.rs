//! Derived metric columns
//!
//! Each rule computes one column from other columns of the same row. Rules
//! run in order, so later rules can read columns produced by earlier ones.
//! Arithmetic faults are errors; rows are never dropped or filled with a
//! sentinel value.

use crate::types::{PipelineError, Result, Row, Scalar, Table};
use std::fmt;

/// Nanoseconds per second
pub const NANOS_PER_SEC: f64 = 1_000_000_000.0;

type RuleFn = dyn Fn(&Row) -> std::result::Result<Scalar, String> + Send + Sync;

/// A named per-row computation producing one column
pub struct Rule {
    target: String,
    compute: Box<RuleFn>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("target", &self.target).finish()
    }
}

impl Rule {
    /// Rule backed by an arbitrary function of the row
    pub fn custom<F>(target: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Row) -> std::result::Result<Scalar, String> + Send + Sync + 'static,
    {
        Self {
            target: target.into(),
            compute: Box::new(compute),
        }
    }

    /// Numeric rule; non-finite results are rejected
    fn numeric<F>(target: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Row) -> std::result::Result<f64, String> + Send + Sync + 'static,
    {
        Self::custom(target, move |row| {
            let value = compute(row)?;
            if value.is_finite() {
                Ok(Scalar::Float(value))
            } else {
                Err(format!("result {} is not finite", value))
            }
        })
    }

    /// `target = source / 10^9`
    pub fn nanos_to_seconds(target: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        Self::numeric(target, move |row| Ok(row.float(&source)? / NANOS_PER_SEC))
    }

    /// `target = source * 100`
    pub fn ratio_to_percent(target: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        Self::numeric(target, move |row| Ok(row.float(&source)? * 100.0))
    }

    /// `target = part / whole * 100`
    pub fn share_percent(
        target: impl Into<String>,
        part: impl Into<String>,
        whole: impl Into<String>,
    ) -> Self {
        let (part, whole) = (part.into(), whole.into());
        Self::numeric(target, move |row| {
            Ok(checked_div(row.float(&part)?, row.float(&whole)?, &whole)? * 100.0)
        })
    }

    /// `target = (1 - remaining / total) * 100`
    pub fn remaining_to_used_percent(
        target: impl Into<String>,
        remaining: impl Into<String>,
        total: impl Into<String>,
    ) -> Self {
        let (remaining, total) = (remaining.into(), total.into());
        Self::numeric(target, move |row| {
            Ok((1.0 - checked_div(row.float(&remaining)?, row.float(&total)?, &total)?) * 100.0)
        })
    }

    /// `target = ticks * resolution / 10^9`
    pub fn scaled_duration(
        target: impl Into<String>,
        ticks: impl Into<String>,
        resolution: impl Into<String>,
    ) -> Self {
        let (ticks, resolution) = (ticks.into(), resolution.into());
        Self::numeric(target, move |row| {
            Ok(row.float(&ticks)? * row.float(&resolution)? / NANOS_PER_SEC)
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Evaluate the rule against one row
    pub fn apply(&self, row: &Row) -> std::result::Result<Scalar, String> {
        (self.compute)(row)
    }
}

fn checked_div(numerator: f64, denominator: f64, column: &str) -> std::result::Result<f64, String> {
    if denominator == 0.0 {
        return Err(format!("division by zero ('{}' is 0)", column));
    }
    Ok(numerator / denominator)
}

/// Apply rules in order, appending (or replacing) one column per rule
pub fn derive(mut table: Table, rules: &[Rule]) -> Result<Table> {
    for rule in rules {
        for (idx, row) in table.rows.iter_mut().enumerate() {
            let value = rule.apply(row).map_err(|reason| PipelineError::Derivation {
                rule: rule.target.clone(),
                row: idx,
                reason,
            })?;
            row.insert(rule.target.clone(), value);
        }
        if !table.has_column(&rule.target) {
            table.columns.push(rule.target.clone());
        }
    }

    log::debug!("Derived {} columns over {} rows", rules.len(), table.len());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: Vec<Row>) -> Table {
        let mut columns: Vec<String> = rows
            .first()
            .map(|r| r.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default();
        columns.sort();
        Table { columns, rows }
    }

    #[test]
    fn test_unit_conversions() {
        let input = table(vec![Row::new()
            .with("total_runtime", 2_500_000_000.0)
            .with("cpu_utilization", 0.25)]);

        let rules = vec![
            Rule::nanos_to_seconds("total_run_time_sec", "total_runtime"),
            Rule::ratio_to_percent("cpu_utilization", "cpu_utilization"),
        ];
        let out = derive(input, &rules).unwrap();

        assert_eq!(out.rows[0].float("total_run_time_sec"), Ok(2.5));
        assert_eq!(out.rows[0].float("cpu_utilization"), Ok(25.0));
        assert_eq!(
            out.columns,
            vec!["cpu_utilization", "total_runtime", "total_run_time_sec"]
        );
    }

    #[test]
    fn test_stack_and_duration_rules() {
        let input = table(vec![Row::new()
            .with("stack_high_water", 256.0)
            .with("stack_size", 1024.0)
            .with("total_run_time", 2000.0)
            .with("time_resolution", 1_000_000.0)
            .with("task_run_time", 500.0)]);

        let rules = vec![
            Rule::remaining_to_used_percent("task_stack_usage", "stack_high_water", "stack_size"),
            Rule::scaled_duration("total_run_time_sec", "total_run_time", "time_resolution"),
            Rule::share_percent("task_cpu_usage", "task_run_time", "total_run_time"),
        ];
        let out = derive(input, &rules).unwrap();

        assert_eq!(out.rows[0].float("task_stack_usage"), Ok(75.0));
        assert_eq!(out.rows[0].float("total_run_time_sec"), Ok(2.0));
        assert_eq!(out.rows[0].float("task_cpu_usage"), Ok(25.0));
    }

    #[test]
    fn test_rules_see_earlier_columns() {
        let input = table(vec![Row::new().with("ns", 3e9)]);
        let rules = vec![
            Rule::nanos_to_seconds("sec", "ns"),
            Rule::custom("minutes", |row| Ok(Scalar::Float(row.float("sec")? / 60.0))),
        ];
        let out = derive(input, &rules).unwrap();
        assert_eq!(out.rows[0].float("minutes"), Ok(0.05));
    }

    #[test]
    fn test_division_by_zero_names_rule_and_row() {
        let input = table(vec![
            Row::new().with("a", 1.0).with("b", 2.0),
            Row::new().with("a", 1.0).with("b", 0.0),
        ]);
        let rules = vec![Rule::share_percent("pct", "a", "b")];
        match derive(input, &rules) {
            Err(PipelineError::Derivation { rule, row, .. }) => {
                assert_eq!(rule, "pct");
                assert_eq!(row, 1);
            }
            other => panic!("expected Derivation, got {:?}", other),
        }
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let input = table(vec![Row::new().with("task", "A")]);
        let rules = vec![Rule::ratio_to_percent("pct", "task")];
        assert!(matches!(
            derive(input, &rules),
            Err(PipelineError::Derivation { .. })
        ));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let rows = vec![
            Row::new().with("a", 3.0).with("b", 7.0),
            Row::new().with("a", 5.0).with("b", 9.0),
        ];
        let rules = vec![Rule::remaining_to_used_percent("used", "a", "b")];
        let first = derive(table(rows.clone()), &rules).unwrap();
        let second = derive(table(rows), &rules).unwrap();
        assert_eq!(first, second);
        for row in &first.rows {
            let expected = (1.0 - row.float("a").unwrap() / row.float("b").unwrap()) * 100.0;
            assert_eq!(row.float("used"), Ok(expected));
        }
    }
}
