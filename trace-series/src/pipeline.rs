//! End-to-end query pipeline
//!
//! Wires the stages together: invoke → parse → flatten → project → derive →
//! group. Every stage runs to completion before the next one starts.

use crate::config::QuerySpec;
use crate::derive::derive;
use crate::flatten::{aggregate_set, normalize};
use crate::group::group;
use crate::invoker::{QueryEngine, QueryInvoker};
use crate::parser::{parse_document, parse_records};
use crate::schema::project;
use crate::types::{FlattenedRecord, Result, Series, SeriesTable, Table};
use serde_json::Value;

/// Key of the single series produced when a spec has no grouping column
pub const UNGROUPED_KEY: &str = "all";

/// Runs query specs against a query engine
#[derive(Debug, Clone)]
pub struct Pipeline<E = QueryInvoker> {
    engine: E,
}

impl Pipeline<QueryInvoker> {
    /// Pipeline over the engine named by `TRACE_SERIES_ENGINE` (or `modality`)
    pub fn from_env() -> Self {
        Self::new(QueryInvoker::from_env())
    }
}

impl<E: QueryEngine> Pipeline<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run a query and return its raw records
    pub fn raw_records(&self, expression: &str, extra_args: &[String]) -> Result<Vec<Value>> {
        let output = self.engine.invoke(expression, extra_args)?;
        parse_records(&output)
    }

    /// Run a query and return its flattened records
    pub fn records(&self, spec: &QuerySpec) -> Result<Vec<FlattenedRecord>> {
        let raw = self.raw_records(&spec.expression, &spec.extra_args)?;
        normalize(&raw, spec.unwrap_envelope)
    }

    /// Run a query and return the projected, derived table
    pub fn table(&self, spec: &QuerySpec) -> Result<Table> {
        let schema = spec.schema()?;
        let records = self.records(spec)?;
        let table = project(&records, &schema)?;
        derive(table, &spec.rules())
    }

    /// Run a query all the way to grouped series
    pub fn run(&self, spec: &QuerySpec) -> Result<SeriesTable> {
        let table = self.table(spec)?;

        let mut series = match &spec.group_by {
            Some(key) => group(table, key)?,
            None if table.is_empty() => SeriesTable {
                columns: table.columns,
                series: Vec::new(),
            },
            None => SeriesTable {
                columns: table.columns,
                series: vec![Series {
                    key: UNGROUPED_KEY.to_string(),
                    rows: table.rows,
                }],
            },
        };

        if let Some(column) = &spec.sort_by {
            series.sort_each_by(column)?;
        }

        if let Some(expression) = &spec.series_filter {
            let keys = self.distinct(expression, &spec.extra_args)?;
            series.retain_keys(&keys);
        }

        log::info!(
            "Query produced {} series with {} rows",
            series.len(),
            series.row_count()
        );
        Ok(series)
    }

    /// Members of an aggregate `distinct(...)` query, rendered as text.
    ///
    /// The engine prints aggregates as one JSON array whose first element
    /// carries `value.Set`; one object per line is accepted as well.
    pub fn distinct(&self, expression: &str, extra_args: &[String]) -> Result<Vec<String>> {
        let output = self.engine.invoke(expression, extra_args)?;
        let raw = parse_document(&output)?;
        let members = aggregate_set(&raw)?
            .into_iter()
            .map(|member| match member {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect::<Vec<_>>();
        log::debug!("Aggregate set has {} members", members.len());
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DerivationSpec;
    use crate::invoker::StaticEngine;
    use crate::types::{PipelineError, Row, ScalarType};

    const EVENTS: &str = concat!(
        r#"{"flattened_labeled_events":[[{"attributes":{"event":{"task":"A","cpu_utilization":0.5}}}]]}"#,
        "\n",
        r#"{"flattened_labeled_events":[[{"attributes":{"event":{"task":"B","cpu_utilization":0.25}}}]]}"#,
        "\n",
        r#"{"flattened_labeled_events":[[{"attributes":{"event":{"task":"A"}}}]]}"#,
        "\n",
    );

    fn cpu_spec() -> QuerySpec {
        QuerySpec::new("* @ *")
            .column("attributes.event.task", "task", ScalarType::Text)
            .column("attributes.event.cpu_utilization", "cpu_utilization", ScalarType::Float)
            .derive(DerivationSpec::RatioToPercent {
                target: "cpu_utilization".into(),
                source: "cpu_utilization".into(),
            })
            .group_by("task")
    }

    #[test]
    fn test_run_groups_series() {
        let pipeline = Pipeline::new(StaticEngine::new(EVENTS));
        let series = pipeline.run(&cpu_spec()).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(
            series.get("A").unwrap().rows,
            vec![Row::new().with("task", "A").with("cpu_utilization", 50.0)]
        );
        assert_eq!(
            series.get("B").unwrap().rows,
            vec![Row::new().with("task", "B").with("cpu_utilization", 25.0)]
        );
    }

    #[test]
    fn test_series_filter() {
        let engine = StaticEngine::new(EVENTS)
            .with_response("agg", r#"[{"value":{"Set":["B","Z"]}}]"#);
        let pipeline = Pipeline::new(engine);
        let series = pipeline.run(&cpu_spec().with_series_filter("agg")).unwrap();
        let keys: Vec<_> = series.keys().collect();
        assert_eq!(keys, vec!["B"]);
    }

    #[test]
    fn test_ungrouped_single_series() {
        let pipeline = Pipeline::new(StaticEngine::new(EVENTS));
        let mut spec = cpu_spec();
        spec.group_by = None;
        let series = pipeline.run(&spec.sort_by("cpu_utilization")).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.get(UNGROUPED_KEY).unwrap().floats("cpu_utilization"), vec![25.0, 50.0]);
    }

    #[test]
    fn test_distinct_renders_members() {
        let engine = StaticEngine::new(r#"[{"value":{"Set":["IDLE",3]}}]"#);
        let members = Pipeline::new(engine).distinct("agg", &[]).unwrap();
        assert_eq!(members, vec!["IDLE", "3"]);
    }

    #[test]
    fn test_distinct_pretty_printed_array() {
        let output = "[\n  {\n    \"value\": {\n      \"Set\": [\"A\", \"B\"]\n    }\n  }\n]\n";
        let members = Pipeline::new(StaticEngine::new(output)).distinct("agg", &[]).unwrap();
        assert_eq!(members, vec!["A", "B"]);

        let line = r#"{"value":{"Set":["C"]}}"#;
        let members = Pipeline::new(StaticEngine::new(line)).distinct("agg", &[]).unwrap();
        assert_eq!(members, vec!["C"]);
    }

    #[test]
    fn test_distinct_shape_errors() {
        for output in ["[]", "[{}]", r#"[{"value":{"Count":2}}]"#, ""] {
            let err = Pipeline::new(StaticEngine::new(output)).distinct("agg", &[]).unwrap_err();
            assert!(matches!(err, PipelineError::AggregateShape(_)), "{}: {:?}", output, err);
        }
    }
}
