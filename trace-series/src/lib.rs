//! Trace Series Library
//!
//! A stateless library that turns line-delimited JSON query results from a
//! trace query engine into typed, grouped time series ready for charting.
//!
//! # Architecture
//!
//! Data flows strictly left to right, each stage running to completion:
//! - `invoker`: runs `<engine> query --format json <expr>` as a subprocess
//! - `parser`: one JSON document per line into raw records
//! - `flatten`: nested records into dotted-path keys, unwrapping the
//!   labeled event envelope on request
//! - `schema`: select, rename, drop incomplete rows, coerce types
//! - `derive`: per-row derived columns (unit conversions, percentages)
//! - `group`: partition into series by a key column
//!
//! The library does NOT:
//! - Render charts or print logs
//! - Cache or persist query results
//! - Retry failed queries
//!
//! Presentation lives in the application layer (trace-series-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use trace_series::{DerivationSpec, Pipeline, QuerySpec, ScalarType};
//!
//! let spec = QuerySpec::new(r#"* @ * (_.task != "IDLE" AND exists(_.cpu_utilization))"#)
//!     .column("attributes.event.task", "task", ScalarType::Text)
//!     .column("attributes.event.cpu_utilization", "cpu_utilization", ScalarType::Float)
//!     .derive(DerivationSpec::RatioToPercent {
//!         target: "cpu_utilization".into(),
//!         source: "cpu_utilization".into(),
//!     })
//!     .group_by("task");
//!
//! let series = Pipeline::from_env().run(&spec).unwrap();
//! for s in &series.series {
//!     println!("{}: {:?}", s.key, s.floats("cpu_utilization"));
//! }
//! ```

// Public modules
pub mod config;
pub mod derive;
pub mod flatten;
pub mod group;
pub mod invoker;
pub mod parser;
pub mod pipeline;
pub mod schema;
pub mod types;

// Re-export main types for convenience
pub use config::{ColumnSpec, DerivationSpec, QuerySpec};
pub use derive::Rule;
pub use invoker::{QueryEngine, QueryInvoker, StaticEngine};
pub use pipeline::Pipeline;
pub use schema::{Column, Schema};
pub use types::{
    FlattenedRecord, PipelineError, Result, Row, Scalar, ScalarType, Series, SeriesTable, Table,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: a canned engine with no output yields no series
        let pipeline = Pipeline::new(StaticEngine::new(""));
        let spec = QuerySpec::new("* @ *").column("a", "a", ScalarType::Float);
        assert!(pipeline.run(&spec).unwrap().is_empty());
    }
}
