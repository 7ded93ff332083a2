//! Core types for the trace series pipeline
//!
//! This module defines the tabular shapes that flow between pipeline stages
//! (rows, tables, grouped series) together with the error taxonomy. Every
//! value here is transient: created per query and handed off to a renderer.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// A flattened record: dotted-path keys mapped to scalar JSON leaves
pub type FlattenedRecord = BTreeMap<String, serde_json::Value>;

/// Errors that can occur while querying and shaping trace data
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Query engine exited with {}: {stderr}", exit_status(.code))]
    QueryExecutionFailed {
        /// Exit code, `None` when the process was killed by a signal
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Query engine output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("Malformed record on line {line}: {source}")]
    MalformedRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Record {record} has no labeled event envelope: {reason}")]
    EnvelopeShape { record: usize, reason: String },

    #[error("Aggregate result has unexpected shape: {0}")]
    AggregateShape(String),

    #[error("Cannot coerce column '{column}' value {value} to {expected}")]
    TypeCoercion {
        column: String,
        value: serde_json::Value,
        expected: ScalarType,
    },

    #[error("Derivation '{rule}' failed on row {row}: {reason}")]
    Derivation {
        rule: String,
        row: usize,
        reason: String,
    },

    #[error("Query engine '{0}' could not be started")]
    EngineNotFound(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// Declared type of a projected column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    /// Finite 64-bit float (numbers, numeric strings, booleans as 1/0)
    Float,
    /// Text (strings, or numbers/booleans rendered as text)
    Text,
    /// Keep the JSON leaf's own type
    #[default]
    Natural,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::Float => write!(f, "float"),
            ScalarType::Text => write!(f, "text"),
            ScalarType::Natural => write!(f, "natural"),
        }
    }
}

/// A typed cell value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Float(f64),
    Text(String),
    Bool(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(v) => write!(f, "{}", v),
            Scalar::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl Scalar {
    /// Numeric view of this value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view of this value, if it has one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Convert back into a JSON leaf
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Scalar::Text(v) => serde_json::Value::String(v.clone()),
            Scalar::Bool(v) => serde_json::Value::Bool(*v),
        }
    }

    /// Ordering used by explicit sort steps: numbers by `total_cmp`,
    /// text lexicographically, mixed kinds by kind.
    fn sort_cmp(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Scalar::Float(a), Scalar::Float(b)) => a.total_cmp(b),
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Scalar::Bool(_) => 0,
            Scalar::Float(_) => 1,
            Scalar::Text(_) => 2,
        }
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

/// One row of a projected or derived table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    values: BTreeMap<String, Scalar>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful in tests
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Scalar>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.values.get(column)
    }

    /// Numeric value of a column, failing if it is missing or not numeric
    pub fn float(&self, column: &str) -> std::result::Result<f64, String> {
        match self.values.get(column) {
            Some(Scalar::Float(v)) => Ok(*v),
            Some(other) => Err(format!("column '{}' is not numeric ({})", column, other)),
            None => Err(format!("column '{}' is missing", column)),
        }
    }

    /// Text value of a column, if present and textual
    pub fn text(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(Scalar::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Scalar)> {
        self.values.iter()
    }
}

/// A table of rows sharing an ordered set of column names
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// All values of one column in row order
    pub fn column(&self, column: &str) -> Result<Vec<&Scalar>> {
        if !self.has_column(column) {
            return Err(PipelineError::UnknownColumn(column.to_string()));
        }
        Ok(self.rows.iter().filter_map(|row| row.get(column)).collect())
    }

    /// Stable sort of the rows by one column
    pub fn sort_by(&mut self, column: &str) -> Result<()> {
        if !self.has_column(column) {
            return Err(PipelineError::UnknownColumn(column.to_string()));
        }
        sort_rows(&mut self.rows, column);
        Ok(())
    }

    /// Turn the table back into flattened records keyed by column name
    pub fn to_records(&self) -> Vec<FlattenedRecord> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(column, value)| (column.clone(), value.to_json()))
                    .collect()
            })
            .collect()
    }
}

/// Rows that share one group key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub key: String,
    pub rows: Vec<Row>,
}

impl Series {
    /// Stable sort of the series by one column
    pub fn sort_by(&mut self, column: &str) {
        sort_rows(&mut self.rows, column);
    }

    /// Numeric values of one column; rows where it is not numeric are skipped
    pub fn floats(&self, column: &str) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).and_then(Scalar::as_f64))
            .collect()
    }
}

/// Grouped series, iterated in first-occurrence order of their keys
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesTable {
    pub columns: Vec<String>,
    pub series: Vec<Series>,
}

impl SeriesTable {
    pub fn get(&self, key: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(|s| s.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total number of rows across all series
    pub fn row_count(&self) -> usize {
        self.series.iter().map(|s| s.rows.len()).sum()
    }

    /// Keep only the listed keys, in the order given. Keys with no rows
    /// are skipped.
    pub fn retain_keys(&mut self, keys: &[String]) {
        let mut remaining = std::mem::take(&mut self.series);
        for key in keys {
            if let Some(pos) = remaining.iter().position(|s| &s.key == key) {
                self.series.push(remaining.swap_remove(pos));
            }
        }
    }

    pub fn sort_each_by(&mut self, column: &str) -> Result<()> {
        if !self.columns.iter().any(|c| c == column) {
            return Err(PipelineError::UnknownColumn(column.to_string()));
        }
        for series in &mut self.series {
            series.sort_by(column);
        }
        Ok(())
    }
}

fn sort_rows(rows: &mut [Row], column: &str) {
    rows.sort_by(|a, b| match (a.get(column), b.get(column)) {
        (Some(x), Some(y)) => x.sort_cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}
