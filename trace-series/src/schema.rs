//! Schema projection
//!
//! Selects a declared subset of flattened keys, renames them to logical
//! column names, drops incomplete rows and coerces every cell to its
//! declared scalar type.

use crate::types::{FlattenedRecord, PipelineError, Result, Row, Scalar, ScalarType, Table};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// One projected column: where it comes from, what it is called, what it holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Dotted source path in the flattened record
    pub source: String,
    /// Logical column name in the projected table
    pub target: String,
    pub ty: ScalarType,
    /// Missing values leave the cell empty instead of dropping the row
    pub optional: bool,
}

impl Column {
    pub fn new(source: impl Into<String>, target: impl Into<String>, ty: ScalarType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            ty,
            optional: false,
        }
    }

    /// Builder method: keep rows where this column is missing
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Ordered list of projected columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: append a column
    pub fn column(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        ty: ScalarType,
    ) -> Self {
        self.columns.push(Column::new(source, target, ty));
        self
    }

    /// Builder method: append a column whose absence does not drop the row
    pub fn optional_column(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        ty: ScalarType,
    ) -> Self {
        self.columns.push(Column::new(source, target, ty).optional());
        self
    }

    /// Build a schema from `(source, target)` pairs and a `target -> type` map.
    ///
    /// Columns without a type entry keep their natural JSON type.
    pub fn from_parts(
        columns: &[(String, String)],
        types: &BTreeMap<String, ScalarType>,
    ) -> Result<Self> {
        for name in types.keys() {
            if !columns.iter().any(|(_, target)| target == name) {
                return Err(PipelineError::Schema(format!(
                    "type declared for unknown column '{}'",
                    name
                )));
            }
        }

        let schema = Self {
            columns: columns
                .iter()
                .map(|(source, target)| {
                    let ty = types.get(target).copied().unwrap_or_default();
                    Column::new(source.clone(), target.clone(), ty)
                })
                .collect(),
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Check the schema is usable: at least one column, unique targets
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(PipelineError::Schema("no columns declared".to_string()));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.target.as_str()) {
                return Err(PipelineError::Schema(format!(
                    "duplicate column '{}'",
                    column.target
                )));
            }
        }
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn targets(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.target.clone()).collect()
    }

    /// Same columns and types, reading each column from its own target name
    pub fn renamed(&self) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    source: c.target.clone(),
                    ..c.clone()
                })
                .collect(),
        }
    }
}

/// Project flattened records onto a schema.
///
/// Rows with any missing or null required column are dropped; a missing
/// optional column leaves its cell empty. Coercion failures are fatal and
/// name the offending column and value.
pub fn project(records: &[FlattenedRecord], schema: &Schema) -> Result<Table> {
    schema.validate()?;

    let mut table = Table::new(schema.targets());
    let mut dropped = 0usize;

    'records: for (idx, record) in records.iter().enumerate() {
        let mut row = Row::new();
        for column in schema.columns() {
            match record.get(&column.source) {
                None | Some(Value::Null) if column.optional => {}
                None | Some(Value::Null) => {
                    log::trace!("Dropping record {}: '{}' is missing", idx, column.source);
                    dropped += 1;
                    continue 'records;
                }
                Some(value) => row.insert(column.target.clone(), coerce(value, column)?),
            }
        }
        table.rows.push(row);
    }

    log::debug!(
        "Projected {} rows onto {} columns ({} incomplete rows dropped)",
        table.len(),
        table.columns.len(),
        dropped
    );
    Ok(table)
}

/// Coerce one JSON leaf to the column's declared type
fn coerce(value: &Value, column: &Column) -> Result<Scalar> {
    let fail = || PipelineError::TypeCoercion {
        column: column.target.clone(),
        value: value.clone(),
        expected: column.ty,
    };

    let scalar = match (column.ty, value) {
        (ScalarType::Float, Value::Number(n)) => Scalar::Float(n.as_f64().ok_or_else(fail)?),
        (ScalarType::Float, Value::String(s)) => {
            Scalar::Float(s.trim().parse::<f64>().map_err(|_| fail())?)
        }
        (ScalarType::Float, Value::Bool(b)) => Scalar::Float(if *b { 1.0 } else { 0.0 }),

        (ScalarType::Text, Value::String(s)) => Scalar::Text(s.clone()),
        (ScalarType::Text, Value::Number(n)) => Scalar::Text(n.to_string()),
        (ScalarType::Text, Value::Bool(b)) => Scalar::Text(b.to_string()),

        (ScalarType::Natural, Value::Number(n)) => Scalar::Float(n.as_f64().ok_or_else(fail)?),
        (ScalarType::Natural, Value::String(s)) => Scalar::Text(s.clone()),
        (ScalarType::Natural, Value::Bool(b)) => Scalar::Bool(*b),

        _ => return Err(fail()),
    };

    match scalar {
        Scalar::Float(v) if !v.is_finite() => Err(fail()),
        scalar => Ok(scalar),
    }
}
