//! Series grouping

use crate::types::{PipelineError, Result, Scalar, Series, SeriesTable, Table};
use std::collections::HashMap;

/// Hashable identity of a key cell: equal values share a group, values of
/// different kinds never do.
#[derive(Debug, PartialEq, Eq, Hash)]
enum GroupKey {
    Float(u64),
    Text(String),
    Bool(bool),
}

impl From<&Scalar> for GroupKey {
    fn from(value: &Scalar) -> Self {
        match value {
            // -0.0 == 0.0, so both map to the same bits
            Scalar::Float(v) if *v == 0.0 => GroupKey::Float(0.0f64.to_bits()),
            Scalar::Float(v) => GroupKey::Float(v.to_bits()),
            Scalar::Text(v) => GroupKey::Text(v.clone()),
            Scalar::Bool(v) => GroupKey::Bool(*v),
        }
    }
}

/// Partition rows by the value of `key`.
///
/// Rows belong to the same group when their key values are equal. Groups
/// come out in order of first occurrence, labelled with the first value's
/// text, and rows keep their table order; no sorting happens here.
pub fn group(table: Table, key: &str) -> Result<SeriesTable> {
    if !table.has_column(key) {
        return Err(PipelineError::UnknownColumn(key.to_string()));
    }

    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut series: Vec<Series> = Vec::new();

    for row in table.rows {
        let value = row
            .get(key)
            .ok_or_else(|| PipelineError::UnknownColumn(key.to_string()))?;

        let id = GroupKey::from(value);
        match index.get(&id) {
            Some(&pos) => series[pos].rows.push(row),
            None => {
                index.insert(id, series.len());
                series.push(Series {
                    key: value.to_string(),
                    rows: vec![row],
                });
            }
        }
    }

    log::debug!("Grouped rows into {} series by '{}'", series.len(), key);
    Ok(SeriesTable {
        columns: table.columns,
        series,
    })
}
