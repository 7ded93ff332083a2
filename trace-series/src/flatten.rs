//! Record flattening and labeled event unwrapping
//!
//! Turns arbitrarily nested JSON records into flat maps keyed by dotted
//! paths (`attributes.event.task`). Object keys are joined with `.`, array
//! elements are addressed by position (`samples.0.value`), and only scalar
//! leaves survive. Empty objects and empty arrays contribute no keys.

use crate::types::{FlattenedRecord, PipelineError, Result};
use serde_json::{Map, Value};

/// Key under which the engine wraps each labeled event
pub const ENVELOPE_KEY: &str = "flattened_labeled_events";

/// Flatten a batch of raw records.
///
/// With `unwrap_envelope`, each record must carry exactly the
/// `flattened_labeled_events[0][0]` object and only that sub-record is
/// flattened.
pub fn normalize(records: &[Value], unwrap_envelope: bool) -> Result<Vec<FlattenedRecord>> {
    let flattened = records
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            if unwrap_envelope {
                unwrap_labeled_event(record, idx).map(flatten_record)
            } else {
                Ok(flatten_record(record))
            }
        })
        .collect::<Result<Vec<_>>>()?;

    log::debug!(
        "Flattened {} records (envelope unwrapping: {})",
        flattened.len(),
        unwrap_envelope
    );
    Ok(flattened)
}

/// Extract the single labeled event from its envelope
pub fn unwrap_labeled_event(record: &Value, index: usize) -> Result<&Value> {
    let shape_error = |reason: &str| PipelineError::EnvelopeShape {
        record: index,
        reason: reason.to_string(),
    };

    let outer = record
        .get(ENVELOPE_KEY)
        .ok_or_else(|| shape_error("missing 'flattened_labeled_events'"))?
        .as_array()
        .ok_or_else(|| shape_error("'flattened_labeled_events' is not an array"))?;

    let inner = outer
        .first()
        .ok_or_else(|| shape_error("'flattened_labeled_events' is empty"))?
        .as_array()
        .ok_or_else(|| shape_error("'flattened_labeled_events[0]' is not an array"))?;

    let event = inner
        .first()
        .ok_or_else(|| shape_error("'flattened_labeled_events[0]' is empty"))?;

    if !event.is_object() {
        return Err(shape_error("labeled event is not an object"));
    }
    Ok(event)
}

/// Flatten one record into dotted-path keys
pub fn flatten_record(record: &Value) -> FlattenedRecord {
    let mut out = FlattenedRecord::new();
    let mut path = String::new();
    visit(record, &mut path, &mut out);
    out
}

fn visit(value: &Value, path: &mut String, out: &mut FlattenedRecord) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                descend(path, key, |path| visit(child, path, out));
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                descend(path, &idx.to_string(), |path| visit(child, path, out));
            }
        }
        leaf => {
            out.insert(path.clone(), leaf.clone());
        }
    }
}

/// Push one path segment, run `f`, then restore the path
fn descend(path: &mut String, segment: &str, f: impl FnOnce(&mut String)) {
    let len = path.len();
    if !path.is_empty() {
        path.push('.');
    }
    path.push_str(segment);
    f(path);
    path.truncate(len);
}

/// Re-nest a flattened record using the same dotted-path convention.
///
/// Every segment becomes an object key, so positional array segments come
/// back as `"0"`, `"1"`, ... keys.
pub fn unflatten(record: &FlattenedRecord) -> Value {
    let mut root = Map::new();

    for (key, leaf) in record {
        let mut segments = key.split('.').peekable();
        let mut node = &mut root;
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                node.insert(segment.to_string(), leaf.clone());
                break;
            }
            let child = node
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            node = match child {
                Value::Object(map) => map,
                _ => unreachable!(),
            };
        }
    }

    Value::Object(root)
}

/// Members of an aggregate `Set` result (`... AGGREGATE distinct(x)`).
///
/// The engine answers aggregate queries with a single record shaped as
/// `{"value": {"Set": [...]}}`.
pub fn aggregate_set(records: &[Value]) -> Result<Vec<Value>> {
    let record = records
        .first()
        .ok_or_else(|| PipelineError::AggregateShape("query returned no records".to_string()))?;

    let value = record
        .get("value")
        .ok_or_else(|| PipelineError::AggregateShape("missing 'value'".to_string()))?;

    let set = value
        .get("Set")
        .ok_or_else(|| PipelineError::AggregateShape("'value' has no 'Set' container".to_string()))?;

    set.as_array()
        .cloned()
        .ok_or_else(|| PipelineError::AggregateShape("'Set' is not an array".to_string()))
}
