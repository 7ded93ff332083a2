//! Line-delimited JSON record parser

use crate::types::{PipelineError, Result};
use serde_json::Value;

/// Parse engine output into raw records, one JSON document per non-empty line.
///
/// A malformed line fails the whole call; partial results are never returned.
pub fn parse_records(text: &str) -> Result<Vec<Value>> {
    let mut records = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record = serde_json::from_str(line).map_err(|source| PipelineError::MalformedRecord {
            line: idx + 1,
            source,
        })?;
        records.push(record);
    }

    log::debug!("Parsed {} records", records.len());
    Ok(records)
}

/// Parse output that may be a single JSON document spanning several lines.
///
/// Aggregate queries print one top-level array, often pretty-printed; its
/// elements become the records. A single object becomes one record. Anything
/// that is not one document is read line by line with [`parse_records`].
pub fn parse_document(text: &str) -> Result<Vec<Value>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => {
            log::debug!("Parsed document with {} elements", items.len());
            Ok(items)
        }
        Ok(doc) => Ok(vec![doc]),
        Err(_) => parse_records(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_input() {
        assert!(parse_records("").unwrap().is_empty());
        assert!(parse_records("\n  \n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_lines() {
        let text = "{\"a\":1}\n\n{\"b\":[true,null]}\r\n";
        let records = parse_records(text).unwrap();
        assert_eq!(records, vec![json!({"a": 1}), json!({"b": [true, null]})]);
    }

    #[test]
    fn test_document_array() {
        let compact = r#"[{"value":{"Set":["A","B"]}}]"#;
        assert_eq!(parse_document(compact).unwrap(), vec![json!({"value": {"Set": ["A", "B"]}})]);

        let pretty = "[\n  {\n    \"value\": {\"Set\": [\"A\"]}\n  }\n]\n";
        assert_eq!(parse_document(pretty).unwrap(), vec![json!({"value": {"Set": ["A"]}})]);
    }

    #[test]
    fn test_document_falls_back_to_lines() {
        assert_eq!(parse_document(r#"{"a":1}"#).unwrap(), vec![json!({"a": 1})]);
        assert_eq!(
            parse_document("{\"a\":1}\n{\"b\":2}\n").unwrap(),
            vec![json!({"a": 1}), json!({"b": 2})]
        );
        assert!(parse_document(" \n").unwrap().is_empty());
        assert!(matches!(
            parse_document("{\"a\":1}\n{oops"),
            Err(PipelineError::MalformedRecord { line: 2, .. })
        ));
    }

    #[test]
    fn test_malformed_line_number() {
        let text = "{\"a\":1}\n\n{\"b\":\n{\"c\":3}";
        match parse_records(text) {
            Err(PipelineError::MalformedRecord { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected MalformedRecord, got {:?}", other),
        }
    }
}
