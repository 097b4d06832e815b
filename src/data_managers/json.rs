//! JSON document store: `{"books": [ {...}, ... ]}` with 4-space indentation

use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Value};

use super::file_store::DocumentCodec;
use crate::error::{StorageError, StorageResult};
use crate::models::{EntitySchema, Record};

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl DocumentCodec for JsonCodec {
    const EXTENSION: &'static str = "json";

    fn decode(&self, schema: &'static EntitySchema, content: &str) -> StorageResult<Vec<Record>> {
        let document: Value = serde_json::from_str(content)?;
        let items = match document {
            Value::Object(mut root) => match root.remove(schema.plural) {
                Some(items) => items,
                None => return Ok(Vec::new()),
            },
            // Bare arrays are accepted too
            array @ Value::Array(_) => array,
            _ => {
                return Err(StorageError::malformed(
                    schema.name,
                    "expected an object or an array at the document root",
                ))
            }
        };
        records_from_array(schema, items)
    }

    fn encode(&self, schema: &'static EntitySchema, records: &[Record]) -> StorageResult<String> {
        let mut document = Record::new();
        document.insert(
            schema.plural.to_string(),
            Value::Array(records.iter().cloned().map(Value::Object).collect()),
        );
        to_pretty_string(&Value::Object(document), b"    ")
    }
}

/// Keep the object elements of a JSON array, warning about the rest.
pub(crate) fn records_from_array(
    schema: &'static EntitySchema,
    items: Value,
) -> StorageResult<Vec<Record>> {
    let Value::Array(items) = items else {
        return Err(StorageError::malformed(
            schema.name,
            format!("'{}' is not an array", schema.plural),
        ));
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(record) => records.push(record),
            other => tracing::warn!(
                "Skipping {} entry {}: expected an object, got {}",
                schema.name,
                index,
                other
            ),
        }
    }
    Ok(records)
}

pub(crate) fn to_pretty_string(value: &Value, indent: &[u8]) -> StorageResult<String> {
    let mut buffer = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(indent));
    value.serialize(&mut serializer)?;
    String::from_utf8(buffer).map_err(|e| StorageError::malformed("json", e.to_string()))
}
