//! Plain-text store: the collection as one JSON array

use serde_json::Value;

use super::file_store::DocumentCodec;
use super::json::{records_from_array, to_pretty_string};
use crate::error::StorageResult;
use crate::models::{EntitySchema, Record};

#[derive(Debug, Clone, Copy, Default)]
pub struct TxtCodec;

impl DocumentCodec for TxtCodec {
    const EXTENSION: &'static str = "txt";

    fn decode(&self, schema: &'static EntitySchema, content: &str) -> StorageResult<Vec<Record>> {
        let document: Value = serde_json::from_str(content)?;
        records_from_array(schema, document)
    }

    fn encode(&self, _schema: &'static EntitySchema, records: &[Record]) -> StorageResult<String> {
        let array = Value::Array(records.iter().cloned().map(Value::Object).collect());
        to_pretty_string(&array, b"  ")
    }
}
