//! CSV store: one row per record, header in schema field order.
//!
//! Booleans are written `True`/`False`, lists are `;`-joined and optional
//! values are empty cells. Columns the schema does not know are ignored on
//! read; missing columns fall back to the entity defaults.

use csv::{ReaderBuilder, StringRecord, Writer};

use super::file_store::DocumentCodec;
use crate::error::{StorageError, StorageResult};
use crate::models::{EntitySchema, Record};

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvCodec;

impl DocumentCodec for CsvCodec {
    const EXTENSION: &'static str = "csv";

    fn decode(&self, schema: &'static EntitySchema, content: &str) -> StorageResult<Vec<Record>> {
        let mut reader = ReaderBuilder::new().from_reader(content.as_bytes());
        let headers = reader.headers()?.clone();

        let mut records = Vec::new();
        for (index, row) in reader.records().enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!("Skipping malformed {} row {}: {}", schema.name, index + 1, e);
                    continue;
                }
            };

            match row_to_record(schema, &headers, &row) {
                Ok(record) => records.push(record),
                Err(message) => {
                    tracing::warn!("Skipping {} row {}: {}", schema.name, index + 1, message)
                }
            }
        }

        Ok(records)
    }

    fn encode(&self, schema: &'static EntitySchema, records: &[Record]) -> StorageResult<String> {
        let mut writer = Writer::from_writer(Vec::new());
        writer.write_record(schema.fields.iter().map(|field| field.name))?;

        for record in records {
            writer.write_record(
                schema
                    .fields
                    .iter()
                    .map(|field| field.kind.to_text(record.get(field.name))),
            )?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| StorageError::malformed(schema.name, e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| StorageError::malformed(schema.name, e.to_string()))
    }
}

fn row_to_record(
    schema: &'static EntitySchema,
    headers: &StringRecord,
    row: &StringRecord,
) -> Result<Record, String> {
    let mut record = Record::new();
    for (header, cell) in headers.iter().zip(row.iter()) {
        if let Some(field) = schema.field(header) {
            let value = field
                .kind
                .from_text(cell)
                .map_err(|e| format!("column '{}': {}", header, e))?;
            record.insert(header.to_string(), value);
        }
    }
    Ok(record)
}
