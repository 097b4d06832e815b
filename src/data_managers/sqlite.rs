//! SQLite store: one table per entity in a shared `library.db`.
//!
//! Entities with [`SqlLayout::Columns`] get one column per field; the others
//! are stored as `(id TEXT PRIMARY KEY, data TEXT)` with the record as JSON.
//! A connection is opened and closed for every call.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row};

use super::{BackupSource, Criteria, RecordStore};
use crate::error::StorageResult;
use crate::models::{EntitySchema, FieldKind, Record, SqlLayout};

pub const DATABASE_FILE: &str = "library.db";

/// A bind parameter in its SQLite storage class
#[derive(Debug, Clone, PartialEq)]
enum SqlValue {
    Text(Option<String>),
    Integer(Option<i64>),
    Boolean(Option<bool>),
}

pub struct SqliteStore {
    schema: &'static EntitySchema,
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn new(schema: &'static EntitySchema, base_path: &Path) -> Self {
        Self {
            schema,
            db_path: base_path.join(DATABASE_FILE),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn table(&self) -> &'static str {
        self.schema.plural
    }

    async fn connect(&self) -> StorageResult<SqliteConnection> {
        if let Some(parent) = self.db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut conn = SqliteConnectOptions::new()
            .filename(&self.db_path)
            .create_if_missing(true)
            .connect()
            .await?;

        sqlx::query(&self.create_table_sql())
            .execute(&mut conn)
            .await?;

        Ok(conn)
    }

    fn create_table_sql(&self) -> String {
        match self.schema.layout {
            SqlLayout::JsonBlob => format!(
                "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, data TEXT NOT NULL)",
                self.table()
            ),
            SqlLayout::Columns => {
                let columns: Vec<String> = self
                    .schema
                    .fields
                    .iter()
                    .map(|field| {
                        if field.name == "id" {
                            "id TEXT PRIMARY KEY".to_string()
                        } else {
                            format!("{} {}", field.name, column_type(field.kind))
                        }
                    })
                    .collect();
                format!(
                    "CREATE TABLE IF NOT EXISTS {} ({})",
                    self.table(),
                    columns.join(", ")
                )
            }
        }
    }

    fn upsert_statement(&self, record: &Record) -> StorageResult<(String, Vec<SqlValue>)> {
        match self.schema.layout {
            SqlLayout::JsonBlob => {
                let id = record
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let data = serde_json::to_string(record)?;
                Ok((
                    format!(
                        "INSERT OR REPLACE INTO {} (id, data) VALUES (?, ?)",
                        self.table()
                    ),
                    vec![SqlValue::Text(id), SqlValue::Text(Some(data))],
                ))
            }
            SqlLayout::Columns => {
                let names = self.schema.field_names();
                let placeholders = vec!["?"; names.len()].join(", ");
                let values = self
                    .schema
                    .fields
                    .iter()
                    .map(|field| to_sql(field.kind, record.get(field.name)))
                    .collect();
                Ok((
                    format!(
                        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
                        self.table(),
                        names.join(", "),
                        placeholders
                    ),
                    values,
                ))
            }
        }
    }

    /// Rows to records, skipping rows that cannot be decoded.
    fn decode_rows(&self, rows: &[SqliteRow]) -> Vec<Record> {
        rows.iter()
            .filter_map(|row| {
                let decoded = match self.schema.layout {
                    SqlLayout::JsonBlob => blob_to_record(row),
                    SqlLayout::Columns => columns_to_record(self.schema, row),
                };
                match decoded {
                    Ok(record) => Some(record),
                    Err(message) => {
                        tracing::warn!("Skipping {} row: {}", self.schema.name, message);
                        None
                    }
                }
            })
            .collect()
    }

    async fn fetch(&self, sql: &str, binds: Vec<SqlValue>) -> StorageResult<Vec<Record>> {
        if !self.db_path.exists() {
            return Ok(Vec::new());
        }

        let mut conn = self.connect().await?;
        let mut query = sqlx::query(sql);
        for value in binds {
            query = bind_value(query, value);
        }
        let rows = query.fetch_all(&mut conn).await?;
        conn.close().await?;

        Ok(self.decode_rows(&rows))
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    fn backup_source(&self) -> BackupSource {
        BackupSource::File(self.db_path.clone())
    }

    async fn read_all(&self) -> StorageResult<Vec<Record>> {
        self.fetch(&format!("SELECT * FROM {}", self.table()), Vec::new())
            .await
    }

    async fn read_one(&self, id: &str) -> StorageResult<Option<Record>> {
        let records = self
            .fetch(
                &format!("SELECT * FROM {} WHERE id = ?", self.table()),
                vec![SqlValue::Text(Some(id.to_string()))],
            )
            .await?;
        Ok(records.into_iter().next())
    }

    async fn upsert(&self, record: Record) -> StorageResult<()> {
        let (sql, binds) = self.upsert_statement(&record)?;

        let mut conn = self.connect().await?;
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = bind_value(query, value);
        }
        query.execute(&mut conn).await?;
        conn.close().await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> StorageResult<bool> {
        if !self.db_path.exists() {
            return Ok(false);
        }

        let mut conn = self.connect().await?;
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", self.table()))
            .bind(id)
            .execute(&mut conn)
            .await?;
        conn.close().await?;

        Ok(result.rows_affected() > 0)
    }

    /// Narrows candidates with a WHERE clause on the column layout. Only
    /// exact integer and boolean conditions are pushed down; text matching
    /// needs Unicode case folding, which SQL `LIKE` does not do.
    async fn candidates(&self, criteria: &Criteria) -> StorageResult<Vec<Record>> {
        if self.schema.layout != SqlLayout::Columns || criteria.is_empty() {
            return self.read_all().await;
        }

        let mut clauses = Vec::new();
        let mut binds = Vec::new();
        for (name, expected) in criteria {
            let Some(field) = self.schema.field(name) else {
                return Ok(Vec::new());
            };
            match (field.kind, expected) {
                (FieldKind::Int | FieldKind::OptInt, Value::Number(n)) if n.is_i64() => {
                    clauses.push(format!("{} = ?", field.name));
                    binds.push(SqlValue::Integer(n.as_i64()));
                }
                (FieldKind::Bool, Value::Bool(b)) => {
                    clauses.push(format!("{} = ?", field.name));
                    binds.push(SqlValue::Boolean(Some(*b)));
                }
                _ => {}
            }
        }

        if clauses.is_empty() {
            return self.read_all().await;
        }

        let sql = format!(
            "SELECT * FROM {} WHERE {}",
            self.table(),
            clauses.join(" AND ")
        );
        self.fetch(&sql, binds).await
    }
}

fn column_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Int | FieldKind::OptInt | FieldKind::Bool => "INTEGER",
        _ => "TEXT",
    }
}

fn to_sql(kind: FieldKind, value: Option<&Value>) -> SqlValue {
    match kind {
        FieldKind::Int | FieldKind::OptInt => SqlValue::Integer(value.and_then(Value::as_i64)),
        FieldKind::Bool => SqlValue::Boolean(value.and_then(Value::as_bool)),
        FieldKind::TextList => SqlValue::Text(Some(kind.to_text(value))),
        _ => match value {
            None | Some(Value::Null) => SqlValue::Text(None),
            Some(v) => SqlValue::Text(Some(kind.to_text(Some(v)))),
        },
    }
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: SqlValue,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Integer(v) => query.bind(v),
        SqlValue::Boolean(v) => query.bind(v),
    }
}

/// `Ok(None)` when the column does not exist in this table.
fn read_column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<Option<Option<T>>, sqlx::Error>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    match row.try_get::<Option<T>, _>(name) {
        Ok(value) => Ok(Some(value)),
        Err(sqlx::Error::ColumnNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn columns_to_record(schema: &EntitySchema, row: &SqliteRow) -> Result<Record, String> {
    let mut record = Record::new();
    for field in schema.fields {
        let value = match field.kind {
            FieldKind::Int | FieldKind::OptInt => read_column::<i64>(row, field.name)
                .map(|v| v.map(|v| v.map(Value::from).unwrap_or(Value::Null))),
            FieldKind::Bool => read_column::<bool>(row, field.name)
                .map(|v| v.map(|v| v.map(Value::Bool).unwrap_or(Value::Null))),
            kind => read_column::<String>(row, field.name).map(|v| {
                v.map(|v| match v {
                    Some(text) => kind.from_text(&text).unwrap_or(Value::String(text)),
                    None => Value::Null,
                })
            }),
        }
        .map_err(|e| format!("column '{}': {}", field.name, e))?;

        if let Some(value) = value {
            record.insert(field.name.to_string(), value);
        }
    }
    Ok(record)
}

fn blob_to_record(row: &SqliteRow) -> Result<Record, String> {
    let data: String = row.try_get("data").map_err(|e| e.to_string())?;
    match serde_json::from_str::<Value>(&data) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(_) => Err("data is not a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}
