//! Format-specific data managers
//!
//! Every backend implements [`RecordStore`], which moves untyped records in
//! and out of one collection. [`DataManager`] adds the entity type on top and
//! owns the failure policy: storage errors are logged and turned into the
//! `false` / `None` / empty sentinel of the operation, and records that fail
//! entity validation are skipped with a warning.

pub mod csv;
pub mod factory;
pub mod file_store;
pub mod json;
pub mod sqlite;
pub mod txt;
pub mod xml;

use std::marker::PhantomData;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageResult;
use crate::models::{Entity, EntitySchema, Record};

pub use factory::DataManagerFactory;
pub use file_store::{DocumentCodec, FileStore};
pub use sqlite::SqliteStore;

/// Field name → expected value
pub type Criteria = Record;

/// What a backup of a store has to copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupSource {
    /// Data directory holding one file per collection
    Directory(PathBuf),
    /// Single database file
    File(PathBuf),
}

/// Untyped storage for one entity collection
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn schema(&self) -> &'static EntitySchema;

    fn backup_source(&self) -> BackupSource;

    /// All records; empty when the collection was never written.
    async fn read_all(&self) -> StorageResult<Vec<Record>>;

    async fn read_one(&self, id: &str) -> StorageResult<Option<Record>> {
        let records = self.read_all().await?;
        Ok(records
            .into_iter()
            .find(|record| crate::models::fields::record_id(record) == Some(id)))
    }

    /// Insert or replace by `id`.
    async fn upsert(&self, record: Record) -> StorageResult<()>;

    /// Returns whether a record with `id` existed.
    async fn remove(&self, id: &str) -> StorageResult<bool>;

    /// Records that may match `criteria`. Callers still post-filter.
    async fn candidates(&self, _criteria: &Criteria) -> StorageResult<Vec<Record>> {
        self.read_all().await
    }
}

/// Typed CRUD and search over one record store
pub struct DataManager<E: Entity> {
    format: String,
    store: Box<dyn RecordStore>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> DataManager<E> {
    pub fn new(format: &str, store: Box<dyn RecordStore>) -> Self {
        Self {
            format: format.to_string(),
            store,
            _entity: PhantomData,
        }
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn backup_source(&self) -> BackupSource {
        self.store.backup_source()
    }

    /// Upsert by id. Returns `false` when the write failed.
    pub async fn save(&self, entity: &E) -> bool {
        match self.store.upsert(entity.to_record()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    entity = E::KIND.as_str(),
                    format = %self.format,
                    id = entity.id(),
                    "Failed to save record: {}",
                    e
                );
                false
            }
        }
    }

    pub async fn load(&self, id: &str) -> Option<E> {
        match self.store.read_one(id).await {
            Ok(Some(record)) => self.decode(&record),
            Ok(None) => None,
            Err(e) => {
                tracing::error!(
                    entity = E::KIND.as_str(),
                    format = %self.format,
                    id,
                    "Failed to load record: {}",
                    e
                );
                None
            }
        }
    }

    pub async fn load_all(&self) -> Vec<E> {
        match self.store.read_all().await {
            Ok(records) => records.iter().filter_map(|r| self.decode(r)).collect(),
            Err(e) => {
                tracing::error!(
                    entity = E::KIND.as_str(),
                    format = %self.format,
                    "Failed to load records: {}",
                    e
                );
                Vec::new()
            }
        }
    }

    /// `true` iff a record existed and was removed.
    pub async fn delete(&self, id: &str) -> bool {
        match self.store.remove(id).await {
            Ok(existed) => existed,
            Err(e) => {
                tracing::error!(
                    entity = E::KIND.as_str(),
                    format = %self.format,
                    id,
                    "Failed to delete record: {}",
                    e
                );
                false
            }
        }
    }

    pub async fn exists(&self, id: &str) -> bool {
        self.load(id).await.is_some()
    }

    /// Case-insensitive substring match on text fields, equality otherwise.
    pub async fn search(&self, criteria: &Criteria) -> Vec<E> {
        let candidates = match self.store.candidates(criteria).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(
                    entity = E::KIND.as_str(),
                    format = %self.format,
                    "Search failed: {}",
                    e
                );
                return Vec::new();
            }
        };

        candidates
            .iter()
            .filter_map(|record| self.decode(record))
            .filter(|entity| matches_search(E::schema(), &entity.to_record(), criteria))
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.load_all().await.len()
    }

    fn decode(&self, record: &Record) -> Option<E> {
        if crate::models::fields::stored_id(record).is_none() {
            tracing::warn!(
                entity = E::KIND.as_str(),
                format = %self.format,
                "Skipping stored record without an id"
            );
            return None;
        }
        match E::from_record(record) {
            Ok(entity) => Some(entity),
            Err(e) => {
                tracing::warn!(
                    entity = E::KIND.as_str(),
                    format = %self.format,
                    id = crate::models::fields::record_id(record).unwrap_or("?"),
                    "Skipping invalid record: {}",
                    e
                );
                None
            }
        }
    }
}

/// Search semantics shared by every backend.
///
/// A criterion on a field the record lacks excludes it. Text against text is
/// a case-insensitive substring test; anything else is equality.
pub fn matches_search(schema: &EntitySchema, record: &Record, criteria: &Criteria) -> bool {
    criteria.iter().all(|(field, expected)| {
        let Some(actual) = record.get(field) else {
            return false;
        };
        let textual = schema.field(field).map_or(true, |f| f.kind.is_textual());
        match (expected, actual) {
            (Value::String(needle), Value::String(haystack)) if textual => haystack
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => actual == expected,
        }
    })
}

/// Exact equality on every criterion.
pub fn matches_exact(record: &Record, criteria: &Criteria) -> bool {
    criteria
        .iter()
        .all(|(field, expected)| record.get(field) == Some(expected))
}
