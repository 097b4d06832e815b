//! Shared control flow for single-document file formats.
//!
//! The whole collection lives in one file. Reads decode it in full; every
//! mutation decodes, edits the record list in memory and rewrites the file
//! through a temporary sibling that is renamed into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BackupSource, RecordStore};
use crate::error::StorageResult;
use crate::models::fields::record_id;
use crate::models::{EntitySchema, Record};

/// Encodes a whole collection to text and back.
///
/// `decode` fails only when the document as a whole is unreadable; single
/// malformed records are skipped with a warning.
pub trait DocumentCodec: Send + Sync + 'static {
    const EXTENSION: &'static str;

    fn decode(&self, schema: &'static EntitySchema, content: &str) -> StorageResult<Vec<Record>>;

    fn encode(&self, schema: &'static EntitySchema, records: &[Record]) -> StorageResult<String>;
}

pub struct FileStore<C: DocumentCodec> {
    schema: &'static EntitySchema,
    base_path: PathBuf,
    path: PathBuf,
    codec: C,
    /// Serializes read-modify-write cycles on this store
    write_lock: Mutex<()>,
}

impl<C: DocumentCodec> FileStore<C> {
    pub fn new(schema: &'static EntitySchema, base_path: &Path, codec: C) -> Self {
        Self {
            schema,
            base_path: base_path.to_path_buf(),
            path: base_path.join(format!("{}.{}", schema.plural, C::EXTENSION)),
            codec,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_all(&self, records: &[Record]) -> StorageResult<()> {
        let content = self.codec.encode(self.schema, records)?;

        tokio::fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.path.with_extension(format!("{}.tmp", C::EXTENSION));
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        tracing::debug!(
            "Wrote {} {} to {}",
            records.len(),
            self.schema.plural,
            self.path.display()
        );
        Ok(())
    }
}

#[async_trait]
impl<C: DocumentCodec> RecordStore for FileStore<C> {
    fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    fn backup_source(&self) -> BackupSource {
        BackupSource::Directory(self.base_path.clone())
    }

    async fn read_all(&self) -> StorageResult<Vec<Record>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => self.codec.decode(self.schema, &content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert(&self, record: Record) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        // An unreadable file fails the save instead of being overwritten.
        let mut records = self.read_all().await?;
        let id = record_id(&record).map(str::to_string);

        match records
            .iter_mut()
            .find(|existing| id.is_some() && record_id(existing) == id.as_deref())
        {
            Some(existing) => *existing = record,
            None => records.push(record),
        }

        self.write_all(&records).await
    }

    async fn remove(&self, id: &str) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        let before = records.len();
        records.retain(|record| record_id(record) != Some(id));

        if records.len() == before {
            return Ok(false);
        }

        self.write_all(&records).await?;
        Ok(true)
    }
}
