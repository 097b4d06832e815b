//! Format name → record store constructor registry

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::csv::CsvCodec;
use super::json::JsonCodec;
use super::txt::TxtCodec;
use super::xml::XmlCodec;
use super::{DataManager, FileStore, RecordStore, SqliteStore};
use crate::error::{AppError, AppResult};
use crate::models::{Entity, EntitySchema};

pub type StoreConstructor =
    Arc<dyn Fn(&'static EntitySchema, &Path) -> Box<dyn RecordStore> + Send + Sync>;

/// Builds typed data managers for a format name.
///
/// Names are matched case-insensitively. `new()` registers the built-in
/// formats; more can be added with [`DataManagerFactory::register`].
/// An alias is a second name for a registered format and shares its storage.
#[derive(Clone)]
pub struct DataManagerFactory {
    constructors: HashMap<String, StoreConstructor>,
    aliases: HashMap<String, String>,
}

impl Default for DataManagerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DataManagerFactory {
    pub fn new() -> Self {
        let mut factory = Self::empty();
        factory.register("txt", |schema, base| {
            Box::new(FileStore::new(schema, base, TxtCodec))
        });
        factory.register("csv", |schema, base| {
            Box::new(FileStore::new(schema, base, CsvCodec))
        });
        factory.register("json", |schema, base| {
            Box::new(FileStore::new(schema, base, JsonCodec))
        });
        factory.register("xml", |schema, base| {
            Box::new(FileStore::new(schema, base, XmlCodec))
        });
        factory.register("sqlite", |schema, base| {
            Box::new(SqliteStore::new(schema, base))
        });
        factory.register_alias("db", "sqlite");
        factory
    }

    /// A factory with no formats registered
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, format: &str, constructor: F)
    where
        F: Fn(&'static EntitySchema, &Path) -> Box<dyn RecordStore> + Send + Sync + 'static,
    {
        let format = normalize_format(format);
        self.aliases.remove(&format);
        self.constructors.insert(format, Arc::new(constructor));
    }

    /// Make `alias` another name for the registered `format`.
    pub fn register_alias(&mut self, alias: &str, format: &str) {
        let format = self.canonical_format(format);
        self.aliases.insert(normalize_format(alias), format);
    }

    /// The registered name behind `format`; two names with the same canonical
    /// name address the same storage.
    pub fn canonical_format(&self, format: &str) -> String {
        let format = normalize_format(format);
        self.aliases.get(&format).cloned().unwrap_or(format)
    }

    pub fn supports(&self, format: &str) -> bool {
        self.constructors
            .contains_key(&self.canonical_format(format))
    }

    /// Registered names and aliases, sorted
    pub fn supported_formats(&self) -> Vec<String> {
        let mut formats: Vec<String> = self
            .constructors
            .keys()
            .chain(
                self.aliases
                    .iter()
                    .filter(|(_, target)| self.constructors.contains_key(*target))
                    .map(|(alias, _)| alias),
            )
            .cloned()
            .collect();
        formats.sort();
        formats.dedup();
        formats
    }

    pub fn create_manager<E: Entity>(
        &self,
        format: &str,
        base_path: &Path,
    ) -> AppResult<DataManager<E>> {
        let format = normalize_format(format);
        let constructor = self
            .constructors
            .get(&self.canonical_format(&format))
            .ok_or_else(|| AppError::UnsupportedFormat(format.clone()))?;

        tracing::debug!(
            "Creating {} data manager for {} in {}",
            format,
            E::KIND,
            base_path.display()
        );

        Ok(DataManager::new(&format, constructor(E::schema(), base_path)))
    }
}

pub fn normalize_format(format: &str) -> String {
    format.trim().to_lowercase()
}
