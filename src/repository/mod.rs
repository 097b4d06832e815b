//! Repository layer over the format-specific data managers

pub mod migration;

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::data_managers::{matches_exact, Criteria, DataManager, DataManagerFactory};
use crate::error::{AppError, AppResult};
use crate::models::{Entity, EntityKind};

pub use migration::{MigrationLogEntry, MigrationManager, MigrationReport};

/// Typed repository for one entity type
pub struct Repository<E: Entity> {
    manager: DataManager<E>,
}

impl<E: Entity> Repository<E> {
    pub fn new(manager: DataManager<E>) -> Self {
        Self { manager }
    }

    pub fn format(&self) -> &str {
        self.manager.format()
    }

    pub fn manager(&self) -> &DataManager<E> {
        &self.manager
    }

    pub async fn save(&self, entity: &E) -> bool {
        self.manager.save(entity).await
    }

    pub async fn load(&self, id: &str) -> Option<E> {
        self.manager.load(id).await
    }

    pub async fn load_all(&self) -> Vec<E> {
        self.manager.load_all().await
    }

    pub async fn delete(&self, id: &str) -> bool {
        self.manager.delete(id).await
    }

    pub async fn exists(&self, id: &str) -> bool {
        self.manager.exists(id).await
    }

    pub async fn search(&self, criteria: &Criteria) -> Vec<E> {
        self.manager.search(criteria).await
    }

    /// Exact equality on every criterion, unlike `search`.
    pub async fn find_by(&self, criteria: &Criteria) -> Vec<E> {
        self.manager
            .load_all()
            .await
            .into_iter()
            .filter(|entity| matches_exact(&entity.to_record(), criteria))
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.manager.count().await
    }
}

/// Outcome of copying one entity type between formats
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityMigration {
    pub entity: EntityKind,
    pub loaded: usize,
    pub saved: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityStats {
    pub entity: EntityKind,
    pub format: String,
    pub count: usize,
    pub fields: Vec<&'static str>,
}

/// Hands out one cached repository per entity type in the default format.
pub struct EntityManager {
    factory: DataManagerFactory,
    default_format: String,
    base_path: PathBuf,
    repositories: Mutex<HashMap<EntityKind, Arc<dyn Any + Send + Sync>>>,
}

impl EntityManager {
    pub fn new(
        factory: DataManagerFactory,
        default_format: &str,
        base_path: impl Into<PathBuf>,
    ) -> AppResult<Self> {
        if !factory.supports(default_format) {
            return Err(AppError::UnsupportedFormat(default_format.to_string()));
        }

        Ok(Self {
            factory,
            default_format: default_format.trim().to_lowercase(),
            base_path: base_path.into(),
            repositories: Mutex::new(HashMap::new()),
        })
    }

    pub fn factory(&self) -> &DataManagerFactory {
        &self.factory
    }

    pub fn default_format(&self) -> &str {
        &self.default_format
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Lazily builds the repository for `E`, then keeps returning the same one.
    pub fn get_repository<E: Entity>(&self) -> AppResult<Arc<Repository<E>>> {
        let mut repositories = self
            .repositories
            .lock()
            .map_err(|_| AppError::Internal("Repository cache lock poisoned".to_string()))?;

        if let Some(cached) = repositories.get(&E::KIND) {
            if let Ok(repository) = Arc::clone(cached).downcast::<Repository<E>>() {
                return Ok(repository);
            }
        }

        let manager = self
            .factory
            .create_manager::<E>(&self.default_format, &self.base_path)?;
        let repository = Arc::new(Repository::new(manager));
        repositories.insert(E::KIND, repository.clone());

        tracing::debug!(
            "Created {} repository ({})",
            E::KIND,
            self.default_format
        );
        Ok(repository)
    }

    /// Uncached manager for an arbitrary format
    pub fn manager_for<E: Entity>(&self, format: &str) -> AppResult<DataManager<E>> {
        self.factory.create_manager::<E>(format, &self.base_path)
    }

    /// Copy every `E` from one format to another. Not transactional: records
    /// saved before a failure stay in the destination.
    pub async fn migrate_entity<E: Entity>(
        &self,
        from_format: &str,
        to_format: &str,
    ) -> AppResult<EntityMigration> {
        let source = self.manager_for::<E>(from_format)?;
        let destination = self.manager_for::<E>(to_format)?;

        let entities = source.load_all().await;
        let mut migration = EntityMigration {
            entity: E::KIND,
            loaded: entities.len(),
            saved: 0,
            failed: 0,
        };

        for entity in &entities {
            if destination.save(entity).await {
                migration.saved += 1;
            } else {
                migration.failed += 1;
            }
        }

        tracing::info!(
            "Migrated {} {} records from {} to {} ({} failed)",
            migration.saved,
            E::KIND,
            source.format(),
            destination.format(),
            migration.failed
        );
        Ok(migration)
    }

    pub async fn entity_stats<E: Entity>(&self) -> AppResult<EntityStats> {
        let repository = self.get_repository::<E>()?;
        Ok(EntityStats {
            entity: E::KIND,
            format: repository.format().to_string(),
            count: repository.count().await,
            fields: E::schema().field_names(),
        })
    }
}
