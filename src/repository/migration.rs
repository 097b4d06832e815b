//! Bulk migration of the whole library between storage formats

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use fs_extra::dir::CopyOptions;
use serde::Serialize;

use super::EntityManager;
use crate::data_managers::factory::normalize_format;
use crate::data_managers::BackupSource;
use crate::error::{AppError, AppResult};
use crate::models::{Author, Book, Category, Entity, EntityKind, Loan, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationOperation {
    MigrationComplete,
    EntityFailed,
}

/// One line of migration history
#[derive(Debug, Clone, Serialize)]
pub struct MigrationLogEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: MigrationOperation,
    pub from_format: String,
    pub to_format: String,
    pub entity: Option<EntityKind>,
    pub migrated: usize,
    pub errors: usize,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    pub entity: EntityKind,
    pub loaded: usize,
    pub saved: usize,
    pub failed: usize,
    /// Records found in the destination afterwards
    pub verified: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub success: bool,
    pub from_format: String,
    pub to_format: String,
    pub migrated_count: usize,
    pub errors: Vec<String>,
    pub entities: Vec<EntityReport>,
    pub backup_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityCount {
    pub entity: EntityKind,
    pub count: usize,
}

/// Pre-flight check for a migration
#[derive(Debug, Clone, Serialize)]
pub struct MigrationValidation {
    pub valid: bool,
    pub issues: Vec<String>,
    pub source_counts: Vec<EntityCount>,
}

pub struct MigrationManager {
    entity_manager: Arc<EntityManager>,
    backup_dir: PathBuf,
    backup_enabled: bool,
    history: Mutex<Vec<MigrationLogEntry>>,
}

impl MigrationManager {
    pub fn new(
        entity_manager: Arc<EntityManager>,
        backup_dir: impl Into<PathBuf>,
        backup_enabled: bool,
    ) -> Self {
        Self {
            entity_manager,
            backup_dir: backup_dir.into(),
            backup_enabled,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Move every entity of `entities` (default: all five) from one format to
    /// another. Failures of one entity type do not stop the others.
    pub async fn migrate(
        &self,
        from_format: &str,
        to_format: &str,
        entities: Option<&[EntityKind]>,
    ) -> AppResult<MigrationReport> {
        let from = normalize_format(from_format);
        let to = normalize_format(to_format);
        self.check_formats(&from, &to)?;

        tracing::info!("Starting migration from {} to {}", from, to);

        let backup_path = if self.backup_enabled {
            self.create_backup(&from).await
        } else {
            None
        };

        let mut report = MigrationReport {
            success: false,
            from_format: from.clone(),
            to_format: to.clone(),
            migrated_count: 0,
            errors: Vec::new(),
            entities: Vec::new(),
            backup_path,
        };

        for &kind in entities.unwrap_or(&EntityKind::ALL) {
            match self.migrate_kind(kind, &from, &to).await {
                Ok(entity_report) => {
                    let mut problems = Vec::new();
                    if entity_report.failed > 0 {
                        problems.push(format!(
                            "{}: {} of {} records failed to save",
                            kind, entity_report.failed, entity_report.loaded
                        ));
                    }
                    if entity_report.verified < entity_report.saved {
                        problems.push(format!(
                            "{}: verification found {} records, expected at least {}",
                            kind, entity_report.verified, entity_report.saved
                        ));
                    }
                    for problem in &problems {
                        self.record_entity_failure(&from, &to, kind, entity_report.saved, problem);
                    }

                    report.migrated_count += entity_report.saved;
                    report.errors.extend(problems);
                    report.entities.push(entity_report);
                }
                Err(e) => {
                    tracing::error!("Migration of {} failed: {}", kind, e);
                    let message = format!("{}: {}", kind, e);
                    self.record_entity_failure(&from, &to, kind, 0, &message);
                    report.errors.push(message);
                }
            }
        }

        report.success = report.errors.is_empty();
        self.record(MigrationLogEntry {
            timestamp: Utc::now(),
            operation: MigrationOperation::MigrationComplete,
            from_format: from.clone(),
            to_format: to.clone(),
            entity: None,
            migrated: report.migrated_count,
            errors: report.errors.len(),
            message: None,
        });

        if report.success {
            tracing::info!(
                "Migration from {} to {} complete: {} records",
                from,
                to,
                report.migrated_count
            );
        } else {
            tracing::warn!(
                "Migration from {} to {} finished with {} errors ({} records migrated)",
                from,
                to,
                report.errors.len(),
                report.migrated_count
            );
        }

        Ok(report)
    }

    /// Copy of the history, oldest first
    pub fn migration_history(&self) -> Vec<MigrationLogEntry> {
        match self.history.lock() {
            Ok(history) => history.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Report problems a migration would run into, without moving anything.
    pub async fn validate_migration(
        &self,
        from_format: &str,
        to_format: &str,
    ) -> AppResult<MigrationValidation> {
        let from = normalize_format(from_format);
        let to = normalize_format(to_format);
        let factory = self.entity_manager.factory();

        let mut issues = Vec::new();
        if factory.canonical_format(&from) == factory.canonical_format(&to) {
            issues.push("Source and destination formats are the same".to_string());
        }
        for format in [&from, &to] {
            if !factory.supports(format) {
                issues.push(format!("Unsupported format: {}", format));
            }
        }

        let mut source_counts = Vec::new();
        if factory.supports(&from) {
            for kind in EntityKind::ALL {
                source_counts.push(EntityCount {
                    entity: kind,
                    count: self.count_kind(kind, &from).await?,
                });
            }
            if source_counts.iter().all(|c| c.count == 0) {
                issues.push(format!("No data found in {} storage", from));
            }
        }

        Ok(MigrationValidation {
            valid: issues.is_empty(),
            issues,
            source_counts,
        })
    }

    pub fn rollback_migration(&self, migration_id: &str) -> AppResult<()> {
        Err(AppError::NotImplemented(format!(
            "Rollback of migration {} is not supported; restore a backup manually",
            migration_id
        )))
    }

    fn check_formats(&self, from: &str, to: &str) -> AppResult<()> {
        let factory = self.entity_manager.factory();
        if factory.canonical_format(from) == factory.canonical_format(to) {
            return Err(AppError::Validation(
                "Source and destination formats must differ".to_string(),
            ));
        }
        for format in [from, to] {
            if !factory.supports(format) {
                return Err(AppError::UnsupportedFormat(format.to_string()));
            }
        }
        Ok(())
    }

    async fn migrate_kind(&self, kind: EntityKind, from: &str, to: &str) -> AppResult<EntityReport> {
        match kind {
            EntityKind::Book => self.migrate_typed::<Book>(from, to).await,
            EntityKind::Author => self.migrate_typed::<Author>(from, to).await,
            EntityKind::User => self.migrate_typed::<User>(from, to).await,
            EntityKind::Loan => self.migrate_typed::<Loan>(from, to).await,
            EntityKind::Category => self.migrate_typed::<Category>(from, to).await,
        }
    }

    async fn migrate_typed<E: Entity>(&self, from: &str, to: &str) -> AppResult<EntityReport> {
        let migration = self.entity_manager.migrate_entity::<E>(from, to).await?;
        let verified = self.entity_manager.manager_for::<E>(to)?.count().await;
        Ok(EntityReport {
            entity: E::KIND,
            loaded: migration.loaded,
            saved: migration.saved,
            failed: migration.failed,
            verified,
        })
    }

    async fn count_kind(&self, kind: EntityKind, format: &str) -> AppResult<usize> {
        let manager = &self.entity_manager;
        Ok(match kind {
            EntityKind::Book => manager.manager_for::<Book>(format)?.count().await,
            EntityKind::Author => manager.manager_for::<Author>(format)?.count().await,
            EntityKind::User => manager.manager_for::<User>(format)?.count().await,
            EntityKind::Loan => manager.manager_for::<Loan>(format)?.count().await,
            EntityKind::Category => manager.manager_for::<Category>(format)?.count().await,
        })
    }

    /// Best effort: failures are logged and the migration goes on.
    async fn create_backup(&self, format: &str) -> Option<PathBuf> {
        let source = match self.entity_manager.manager_for::<Book>(format) {
            Ok(manager) => manager.backup_source(),
            Err(e) => {
                tracing::warn!("Cannot back up {} storage: {}", format, e);
                return None;
            }
        };

        let backup_dir = self.backup_dir.clone();
        let name = format!("backup_{}_{}", format, Utc::now().format("%Y%m%d_%H%M%S_%3f"));

        match tokio::task::spawn_blocking(move || copy_backup(&source, &backup_dir, &name)).await {
            Ok(Ok(Some(path))) => {
                tracing::info!("Backup created at {}", path.display());
                Some(path)
            }
            Ok(Ok(None)) => {
                tracing::debug!("No {} data to back up", format);
                None
            }
            Ok(Err(e)) => {
                tracing::warn!("Backup of {} storage failed: {}", format, e);
                None
            }
            Err(e) => {
                tracing::warn!("Backup task failed: {}", e);
                None
            }
        }
    }

    fn record_entity_failure(
        &self,
        from: &str,
        to: &str,
        kind: EntityKind,
        migrated: usize,
        message: &str,
    ) {
        self.record(MigrationLogEntry {
            timestamp: Utc::now(),
            operation: MigrationOperation::EntityFailed,
            from_format: from.to_string(),
            to_format: to.to_string(),
            entity: Some(kind),
            migrated,
            errors: 1,
            message: Some(message.to_string()),
        });
    }

    fn record(&self, entry: MigrationLogEntry) {
        match self.history.lock() {
            Ok(mut history) => history.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

fn copy_backup(source: &BackupSource, backup_dir: &Path, name: &str) -> AppResult<Option<PathBuf>> {
    match source {
        BackupSource::Directory(data_dir) => {
            if !data_dir.exists() {
                return Ok(None);
            }
            if resolve_path(backup_dir).starts_with(resolve_path(data_dir)) {
                return Err(AppError::Internal(format!(
                    "backup directory {} is inside the data directory",
                    backup_dir.display()
                )));
            }

            let target = backup_dir.join(name);
            std::fs::create_dir_all(&target)
                .map_err(|e| AppError::Internal(format!("create {}: {}", target.display(), e)))?;

            let options = CopyOptions::new().content_only(true).overwrite(true);
            fs_extra::dir::copy(data_dir, &target, &options)
                .map_err(|e| AppError::Internal(e.to_string()))?;
            Ok(Some(target))
        }
        BackupSource::File(db_file) => {
            if !db_file.exists() {
                return Ok(None);
            }

            std::fs::create_dir_all(backup_dir)
                .map_err(|e| AppError::Internal(format!("create {}: {}", backup_dir.display(), e)))?;
            let target = backup_dir.join(format!("{}.db", name));
            std::fs::copy(db_file, &target)
                .map_err(|e| AppError::Internal(format!("copy {}: {}", db_file.display(), e)))?;
            Ok(Some(target))
        }
    }
}

/// `path` with symlinks and `.`/`..` resolved through its longest existing
/// prefix; the missing tail is appended as written.
fn resolve_path(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut missing = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                missing.push(name.to_os_string());
                existing.pop();
            }
            None => break,
        }
    }
    if existing.as_os_str().is_empty() {
        existing = PathBuf::from(".");
    }

    let resolved = existing.canonicalize().unwrap_or(existing);
    missing
        .iter()
        .rev()
        .fold(resolved, |acc, name| acc.join(name))
}
