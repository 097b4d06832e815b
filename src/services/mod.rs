//! Business logic services

pub mod auth;
pub mod loans;
pub mod reports;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    data_managers::DataManagerFactory,
    error::AppResult,
    repository::{EntityManager, MigrationManager},
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub entities: Arc<EntityManager>,
    pub migrations: Arc<MigrationManager>,
    pub auth: auth::AuthService,
    pub loans: loans::LoansService,
    pub reports: reports::ReportService,
}

impl Services {
    /// Build the storage stack and services from configuration
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let entities = Arc::new(EntityManager::new(
            DataManagerFactory::new(),
            &config.storage.format,
            config.storage.data_dir.clone(),
        )?);

        Ok(Self {
            migrations: Arc::new(MigrationManager::new(
                entities.clone(),
                config.storage.backup_dir.clone(),
                config.storage.backup_enabled,
            )),
            auth: auth::AuthService::new(entities.clone()),
            loans: loans::LoansService::new(entities.clone(), config.loans.clone()),
            reports: reports::ReportService::new(entities.clone()),
            entities,
        })
    }
}
