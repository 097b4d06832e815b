//! Shelfkeeper personal library manager
//!
//! Books, authors, users, loans and categories persisted interchangeably as
//! plain text, CSV, JSON, XML or SQLite behind one repository contract, with
//! a migration utility between formats and a REST JSON API on top.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod data_managers;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let services = services::Services::new(&config)?;
        Ok(Self {
            config: Arc::new(config),
            services: Arc::new(services),
        })
    }
}
