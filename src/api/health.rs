//! Health and statistics endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::{
    error::AppResult,
    models::{Author, Book, Category, Loan, User},
    repository::EntityStats,
    AppState,
};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Active storage format
    pub storage: String,
    pub supported_formats: Vec<String>,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let entities = &state.services.entities;
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: entities.default_format().to_string(),
        supported_formats: entities.factory().supported_formats(),
    })
}

/// Record counts per entity type
pub async fn stats(State(state): State<AppState>) -> AppResult<Json<Vec<EntityStats>>> {
    let entities = &state.services.entities;
    Ok(Json(vec![
        entities.entity_stats::<Book>().await?,
        entities.entity_stats::<Author>().await?,
        entities.entity_stats::<User>().await?,
        entities.entity_stats::<Loan>().await?,
        entities.entity_stats::<Category>().await?,
    ]))
}
