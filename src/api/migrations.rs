//! Storage migration endpoints

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::{
    error::AppResult,
    models::EntityKind,
    repository::{
        migration::MigrationValidation, MigrationLogEntry, MigrationReport,
    },
    AppState,
};

#[derive(Deserialize)]
pub struct MigrationRequest {
    pub from: String,
    pub to: String,
    /// Entity names (`books`, `Author`, ...); all when absent
    pub entities: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct ValidateRequest {
    pub from: String,
    pub to: String,
}

pub async fn run_migration(
    State(state): State<AppState>,
    Json(request): Json<MigrationRequest>,
) -> AppResult<Json<MigrationReport>> {
    let kinds = request
        .entities
        .map(|names| {
            names
                .iter()
                .map(|name| name.parse::<EntityKind>())
                .collect::<AppResult<Vec<_>>>()
        })
        .transpose()?;

    let report = state
        .services
        .migrations
        .migrate(&request.from, &request.to, kinds.as_deref())
        .await?;
    Ok(Json(report))
}

pub async fn history(State(state): State<AppState>) -> Json<Vec<MigrationLogEntry>> {
    Json(state.services.migrations.migration_history())
}

pub async fn validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> AppResult<Json<MigrationValidation>> {
    let validation = state
        .services
        .migrations
        .validate_migration(&request.from, &request.to)
        .await?;
    Ok(Json(validation))
}
