//! CRUD and search endpoints shared by every entity collection

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use crate::{
    data_managers::Criteria,
    error::{AppError, AppResult},
    models::{fields::{format_datetime, now}, Entity, Record},
    AppState,
};

/// List a collection. Query parameters become search criteria, coerced
/// through the field kinds (`?available=true&publication_year=1967`).
/// Sensitive fields cannot be searched on.
pub async fn list<E: Entity>(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<Vec<Record>>> {
    let repository = state.services.entities.get_repository::<E>()?;
    let entities = if params.is_empty() {
        repository.load_all().await
    } else {
        repository.search(&criteria_from_query::<E>(&params)?).await
    };
    Ok(Json(entities.iter().map(Entity::to_public_record).collect()))
}

pub async fn get<E: Entity>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Record>> {
    let repository = state.services.entities.get_repository::<E>()?;
    let entity = repository
        .load(&id)
        .await
        .ok_or_else(|| not_found::<E>(&id))?;
    Ok(Json(entity.to_public_record()))
}

/// Create from a JSON object. Absent fields take their defaults and a new id
/// is generated unless one is given.
pub async fn create<E: Entity>(
    State(state): State<AppState>,
    Json(body): Json<Record>,
) -> AppResult<(StatusCode, Json<Record>)> {
    let repository = state.services.entities.get_repository::<E>()?;
    let mut record = E::schema().public_record(body);
    record.remove("created_at");
    record.remove("updated_at");

    let entity = E::from_record(&record)?;
    if repository.exists(entity.id()).await {
        return Err(AppError::Conflict(format!(
            "{} {} already exists",
            E::KIND,
            entity.id()
        )));
    }
    if !repository.save(&entity).await {
        return Err(AppError::Internal(format!("Failed to save {}", E::KIND)));
    }

    Ok((StatusCode::CREATED, Json(entity.to_public_record())))
}

/// Merge the given fields into the stored entity and save it.
pub async fn update<E: Entity>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Record>,
) -> AppResult<Json<Record>> {
    let repository = state.services.entities.get_repository::<E>()?;
    let existing = repository
        .load(&id)
        .await
        .ok_or_else(|| not_found::<E>(&id))?;

    let mut record = existing.to_record();
    for (field, value) in E::schema().public_record(body) {
        if matches!(field.as_str(), "id" | "created_at" | "updated_at") {
            continue;
        }
        record.insert(field, value);
    }
    record.insert("updated_at".to_string(), Value::String(format_datetime(&now())));

    let entity = E::from_record(&record)?;
    if !repository.save(&entity).await {
        return Err(AppError::Internal(format!("Failed to save {}", E::KIND)));
    }

    Ok(Json(entity.to_public_record()))
}

pub async fn delete<E: Entity>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let repository = state.services.entities.get_repository::<E>()?;
    if repository.delete(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found::<E>(&id))
    }
}

fn not_found<E: Entity>(id: &str) -> AppError {
    AppError::NotFound(format!("{} {} not found", E::KIND, id))
}

fn criteria_from_query<E: Entity>(params: &HashMap<String, String>) -> AppResult<Criteria> {
    let schema = E::schema();
    params
        .iter()
        .map(|(field, text)| {
            if schema.field(field).map_or(false, |def| def.sensitive) {
                return Err(AppError::BadRequest(format!(
                    "Cannot search {} by {}",
                    schema.plural, field
                )));
            }
            let value = schema
                .value_from_text(field, text)
                .unwrap_or_else(|_| Value::String(text.clone()));
            Ok((field.clone(), value))
        })
        .collect()
}
