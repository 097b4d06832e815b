//! Authentication endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{
    error::AppResult,
    models::{Entity, Record},
    services::auth::RegisterUser,
    AppState,
};

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub user_id: String,
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct DeactivateRequest {
    /// Administrator performing the change
    pub admin_id: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterUser>,
) -> AppResult<(StatusCode, Json<Record>)> {
    let user = state.services.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(user.to_public_record())))
}

/// Check credentials; returns the user without the password hash
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<Record>> {
    let user = state
        .services
        .auth
        .authenticate(&request.email, &request.password)
        .await?;
    Ok(Json(user.to_public_record()))
}

pub async fn change_password(
    State(state): State<AppState>,
    Json(request): Json<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    state
        .services
        .auth
        .change_password(
            &request.user_id,
            &request.current_password,
            &request.new_password,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Always answers 204 so the response does not tell whether the email exists
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> AppResult<StatusCode> {
    state
        .services
        .auth
        .reset_password(&request.email, &request.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn deactivate_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<DeactivateRequest>,
) -> AppResult<Json<Record>> {
    let user = state
        .services
        .auth
        .deactivate_user(&user_id, &request.admin_id)
        .await?;
    Ok(Json(user.to_public_record()))
}
