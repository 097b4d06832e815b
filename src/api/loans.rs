//! Loan management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    models::{fields::now, Entity, Record},
    services::loans::{FineSummary, LoanHistoryFilter, LoanStats},
    AppState,
};

/// Checkout request
#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub book_id: String,
    pub user_id: String,
    /// Loan period; the configured default when absent
    pub days: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct ReturnRequest {
    /// Return time; now when absent
    pub returned_at: Option<DateTime<Utc>>,
}

/// Return response with the computed fine
#[derive(Serialize)]
pub struct ReturnResponse {
    pub loan: Record,
    pub days_overdue: i64,
    pub fine: f64,
}

#[derive(Deserialize, Default)]
pub struct ExtendRequest {
    /// Extra days; the configured extension when absent
    pub days: Option<i64>,
}

#[derive(Serialize)]
pub struct MarkOverdueResponse {
    pub updated: usize,
}

/// Lend a book to a user
pub async fn checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<Record>)> {
    let loan = state
        .services
        .loans
        .create_loan(&request.book_id, &request.user_id, request.days)
        .await?;
    Ok((StatusCode::CREATED, Json(loan.to_public_record())))
}

/// Return a borrowed book
pub async fn return_loan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Option<Json<ReturnRequest>>,
) -> AppResult<Json<ReturnResponse>> {
    let returned_at = request.and_then(|Json(r)| r.returned_at);
    let result = state.services.loans.return_loan(&id, returned_at).await?;
    Ok(Json(ReturnResponse {
        loan: result.loan.to_public_record(),
        days_overdue: result.days_overdue,
        fine: result.fine,
    }))
}

pub async fn extend_loan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Option<Json<ExtendRequest>>,
) -> AppResult<Json<Record>> {
    let days = request.and_then(|Json(r)| r.days);
    let loan = state.services.loans.extend_loan(&id, days).await?;
    Ok(Json(loan.to_public_record()))
}

/// All loans, newest first, narrowed by `?user_id=` and/or `?book_id=`
pub async fn history(
    State(state): State<AppState>,
    Query(filter): Query<LoanHistoryFilter>,
) -> AppResult<Json<Vec<Record>>> {
    let loans = state.services.loans.loan_history(&filter).await?;
    Ok(Json(loans.iter().map(Entity::to_public_record).collect()))
}

pub async fn stats(State(state): State<AppState>) -> AppResult<Json<LoanStats>> {
    Ok(Json(state.services.loans.loan_stats(now()).await?))
}

/// Fines owed by a user on late loans still out
pub async fn user_fines(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<FineSummary>> {
    Ok(Json(state.services.loans.calculate_fines(&user_id, now()).await?))
}

/// Loans past their due date
pub async fn overdue(State(state): State<AppState>) -> AppResult<Json<Vec<Record>>> {
    let loans = state.services.loans.overdue_loans(now()).await?;
    Ok(Json(loans.iter().map(Entity::to_public_record).collect()))
}

pub async fn mark_overdue(State(state): State<AppState>) -> AppResult<Json<MarkOverdueResponse>> {
    let updated = state.services.loans.mark_overdue(now()).await?;
    Ok(Json(MarkOverdueResponse { updated }))
}

/// Get loans for a specific user
pub async fn get_user_loans(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<Record>>> {
    let loans = state.services.loans.user_loans(&user_id).await?;
    Ok(Json(loans.iter().map(Entity::to_public_record).collect()))
}
