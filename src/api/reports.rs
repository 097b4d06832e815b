//! Report endpoints. Every report is JSON by default; `?export=csv|txt|json`
//! returns its text export instead.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    models::fields::now,
    services::reports::{export_report, BookReportFilter, ExportFormat, ReportPeriod},
    AppState,
};

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ExportQuery {
    pub export: Option<String>,
}

fn render<R: Serialize>(report: R, query: ExportQuery) -> AppResult<Response> {
    let Some(format) = query.export else {
        return Ok(Json(report).into_response());
    };
    let format: ExportFormat = format.parse()?;
    let body = export_report(&report, format)?;
    Ok(([(header::CONTENT_TYPE, format.content_type())], body).into_response())
}

pub async fn overview(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    let report = state.services.reports.library_overview(now()).await?;
    render(report, query)
}

/// Books report, filtered by `genre`, `language`, `year_from`, `year_to`, `available`
pub async fn books(
    State(state): State<AppState>,
    Query(filter): Query<BookReportFilter>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    let report = state.services.reports.books_report(filter).await?;
    render(report, query)
}

pub async fn authors(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    let report = state.services.reports.authors_report().await?;
    render(report, query)
}

/// Loans report for loans made between `from` and `to` (RFC 3339, both optional)
pub async fn loans(
    State(state): State<AppState>,
    Query(period): Query<ReportPeriod>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    let report = state.services.reports.loans_report(period, now()).await?;
    render(report, query)
}

pub async fn user_activity(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    let report = state.services.reports.user_activity(&user_id, now()).await?;
    render(report, query)
}
