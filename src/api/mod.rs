//! API handlers for Shelfkeeper REST endpoints

pub mod auth;
pub mod entities;
pub mod health;
pub mod loans;
pub mod migrations;
pub mod reports;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    models::{Author, Book, Category, Loan, User},
    AppState,
};

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/stats", get(health::stats))
        // Authentication
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/change-password", post(auth::change_password))
        .route("/auth/reset-password", post(auth::reset_password))
        // Books
        .route(
            "/books",
            get(entities::list::<Book>).post(entities::create::<Book>),
        )
        .route(
            "/books/:id",
            get(entities::get::<Book>)
                .put(entities::update::<Book>)
                .delete(entities::delete::<Book>),
        )
        // Authors
        .route(
            "/authors",
            get(entities::list::<Author>).post(entities::create::<Author>),
        )
        .route(
            "/authors/:id",
            get(entities::get::<Author>)
                .put(entities::update::<Author>)
                .delete(entities::delete::<Author>),
        )
        // Users
        .route(
            "/users",
            get(entities::list::<User>).post(entities::create::<User>),
        )
        .route(
            "/users/:id",
            get(entities::get::<User>)
                .put(entities::update::<User>)
                .delete(entities::delete::<User>),
        )
        .route("/users/:id/loans", get(loans::get_user_loans))
        .route("/users/:id/fines", get(loans::user_fines))
        .route("/users/:id/deactivate", post(auth::deactivate_user))
        // Categories
        .route(
            "/categories",
            get(entities::list::<Category>).post(entities::create::<Category>),
        )
        .route(
            "/categories/:id",
            get(entities::get::<Category>)
                .put(entities::update::<Category>)
                .delete(entities::delete::<Category>),
        )
        // Loans
        .route(
            "/loans",
            get(entities::list::<Loan>).post(entities::create::<Loan>),
        )
        .route("/loans/checkout", post(loans::checkout))
        .route("/loans/overdue", get(loans::overdue))
        .route("/loans/overdue/mark", post(loans::mark_overdue))
        .route("/loans/history", get(loans::history))
        .route("/loans/stats", get(loans::stats))
        .route(
            "/loans/:id",
            get(entities::get::<Loan>)
                .put(entities::update::<Loan>)
                .delete(entities::delete::<Loan>),
        )
        .route("/loans/:id/return", post(loans::return_loan))
        .route("/loans/:id/extend", post(loans::extend_loan))
        // Reports
        .route("/reports/overview", get(reports::overview))
        .route("/reports/books", get(reports::books))
        .route("/reports/authors", get(reports::authors))
        .route("/reports/loans", get(reports::loans))
        .route("/reports/users/:id", get(reports::user_activity))
        // Storage migrations
        .route(
            "/migrations",
            get(migrations::history).post(migrations::run_migration),
        )
        .route("/migrations/validate", post(migrations::validate))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
