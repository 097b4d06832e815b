//! API integration tests, driven through the router without a socket

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use shelfkeeper::{api, config::AppConfig, AppState};

struct TestApp {
    _root: tempfile::TempDir,
    router: Router,
}

impl TestApp {
    fn new(format: &str) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.format = format.to_string();
        config.storage.data_dir = root.path().join("data");
        config.storage.backup_dir = root.path().join("backups");

        let state = AppState::new(config).expect("Failed to build state");
        Self {
            _root: root,
            router: api::create_router(state),
        }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(format!("/api/v1{}", uri));
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Response is not JSON")
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send("GET", uri, None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(body)).await
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new("csv");
    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"], "csv");
    assert_eq!(
        body["supported_formats"],
        json!(["csv", "db", "json", "sqlite", "txt", "xml"])
    );
}

#[tokio::test]
async fn test_unknown_storage_format_fails_startup() {
    let mut config = AppConfig::default();
    config.storage.format = "yaml".to_string();
    assert!(AppState::new(config).is_err());
}

#[tokio::test]
async fn test_book_crud() {
    let app = TestApp::new("json");

    let (status, created) = app
        .post(
            "/books",
            json!({
                "id": "b1",
                "title": "Cien años de soledad",
                "author_id": "a1",
                "publication_year": 1967,
                "isbn": "978-0-306-40615-7"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], "b1");
    assert_eq!(created["available"], true);
    assert_eq!(created["language"], "Español");

    let (status, _) = app
        .post("/books", json!({"id": "b1", "title": "Otra"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, book) = app.get("/books/b1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(book["title"], "Cien años de soledad");

    let (status, updated) = app
        .send("PUT", "/books/b1", Some(json!({"pages": 417, "id": "ignored"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["id"], "b1");
    assert_eq!(updated["pages"], 417);
    assert_eq!(updated["created_at"], book["created_at"]);

    let (status, _) = app.send("DELETE", "/books/b1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.get("/books/b1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");

    let (status, _) = app.send("DELETE", "/books/b1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_book_rejected() {
    let app = TestApp::new("json");

    let (status, body) = app.post("/books", json!({"title": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation");

    let (status, _) = app
        .post("/books", json!({"title": "Y", "isbn": "12345"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, books) = app.get("/books").await;
    assert_eq!(books, json!([]));
}

#[tokio::test]
async fn test_list_with_search_query() {
    let app = TestApp::new("xml");

    for (title, year) in [
        ("Cien años de soledad", 1967),
        ("El otoño del patriarca", 1975),
        ("Crónica de una muerte anunciada", 1981),
    ] {
        let (status, _) = app
            .post("/books", json!({"title": title, "publication_year": year}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, all) = app.get("/books").await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (_, found) = app.get("/books?title=A%C3%91OS").await;
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["title"], "Cien años de soledad");

    let (_, by_year) = app.get("/books?publication_year=1975").await;
    assert_eq!(by_year.as_array().unwrap().len(), 1);
    assert_eq!(by_year[0]["title"], "El otoño del patriarca");

    let (_, none) = app.get("/books?shelf=A3").await;
    assert_eq!(none, json!([]));
}

#[tokio::test]
async fn test_register_and_login() {
    let app = TestApp::new("db");

    let (status, user) = app
        .post(
            "/auth/register",
            json!({"name": "Ana", "email": "ana@example.com", "password": "s3cret"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["role"], "user");
    assert!(user.get("password_hash").is_none());

    let (status, _) = app
        .post(
            "/auth/register",
            json!({"name": "Ana", "email": "ana@example.com", "password": "other"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, logged_in) = app
        .post(
            "/auth/login",
            json!({"email": "ana@example.com", "password": "s3cret"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logged_in["id"], user["id"]);
    assert!(logged_in["last_login"].is_string());
    assert!(logged_in.get("password_hash").is_none());

    let (status, body) = app
        .post(
            "/auth/login",
            json!({"email": "ana@example.com", "password": "wrong"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authentication");

    let (_, users) = app.get("/users").await;
    assert!(users[0].get("password_hash").is_none());
}

#[tokio::test]
async fn test_password_hash_is_not_searchable() {
    let app = TestApp::new("db");
    app.post(
        "/auth/register",
        json!({"name": "Ana", "email": "ana@example.com", "password": "s3cret"}),
    )
    .await;

    for prefix in ["%24argon2id", "%24", "x"] {
        let (status, body) = app.get(&format!("/users?password_hash={}", prefix)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BadRequest");
    }

    let (status, users) = app.get("/users?name=Ana").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_account_maintenance() {
    let app = TestApp::new("json");
    let (_, admin) = app
        .post(
            "/auth/register",
            json!({"name": "Root", "email": "root@example.com", "password": "adm1n", "role": "admin"}),
        )
        .await;
    let (_, user) = app
        .post(
            "/auth/register",
            json!({"name": "Ana", "email": "ana@example.com", "password": "s3cret"}),
        )
        .await;
    let user_id = user["id"].as_str().unwrap();

    let (status, _) = app
        .post(
            "/auth/change-password",
            json!({"user_id": user_id, "current_password": "nope", "new_password": "n3w-pass"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/auth/change-password",
            json!({"user_id": user_id, "current_password": "s3cret", "new_password": "n3w-pass"}),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .post(
            "/auth/reset-password",
            json!({"email": "nobody@example.com", "new_password": "whatever"}),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .post(
            "/auth/reset-password",
            json!({"email": "ana@example.com", "new_password": "r3set-pass"}),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .post(
            "/auth/login",
            json!({"email": "ana@example.com", "password": "r3set-pass"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(&format!("/users/{}/deactivate", user_id), json!({"admin_id": user_id}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, deactivated) = app
        .post(
            &format!("/users/{}/deactivate", user_id),
            json!({"admin_id": admin["id"]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deactivated["active"], false);
    assert!(deactivated.get("password_hash").is_none());
}

#[tokio::test]
async fn test_checkout_and_return() {
    let app = TestApp::new("json");

    app.post("/books", json!({"id": "b1", "title": "Y"})).await;
    app.post("/users", json!({"id": "u1", "name": "Ana", "email": "ana@example.com"}))
        .await;

    let (status, loan) = app
        .post("/loans/checkout", json!({"book_id": "b1", "user_id": "u1"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(loan["status"], "active");
    let loan_id = loan["id"].as_str().unwrap().to_string();

    let (_, book) = app.get("/books/b1").await;
    assert_eq!(book["available"], false);
    assert_eq!(book["borrowed_by"], "u1");

    let (status, _) = app
        .post("/loans/checkout", json!({"book_id": "b1", "user_id": "u1"}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, user_loans) = app.get("/users/u1/loans").await;
    assert_eq!(user_loans.as_array().unwrap().len(), 1);

    let due: DateTime<Utc> = loan["due_date"].as_str().unwrap().parse().unwrap();
    let returned_at = due + Duration::days(3) + Duration::hours(1);
    let (status, returned) = app
        .post(
            &format!("/loans/{}/return", loan_id),
            json!({"returned_at": returned_at}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["days_overdue"], 3);
    assert_eq!(returned["fine"], 1.5);
    assert_eq!(returned["loan"]["status"], "returned");

    let (_, book) = app.get("/books/b1").await;
    assert_eq!(book["available"], true);
    assert!(book["borrowed_by"].is_null());

    let (_, user) = app.get("/users/u1").await;
    assert_eq!(user["borrowed_books"], json!([]));

    let (status, _) = app
        .send("POST", &format!("/loans/{}/return", loan_id), None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_checkout_period_out_of_range() {
    let app = TestApp::new("json");
    app.post("/books", json!({"id": "b1", "title": "Y"})).await;
    app.post("/users", json!({"id": "u1", "name": "Ana", "email": "ana@example.com"}))
        .await;

    for days in [json!(100_000_000), json!(i64::MAX), json!(0)] {
        let (status, body) = app
            .post(
                "/loans/checkout",
                json!({"book_id": "b1", "user_id": "u1", "days": days}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Validation");
    }

    let (_, book) = app.get("/books/b1").await;
    assert_eq!(book["available"], true);
}

#[tokio::test]
async fn test_extend_history_and_fines() {
    let app = TestApp::new("csv");
    app.post("/books", json!({"id": "b1", "title": "Y"})).await;
    app.post("/users", json!({"id": "u1", "name": "Ana", "email": "ana@example.com"}))
        .await;

    let (_, loan) = app
        .post("/loans/checkout", json!({"book_id": "b1", "user_id": "u1", "days": 7}))
        .await;
    let loan_id = loan["id"].as_str().unwrap().to_string();
    let due: DateTime<Utc> = loan["due_date"].as_str().unwrap().parse().unwrap();

    let (status, extended) = app
        .send("POST", &format!("/loans/{}/extend", loan_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_due: DateTime<Utc> = extended["due_date"].as_str().unwrap().parse().unwrap();
    assert_eq!(new_due - due, Duration::days(7));

    let (status, _) = app
        .post(&format!("/loans/{}/extend", loan_id), json!({"days": 100_000_000}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, history) = app.get("/loans/history?user_id=u1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    let (_, none) = app.get("/loans/history?book_id=b2").await;
    assert_eq!(none, json!([]));

    let (status, fines) = app.get("/users/u1/fines").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fines["total_fine"], 0.0);
    assert_eq!(fines["fine_per_day"], 0.5);

    let (status, stats) = app.get("/loans/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_loans"], 1);
    assert_eq!(stats["active_loans"], 1);
}

#[tokio::test]
async fn test_reports() {
    let app = TestApp::new("json");
    app.post("/authors", json!({"id": "a1", "name": "Julio Cortázar", "nationality": "Argentina"}))
        .await;
    app.post("/books", json!({"id": "b1", "title": "Rayuela", "author_id": "a1", "genre": "Novela", "publication_year": 1963}))
        .await;
    app.post("/users", json!({"id": "u1", "name": "Ana", "email": "ana@example.com"}))
        .await;
    app.post("/loans/checkout", json!({"book_id": "b1", "user_id": "u1"}))
        .await;

    let (status, overview) = app.get("/reports/overview").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["books"]["loaned"], 1);
    assert_eq!(overview["loans"]["active_loans"], 1);

    let (_, books) = app.get("/reports/books?genre=Novela&year_from=1960").await;
    assert_eq!(books["total_books"], 1);
    assert_eq!(books["by_year"]["1963"], 1);
    let (_, none) = app.get("/reports/books?available=true").await;
    assert_eq!(none["total_books"], 0);

    let (_, authors) = app.get("/reports/authors").await;
    assert_eq!(authors["top_authors"][0]["books_count"], 1);

    let (status, loans) = app.get("/reports/loans?from=2000-01-01T00:00:00Z").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loans["summary"]["total_loans"], 1);
    assert_eq!(loans["top_books"][0]["title"], "Rayuela");
    let (_, future) = app.get("/reports/loans?from=2999-01-01T00:00:00Z").await;
    assert_eq!(future["summary"]["total_loans"], 0);

    let (status, activity) = app.get("/reports/users/u1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(activity["loan_history"][0]["book_title"], "Rayuela");
    let (status, _) = app.get("/reports/users/nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get("/reports/overview?export=pdf").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_report_text_export() {
    let app = TestApp::new("json");
    app.post("/books", json!({"title": "Rayuela"})).await;

    let request = Request::builder()
        .uri("/api/v1/reports/books?export=csv")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/csv; charset=utf-8"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("field,value\n"));
    assert!(text.contains("total_books,1\n"));
}

#[tokio::test]
async fn test_checkout_missing_book() {
    let app = TestApp::new("json");
    let (status, _) = app
        .post("/loans/checkout", json!({"book_id": "nope", "user_id": "u1"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_migration_endpoints() {
    let app = TestApp::new("json");
    app.post("/books", json!({"id": "b1", "title": "Y", "author_id": "a1"}))
        .await;
    app.post("/authors", json!({"id": "a1", "name": "X"})).await;

    let (status, validation) = app
        .post("/migrations/validate", json!({"from": "json", "to": "csv"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(validation["valid"], true);

    let (status, report) = app
        .post(
            "/migrations",
            json!({"from": "json", "to": "csv", "entities": ["books"]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["success"], true);
    assert_eq!(report["migrated_count"], 1);
    assert!(report["backup_path"].is_string());

    let (status, _) = app
        .post("/migrations", json!({"from": "json", "to": "json"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // db is another name for sqlite
    let (status, _) = app
        .post("/migrations", json!({"from": "db", "to": "sqlite"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/migrations", json!({"from": "json", "to": "csv", "entities": ["shelves"]}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, history) = app.get("/migrations").await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["operation"], "migration_complete");
}

#[tokio::test]
async fn test_stats() {
    let app = TestApp::new("txt");
    app.post("/categories", json!({"name": "Novela"})).await;

    let (status, stats) = app.get("/stats").await;
    assert_eq!(status, StatusCode::OK);
    let stats = stats.as_array().unwrap();
    assert_eq!(stats.len(), 5);
    assert_eq!(stats[4]["entity"], "category");
    assert_eq!(stats[4]["count"], 1);
    assert_eq!(stats[0]["count"], 0);
}
