//! Data manager behaviour across every storage format

use std::path::Path;

use chrono::{Duration, NaiveDate};
use rstest::rstest;
use serde_json::json;

use shelfkeeper::data_managers::{Criteria, DataManager, DataManagerFactory};
use shelfkeeper::models::fields::{into_record, now};
use shelfkeeper::models::{
    Author, Book, Category, CreateAuthor, CreateBook, CreateCategory, CreateLoan, CreateUser,
    Entity, Loan, User, UserRole,
};
use shelfkeeper::repository::EntityManager;

fn manager<E: Entity>(format: &str, dir: &Path) -> DataManager<E> {
    DataManagerFactory::new()
        .create_manager::<E>(format, dir)
        .expect("known format")
}

fn criteria(value: serde_json::Value) -> Criteria {
    into_record(value)
}

fn sample_book(id: &str, title: &str) -> Book {
    let mut book = Book::create(CreateBook {
        id: Some(id.to_string()),
        title: title.to_string(),
        author_id: "a1".to_string(),
        isbn: Some("978-0-306-40615-7".to_string()),
        publication_year: Some(1967),
        genre: "Novela".to_string(),
        description: "Macondo, \"siete\" generaciones; lluvia & olvido".to_string(),
        pages: Some(417),
        publisher: "Sudamericana".to_string(),
        category_id: Some("c1".to_string()),
        ..Default::default()
    })
    .unwrap();
    book.lend_to("u1", now() + Duration::days(14));
    book
}

#[rstest]
#[case::txt("txt")]
#[case::csv("csv")]
#[case::json("json")]
#[case::xml("xml")]
#[case::sqlite("db")]
#[tokio::test]
async fn test_roundtrip_every_entity(#[case] format: &str) {
    let dir = tempfile::tempdir().unwrap();

    let book = sample_book("b1", "Cien años de soledad");

    let author = Author::create(CreateAuthor {
        id: Some("a1".into()),
        name: "Gabriel García Márquez".into(),
        birth_date: NaiveDate::from_ymd_opt(1927, 3, 6),
        nationality: "Colombiana".into(),
        biography: "Premio Nobel, 1982".into(),
        books: vec!["b1".into(), "b2".into()],
    })
    .unwrap();

    let mut user = User::create(CreateUser {
        id: Some("u1".into()),
        name: "Ana López".into(),
        email: "ana@example.com".into(),
        phone: "+34 600 000 000".into(),
        role: UserRole::Librarian,
        max_books: 7,
        ..Default::default()
    })
    .unwrap();
    user.password_hash = Some("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into());
    user.add_borrowed_book("b1");

    let mut loan = Loan::create(CreateLoan {
        id: Some("l1".into()),
        book_id: "b1".into(),
        user_id: "u1".into(),
        notes: "Primera edición".into(),
        ..Default::default()
    })
    .unwrap();
    loan.mark_returned(now()).unwrap();

    let category = Category::create(CreateCategory {
        id: Some("c2".into()),
        name: "Realismo mágico".into(),
        description: String::new(),
        parent_id: Some("c1".into()),
    })
    .unwrap();

    let books = manager::<Book>(format, dir.path());
    let authors = manager::<Author>(format, dir.path());
    let users = manager::<User>(format, dir.path());
    let loans = manager::<Loan>(format, dir.path());
    let categories = manager::<Category>(format, dir.path());

    assert!(books.save(&book).await);
    assert!(authors.save(&author).await);
    assert!(users.save(&user).await);
    assert!(loans.save(&loan).await);
    assert!(categories.save(&category).await);

    assert_eq!(books.load("b1").await, Some(book));
    assert_eq!(authors.load("a1").await, Some(author));
    assert_eq!(users.load("u1").await, Some(user));
    assert_eq!(loans.load("l1").await, Some(loan));
    assert_eq!(categories.load("c2").await, Some(category));
}

#[rstest]
#[case::txt("txt")]
#[case::csv("csv")]
#[case::json("json")]
#[case::xml("xml")]
#[case::sqlite("sqlite")]
#[tokio::test]
async fn test_upsert_replaces_in_place(#[case] format: &str) {
    let dir = tempfile::tempdir().unwrap();
    let books = manager::<Book>(format, dir.path());

    assert!(books.save(&sample_book("b1", "Cien años de soledad")).await);
    assert!(books.save(&sample_book("b2", "El otoño del patriarca")).await);

    let mut book = books.load("b1").await.unwrap();
    book.title = "Cien años de soledad (edición conmemorativa)".into();
    book.available = true;
    assert!(books.save(&book).await);

    let all = books.load_all().await;
    assert_eq!(all.len(), 2);
    assert_eq!(books.load("b1").await.unwrap(), book);
}

#[rstest]
#[case::txt("txt")]
#[case::csv("csv")]
#[case::json("json")]
#[case::xml("xml")]
#[case::sqlite("db")]
#[tokio::test]
async fn test_delete_is_idempotent(#[case] format: &str) {
    let dir = tempfile::tempdir().unwrap();
    let books = manager::<Book>(format, dir.path());

    // never-created store
    assert!(!books.delete("b1").await);

    assert!(books.save(&sample_book("b1", "Y")).await);
    assert!(books.exists("b1").await);

    assert!(books.delete("b1").await);
    assert!(!books.delete("b1").await);
    assert!(!books.exists("b1").await);
    assert!(books.load_all().await.is_empty());
}

#[rstest]
#[case::txt("txt")]
#[case::csv("csv")]
#[case::json("json")]
#[case::xml("xml")]
#[case::sqlite("db")]
#[tokio::test]
async fn test_search_semantics(#[case] format: &str) {
    let dir = tempfile::tempdir().unwrap();
    let books = manager::<Book>(format, dir.path());

    assert!(books.save(&sample_book("b1", "Cien años de soledad")).await);
    let mut other = sample_book("b2", "El amor en los tiempos del cólera");
    other.publication_year = Some(1985);
    assert!(books.save(&other).await);

    let found = books.search(&criteria(json!({"title": "años"}))).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "b1");

    // non-ASCII case folding
    assert_eq!(books.search(&criteria(json!({"title": "AÑOS"}))).await.len(), 1);
    assert_eq!(books.search(&criteria(json!({"title": "SOLEDAD"}))).await.len(), 1);
    assert_eq!(books.search(&criteria(json!({"title": "de"}))).await.len(), 2);

    let by_year = books.search(&criteria(json!({"publication_year": 1985}))).await;
    assert_eq!(by_year.len(), 1);
    assert_eq!(by_year[0].id, "b2");

    let combined = books
        .search(&criteria(json!({"title": "de", "available": false})))
        .await;
    assert_eq!(combined.len(), 2);

    assert!(books.search(&criteria(json!({"shelf": "A3"}))).await.is_empty());
    assert!(books.search(&criteria(json!({"title": "100%"}))).await.is_empty());
    assert_eq!(books.search(&Criteria::new()).await.len(), 2);
}

#[rstest]
#[case::txt("txt")]
#[case::csv("csv")]
#[case::json("json")]
#[case::xml("xml")]
#[case::sqlite("db")]
#[tokio::test]
async fn test_search_folds_non_ascii_stored_text(#[case] format: &str) {
    let dir = tempfile::tempdir().unwrap();
    let books = manager::<Book>(format, dir.path());

    // KELVIN SIGN lowercases to an ASCII 'k'
    let mut kelvin = sample_book("b1", "\u{212A}elvin y las estrellas");
    kelvin.publication_year = Some(1990);
    assert!(books.save(&kelvin).await);
    assert!(books.save(&sample_book("b2", "Rayuela")).await);

    let found = books.search(&criteria(json!({"title": "kelvin"}))).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "b1");

    let combined = books
        .search(&criteria(json!({"title": "KELVIN", "publication_year": 1990})))
        .await;
    assert_eq!(combined.len(), 1);
}

#[rstest]
#[case::txt("txt")]
#[case::csv("csv")]
#[case::json("json")]
#[case::xml("xml")]
#[case::sqlite("db")]
#[tokio::test]
async fn test_missing_store_is_empty(#[case] format: &str) {
    let dir = tempfile::tempdir().unwrap();
    let authors = manager::<Author>(format, &dir.path().join("not-yet-created"));

    assert!(authors.load_all().await.is_empty());
    assert!(authors.load("a1").await.is_none());
    assert!(authors.search(&criteria(json!({"name": "x"}))).await.is_empty());
    assert!(!dir.path().join("not-yet-created").exists());
}

#[rstest]
#[case::txt("txt")]
#[case::csv("csv")]
#[case::json("json")]
#[case::xml("xml")]
#[case::sqlite("db")]
#[tokio::test]
async fn test_find_by_is_exact(#[case] format: &str) {
    let dir = tempfile::tempdir().unwrap();
    let entities = EntityManager::new(DataManagerFactory::new(), format, dir.path()).unwrap();
    let users = entities.get_repository::<User>().unwrap();

    assert!(users.save(&User::new("Upper", "A@B.com").unwrap()).await);
    assert!(users.save(&User::new("Longer", "a@b.com.mx").unwrap()).await);

    let exact = criteria(json!({"email": "a@b.com"}));
    assert!(users.find_by(&exact).await.is_empty());
    // search is looser
    assert_eq!(users.search(&exact).await.len(), 2);

    assert!(users.save(&User::new("Exact", "a@b.com").unwrap()).await);
    let found = users.find_by(&exact).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Exact");
}

#[tokio::test]
async fn test_invalid_records_skipped_on_load() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("books.json"),
        r#"{"books": [
            {"id": "b1", "title": "Y", "author_id": "a1"},
            {"id": "b2", "title": ""},
            {"id": "b3", "title": "Z", "isbn": "123"},
            {"id": "b4", "title": "W", "publication_year": "MCMLXVII"}
        ]}"#,
    )
    .unwrap();

    let books = manager::<Book>("json", dir.path());
    let all = books.load_all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "b1");
    assert!(books.load("b2").await.is_none());
}

#[rstest]
#[case::json("json", "books.json", r#"{"books": [
    {"id": "b1", "title": "Y", "author_id": "a1"},
    {"title": "Sin id", "author_id": "a1"},
    {"id": "", "title": "Id vacío"}
]}"#)]
#[case::csv("csv", "books.csv", "id,title,author_id\nb1,Y,a1\n,Sin id,a1\n")]
#[tokio::test]
async fn test_records_without_id_skipped(
    #[case] format: &str,
    #[case] file: &str,
    #[case] content: &str,
) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(file), content).unwrap();

    let books = manager::<Book>(format, dir.path());
    let first: Vec<String> = books.load_all().await.into_iter().map(|b| b.id).collect();
    let second: Vec<String> = books.load_all().await.into_iter().map(|b| b.id).collect();
    assert_eq!(first, vec!["b1"]);
    assert_eq!(first, second);
    assert_eq!(books.search(&criteria(json!({"title": "id"}))).await.len(), 0);
}

#[tokio::test]
async fn test_unreadable_file_is_not_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("books.json");
    std::fs::write(&path, "{ not json").unwrap();

    let books = manager::<Book>("json", dir.path());
    assert!(books.load_all().await.is_empty());
    assert!(!books.save(&sample_book("b1", "Y")).await);
    assert!(!books.delete("b1").await);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
}

#[tokio::test]
async fn test_file_layouts() {
    let dir = tempfile::tempdir().unwrap();
    let book = sample_book("b1", "Y");

    for format in ["txt", "csv", "json", "xml", "db"] {
        assert!(manager::<Book>(format, dir.path()).save(&book).await);
    }

    for name in ["books.txt", "books.csv", "books.json", "books.xml", "library.db"] {
        assert!(dir.path().join(name).exists(), "{} missing", name);
    }
    assert!(!dir.path().join("books.json.tmp").exists());

    let json_text = std::fs::read_to_string(dir.path().join("books.json")).unwrap();
    assert!(json_text.starts_with("{\n    \"books\": ["));

    let csv_text = std::fs::read_to_string(dir.path().join("books.csv")).unwrap();
    assert!(csv_text.starts_with("id,title,author_id,isbn,"));

    let xml_text = std::fs::read_to_string(dir.path().join("books.xml")).unwrap();
    assert!(xml_text.contains("<library>\n  <books>\n    <book>"));
}
