//! Migration between storage formats

use std::sync::Arc;

use async_trait::async_trait;
use rstest::rstest;

use shelfkeeper::data_managers::{BackupSource, DataManagerFactory, RecordStore};
use shelfkeeper::error::{AppError, StorageError, StorageResult};
use shelfkeeper::models::{
    Author, Book, Category, EntityKind, EntitySchema, Loan, Record, User,
};
use shelfkeeper::repository::migration::MigrationOperation;
use shelfkeeper::repository::{EntityManager, MigrationManager};

/// Accepts nothing: every write fails.
struct RejectingStore {
    schema: &'static EntitySchema,
}

#[async_trait]
impl RecordStore for RejectingStore {
    fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    fn backup_source(&self) -> BackupSource {
        BackupSource::Directory("/nonexistent".into())
    }

    async fn read_all(&self) -> StorageResult<Vec<Record>> {
        Ok(Vec::new())
    }

    async fn upsert(&self, _record: Record) -> StorageResult<()> {
        Err(StorageError::malformed(self.schema.name, "read-only store"))
    }

    async fn remove(&self, _id: &str) -> StorageResult<bool> {
        Ok(false)
    }
}

struct Library {
    _root: tempfile::TempDir,
    entities: Arc<EntityManager>,
    migrations: MigrationManager,
}

fn library_with(factory: DataManagerFactory, backup_enabled: bool) -> Library {
    let root = tempfile::tempdir().unwrap();
    let entities =
        Arc::new(EntityManager::new(factory, "json", root.path().join("data")).unwrap());
    let migrations = MigrationManager::new(
        entities.clone(),
        root.path().join("backups"),
        backup_enabled,
    );
    Library {
        _root: root,
        entities,
        migrations,
    }
}

fn library() -> Library {
    library_with(DataManagerFactory::new(), false)
}

async fn seed_books(entities: &EntityManager, format: &str, count: usize) {
    let books = entities.manager_for::<Book>(format).unwrap();
    for i in 0..count {
        let mut book = Book::new(&format!("Libro {}", i), "a1").unwrap();
        book.id = format!("b{}", i);
        assert!(books.save(&book).await);
    }
}

#[rstest]
#[case::empty(0)]
#[case::single(1)]
#[case::many(50)]
#[tokio::test]
async fn test_migrates_every_record(
    #[case] count: usize,
    #[values("txt", "csv", "xml", "db")] to_format: &str,
) {
    let lib = library();
    seed_books(&lib.entities, "json", count).await;

    let report = lib
        .migrations
        .migrate("json", to_format, None)
        .await
        .unwrap();

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.migrated_count, count);
    assert_eq!(report.entities.len(), EntityKind::ALL.len());

    let books = &report.entities[0];
    assert_eq!(books.entity, EntityKind::Book);
    assert_eq!((books.loaded, books.saved, books.failed), (count, count, 0));
    assert_eq!(books.verified, count);

    let source = lib.entities.manager_for::<Book>("json").unwrap();
    let destination = lib.entities.manager_for::<Book>(to_format).unwrap();
    let mut expected = source.load_all().await;
    let mut migrated = destination.load_all().await;
    expected.sort_by(|a, b| a.id.cmp(&b.id));
    migrated.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(migrated, expected);
}

#[tokio::test]
async fn test_migrate_selected_entities_only() {
    let lib = library();

    let mut author = Author::new("Gabriel García Márquez").unwrap();
    author.id = "a1".into();
    let mut book = Book::new("Cien años de soledad", "a1").unwrap();
    book.id = "b1".into();
    assert!(lib.entities.manager_for::<Author>("json").unwrap().save(&author).await);
    assert!(lib.entities.manager_for::<Book>("json").unwrap().save(&book).await);

    let report = lib
        .migrations
        .migrate("json", "csv", Some(&[EntityKind::Book][..]))
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.migrated_count, 1);
    assert_eq!(report.entities.len(), 1);

    let books = lib.entities.manager_for::<Book>("csv").unwrap().load_all().await;
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].author_id, "a1");
    assert!(lib
        .entities
        .manager_for::<Author>("csv")
        .unwrap()
        .load_all()
        .await
        .is_empty());
}

#[tokio::test]
async fn test_migration_is_repeatable() {
    let lib = library();
    seed_books(&lib.entities, "json", 3).await;

    lib.migrations.migrate("json", "xml", None).await.unwrap();
    let second = lib.migrations.migrate("json", "xml", None).await.unwrap();

    assert!(second.success);
    assert_eq!(
        lib.entities.manager_for::<Book>("xml").unwrap().count().await,
        3
    );
}

#[tokio::test]
async fn test_mixed_entities_survive_round_trip() {
    let lib = library();
    let json = "json";

    let mut user = User::new("Ana", "ana@example.com").unwrap();
    user.add_borrowed_book("b1");
    let loan = Loan::new("b1", &user.id, 14).unwrap();
    let category = Category::new("Novela").unwrap();

    assert!(lib.entities.manager_for::<User>(json).unwrap().save(&user).await);
    assert!(lib.entities.manager_for::<Loan>(json).unwrap().save(&loan).await);
    assert!(lib.entities.manager_for::<Category>(json).unwrap().save(&category).await);

    lib.migrations.migrate("json", "db", None).await.unwrap();
    let back = lib.migrations.migrate("db", "csv", None).await.unwrap();
    assert!(back.success);
    assert_eq!(back.migrated_count, 3);

    assert_eq!(
        lib.entities.manager_for::<User>("csv").unwrap().load(&user.id).await,
        Some(user)
    );
    assert_eq!(
        lib.entities.manager_for::<Loan>("csv").unwrap().load(&loan.id).await,
        Some(loan)
    );
    assert_eq!(
        lib.entities.manager_for::<Category>("csv").unwrap().load(&category.id).await,
        Some(category)
    );
}

#[tokio::test]
async fn test_failed_saves_are_reported() {
    let mut factory = DataManagerFactory::new();
    factory.register("readonly", |schema, _base| {
        Box::new(RejectingStore { schema })
    });
    let lib = library_with(factory, false);
    seed_books(&lib.entities, "json", 2).await;

    let report = lib
        .migrations
        .migrate("json", "readonly", None)
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.migrated_count, 0);
    assert!(report.errors.iter().any(|e| e.contains("2 of 2")));

    let history = lib.migrations.migration_history();
    let failed: Vec<_> = history
        .iter()
        .filter(|entry| entry.operation == MigrationOperation::EntityFailed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].entity, Some(EntityKind::Book));

    let last = history.last().unwrap();
    assert_eq!(last.operation, MigrationOperation::MigrationComplete);
    assert_eq!(last.errors, report.errors.len());
}

#[tokio::test]
async fn test_history_accumulates() {
    let lib = library();
    assert!(lib.migrations.migration_history().is_empty());

    seed_books(&lib.entities, "json", 1).await;
    lib.migrations.migrate("json", "csv", None).await.unwrap();
    lib.migrations.migrate("csv", "txt", None).await.unwrap();

    let history = lib.migrations.migration_history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].from_format, "json");
    assert_eq!(history[1].to_format, "txt");
    assert!(history
        .iter()
        .all(|entry| entry.operation == MigrationOperation::MigrationComplete && entry.migrated == 1));
}

#[tokio::test]
async fn test_invalid_formats_rejected() {
    let lib = library();

    let same = lib.migrations.migrate("CSV", "csv", None).await;
    assert!(matches!(same, Err(AppError::Validation(_))));

    let alias = lib.migrations.migrate("sqlite", "DB", None).await;
    assert!(matches!(alias, Err(AppError::Validation(_))));

    let unknown = lib.migrations.migrate("json", "yaml", None).await;
    assert!(matches!(unknown, Err(AppError::UnsupportedFormat(_))));

    assert!(lib.migrations.migration_history().is_empty());
}

#[tokio::test]
async fn test_validate_migration() {
    let lib = library();

    let empty = lib.migrations.validate_migration("json", "csv").await.unwrap();
    assert!(!empty.valid);
    assert!(empty.issues.iter().any(|issue| issue.contains("No data")));

    seed_books(&lib.entities, "json", 4).await;
    let ready = lib.migrations.validate_migration("json", "csv").await.unwrap();
    assert!(ready.valid, "issues: {:?}", ready.issues);
    assert_eq!(ready.source_counts[0].count, 4);

    let bad = lib.migrations.validate_migration("json", "yaml").await.unwrap();
    assert!(!bad.valid);
}

#[tokio::test]
async fn test_backup_created_before_migration() {
    let lib = library_with(DataManagerFactory::new(), true);
    seed_books(&lib.entities, "json", 2).await;

    let report = lib.migrations.migrate("json", "csv", None).await.unwrap();
    let backup = report.backup_path.expect("backup path");
    assert!(backup.join("books.json").exists());
    assert!(!backup.join("books.csv").exists());

    let to_db = lib.migrations.migrate("json", "db", None).await.unwrap();
    assert!(to_db.success);

    let from_db = lib.migrations.migrate("db", "xml", None).await.unwrap();
    let db_backup = from_db.backup_path.expect("database backup");
    assert!(db_backup.is_file());
    assert_eq!(db_backup.extension().and_then(|e| e.to_str()), Some("db"));
}

#[tokio::test]
async fn test_no_backup_without_data() {
    let lib = library_with(DataManagerFactory::new(), true);
    let report = lib.migrations.migrate("json", "csv", None).await.unwrap();
    assert!(report.success);
    assert!(report.backup_path.is_none());
}

#[test]
fn test_rollback_not_supported() {
    let lib = library();
    let result = lib.migrations.rollback_migration("backup_json_20240101_000000_000");
    assert!(matches!(result, Err(AppError::NotImplemented(_))));
}
