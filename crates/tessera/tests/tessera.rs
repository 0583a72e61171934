//! Opening a store from configuration and driving every layer through it.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tempfile::tempdir;
use tessera::{
    Catalog, DeliveryError, FieldMetadata, FieldType, InMemoryDirectory, ObjectGrant,
    ObjectMetadata, OutboxEvent, Record, RequestContext, RlsError, StaticCatalog, Tessera,
    TesseraConfig, TesseraError, UserSession,
};

fn admin() -> RequestContext {
    RequestContext::new(UserSession::new("admin", "Ada Admin", "system_admin"))
}

fn user(id: &str) -> RequestContext {
    RequestContext::new(UserSession::new(id, format!("User {id}"), "standard"))
}

fn account() -> ObjectMetadata {
    ObjectMetadata::new("account")
        .with_labels("Account", "Accounts")
        .owned()
        .with_field(FieldMetadata::new("name", FieldType::Text).required())
}

fn open(dir: &std::path::Path, catalog: Arc<StaticCatalog>) -> Tessera {
    let directory = InMemoryDirectory::new().with_object_grant("standard", "*", ObjectGrant::full());
    Tessera::open_with(TesseraConfig::in_dir(dir), catalog, Arc::new(directory))
        .expect("Failed to open store")
}

#[test]
fn test_open_with_file_catalog() {
    let dir = tempdir().expect("Failed to create temp dir");
    let catalog_path = dir.path().join("catalog.toml");
    fs::write(
        &catalog_path,
        r#"
[[objects]]
api_name = "note"
plural_label = "Notes"

[[objects.fields]]
api_name = "owner_id"
type = "Lookup"
is_system = true

[[objects.fields]]
api_name = "title"
type = "Text"
required = true
is_name_field = true
"#,
    )
    .expect("Failed to write catalog");

    let mut config = TesseraConfig::in_dir(dir.path());
    config.metadata.catalog_path = Some(catalog_path);
    let store = Tessera::open(config).expect("Failed to open store");
    assert!(store.database().path().starts_with(dir.path()));

    let note = store
        .engine()
        .insert(&admin(), "note", Record::new().with("title", "Hello"))
        .expect("Failed to insert");
    assert_eq!(note.get_str("name"), Some("Hello"));

    // No grants: only the super-user can read.
    let err = store.rewrite_query(&user("u1"), "SELECT title FROM note").unwrap_err();
    assert!(matches!(err, TesseraError::Query(RlsError::TableDenied { .. })));
    let sql = store.rewrite_query(&admin(), "SELECT title FROM note").unwrap();
    assert!(!sql.contains("owner_id"));
}

#[test]
fn test_rewrite_injects_owner_predicate() {
    let dir = tempdir().expect("Failed to create temp dir");
    let store = open(dir.path(), Arc::new(StaticCatalog::new(Catalog::new().with_object(account()))));

    let sql = store
        .rewrite_query(&user("u1"), "SELECT name FROM account WHERE name = 'Acme'")
        .unwrap();
    assert!(sql.contains("owner_id = 'u1'"), "{sql}");

    let err = store
        .rewrite_query(&user("u1"), "DELETE FROM account")
        .unwrap_err();
    assert!(matches!(err, TesseraError::Query(RlsError::NotReadOnly)));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut config = TesseraConfig::in_dir(dir.path());
    config.bulk.batch_size = 0;
    let err = Tessera::open(config).unwrap_err();
    assert!(matches!(err, TesseraError::Config(_)));
}

#[test]
fn test_reload_creates_new_tables() {
    let dir = tempdir().expect("Failed to create temp dir");
    let catalog = Arc::new(StaticCatalog::new(Catalog::new().with_object(account())));
    let store = open(dir.path(), Arc::clone(&catalog));

    let contact = ObjectMetadata::new("contact")
        .owned()
        .with_field(FieldMetadata::new("name", FieldType::Text));
    catalog
        .replace(Catalog::new().with_object(account()).with_object(contact))
        .unwrap();
    assert!(
        store
            .engine()
            .insert(&admin(), "contact", Record::new().with("name", "Ada"))
            .is_err()
    );

    store.reload_metadata().unwrap();
    store
        .engine()
        .insert(&admin(), "contact", Record::new().with("name", "Ada"))
        .unwrap();
    assert_eq!(store.ensure_tables().unwrap(), 2);
}

#[test]
fn test_outbox_worker_delivers() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut config = TesseraConfig::in_dir(dir.path());
    config.outbox.poll_interval_ms = 10;
    let store = Tessera::open_with(
        config,
        Arc::new(StaticCatalog::new(Catalog::new().with_object(account()))),
        Arc::new(InMemoryDirectory::new()),
    )
    .unwrap();

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let subscriber = move |_: &OutboxEvent| -> Result<(), DeliveryError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    };
    let mut worker = store.start_outbox_worker(Arc::new(subscriber)).unwrap();

    for name in ["A", "B"] {
        store
            .engine()
            .insert(&admin(), "account", Record::new().with("name", name))
            .unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while delivered.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    worker.stop();
    assert_eq!(delivered.load(Ordering::SeqCst), 2);
    assert_eq!(store.outbox().pending_count().unwrap(), 0);

    // Delivered events are younger than the retention window.
    assert_eq!(store.cleanup_outbox().unwrap(), 0);
}
