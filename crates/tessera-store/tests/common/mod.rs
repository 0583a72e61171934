//! Shared fixture for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use tempfile::TempDir;
use tessera_access::{AccessController, InMemoryDirectory, ObjectGrant};
use tessera_metadata::{
    AutoNumberSequence, Catalog, FieldMetadata, FieldType, MetadataCache, ObjectMetadata,
    StaticCatalog, ValidationRule,
};
use tessera_store::{Database, Outbox, OutboxOptions, RecordEngine};
use tessera_types::{Record, RequestContext, UserSession};

pub const ADMIN_PROFILE: &str = "system_admin";
pub const STANDARD_PROFILE: &str = "standard";

/// Objects used across the tests.
///
/// - `account`: owned, unique `code`, auto-numbered `account_number`
/// - `contact`: cascades from `account`
/// - `opportunity`: restricts `account` deletes, tracked `amount` and `stage`
/// - `task`: polymorphic `what_id` over `account` and `opportunity`, cascading
/// - `attachment`: restricts `account` deletes but has no table
/// - `app_user`: password field
pub fn catalog() -> Catalog {
    let account = ObjectMetadata::new("account")
        .with_labels("Account", "Accounts")
        .owned()
        .with_field(FieldMetadata::new("name", FieldType::Text).required().name_field())
        .with_field(FieldMetadata::new("code", FieldType::Text).unique())
        .with_field(FieldMetadata::new("account_number", FieldType::AutoNumber))
        .with_field(
            FieldMetadata::new("industry", FieldType::Picklist).with_picklist(["Tech", "Retail"]),
        )
        .with_field(FieldMetadata::new("website", FieldType::Url))
        .with_field(FieldMetadata::new("is_active", FieldType::Boolean).with_default("true"))
        .with_field(FieldMetadata::new("secret_notes", FieldType::TextArea));

    let contact = ObjectMetadata::new("contact")
        .with_labels("Contact", "Contacts")
        .owned()
        .with_field(FieldMetadata::new("last_name", FieldType::Text).required().name_field())
        .with_field(FieldMetadata::new("email", FieldType::Email).unique())
        .with_field(FieldMetadata::lookup("account_id", ["account"]).with_delete_rule("Cascade"));

    let opportunity = ObjectMetadata::new("opportunity")
        .with_labels("Opportunity", "Opportunities")
        .owned()
        .with_field(FieldMetadata::new("name", FieldType::Text).required().name_field())
        .with_field(FieldMetadata::new("amount", FieldType::Currency).tracked())
        .with_field(
            FieldMetadata::new("stage", FieldType::Picklist)
                .with_picklist(["Prospect", "Won", "Lost"])
                .with_default("Prospect")
                .tracked(),
        )
        .with_field(FieldMetadata::lookup("account_id", ["account"]));

    let task = ObjectMetadata::new("task")
        .with_labels("Task", "Tasks")
        .owned()
        .with_field(FieldMetadata::new("subject", FieldType::Text).required().name_field())
        .with_field(
            FieldMetadata::lookup("what_id", ["account", "opportunity"]).with_delete_rule("Cascade"),
        );

    let attachment = ObjectMetadata::new("attachment")
        .with_labels("Attachment", "Attachments")
        .owned()
        .with_field(FieldMetadata::lookup("account_id", ["account"]).with_delete_rule("Restrict"));

    let app_user = ObjectMetadata::new("app_user")
        .owned()
        .with_field(FieldMetadata::new("username", FieldType::Text).required().unique().name_field())
        .with_field(FieldMetadata::new("password", FieldType::Password));

    Catalog::new()
        .with_object(account)
        .with_object(contact)
        .with_object(opportunity)
        .with_object(task)
        .with_object(attachment)
        .with_object(app_user)
        .with_validation_rule(ValidationRule::new(
            "opportunity",
            "non_negative_amount",
            "amount < 0",
            "Amount cannot be negative",
        ))
        .with_auto_number(AutoNumberSequence::new("account", "account_number", "ACC-{0000}"))
}

/// `standard` users get full object access except `secret_notes`, which
/// they can read but not edit.
pub fn directory() -> InMemoryDirectory {
    InMemoryDirectory::new()
        .with_object_grant(STANDARD_PROFILE, "*", ObjectGrant::full())
        .with_field_grant(
            STANDARD_PROFILE,
            "account",
            "secret_notes",
            tessera_access::FieldGrant::read_only(),
        )
}

pub struct Fixture {
    // Holds the database file for the lifetime of the test.
    _dir: TempDir,
    pub db: Arc<Database>,
    pub catalog: Arc<StaticCatalog>,
    pub metadata: Arc<MetadataCache>,
    pub directory: Arc<InMemoryDirectory>,
    pub access: Arc<AccessController>,
    pub engine: RecordEngine,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_catalog(catalog())
    }

    /// Creates tables for every object in `catalog` except `attachment`.
    pub fn with_catalog(catalog: Catalog) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(dir.path().join("tessera.db")).unwrap());
        db.bootstrap().unwrap();

        let source = Arc::new(StaticCatalog::new(catalog));
        let metadata = Arc::new(MetadataCache::new(Arc::clone(&source) as _));
        for schema in metadata.all_schemas().unwrap() {
            if schema.api_name != "attachment" {
                db.ensure_object_table(&schema).unwrap();
            }
        }

        let directory = Arc::new(directory());
        let access = Arc::new(
            AccessController::new(Arc::clone(&metadata), Arc::clone(&directory) as _).without_audit(),
        );
        let engine = RecordEngine::new(Arc::clone(&db), Arc::clone(&metadata), Arc::clone(&access));

        Self {
            _dir: dir,
            db,
            catalog: source,
            metadata,
            directory,
            access,
            engine,
        }
    }

    pub fn outbox(&self) -> Outbox {
        Outbox::new(Arc::clone(&self.db), OutboxOptions::default())
    }

    /// Creates an account as the admin and returns its id.
    pub fn account(&self, name: &str) -> String {
        let created = self
            .engine
            .insert(&admin(), "account", Record::new().with("name", name))
            .unwrap();
        created.id().unwrap().to_string()
    }

    /// Counts rows in `table`, deleted or not.
    pub fn count(&self, table: &str) -> i64 {
        let conn = self.db.connection().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))
            .unwrap()
    }

    /// Raw `is_deleted` flag of a row.
    pub fn is_deleted(&self, table: &str, id: &str) -> bool {
        let conn = self.db.connection().unwrap();
        conn.query_row(
            &format!("SELECT is_deleted FROM \"{table}\" WHERE id = ?1"),
            [id],
            |row| row.get::<_, bool>(0),
        )
        .unwrap()
    }

    /// Outbox event types in insertion order.
    pub fn event_types(&self) -> Vec<String> {
        let conn = self.db.connection().unwrap();
        let mut stmt = conn
            .prepare("SELECT event_type FROM \"_outbox_event\" ORDER BY created_date, rowid")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<String>>>()
            .unwrap()
    }
}

pub fn admin() -> RequestContext {
    RequestContext::new(admin_session())
}

pub fn admin_session() -> UserSession {
    UserSession::new("admin", "Ada Admin", ADMIN_PROFILE)
}

pub fn user(id: &str) -> RequestContext {
    RequestContext::new(UserSession::new(id, format!("User {id}"), STANDARD_PROFILE))
}
