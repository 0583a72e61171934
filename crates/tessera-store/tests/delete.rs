//! Soft delete, cascade and restrict, restore, purge and the recycle bin.

mod common;

use common::{Fixture, admin, user};
use tessera_access::ObjectGrant;
use tessera_store::{ErrorKind, RecordError, RecycleBinScope};
use tessera_types::{Record, RequestContext, UserSession};

fn contact(fx: &Fixture, ctx: &RequestContext, account_id: &str, last_name: &str) -> String {
    fx.engine
        .insert(
            ctx,
            "contact",
            Record::new().with("last_name", last_name).with("account_id", account_id),
        )
        .unwrap()
        .id()
        .unwrap()
        .to_string()
}

fn task(fx: &Fixture, what_id: &str) -> String {
    fx.engine
        .insert(&admin(), "task", Record::new().with("subject", "Call").with("what_id", what_id))
        .unwrap()
        .id()
        .unwrap()
        .to_string()
}

#[test]
fn test_delete_is_idempotent() {
    let fx = Fixture::new();
    let id = fx.account("Acme");

    assert_eq!(fx.engine.delete(&admin(), "account", &id).unwrap(), 1);
    assert_eq!(fx.engine.delete(&admin(), "account", &id).unwrap(), 0);
    assert_eq!(fx.engine.delete(&admin(), "account", "never-existed").unwrap(), 0);

    assert!(fx.is_deleted("account", &id));
    assert!(fx.engine.get(&admin(), "account", &id).unwrap_err().is_not_found());
    assert_eq!(
        fx.engine.recycle_bin(&admin(), RecycleBinScope::Mine).unwrap().len(),
        1
    );
    assert_eq!(fx.event_types(), ["record.created", "record.deleted"]);
}

#[test]
fn test_delete_cascades_to_children() {
    let fx = Fixture::new();
    let parent = fx.account("Parent");
    let other = fx.account("Other");
    let c1 = contact(&fx, &admin(), &parent, "One");
    let c2 = contact(&fx, &admin(), &parent, "Two");
    let c3 = contact(&fx, &admin(), &other, "Three");
    let on_parent = task(&fx, &parent);

    let deleted = fx.engine.delete(&admin(), "account", &parent).unwrap();
    assert_eq!(deleted, 4);

    for id in [&c1, &c2] {
        assert!(fx.is_deleted("contact", id));
    }
    assert!(fx.is_deleted("task", &on_parent));
    assert!(!fx.is_deleted("contact", &c3));
    assert!(!fx.is_deleted("account", &other));

    let bin = fx.engine.recycle_bin(&admin(), RecycleBinScope::All).unwrap();
    assert_eq!(bin.len(), 4);
    let deleted_events = fx
        .event_types()
        .into_iter()
        .filter(|event| event == "record.deleted")
        .count();
    assert_eq!(deleted_events, 4);
}

#[test]
fn test_polymorphic_cascade_matches_type() {
    let fx = Fixture::new();
    let account = fx.account("Acme");
    let opportunity = fx
        .engine
        .insert(&admin(), "opportunity", Record::new().with("name", "Deal"))
        .unwrap();
    let opportunity_id = opportunity.id().unwrap();
    let on_opportunity = task(&fx, opportunity_id);
    let on_account = task(&fx, &account);

    assert_eq!(fx.engine.delete(&admin(), "opportunity", opportunity_id).unwrap(), 2);
    assert!(fx.is_deleted("task", &on_opportunity));
    assert!(!fx.is_deleted("task", &on_account));
}

#[test]
fn test_restrict_blocks_whole_delete() {
    let fx = Fixture::new();
    let parent = fx.account("Parent");
    let c1 = contact(&fx, &admin(), &parent, "One");
    let c2 = contact(&fx, &admin(), &parent, "Two");
    let opportunity = fx
        .engine
        .insert(
            &admin(),
            "opportunity",
            Record::new().with("name", "Deal").with("account_id", parent.as_str()),
        )
        .unwrap();
    let events_before = fx.event_types().len();

    let err = fx.engine.delete(&admin(), "account", &parent).unwrap_err();
    assert!(
        matches!(err, RecordError::Restricted { ref relationship, .. } if relationship == "Opportunities"),
        "{err:?}"
    );
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains("Opportunities"));

    assert!(!fx.is_deleted("account", &parent));
    assert!(!fx.is_deleted("contact", &c1));
    assert!(!fx.is_deleted("contact", &c2));
    assert_eq!(fx.event_types().len(), events_before);
    assert!(fx.engine.recycle_bin(&admin(), RecycleBinScope::All).unwrap().is_empty());

    // A deleted child no longer restricts.
    fx.engine
        .delete(&admin(), "opportunity", opportunity.id().unwrap())
        .unwrap();
    assert_eq!(fx.engine.delete(&admin(), "account", &parent).unwrap(), 3);
}

#[test]
fn test_missing_child_table_is_skipped() {
    // `attachment` restricts account deletes but has no table.
    let fx = Fixture::new();
    let id = fx.account("Acme");
    assert_eq!(fx.engine.delete(&admin(), "account", &id).unwrap(), 1);
}

#[test]
fn test_delete_requires_record_access() {
    let fx = Fixture::new();
    let id = fx
        .engine
        .insert(&user("u1"), "account", Record::new().with("name", "Mine"))
        .unwrap()
        .id()
        .unwrap()
        .to_string();

    let err = fx.engine.delete(&user("u2"), "account", &id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert!(!fx.is_deleted("account", &id));

    assert_eq!(fx.engine.delete(&user("u1"), "account", &id).unwrap(), 1);
}

#[test]
fn test_cascade_checks_child_permissions() {
    let fx = Fixture::new();
    fx.directory.grant_object("limited", "account", ObjectGrant::full());
    fx.directory
        .grant_object("limited", "contact", ObjectGrant::read_write());
    let limited = RequestContext::new(UserSession::new("l1", "Limited", "limited"));

    let account = fx
        .engine
        .insert(&limited, "account", Record::new().with("name", "Mine"))
        .unwrap()
        .id()
        .unwrap()
        .to_string();
    let child = contact(&fx, &limited, &account, "Child");

    let err = fx.engine.delete(&limited, "account", &account).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert!(!fx.is_deleted("account", &account));
    assert!(!fx.is_deleted("contact", &child));
}

#[test]
fn test_restore_brings_back_the_record_only() {
    let fx = Fixture::new();
    let parent = fx.account("Parent");
    let child = contact(&fx, &admin(), &parent, "Child");
    fx.engine.delete(&admin(), "account", &parent).unwrap();

    let restored = fx.engine.restore(&admin(), "account", &parent).unwrap();
    assert_eq!(restored.get_str("name"), Some("Parent"));
    assert!(!fx.is_deleted("account", &parent));
    assert!(fx.is_deleted("contact", &child));

    let bin = fx.engine.recycle_bin(&admin(), RecycleBinScope::All).unwrap();
    assert_eq!(bin.len(), 1);
    assert_eq!(bin[0].record_id, child);
    assert_eq!(fx.event_types().last().map(String::as_str), Some("record.restored"));

    // Restoring a live record changes nothing.
    let events = fx.event_types().len();
    fx.engine.restore(&admin(), "account", &parent).unwrap();
    assert_eq!(fx.event_types().len(), events);
}

#[test]
fn test_restore_checks_uniqueness() {
    let fx = Fixture::new();
    let old = fx
        .engine
        .insert(&admin(), "account", Record::new().with("name", "Old").with("code", "A-1"))
        .unwrap();
    let old_id = old.id().unwrap();
    fx.engine.delete(&admin(), "account", old_id).unwrap();
    fx.engine
        .insert(&admin(), "account", Record::new().with("name", "New").with("code", "A-1"))
        .unwrap();

    let err = fx.engine.restore(&admin(), "account", old_id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(fx.is_deleted("account", old_id));
}

#[test]
fn test_restore_missing_record() {
    let fx = Fixture::new();
    assert!(fx.engine.restore(&admin(), "account", "missing").unwrap_err().is_not_found());
}

#[test]
fn test_purge_by_deleter_or_admin() {
    let fx = Fixture::new();
    let mine = fx
        .engine
        .insert(&user("u1"), "account", Record::new().with("name", "Mine"))
        .unwrap()
        .id()
        .unwrap()
        .to_string();
    fx.engine.delete(&user("u1"), "account", &mine).unwrap();

    let err = fx.engine.purge(&user("u2"), "account", &mine).unwrap_err();
    assert!(matches!(err, RecordError::Forbidden(_)));
    assert_eq!(fx.count("account"), 1);

    fx.engine.purge(&user("u1"), "account", &mine).unwrap();
    assert_eq!(fx.count("account"), 0);
    assert!(fx.engine.recycle_bin(&user("u1"), RecycleBinScope::Mine).unwrap().is_empty());

    let theirs = fx
        .engine
        .insert(&user("u2"), "account", Record::new().with("name", "Theirs"))
        .unwrap()
        .id()
        .unwrap()
        .to_string();
    fx.engine.delete(&user("u2"), "account", &theirs).unwrap();
    fx.engine.purge(&admin(), "account", &theirs).unwrap();
    assert_eq!(fx.count("account"), 0);
}

#[test]
fn test_purge_requires_bin_entry() {
    let fx = Fixture::new();
    let live = fx.account("Live");
    assert!(fx.engine.purge(&admin(), "account", &live).unwrap_err().is_not_found());
    assert_eq!(fx.count("account"), 1);
}

#[test]
fn test_recycle_bin_scopes() {
    let fx = Fixture::new();
    for owner in ["u1", "u2"] {
        let id = fx
            .engine
            .insert(&user(owner), "account", Record::new().with("name", format!("{owner} account")))
            .unwrap()
            .id()
            .unwrap()
            .to_string();
        fx.engine.delete(&user(owner), "account", &id).unwrap();
    }

    let mine = fx.engine.recycle_bin(&user("u1"), RecycleBinScope::Mine).unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].deleted_by, "User u1");
    assert_eq!(mine[0].deleted_by_id.as_deref(), Some("u1"));
    assert_eq!(mine[0].record_name.as_deref(), Some("u1 account"));
    assert_eq!(mine[0].object_api_name, "account");
    assert_ne!(mine[0].id, mine[0].record_id);

    let err = fx.engine.recycle_bin(&user("u1"), RecycleBinScope::All).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(fx.engine.recycle_bin(&admin(), RecycleBinScope::All).unwrap().len(), 2);
}
