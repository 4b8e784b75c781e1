use grits_core::bootstrap::{BootstrapResolver, GritsContext};
use grits_core::db::open_db_in_memory;
use grits_core::{
    AccessLevel, Caller, DirectoryRepository, GritsConfig, GritsError, GritsService, IncidentMeta,
    IncidentRecord, ItemRepository, SqliteDirectoryRepository, SqliteItemRepository, User,
};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

#[test]
fn writing_then_nulling_a_key_removes_it() {
    let conn = open_db_in_memory().unwrap();
    let context = bootstrap(&conn);
    let writer = Caller::User(member(&conn, &context, "editor", AccessLevel::Write));
    let record = seed(&conn, &context);
    let service = GritsService::open(&conn, &GritsConfig::default());
    let id = record.id.to_string();

    let updated = service
        .set_private_metadata(&writer, &id, r#"{"key1": "value", "key2": 2}"#)
        .unwrap();
    assert_eq!(
        updated.private.as_ref().and_then(|p| p.get("key1")),
        Some(&json!("value"))
    );

    service
        .set_private_metadata(&writer, &id, r#"{"key1": null}"#)
        .unwrap();

    let stored = SqliteItemRepository::new(&conn)
        .get_item(record.id)
        .unwrap()
        .unwrap();
    let private = stored.private.unwrap();
    assert!(!private.contains_key("key1"));
    assert_eq!(private.get("key2"), Some(&json!(2)));
}

#[test]
fn malformed_body_is_rejected_and_record_is_unchanged() {
    let conn = open_db_in_memory().unwrap();
    let context = bootstrap(&conn);
    let writer = Caller::User(member(&conn, &context, "editor", AccessLevel::Write));
    let record = seed(&conn, &context);
    let service = GritsService::open(&conn, &GritsConfig::default());
    let id = record.id.to_string();

    service
        .set_private_metadata(&writer, &id, r#"{"keep": true}"#)
        .unwrap();
    let before = SqliteItemRepository::new(&conn)
        .get_item(record.id)
        .unwrap()
        .unwrap();

    for body in ["{not json", "[1, 2]", "\"text\""] {
        let err = service.set_private_metadata(&writer, &id, body).unwrap_err();
        assert!(matches!(err, GritsError::Validation(_)), "body {body}");
        assert_eq!(err.status_code(), 400);
    }

    let after = SqliteItemRepository::new(&conn)
        .get_item(record.id)
        .unwrap()
        .unwrap();
    assert_eq!(before, after);
}

#[test]
fn unknown_or_malformed_item_ids_are_invalid() {
    let conn = open_db_in_memory().unwrap();
    let context = bootstrap(&conn);
    let service = GritsService::open(&conn, &GritsConfig::default());
    let owner = Caller::User(context.owner.clone());

    for id in [Uuid::new_v4().to_string(), "not-an-id".to_string()] {
        let err = service
            .set_private_metadata(&owner, &id, r#"{"a": 1}"#)
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "ID was invalid");
    }
}

#[test]
fn private_writes_require_privileged_write() {
    let conn = open_db_in_memory().unwrap();
    let context = bootstrap(&conn);
    let record = seed(&conn, &context);
    let reader = Caller::User(member(&conn, &context, "analyst", AccessLevel::Read));

    let directory = SqliteDirectoryRepository::new(&conn);
    let base_admin = User::new("base-admin");
    directory.create_user(&base_admin).unwrap();
    directory
        .add_group_member(context.base_group.id, base_admin.id, AccessLevel::Admin)
        .unwrap();

    let service = GritsService::open(&conn, &GritsConfig::default());
    for caller in [reader, Caller::User(base_admin), Caller::Anonymous] {
        let err = service
            .set_private_metadata(&caller, &record.id.to_string(), r#"{"a": 1}"#)
            .unwrap_err();
        assert_eq!(err.status_code(), 403, "caller {caller:?}");
    }

    let stored = SqliteItemRepository::new(&conn)
        .get_item(record.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.private, None);
}

fn bootstrap(conn: &Connection) -> GritsContext {
    let directory = SqliteDirectoryRepository::new(conn);
    directory.create_user(&User::new("grits")).unwrap();
    BootstrapResolver::new(&GritsConfig::default())
        .resolve(&directory)
        .unwrap()
}

fn member(conn: &Connection, context: &GritsContext, login: &str, level: AccessLevel) -> User {
    let directory = SqliteDirectoryRepository::new(conn);
    let user = User::new(login);
    directory.create_user(&user).unwrap();
    directory
        .add_group_member(context.privileged_group.id, user.id, level)
        .unwrap();
    user
}

fn seed(conn: &Connection, context: &GritsContext) -> IncidentRecord {
    let record = IncidentRecord::new(
        context.folder.id,
        "hm-1",
        "summary",
        IncidentMeta::new(1_393_632_000_000, 0.0, 0.0),
    );
    SqliteItemRepository::new(conn).create_item(&record).unwrap();
    record
}
