use grits_core::bootstrap::{BootstrapResolver, GritsContext};
use grits_core::db::open_db_in_memory;
use grits_core::model::incident::IncidentEvent;
use grits_core::{
    AccessLevel, Caller, DirectoryRepository, GritsConfig, GritsService, IncidentMeta,
    IncidentRecord, ItemRepository, SearchOutput, SqliteDirectoryRepository,
    SqliteItemRepository, User,
};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashMap;

const MARCH_1_2014_MS: i64 = 1_393_632_000_000;
const MARCH_2_2014_MS: i64 = 1_393_718_400_000;

#[test]
fn access_matrix_for_search_and_privileged_id() {
    let conn = open_db_in_memory().unwrap();
    let context = bootstrap(&conn);
    let directory = SqliteDirectoryRepository::new(&conn);

    let admin = User::new_admin("site-admin");
    directory.create_user(&admin).unwrap();
    let outsider = member(&conn, &context, "outsider", None, None);
    let base = member(&conn, &context, "reader", Some(AccessLevel::Read), None);
    let privileged = member(&conn, &context, "analyst", None, Some(AccessLevel::Read));

    let service = GritsService::open(&conn, &GritsConfig::default());
    let cases = [
        (Caller::User(admin), (200, 200)),
        (Caller::User(outsider), (403, 403)),
        (Caller::User(base), (200, 403)),
        (Caller::User(privileged), (200, 200)),
        (Caller::Anonymous, (403, 403)),
    ];

    for (caller, expected) in cases {
        let search = status(service.search(&caller, &HashMap::new()).map(|_| ()));
        let privileged_id = status(service.privileged_group_id(&caller).map(|_| ()));
        assert_eq!((search, privileged_id), expected, "caller {caller:?}");
    }
}

#[test]
fn base_members_never_see_private_metadata() {
    let conn = open_db_in_memory().unwrap();
    let context = bootstrap(&conn);
    let base = member(&conn, &context, "reader", Some(AccessLevel::Read), None);
    let analyst = member(&conn, &context, "analyst", None, Some(AccessLevel::Read));

    let mut record = incident(&context, "hm-1", MARCH_1_2014_MS);
    record.private = Some(json!({"score": 9}).as_object().cloned().unwrap());
    SqliteItemRepository::new(&conn).create_item(&record).unwrap();

    let service = GritsService::open(&conn, &GritsConfig::default());
    for geojson in ["0", "1"] {
        let params = query(&[("geoJSON", geojson)]);

        let hidden = output_json(service.search(&Caller::User(base.clone()), &params).unwrap());
        assert!(!hidden.to_string().contains("score"), "geoJSON={geojson}");

        let shown = output_json(service.search(&Caller::User(analyst.clone()), &params).unwrap());
        assert!(shown.to_string().contains("score"), "geoJSON={geojson}");
    }
}

#[test]
fn date_interval_is_half_open() {
    let conn = open_db_in_memory().unwrap();
    let context = bootstrap(&conn);
    let items = SqliteItemRepository::new(&conn);
    for (name, date) in [
        ("before", MARCH_1_2014_MS - 1),
        ("first", MARCH_1_2014_MS),
        ("last", MARCH_2_2014_MS - 1),
        ("after", MARCH_2_2014_MS),
    ] {
        items.create_item(&incident(&context, name, date)).unwrap();
    }

    let service = GritsService::open(&conn, &GritsConfig::default());
    let output = service
        .search(
            &Caller::User(context.owner.clone()),
            &query(&[("start", "2014-03-01"), ("end", "March 2, 2014")]),
        )
        .unwrap();

    let records = records(output);
    assert_eq!(names(&records), vec!["first", "last"]);
    for record in &records {
        assert!(record.meta.date >= MARCH_1_2014_MS && record.meta.date < MARCH_2_2014_MS);
    }
}

#[test]
fn legacy_and_migrated_stores_return_same_country_matches() {
    let legacy = open_db_in_memory().unwrap();
    let migrated = open_db_in_memory().unwrap();
    let legacy_context = bootstrap(&legacy);
    let migrated_context = bootstrap(&migrated);

    let data = [("hm-1", "Kenya"), ("hm-2", "Uganda"), ("hm-3", "Kenya")];
    for (offset, (name, country)) in data.into_iter().enumerate() {
        let date = MARCH_1_2014_MS + offset as i64;

        let mut flat = incident(&legacy_context, name, date);
        flat.meta.country = Some(country.to_string());
        flat.meta.disease = Some("Ebola".to_string());
        SqliteItemRepository::new(&legacy).create_item(&flat).unwrap();

        let mut nested = incident(&migrated_context, name, date);
        nested.meta.events = Some(vec![IncidentEvent {
            country: Some(country.to_string()),
            ..IncidentEvent::default()
        }]);
        SqliteItemRepository::new(&migrated).create_item(&nested).unwrap();
    }

    let params = query(&[("country", "Kenya")]);
    let legacy_names = names(&records(
        GritsService::open(&legacy, &GritsConfig::default())
            .search(&Caller::User(legacy_context.owner.clone()), &params)
            .unwrap(),
    ));
    let migrated_names = names(&records(
        GritsService::open(&migrated, &GritsConfig::default())
            .search(&Caller::User(migrated_context.owner.clone()), &params)
            .unwrap(),
    ));

    assert_eq!(legacy_names, vec!["hm-1", "hm-3"]);
    assert_eq!(legacy_names, migrated_names);
}

#[test]
fn legacy_records_without_a_flat_disease_are_still_found() {
    for (param, value) in [("country", "Kenya"), ("species", "human")] {
        let conn = open_db_in_memory().unwrap();
        let context = bootstrap(&conn);

        let mut flat = incident(&context, "hm-1", MARCH_1_2014_MS);
        match param {
            "country" => flat.meta.country = Some(value.to_string()),
            _ => flat.meta.species = Some(value.to_string()),
        }
        SqliteItemRepository::new(&conn).create_item(&flat).unwrap();

        let found = names(&records(
            GritsService::open(&conn, &GritsConfig::default())
                .search(&Caller::User(context.owner.clone()), &query(&[(param, value)]))
                .unwrap(),
        ));
        assert_eq!(found, vec!["hm-1"], "{param}={value}");
    }
}

#[test]
fn migration_state_is_cached_until_invalidated() {
    let conn = open_db_in_memory().unwrap();
    let context = bootstrap(&conn);
    let owner = Caller::User(context.owner.clone());
    let service = GritsService::open(&conn, &GritsConfig::default());
    let params = query(&[("country", "Kenya")]);

    assert!(service.search(&owner, &params).unwrap().is_empty());

    let mut flat = incident(&context, "hm-1", MARCH_1_2014_MS);
    flat.meta.country = Some("Kenya".to_string());
    SqliteItemRepository::new(&conn).create_item(&flat).unwrap();

    assert!(service.search(&owner, &params).unwrap().is_empty());

    service.invalidate_caches();
    let found = names(&records(service.search(&owner, &params).unwrap()));
    assert_eq!(found, vec!["hm-1"]);
}

#[test]
fn set_mode_sort_and_pagination() {
    let conn = open_db_in_memory().unwrap();
    let context = bootstrap(&conn);
    let items = SqliteItemRepository::new(&conn);
    for (offset, (name, feed)) in [("a", "promed"), ("b", "healthmap"), ("c", "promed")]
        .into_iter()
        .enumerate()
    {
        let mut record = incident(&context, name, MARCH_1_2014_MS + offset as i64);
        record.meta.feed = Some(feed.to_string());
        items.create_item(&record).unwrap();
    }

    let service = GritsService::open(&conn, &GritsConfig::default());
    let owner = Caller::User(context.owner.clone());

    let promed = records(
        service
            .search(&owner, &query(&[("feed", r#"["promed"]"#), ("regex", "false")]))
            .unwrap(),
    );
    assert_eq!(names(&promed), vec!["a", "c"]);

    let not_anchored = records(
        service
            .search(&owner, &query(&[("feed", "pro"), ("disableRegex", "1")]))
            .unwrap(),
    );
    assert!(not_anchored.is_empty());

    let page = records(
        service
            .search(
                &owner,
                &query(&[("sort", "name"), ("sortdir", "-1"), ("limit", "2"), ("offset", "1")]),
            )
            .unwrap(),
    );
    assert_eq!(names(&page), vec!["b", "a"]);
}

#[test]
fn invalid_parameters_are_validation_errors() {
    let conn = open_db_in_memory().unwrap();
    let context = bootstrap(&conn);
    let service = GritsService::open(&conn, &GritsConfig::default());
    let owner = Caller::User(context.owner.clone());

    for pairs in [
        vec![("start", "not a date")],
        vec![("limit", "-5")],
        vec![("country", "(")],
        vec![("sort", "private.score")],
    ] {
        let err = service.search(&owner, &query(&pairs)).unwrap_err();
        assert_eq!(err.status_code(), 400, "params {pairs:?}");
    }
}

#[test]
fn geojson_output_groups_event_points() {
    let conn = open_db_in_memory().unwrap();
    let context = bootstrap(&conn);
    let mut record = incident(&context, "hm-1", MARCH_1_2014_MS);
    record.meta.events = Some(vec![
        IncidentEvent {
            longitude: Some(2.0),
            latitude: Some(1.0),
            ..IncidentEvent::default()
        },
        IncidentEvent {
            longitude: Some(30.0),
            latitude: Some(-1.5),
            place_name: Some("Kigali".to_string()),
            ..IncidentEvent::default()
        },
    ]);
    SqliteItemRepository::new(&conn).create_item(&record).unwrap();

    let service = GritsService::open(&conn, &GritsConfig::default());
    let output = service
        .search(&Caller::User(context.owner.clone()), &query(&[("geoJSON", "")]))
        .unwrap();
    let SearchOutput::FeatureCollection(collection) = output else {
        panic!("expected a feature collection");
    };

    assert_eq!(collection["type"], json!("FeatureCollection"));
    let feature = &collection["features"][0];
    assert_eq!(
        feature["geometry"],
        json!({"type": "MultiPoint", "coordinates": [[2.0, 1.0], [30.0, -1.5]]})
    );
    assert_eq!(feature["properties"]["id"], json!("hm-1"));
    assert_eq!(
        feature["properties"]["places"][1]["place_name"],
        json!("Kigali")
    );
}

#[test]
fn records_outside_the_grits_folder_are_invisible() {
    let conn = open_db_in_memory().unwrap();
    let context = bootstrap(&conn);
    conn.execute(
        "INSERT INTO folders (id, collection_id, name) VALUES ('other', ?1, 'drafts');",
        [context.collection.id.to_string()],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO items (id, folder_id, name, meta)
         VALUES ('00000000-0000-4000-8000-000000000001', 'other', 'hidden',
                 '{\"date\": 1393632000000, \"latitude\": 0, \"longitude\": 0}');",
        [],
    )
    .unwrap();

    let service = GritsService::open(&conn, &GritsConfig::default());
    let output = service
        .search(&Caller::User(context.owner.clone()), &HashMap::new())
        .unwrap();
    assert!(output.is_empty());
}

#[test]
fn malformed_stored_documents_surface_as_server_errors() {
    let conn = open_db_in_memory().unwrap();
    let context = bootstrap(&conn);
    conn.execute(
        "INSERT INTO items (id, folder_id, name, meta)
         VALUES ('00000000-0000-4000-8000-000000000002', ?1, 'broken', '{\"latitude\": 0}');",
        [context.folder.id.to_string()],
    )
    .unwrap();

    let service = GritsService::open(&conn, &GritsConfig::default());
    let err = service
        .search(&Caller::User(context.owner.clone()), &HashMap::new())
        .unwrap_err();
    assert_eq!(err.status_code(), 500);
}

fn bootstrap(conn: &Connection) -> GritsContext {
    let directory = SqliteDirectoryRepository::new(conn);
    directory.create_user(&User::new("grits")).unwrap();
    BootstrapResolver::new(&GritsConfig::default())
        .resolve(&directory)
        .unwrap()
}

fn member(
    conn: &Connection,
    context: &GritsContext,
    login: &str,
    base: Option<AccessLevel>,
    privileged: Option<AccessLevel>,
) -> User {
    let directory = SqliteDirectoryRepository::new(conn);
    let user = User::new(login);
    directory.create_user(&user).unwrap();
    if let Some(level) = base {
        directory
            .add_group_member(context.base_group.id, user.id, level)
            .unwrap();
    }
    if let Some(level) = privileged {
        directory
            .add_group_member(context.privileged_group.id, user.id, level)
            .unwrap();
    }
    user
}

fn incident(context: &GritsContext, name: &str, date: i64) -> IncidentRecord {
    IncidentRecord::new(
        context.folder.id,
        name,
        format!("summary of {name}"),
        IncidentMeta::new(date, 1.0, 2.0),
    )
}

fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn status(result: Result<(), grits_core::GritsError>) -> u16 {
    match result {
        Ok(()) => 200,
        Err(err) => err.status_code(),
    }
}

fn records(output: SearchOutput) -> Vec<IncidentRecord> {
    match output {
        SearchOutput::Records(records) => records,
        SearchOutput::FeatureCollection(_) => panic!("expected plain records"),
    }
}

fn names(records: &[IncidentRecord]) -> Vec<String> {
    records.iter().map(|record| record.name.clone()).collect()
}

fn output_json(output: SearchOutput) -> Value {
    serde_json::to_value(output).unwrap()
}
