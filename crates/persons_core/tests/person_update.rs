use persons_core::{
    open_pool, open_pool_in_memory, CallContext, ErrorKind, Interrupt, Person, PersonProperties,
    PersonStore, PoolOptions, SqlitePersonStore, StoreError,
};
use rusqlite::Connection;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn numbered(n: i32) -> PersonProperties {
    PersonProperties::new(
        format!("Aboba {n}"),
        n,
        format!("Address {n}"),
        format!("Work {n}"),
    )
}

fn patch(id: i64, properties: PersonProperties) -> Person {
    Person::new(id, properties)
}

#[test]
fn update_merges_only_supplied_fields() {
    let store = SqlitePersonStore::new(open_pool_in_memory().unwrap());
    let ctx = CallContext::background();
    let created = store.create_person(&ctx, &numbered(5)).unwrap();

    let target = patch(
        created.id,
        PersonProperties {
            work: "New Work".to_string(),
            ..PersonProperties::default()
        },
    );
    let updated = store.update_person(&ctx, &target).unwrap().unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.properties.name, "Aboba 5");
    assert_eq!(updated.properties.age, 5);
    assert_eq!(updated.properties.address, "Address 5");
    assert_eq!(updated.properties.work, "New Work");

    let reloaded = store.get_person(&ctx, created.id).unwrap().unwrap();
    assert_eq!(reloaded, updated);
}

#[test]
fn update_with_every_field_supplied_replaces_the_row() {
    let store = SqlitePersonStore::new(open_pool_in_memory().unwrap());
    let ctx = CallContext::background();
    let created = store.create_person(&ctx, &numbered(1)).unwrap();

    let replacement = PersonProperties::new("Other", 77, "Elsewhere", "Retired");
    let updated = store
        .update_person(&ctx, &patch(created.id, replacement.clone()))
        .unwrap()
        .unwrap();
    assert_eq!(updated.properties, replacement);
}

#[test]
fn empty_patch_leaves_the_row_unchanged() {
    let store = SqlitePersonStore::new(open_pool_in_memory().unwrap());
    let ctx = CallContext::background();
    let created = store.create_person(&ctx, &numbered(3)).unwrap();

    let updated = store
        .update_person(&ctx, &patch(created.id, PersonProperties::default()))
        .unwrap()
        .unwrap();
    assert_eq!(updated, created);
}

#[test]
fn update_missing_person_reports_not_found_without_error() {
    let store = SqlitePersonStore::new(open_pool_in_memory().unwrap());
    let ctx = CallContext::background();

    let result = store
        .update_person(&ctx, &patch(99, numbered(1)))
        .unwrap();
    assert_eq!(result, None);

    // The rolled back transaction must not linger on the single connection.
    let created = store.create_person(&ctx, &numbered(2)).unwrap();
    assert!(store
        .update_person(&ctx, &patch(created.id, numbered(4)))
        .unwrap()
        .is_some());
}

#[test]
fn update_rejecting_merged_value_keeps_the_row() {
    let store = SqlitePersonStore::new(open_pool_in_memory().unwrap());
    let ctx = CallContext::background();
    let created = store.create_person(&ctx, &numbered(8)).unwrap();

    let err = store
        .update_person(
            &ctx,
            &patch(
                created.id,
                PersonProperties {
                    age: -4,
                    ..PersonProperties::default()
                },
            ),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);

    let reloaded = store.get_person(&ctx, created.id).unwrap().unwrap();
    assert_eq!(reloaded, created);
}

#[test]
fn failed_write_step_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persons.db");
    let store = SqlitePersonStore::new(open_pool(&path, PoolOptions::default()).unwrap());
    let ctx = CallContext::background();
    let created = store.create_person(&ctx, &numbered(6)).unwrap();

    let admin = Connection::open(&path).unwrap();
    admin
        .execute_batch(
            "CREATE TRIGGER freeze_persons BEFORE UPDATE ON persons
             BEGIN
                SELECT RAISE(ABORT, 'persons are frozen');
             END;",
        )
        .unwrap();

    let err = store
        .update_person(&ctx, &patch(created.id, numbered(60)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    assert!(err.to_string().contains("persons are frozen"));

    admin
        .execute_batch("DROP TRIGGER freeze_persons;")
        .unwrap();
    let reloaded = store.get_person(&ctx, created.id).unwrap().unwrap();
    assert_eq!(reloaded, created);
}

#[test]
fn cancelled_update_leaves_the_row_unchanged() {
    let store = SqlitePersonStore::new(open_pool_in_memory().unwrap());
    let created = store
        .create_person(&CallContext::background(), &numbered(2))
        .unwrap();

    let cancelled = CallContext::background();
    cancelled.cancel();
    let err = store
        .update_person(&cancelled, &patch(created.id, numbered(20)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let reloaded = store
        .get_person(&CallContext::background(), created.id)
        .unwrap()
        .unwrap();
    assert_eq!(reloaded, created);
}

#[test]
fn update_waiting_for_write_lock_stops_at_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persons.db");
    let store = SqlitePersonStore::new(open_pool(&path, PoolOptions::default()).unwrap());
    let created = store
        .create_person(&CallContext::background(), &numbered(3))
        .unwrap();

    let writer = Connection::open(&path).unwrap();
    writer.execute_batch("BEGIN IMMEDIATE;").unwrap();

    let started = Instant::now();
    let err = store
        .update_person(
            &CallContext::with_timeout(Duration::from_millis(100)),
            &patch(created.id, numbered(30)),
        )
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(
        matches!(err, StoreError::Interrupted(Interrupt::DeadlineExceeded)),
        "unexpected error: {err}"
    );
    assert!(elapsed < Duration::from_secs(2), "waited {elapsed:?}");

    writer.execute_batch("ROLLBACK;").unwrap();
    let ctx = CallContext::background();
    assert_eq!(store.get_person(&ctx, created.id).unwrap().unwrap(), created);
    let updated = store
        .update_person(&ctx, &patch(created.id, numbered(31)))
        .unwrap()
        .unwrap();
    assert_eq!(updated.properties.age, 31);
}

#[test]
fn concurrent_updates_on_one_person_keep_every_writer() {
    let dir = tempfile::tempdir().unwrap();
    let options = PoolOptions {
        max_size: 4,
        ..PoolOptions::default()
    };
    let store = Arc::new(SqlitePersonStore::new(
        open_pool(dir.path().join("persons.db"), options).unwrap(),
    ));
    let created = store
        .create_person(&CallContext::background(), &numbered(1))
        .unwrap();

    let patches = vec![
        PersonProperties {
            name: "Concurrent Name".to_string(),
            ..PersonProperties::default()
        },
        PersonProperties {
            age: 99,
            ..PersonProperties::default()
        },
        PersonProperties {
            address: "Concurrent Address".to_string(),
            ..PersonProperties::default()
        },
        PersonProperties {
            work: "Concurrent Work".to_string(),
            ..PersonProperties::default()
        },
    ];

    let handles: Vec<_> = patches
        .into_iter()
        .map(|properties| {
            let store = Arc::clone(&store);
            let target = patch(created.id, properties);
            thread::spawn(move || {
                store
                    .update_person(&CallContext::background(), &target)
                    .unwrap()
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let merged = store
        .get_person(&CallContext::background(), created.id)
        .unwrap()
        .unwrap();
    assert_eq!(
        merged.properties,
        PersonProperties::new(
            "Concurrent Name",
            99,
            "Concurrent Address",
            "Concurrent Work"
        )
    );
}

#[test]
fn delete_then_update_reports_not_found() {
    let store = SqlitePersonStore::new(open_pool_in_memory().unwrap());
    let ctx = CallContext::background();
    let created = store.create_person(&ctx, &numbered(4)).unwrap();

    assert!(store.delete_person(&ctx, created.id).unwrap());
    assert_eq!(
        store
            .update_person(&ctx, &patch(created.id, numbered(40)))
            .unwrap(),
        None
    );
}
