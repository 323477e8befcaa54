use persons_core::{
    open_pool_in_memory, CallContext, ConstraintError, ErrorKind, Person, PersonListQuery,
    PersonProperties, PersonStore, SqlitePersonStore, StoreError,
};

fn store() -> SqlitePersonStore {
    SqlitePersonStore::new(open_pool_in_memory().unwrap())
}

fn numbered(n: i32) -> PersonProperties {
    PersonProperties::new(
        format!("Aboba {n}"),
        n,
        format!("Address {n}"),
        format!("Work {n}"),
    )
}

fn seed(store: &SqlitePersonStore, count: i32) -> Vec<Person> {
    let ctx = CallContext::background();
    (1..=count)
        .map(|n| store.create_person(&ctx, &numbered(n)).unwrap())
        .collect()
}

#[test]
fn create_and_get_roundtrip() {
    let store = store();
    let ctx = CallContext::background();

    let input = PersonProperties::new("A", 1, "B", "C");
    let created = store.create_person(&ctx, &input).unwrap();
    assert!(created.id > 0);
    assert_eq!(created.properties, input);

    let loaded = store.get_person(&ctx, created.id).unwrap().unwrap();
    assert_eq!(loaded, created);
}

#[test]
fn created_ids_are_store_assigned_and_increasing() {
    let store = store();
    let persons = seed(&store, 3);

    assert!(persons[0].id < persons[1].id);
    assert!(persons[1].id < persons[2].id);
}

#[test]
fn ids_are_not_reused_after_delete() {
    let store = store();
    let ctx = CallContext::background();
    let persons = seed(&store, 2);

    assert!(store.delete_person(&ctx, persons[1].id).unwrap());
    let next = store.create_person(&ctx, &numbered(3)).unwrap();
    assert!(next.id > persons[1].id);
}

#[test]
fn get_missing_person_is_not_an_error() {
    let store = store();
    let ctx = CallContext::background();

    assert_eq!(store.get_person(&ctx, 42).unwrap(), None);
}

#[test]
fn list_on_empty_store_returns_empty_page() {
    let store = store();
    let ctx = CallContext::background();

    let page = store
        .list_persons(&ctx, &PersonListQuery::default())
        .unwrap();
    assert!(page.is_empty());
}

#[test]
fn list_pagination_window_follows_insertion_order() {
    let store = store();
    let ctx = CallContext::background();
    let persons = seed(&store, 5);

    let page = store
        .list_persons(&ctx, &PersonListQuery::new(1, Some(3)))
        .unwrap();
    assert_eq!(page, persons[1..4].to_vec());

    let all = store
        .list_persons(&ctx, &PersonListQuery::default())
        .unwrap();
    assert_eq!(all, persons);
}

#[test]
fn list_with_zero_limit_returns_empty_page() {
    let store = store();
    let ctx = CallContext::background();
    seed(&store, 5);

    let page = store
        .list_persons(&ctx, &PersonListQuery::new(0, Some(0)))
        .unwrap();
    assert!(page.is_empty());
}

#[test]
fn list_with_offset_only_and_huge_values() {
    let store = store();
    let ctx = CallContext::background();
    let persons = seed(&store, 5);

    let tail = store
        .list_persons(&ctx, &PersonListQuery::new(3, None))
        .unwrap();
    assert_eq!(tail, persons[3..].to_vec());

    let past_end = store
        .list_persons(&ctx, &PersonListQuery::new(u64::MAX, Some(u64::MAX)))
        .unwrap();
    assert!(past_end.is_empty());
}

#[test]
fn delete_reports_whether_a_row_was_removed() {
    let store = store();
    let ctx = CallContext::background();
    let persons = seed(&store, 2);

    assert!(store.delete_person(&ctx, persons[0].id).unwrap());
    assert!(!store.delete_person(&ctx, persons[0].id).unwrap());
    assert_eq!(store.get_person(&ctx, persons[0].id).unwrap(), None);
    assert!(store.get_person(&ctx, persons[1].id).unwrap().is_some());
}

#[test]
fn create_rejects_negative_age_without_writing() {
    let store = store();
    let ctx = CallContext::background();

    let err = store
        .create_person(&ctx, &PersonProperties::new("n", -1, "a", "w"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    assert!(matches!(
        err,
        StoreError::Constraint(ConstraintError::Validation(_))
    ));

    let page = store
        .list_persons(&ctx, &PersonListQuery::default())
        .unwrap();
    assert!(page.is_empty());
}

#[test]
fn create_accepts_empty_text_fields() {
    let store = store();
    let ctx = CallContext::background();

    let created = store
        .create_person(&ctx, &PersonProperties::new("", 30, "addr", "work"))
        .unwrap();
    assert_eq!(created.properties.name, "");

    let bare = store
        .create_person(&ctx, &PersonProperties { age: 3, ..PersonProperties::default() })
        .unwrap();
    let fetched = store.get_person(&ctx, bare.id).unwrap().unwrap();
    assert_eq!(fetched.properties, PersonProperties::new("", 3, "", ""));
}

#[test]
fn health_check_fails_once_store_is_severed() {
    let store = store();
    let ctx = CallContext::background();

    store.health_check(&ctx).unwrap();

    store.pool().close();
    let err = store.health_check(&ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connectivity);

    let err = store.get_person(&ctx, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connectivity);
}

#[test]
fn cancelled_context_stops_calls_before_touching_the_store() {
    let store = store();
    let ctx = CallContext::background();
    ctx.cancel();

    let err = store.create_person(&ctx, &numbered(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let page = store
        .list_persons(&CallContext::background(), &PersonListQuery::default())
        .unwrap();
    assert!(page.is_empty());
}
