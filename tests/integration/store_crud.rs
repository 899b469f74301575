//! Entity writes and reads through `EntityDataStore`

#[path = "../common/mod.rs"]
mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{
    file_store, memory_store, memory_store_with, model, person_fields, seed_people, Account,
    Event, Person, Phone,
};
use quarry::listener::{EntityListener, StatementListener};
use quarry::meta::Type;
use quarry::prelude::*;

#[test]
fn test_generated_key_round_trip() {
    let store = memory_store();
    let mut ada = Person {
        email: Some("ada@example.com".into()),
        ..Person::new("Ada", 36)
    };
    store.insert(&mut ada).expect("Failed to insert");
    assert!(ada.id > 0);

    let loaded: Person = store
        .find_by_key(ada.id)
        .expect("Failed to find")
        .expect("row exists");
    assert_eq!(loaded, ada);
}

#[test]
fn test_update_refresh_and_delete() {
    let store = memory_store();
    let people = seed_people(&store);

    let mut carol = people[1].clone();
    carol.age = 11;
    carol.email = Some("carol@example.com".into());
    store.update(&mut carol).expect("Failed to update");

    let mut stale = people[1].clone();
    store.refresh(&mut stale).expect("Failed to refresh");
    assert_eq!(stale, carol);

    store.delete(&carol).expect("Failed to delete");
    assert!(store
        .find_by_key::<Person>(carol.id)
        .expect("Failed to find")
        .is_none());
    assert!(matches!(
        store.update(&mut carol),
        Err(QuarryError::RowCount { expected: 1, actual: 0 })
    ));
}

#[test]
fn test_optimistic_locking() {
    let store = memory_store();
    let mut account = Account::open("ada", 100);
    store.insert(&mut account).expect("Failed to insert");
    assert_eq!(account.version, 1);

    let mut stale = account.clone();
    account.balance = 150;
    store.update(&mut account).expect("Failed to update");
    assert_eq!(account.version, 2);

    stale.balance = 0;
    let err = store.update(&mut stale).expect_err("stale update must fail");
    assert!(matches!(err, QuarryError::OptimisticLock { .. }));
    let err = store.delete(&stale).expect_err("stale delete must fail");
    assert!(matches!(err, QuarryError::OptimisticLock { .. }));

    let current: Account = store
        .find_by_key(account.id)
        .expect("Failed to find")
        .expect("row exists");
    assert_eq!(current.balance, 150);
    store.delete(&current).expect("current version deletes");
}

#[test]
fn test_upsert_and_delete_all_with_natural_keys() {
    let store = memory_store();
    let mut launch = Event {
        code: "launch".into(),
        title: "Launch".into(),
    };
    store.upsert(&mut launch).expect("Failed to upsert new row");
    launch.title = "Launch day".into();
    store.upsert(&mut launch).expect("Failed to upsert existing row");

    let loaded: Event = store
        .find_by_key("launch")
        .expect("Failed to find")
        .expect("row exists");
    assert_eq!(loaded.title, "Launch day");

    let mut more = vec![
        Event {
            code: "a".into(),
            title: "A".into(),
        },
        Event {
            code: "b".into(),
            title: "B".into(),
        },
    ];
    store.insert_all(&mut more).expect("Failed to insert");
    more.push(loaded);
    store.delete_all(&more).expect("Failed to delete all");
    assert_eq!(
        store
            .count::<Event>()
            .expect("count")
            .get()
            .expect("get")
            .value()
            .expect("value"),
        0
    );
}

#[test]
fn test_unique_violation_is_reported_as_constraint() {
    let store = memory_store();
    let mut first = Person {
        email: Some("dup@example.com".into()),
        ..Person::new("One", 1)
    };
    let mut second = Person {
        email: Some("dup@example.com".into()),
        ..Person::new("Two", 2)
    };
    store.insert(&mut first).expect("Failed to insert");
    let err = store.insert(&mut second).expect_err("duplicate email");
    assert!(err.is_constraint_violation(), "unexpected error {err}");
}

#[test]
fn test_foreign_key_cascade_on_delete() {
    let store = memory_store();
    let people = seed_people(&store);
    let mut phone = Phone {
        number: "555-0101".into(),
        owner: people[2].id,
        ..Default::default()
    };
    store.insert(&mut phone).expect("Failed to insert phone");

    store.delete(&people[2]).expect("Failed to delete owner");
    assert!(store
        .find_by_key::<Phone>(phone.id)
        .expect("Failed to find")
        .is_none());
}

#[test]
fn test_raw_queries_with_positional_and_named_parameters() {
    let store = memory_store();
    seed_people(&store);

    let rows = store
        .raw(
            "SELECT name, age FROM person WHERE age > ? ORDER BY age",
            &[Value::Integer(5)],
        )
        .expect("raw")
        .to_list()
        .expect("to_list");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get_by_name::<String>("name").expect("name"), "Carol");
    assert_eq!(
        rows[1].to_json(),
        serde_json::json!({ "name": "Alice", "age": 75 })
    );

    let bob: Vec<Person> = store
        .raw_entities(
            "SELECT * FROM person WHERE name = ?",
            &[Value::from("Bob")],
        )
        .expect("raw_entities")
        .to_list()
        .expect("to_list");
    assert_eq!(bob.len(), 1);

    let renamed = store
        .raw_update(
            "UPDATE person SET name = ? WHERE name = ?",
            &[Value::from("Robert"), Value::from("Bob")],
        )
        .expect("raw_update");
    assert_eq!(renamed, 1);

    let rows = store
        .raw_named(
            "SELECT count(*) FROM person WHERE name = :name OR age = :age",
            &[("name", Value::from("Robert")), ("age", Value::Integer(75))],
        )
        .expect("raw_named")
        .to_list()
        .expect("to_list");
    assert_eq!(rows[0].get::<i64>(0).expect("count"), 2);
}

#[derive(Default)]
struct Counting {
    statements: AtomicUsize,
    loaded: AtomicUsize,
}

impl StatementListener for Counting {
    fn before_query(&self, _sql: &str, _params: &[Value]) {
        self.statements.fetch_add(1, Ordering::SeqCst);
    }

    fn before_update(&self, _sql: &str, _params: &[Value]) {
        self.statements.fetch_add(1, Ordering::SeqCst);
    }
}

impl EntityListener for Counting {
    fn post_load(&self, _ty: &Type, _entity: &mut dyn Entity) {
        self.loaded.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_listeners_observe_statements_and_loads() {
    let counting = Arc::new(Counting::default());
    let store = memory_store_with(|builder| {
        builder
            .statement_listener(counting.clone())
            .entity_listener(counting.clone())
    });
    let before = counting.statements.load(Ordering::SeqCst);

    seed_people(&store);
    let p = person_fields(store.model());
    let adults = store
        .select::<Person>()
        .expect("select")
        .filter(p.age.gt(5))
        .get()
        .expect("get")
        .to_list()
        .expect("to_list");

    assert_eq!(adults.len(), 2);
    assert_eq!(counting.loaded.load(Ordering::SeqCst), 2);
    // three inserts and one select
    assert_eq!(counting.statements.load(Ordering::SeqCst) - before, 4);
}

#[test]
fn test_file_database_survives_reopen() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("people.db");

    let id = {
        let store = file_store(&path);
        let mut ada = Person::new("Ada", 36);
        store.insert(&mut ada).expect("Failed to insert");
        ada.id
    };

    let store = file_store(&path);
    let ada: Person = store
        .find_by_key(id)
        .expect("Failed to find")
        .expect("row persisted");
    assert_eq!(ada.name, "Ada");
}

#[test]
fn test_connect_by_url() {
    let store = EntityDataStore::connect("sqlite::memory:", model()).expect("Failed to connect");
    store
        .schema()
        .create_tables(TableCreationMode::Create)
        .expect("Failed to create tables");
    assert_eq!(store.configuration().platform().name(), "sqlite");

    let err = EntityDataStore::connect("mysql://root@localhost/db", model())
        .expect_err("unsupported scheme");
    assert!(matches!(err, QuarryError::Configuration(_)));
}
