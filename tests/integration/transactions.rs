//! Transactions, savepoints and isolation between connections

#[path = "../common/mod.rs"]
mod common;

use common::{file_store, memory_store, person_fields, seed_people, Account, Person};
use quarry::prelude::*;
use quarry::IsolationLevel;

fn count(store: &impl EntityStore) -> i64 {
    store
        .count::<Person>()
        .expect("count")
        .get()
        .expect("get")
        .value()
        .expect("value")
}

#[test]
fn test_uncommitted_writes_are_invisible_to_other_connections() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = file_store(&dir.path().join("tx.db"));

    let tx = store.begin().expect("Failed to begin");
    tx.insert(&mut Person::new("Pending", 1)).expect("insert");
    assert_eq!(count(&tx), 1);
    assert_eq!(count(&store), 0);

    tx.commit().expect("Failed to commit");
    assert_eq!(count(&store), 1);
}

#[test]
fn test_store_writes_never_join_an_open_transaction() {
    let store = memory_store();
    let tx = store.begin().expect("Failed to begin");
    tx.insert(&mut Person::new("In transaction", 1))
        .expect("insert in transaction");

    // the store uses its own connection, which cannot write while the transaction holds the lock
    let mut outside = Person::new("Outside", 2);
    let err = store
        .insert(&mut outside)
        .expect_err("write lock is held by the transaction");
    assert!(!err.is_constraint_violation(), "unexpected error {err}");

    tx.rollback().expect("Failed to roll back");
    store.insert(&mut outside).expect("insert after rollback");
    assert_eq!(count(&store), 1);

    let names: Vec<String> = store
        .select::<Person>()
        .expect("select")
        .get()
        .expect("get")
        .to_list()
        .expect("to_list")
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["Outside"]);
}

#[test]
fn test_serializable_transaction_on_file_database() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = file_store(&dir.path().join("serial.db"));

    let tx = store
        .begin_with_isolation(IsolationLevel::Serializable)
        .expect("Failed to begin");
    let mut people = vec![Person::new("A", 1), Person::new("B", 2)];
    tx.insert_all(&mut people).expect("insert_all");
    tx.commit().expect("Failed to commit");
    assert_eq!(count(&store), 2);
}

#[test]
fn test_batch_inside_transaction_rolls_back_with_it() {
    let store = memory_store();
    let tx = store.begin().expect("Failed to begin");
    let mut people: Vec<Person> = (0..50).map(|i| Person::new("Batch", i)).collect();
    tx.insert_all(&mut people).expect("insert_all");
    assert_eq!(count(&tx), 50);
    tx.rollback().expect("Failed to roll back");
    assert_eq!(count(&store), 0);
}

#[test]
fn test_transaction_closure_commits_or_rolls_back() {
    let store = memory_store();

    let id = store
        .transaction(|tx| {
            let mut ada = Person::new("Ada", 36);
            tx.insert(&mut ada)?;
            Ok(ada.id)
        })
        .expect("committed");
    assert!(id > 0);

    let err = store
        .transaction(|tx| {
            tx.insert(&mut Person::new("Lost", 1))?;
            tx.insert(&mut Person {
                id,
                ..Person::new("Duplicate key", 2)
            })
        })
        .expect_err("duplicate key aborts");
    match err {
        QuarryError::Rollback(cause) => assert!(cause.is_constraint_violation()),
        other => panic!("expected rollback, got {other}"),
    }
    assert_eq!(count(&store), 1);
}

#[test]
fn test_nested_savepoints() {
    let store = memory_store();
    let mut tx = store.begin().expect("Failed to begin");
    tx.insert(&mut Person::new("outer", 1)).expect("insert");

    let mut first = tx.begin_nested().expect("savepoint 1");
    first.insert(&mut Person::new("kept", 2)).expect("insert");
    let second = first.begin_nested().expect("savepoint 2");
    assert_eq!(second.depth(), 2);
    second.insert(&mut Person::new("undone", 3)).expect("insert");
    second.rollback().expect("rollback to savepoint 2");
    first.commit().expect("release savepoint 1");

    tx.commit().expect("Failed to commit");

    let p = person_fields(store.model());
    let names: Vec<String> = store
        .select::<Person>()
        .expect("select")
        .order_by(&[&p.age.asc()])
        .get()
        .expect("get")
        .to_list()
        .expect("to_list")
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["outer", "kept"]);
}

#[test]
fn test_dropped_transaction_rolls_back() {
    let store = memory_store();
    seed_people(&store);
    {
        let tx = store.begin().expect("Failed to begin");
        let p = person_fields(tx.model());
        tx.delete_rows::<Person>()
            .expect("delete_rows")
            .filter(p.age.lt(100))
            .get()
            .expect("get")
            .value()
            .expect("value");
        assert_eq!(count(&tx), 0);
    }
    assert_eq!(count(&store), 3);
}

#[test]
fn test_optimistic_lock_inside_transaction() {
    let store = memory_store();
    let mut account = Account::open("ada", 10);
    store.insert(&mut account).expect("insert");
    let stale = account.clone();

    let err = store
        .transaction(|tx| {
            account.balance += 5;
            tx.update(&mut account)?;
            let mut stale = stale.clone();
            stale.balance -= 5;
            tx.update(&mut stale)
        })
        .expect_err("stale copy conflicts");
    match err {
        QuarryError::Rollback(cause) => {
            assert!(matches!(*cause, QuarryError::OptimisticLock { .. }))
        }
        other => panic!("expected rollback, got {other}"),
    }

    let current: Account = store
        .find_by_key(stale.id)
        .expect("find")
        .expect("row exists");
    assert_eq!(current.balance, 10);
    assert_eq!(current.version, 1);
}
