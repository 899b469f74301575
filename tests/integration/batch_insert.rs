//! Batched inserts and deletes

#[path = "../common/mod.rs"]
mod common;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{memory_store, memory_store_with, Event, Person};
use fake::faker::lorem::en::Sentence;
use fake::faker::name::en::Name;
use fake::Fake;
use quarry::listener::StatementListener;
use quarry::prelude::*;

const ROWS: usize = 2500;

fn people(n: usize) -> Vec<Person> {
    (0..n)
        .map(|i| Person::new(&Name().fake::<String>(), (i % 90) as i32))
        .collect()
}

fn events(n: usize) -> Vec<Event> {
    (0..n)
        .map(|i| Event {
            code: format!("ev-{i:05}"),
            title: Sentence(2..5).fake(),
        })
        .collect()
}

fn count<E: Entity>(store: &EntityDataStore) -> i64 {
    store
        .count::<E>()
        .expect("count")
        .get()
        .expect("get")
        .value()
        .expect("value")
}

#[derive(Default)]
struct UpdateCounter(AtomicUsize);

/// Counts inserts whether they return rows or not
#[derive(Default)]
struct InsertCounter(AtomicUsize);

impl StatementListener for InsertCounter {
    fn before_query(&self, sql: &str, _params: &[Value]) {
        if sql.starts_with("INSERT") {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn before_update(&self, sql: &str, _params: &[Value]) {
        if sql.starts_with("INSERT") {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl StatementListener for UpdateCounter {
    fn before_update(&self, sql: &str, _params: &[Value]) {
        if sql.starts_with("INSERT") {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn test_generated_keys_assigned_across_batches() {
    let counter = Arc::new(InsertCounter::default());
    let store = memory_store_with(|b| {
        b.batch_update_size(1000)
            .statement_listener(counter.clone())
    });
    let mut batch = people(ROWS);
    // identical rows are interchangeable but still get distinct keys
    batch[7] = batch[3].clone();
    store.insert_all(&mut batch).expect("Failed to insert batch");

    let ids: Vec<i64> = batch.iter().map(|p| p.id).collect();
    assert!(ids.iter().all(|&id| id > 0));
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ROWS);
    assert_eq!(count::<Person>(&store), ROWS as i64);
    // three parameters per row, at most 999 per statement on SQLite: 333 rows each
    assert_eq!(counter.0.load(Ordering::SeqCst), ROWS.div_ceil(333));

    // every entity got the key of its own row
    let stored: HashMap<i64, Person> = store
        .select::<Person>()
        .expect("select")
        .get()
        .expect("get")
        .to_list()
        .expect("people")
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    for person in &batch {
        assert_eq!(stored.get(&person.id), Some(person));
    }
}

#[test]
fn test_generated_keys_fall_back_to_single_rows() {
    let counter = Arc::new(InsertCounter::default());
    let store = memory_store_with(|b| {
        b.batch_update_size(10)
            .statement_listener(counter.clone())
    });
    let mut batch = people(20);
    batch[12].id = 5000;
    store.insert_all(&mut batch).expect("Failed to insert batch");

    // the chunk holding an assigned key goes row by row
    assert_eq!(counter.0.load(Ordering::SeqCst), 1 + 10);
    assert_eq!(batch[12].id, 5000);
    assert_eq!(count::<Person>(&store), 20);
}

#[test]
fn test_multi_row_values_respect_parameter_limit() {
    let counter = Arc::new(UpdateCounter::default());
    let store = memory_store_with(|b| {
        b.batch_update_size(1000)
            .statement_listener(counter.clone())
    });
    let mut batch = events(ROWS);
    store.insert_all(&mut batch).expect("Failed to insert batch");

    assert_eq!(count::<Event>(&store), ROWS as i64);
    // two parameters per row, at most 999 per statement on SQLite: 499 rows each
    assert_eq!(counter.0.load(Ordering::SeqCst), ROWS.div_ceil(499));
}

#[test]
fn test_failed_batch_inserts_nothing() {
    let store = memory_store_with(|b| b.batch_update_size(100));
    let mut batch = events(250);
    batch[180].code = batch[20].code.clone();

    let err = store.insert_all(&mut batch).expect_err("duplicate key");
    assert!(err.is_constraint_violation(), "unexpected error {err}");
    assert_eq!(count::<Event>(&store), 0);
}

#[test]
fn test_delete_all_in_batches() {
    let store = memory_store_with(|b| b.batch_update_size(1000));
    let mut batch = people(ROWS);
    store.insert_all(&mut batch).expect("Failed to insert batch");

    let (gone, kept) = batch.split_at(2000);
    store.delete_all(gone).expect("Failed to delete batch");
    assert_eq!(count::<Person>(&store), kept.len() as i64);

    let mut events = events(10);
    store.insert_all(&mut events).expect("Failed to insert events");
    store.delete_all(&events).expect("Failed to delete events");
    assert_eq!(count::<Event>(&store), 0);
}

#[test]
fn test_empty_batch_is_a_no_op() {
    let store = memory_store();
    let mut nothing: Vec<Person> = Vec::new();
    store.insert_all(&mut nothing).expect("empty insert");
    store.delete_all(&nothing).expect("empty delete");
    assert_eq!(count::<Person>(&store), 0);
}
