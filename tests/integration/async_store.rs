//! Store operations on `may` coroutines

#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use common::{file_store, memory_store, seed_people, Person};
use quarry::prelude::*;
use quarry::{AsyncStore, Transaction};

#[test]
fn test_many_tasks_share_one_store() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = AsyncStore::new(file_store(&dir.path().join("async.db")));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            store
                .spawn(move |s| {
                    let mut person = Person::new(&format!("worker-{i}"), i);
                    s.insert(&mut person)?;
                    Ok(person.id)
                })
                .expect("Failed to spawn")
        })
        .collect();

    let mut ids: Vec<i64> = tasks
        .into_iter()
        .map(|task| task.wait().expect("task failed"))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 8);

    let count = store
        .spawn(|s| s.count::<Person>()?.get()?.value())
        .expect("Failed to spawn")
        .wait()
        .expect("count");
    assert_eq!(count, 8);
}

#[test]
fn test_query_results_come_back_typed() {
    let store = memory_store();
    seed_people(&store);
    let store = AsyncStore::new(store);

    let task = store
        .spawn(|s| s.select::<Person>()?.get()?.to_list())
        .expect("Failed to spawn");
    let people = task
        .wait_timeout(Duration::from_secs(30))
        .expect("finished in time")
        .expect("query");
    assert_eq!(people.len(), 3);
}

#[test]
fn test_transaction_runs_on_a_coroutine() {
    let store = AsyncStore::new(memory_store());

    let result = store
        .spawn(|s| {
            s.transaction(|tx: &mut Transaction| {
                tx.insert(&mut Person::new("inside", 1))?;
                Err::<(), _>(QuarryError::Other("abandon".into()))
            })
        })
        .expect("Failed to spawn")
        .wait();
    assert!(matches!(result, Err(QuarryError::Rollback(_))));
    assert_eq!(
        store
            .store()
            .count::<Person>()
            .expect("count")
            .get()
            .expect("get")
            .value()
            .expect("value"),
        0
    );
}

#[test]
fn test_try_take_eventually_yields() {
    let store = AsyncStore::new(memory_store());
    let task = store
        .spawn(|s| s.raw_update("DELETE FROM person", &[]))
        .expect("Failed to spawn");

    let deadline = std::time::Instant::now() + Duration::from_secs(30);
    let outcome = loop {
        if let Some(outcome) = task.try_take() {
            break outcome;
        }
        assert!(std::time::Instant::now() < deadline, "task never finished");
        std::thread::sleep(Duration::from_millis(5));
    };
    assert_eq!(outcome.expect("delete"), 0);
}
