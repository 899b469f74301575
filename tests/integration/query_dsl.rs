//! Query DSL against a live SQLite database
//!
//! Covers conditions (flat chains versus composed groups, inclusive `BETWEEN`,
//! `IN`, `LIKE`, nulls), ordering and paging, grouping, set operations,
//! subqueries, functions and result lifecycle.

#[path = "../common/mod.rs"]
mod common;

use common::{memory_store, person_fields, phone_fields, seed_people, Person, Phone};
use quarry::prelude::*;
use quarry::query::{coalesce, count_all, named, select, value};

fn names(people: Vec<Person>) -> Vec<String> {
    people.into_iter().map(|p| p.name).collect()
}

#[test]
fn test_between_is_inclusive() {
    let store = memory_store();
    seed_people(&store);
    let p = person_fields(store.model());

    let people = store
        .select::<Person>()
        .expect("select")
        .filter(p.age.between(10, 75))
        .order_by(&[&p.age.asc()])
        .get()
        .expect("get")
        .to_list()
        .expect("to_list");
    assert_eq!(names(people), vec!["Carol", "Alice"]);
}

#[test]
fn test_flat_where_chain_follows_sql_precedence() {
    let store = memory_store();
    seed_people(&store);
    let p = person_fields(store.model());

    // age > 5 AND age < 75 AND name <> 'Bob' OR name = 'Bob'
    let people = store
        .select::<Person>()
        .expect("select")
        .filter(p.age.gt(5))
        .and(p.age.lt(75))
        .and(p.name.ne("Bob"))
        .or(p.name.eq("Bob"))
        .order_by(&[&p.name.asc()])
        .get()
        .expect("get")
        .to_list()
        .expect("to_list");
    assert_eq!(names(people), vec!["Bob", "Carol"]);
}

#[test]
fn test_composed_condition_keeps_its_grouping() {
    let store = memory_store();
    seed_people(&store);
    let p = person_fields(store.model());

    // name = 'Alice' AND (age < 20 OR name = 'Bob')
    let grouped = store
        .select::<Person>()
        .expect("select")
        .filter(p.name.eq("Alice"))
        .and(p.age.lt(20).or(p.name.eq("Bob")))
        .get()
        .expect("get")
        .to_list()
        .expect("to_list");
    assert!(grouped.is_empty());

    // name = 'Alice' AND age < 20 OR name = 'Bob'
    let flat = store
        .select::<Person>()
        .expect("select")
        .filter(p.name.eq("Alice"))
        .and(p.age.lt(20))
        .or(p.name.eq("Bob"))
        .get()
        .expect("get")
        .to_list()
        .expect("to_list");
    assert_eq!(names(flat), vec!["Bob"]);
}

#[test]
fn test_in_like_and_null_predicates() {
    let store = memory_store();
    let mut people = vec![
        Person {
            email: Some("ann@example.com".into()),
            ..Person::new("Ann", 30)
        },
        Person::new("Andy", 40),
        Person::new("Zoe", 50),
    ];
    store.insert_all(&mut people).expect("insert_all");
    let p = person_fields(store.model());

    let query = |condition| {
        let people = store
            .select::<Person>()
            .expect("select")
            .filter(condition)
            .order_by(&[&p.name.asc()])
            .get()
            .expect("get")
            .to_list()
            .expect("to_list");
        names(people)
    };

    assert_eq!(query(p.name.in_(["Zoe", "Ann"])), vec!["Ann", "Zoe"]);
    assert_eq!(query(p.age.not_in(vec![30, 40])), vec!["Zoe"]);
    assert_eq!(query(p.name.like("An%")), vec!["Andy", "Ann"]);
    assert_eq!(query(p.name.not_like("An%")), vec!["Zoe"]);
    assert_eq!(query(p.email.is_null()), vec!["Andy", "Zoe"]);
    assert_eq!(query(p.email.not_null()), vec!["Ann"]);
    // an empty IN list matches nothing
    assert!(query(p.name.in_(Vec::<String>::new())).is_empty());
}

#[test]
fn test_order_limit_offset() {
    let store = memory_store();
    seed_people(&store);
    let p = person_fields(store.model());

    let page = store
        .select::<Person>()
        .expect("select")
        .order_by(&[&p.age.desc()])
        .limit(2)
        .offset(1)
        .get()
        .expect("get")
        .to_list()
        .expect("to_list");
    assert_eq!(names(page), vec!["Carol", "Bob"]);
}

#[test]
fn test_group_by_having() {
    let store = memory_store();
    seed_people(&store);
    let mut twins = vec![Person::new("Dan", 10), Person::new("Eve", 10)];
    store.insert_all(&mut twins).expect("insert_all");
    let p = person_fields(store.model());

    let rows = store
        .select_tuple(&[&p.age, &count_all().as_("n")])
        .group_by(&[&p.age])
        .having(count_all().gt(1))
        .get()
        .expect("get")
        .to_list()
        .expect("to_list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<i32>(0).expect("age"), 10);
    assert_eq!(rows[0].get_by_name::<i64>("n").expect("n"), 3);
}

#[test]
fn test_union_and_except() {
    let store = memory_store();
    seed_people(&store);
    let p = person_fields(store.model());

    let rows = store
        .select_tuple(&[&p.name])
        .filter(p.age.lt(18))
        .union(select(&[&p.name]).filter(p.age.gt(65)))
        .order_by(&[&named::<String>("name").asc()])
        .get()
        .expect("get")
        .to_list()
        .expect("to_list");
    let union: Vec<String> = rows.iter().map(|t| t.get(0).expect("name")).collect();
    assert_eq!(union, vec!["Alice", "Bob", "Carol"]);

    let rows = store
        .select_tuple(&[&p.name])
        .except(select(&[&p.name]).filter(p.age.lt(18)))
        .get()
        .expect("get")
        .to_list()
        .expect("to_list");
    let except: Vec<String> = rows.iter().map(|t| t.get(0).expect("name")).collect();
    assert_eq!(except, vec!["Alice"]);
}

#[test]
fn test_exists_and_in_subqueries() {
    let store = memory_store();
    let people = seed_people(&store);
    let mut phone = Phone {
        number: "555-0100".into(),
        owner: people[0].id,
        ..Default::default()
    };
    store.insert(&mut phone).expect("insert phone");

    let p = person_fields(store.model());
    let ph = phone_fields(store.model());

    let with_phone = store
        .select::<Person>()
        .expect("select")
        .filter_exists(select(&[&ph.number]).filter(ph.owner.eq_expr(&p.id)))
        .get()
        .expect("get")
        .to_list()
        .expect("to_list");
    assert_eq!(names(with_phone), vec!["Alice"]);

    let without_phone = store
        .select::<Person>()
        .expect("select")
        .filter_not_exists(select(&[&ph.number]).filter(ph.owner.eq_expr(&p.id)))
        .order_by(&[&p.name.asc()])
        .get()
        .expect("get")
        .to_list()
        .expect("to_list");
    assert_eq!(names(without_phone), vec!["Bob", "Carol"]);

    let owners = store
        .select::<Person>()
        .expect("select")
        .filter(p.id.in_(select(&[&ph.owner]).filter(ph.number.like("555%"))))
        .get()
        .expect("get")
        .to_list()
        .expect("to_list");
    assert_eq!(names(owners), vec!["Alice"]);
}

#[test]
fn test_functions_and_aliases() {
    let store = memory_store();
    seed_people(&store);
    let p = person_fields(store.model());

    let row = store
        .select_tuple(&[
            &p.name.upper().as_("shout"),
            &p.name.length(),
            &coalesce::<String>(&[&p.email, &value("none")]).as_("contact"),
        ])
        .filter(p.name.eq("Carol"))
        .get()
        .expect("get")
        .first()
        .expect("first")
        .expect("a row");
    assert_eq!(row.get_by_name::<String>("shout").expect("shout"), "CAROL");
    assert_eq!(row.get::<i64>(1).expect("length"), 5);
    assert_eq!(row.get_by_name::<String>("contact").expect("contact"), "none");

    let avg = store
        .select_tuple(&[&p.age.avg()])
        .get()
        .expect("get")
        .first()
        .expect("first")
        .expect("a row");
    let mean: f64 = avg.get(0).expect("avg");
    assert!((mean - 85.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_select_from_derived_table() {
    let store = memory_store();
    seed_people(&store);
    let p = person_fields(store.model());

    let rows = store
        .select_tuple(&[&named::<String>("name")])
        .from_query(select(&[&p.name]).filter(p.age.gt(5)), "adults")
        .order_by(&[&named::<String>("name").asc()])
        .get()
        .expect("get")
        .to_list()
        .expect("to_list");
    let adults: Vec<String> = rows.iter().map(|t| t.get(0).expect("name")).collect();
    assert_eq!(adults, vec!["Alice", "Carol"]);
}

#[test]
fn test_partial_selection_leaves_other_fields_default() {
    let store = memory_store();
    seed_people(&store);
    let p = person_fields(store.model());

    let people = store
        .select_fields::<Person>(&[&p.id, &p.name])
        .expect("select_fields")
        .filter(p.name.eq("Alice"))
        .get()
        .expect("get")
        .to_list()
        .expect("to_list");
    assert_eq!(people.len(), 1);
    assert!(people[0].id > 0);
    assert_eq!(people[0].age, 0);
}

#[test]
fn test_distinct_projection() {
    let store = memory_store();
    let mut people = vec![Person::new("A", 1), Person::new("B", 1), Person::new("C", 2)];
    store.insert_all(&mut people).expect("insert_all");
    let p = person_fields(store.model());

    let ages = store
        .select_tuple(&[&p.age])
        .distinct()
        .order_by(&[&p.age.asc()])
        .get()
        .expect("get")
        .to_list()
        .expect("to_list");
    assert_eq!(ages.len(), 2);
}

#[test]
fn test_result_re_executes_on_each_iteration() {
    let store = memory_store();
    seed_people(&store);

    let result = store
        .select::<Person>()
        .expect("select")
        .get()
        .expect("get");
    assert_eq!(result.to_list().expect("first pass").len(), 3);

    let mut dave = Person::new("Dave", 41);
    store.insert(&mut dave).expect("insert");
    assert_eq!(result.iter().expect("second pass").count(), 4);
}

#[test]
fn test_closed_result_rejects_iteration_and_close_is_idempotent() {
    let store = memory_store();
    seed_people(&store);

    let result = store
        .select::<Person>()
        .expect("select")
        .get()
        .expect("get");
    result.close();
    result.close();
    assert!(result.is_closed());
    assert!(matches!(result.to_list(), Err(QuarryError::ResultClosed)));
    assert!(matches!(result.iter(), Err(QuarryError::ResultClosed)));
}

#[test]
fn test_insert_query_returns_generated_keys() {
    let store = memory_store();
    let p = person_fields(store.model());

    let keys = store
        .insert_rows::<Person>()
        .expect("insert_rows")
        .value(&p.name, "Dan")
        .value(&p.age, 40)
        .get()
        .expect("get");
    let first: Vec<i64> = keys
        .to_list()
        .expect("keys")
        .iter()
        .map(|t| t.get(0).expect("id"))
        .collect();
    assert_eq!(first.len(), 1);
    assert!(first[0] > 0);

    // buffered keys iterate again without re-inserting
    assert_eq!(keys.to_list().expect("keys again").len(), 1);
    assert_eq!(
        store
            .count::<Person>()
            .expect("count")
            .get()
            .expect("get")
            .value()
            .expect("value"),
        1
    );
}

#[test]
fn test_unknown_attribute_and_type_are_rejected() {
    #[derive(Debug, Default, Clone)]
    struct Stranger {
        id: i64,
    }
    quarry::impl_entity!(Stranger { id: i64 });

    let store = memory_store();
    let model = store.model();

    let err = model
        .find_attribute::<Person>("shoe_size")
        .expect_err("unknown attribute");
    assert!(matches!(err, QuarryError::UnsupportedOperation(_)));

    let err = model
        .find_attribute::<Stranger>("id")
        .expect_err("unknown type");
    assert!(matches!(err, QuarryError::UnsupportedOperation(_)));

    assert!(store.select::<Stranger>().is_err());
    assert!(model.field::<Person, i32>("age").is_ok());
}
