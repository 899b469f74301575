//! Associations: loading related entities, saving links and cascading deletes

use std::sync::Arc;

use quarry::driver::SqliteProvider;
use quarry::meta::{CascadeAction, EntityModel};
use quarry::prelude::*;
use quarry::Configuration;

#[derive(Debug, Default, Clone, PartialEq)]
struct Author {
    id: i64,
    name: String,
}

quarry::impl_entity!(Author { id: i64, name: String });

#[derive(Debug, Default, Clone, PartialEq)]
struct Book {
    id: i64,
    title: String,
    author: Option<i64>,
}

quarry::impl_entity!(Book {
    id: i64,
    title: String,
    author: Option<i64>,
});

impl Book {
    fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Chapter {
    id: i64,
    book: i64,
    heading: String,
}

quarry::impl_entity!(Chapter {
    id: i64,
    book: i64,
    heading: String,
});

#[derive(Debug, Default, Clone, PartialEq)]
struct Tag {
    id: i64,
    label: String,
}

quarry::impl_entity!(Tag { id: i64, label: String });

impl Tag {
    fn labelled(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }
}

/// Junction between books and tags
#[derive(Debug, Default, Clone, PartialEq)]
struct BookTag {
    book: i64,
    tag: i64,
}

quarry::impl_entity!(BookTag { book: i64, tag: i64 });

fn model() -> Arc<EntityModel> {
    Arc::new(
        EntityModel::builder("library")
            .add(quarry::model_type!(Author => "author" {
                id: BigInt [key, generated],
                name: Varchar [length(64)],
                books: BigInt [
                    one_to_many("book", "author"),
                    cascade(&[CascadeAction::Save, CascadeAction::Delete]),
                ],
            }))
            .add(quarry::model_type!(Book => "book" {
                id: BigInt [key, generated],
                title: Varchar [length(128)],
                author: BigInt [column("author_id"), references("author", "id"), nullable(true)],
                chapters: BigInt [
                    one_to_many("chapter", "book"),
                    cascade(&[CascadeAction::Delete]),
                ],
                tags: BigInt [many_to_many("tag", "book_tag"), cascade(&[CascadeAction::Save])],
            }))
            .add(quarry::model_type!(Chapter => "chapter" {
                id: BigInt [key, generated],
                book: BigInt [column("book_id"), references("book", "id")],
                heading: Text,
            }))
            .add(quarry::model_type!(Tag => "tag" {
                id: BigInt [key, generated],
                label: Varchar [length(32), unique],
            }))
            .add(quarry::model_type!(BookTag => "book_tag" {
                book: BigInt [key, references("book", "id")],
                tag: BigInt [key, references("tag", "id")],
            }))
            .build()
            .expect("Failed to build model"),
    )
}

fn library() -> EntityDataStore {
    let provider = Arc::new(SqliteProvider::memory().expect("Failed to open sqlite"));
    let config = Configuration::builder(provider, model())
        .build()
        .expect("Failed to build configuration");
    let store = EntityDataStore::new(config);
    store
        .schema()
        .create_tables(TableCreationMode::CreateNotExists)
        .expect("Failed to create tables");
    store
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

fn books_of(store: &EntityDataStore, author: &Author) -> Vec<String> {
    let mut titles: Vec<String> = store
        .related::<Author, Book>(author, "books")
        .expect("related query")
        .get()
        .expect("get")
        .to_list()
        .expect("books")
        .into_iter()
        .map(|b| b.title)
        .collect();
    titles.sort();
    titles
}

fn tags_of(store: &EntityDataStore, book: &Book) -> Vec<String> {
    let mut labels: Vec<String> = store
        .related::<Book, Tag>(book, "tags")
        .expect("related query")
        .get()
        .expect("get")
        .to_list()
        .expect("tags")
        .into_iter()
        .map(|t| t.label)
        .collect();
    labels.sort();
    labels
}

#[test]
fn test_save_related_cascades_and_loads_both_ways() {
    let store = library();
    let mut ursula = Author {
        name: "Ursula".into(),
        ..Default::default()
    };
    let mut books = vec![Book::titled("Lathe"), Book::titled("Dispossessed")];
    store
        .save_related(&mut ursula, "books", &mut books)
        .expect("Failed to save books");

    assert!(ursula.id > 0);
    assert!(books.iter().all(|b| b.id > 0 && b.author == Some(ursula.id)));
    assert_eq!(books_of(&store, &ursula), vec!["Dispossessed", "Lathe"]);

    let author = store
        .related::<Book, Author>(&books[0], "author")
        .expect("related query")
        .get()
        .expect("get")
        .first()
        .expect("first");
    assert_eq!(author, Some(ursula.clone()));

    // saving again updates in place
    books[0].title = "The Lathe of Heaven".into();
    store
        .save_related(&mut ursula, "books", &mut books[..1])
        .expect("Failed to resave");
    assert_eq!(count::<Book>(&store), 2);
    assert_eq!(
        books_of(&store, &ursula),
        vec!["Dispossessed", "The Lathe of Heaven"]
    );
}

#[test]
fn test_unsaved_source_has_nothing_related() {
    let store = library();
    let mut ada = Author {
        name: "Ada".into(),
        ..Default::default()
    };
    store
        .save_related(&mut ada, "books", &mut [Book::titled("Notes")])
        .expect("Failed to save");

    assert!(books_of(&store, &Author::default()).is_empty());
    let orphan = Book::titled("Orphan");
    let author = store
        .related::<Book, Author>(&orphan, "author")
        .expect("related query")
        .get()
        .expect("get")
        .first()
        .expect("first");
    assert_eq!(author, None);
}

#[test]
fn test_owning_side_sets_and_clears_foreign_key() {
    let store = library();
    let mut author = Author {
        name: "Iain".into(),
        ..Default::default()
    };
    store.insert(&mut author).expect("Failed to insert author");

    let mut book = Book::titled("Excession");
    store
        .save_related(&mut book, "author", std::slice::from_mut(&mut author))
        .expect("Failed to link author");
    assert_eq!(book.author, Some(author.id));
    assert_eq!(books_of(&store, &author), vec!["Excession"]);

    store
        .save_related::<Book, Author>(&mut book, "author", &mut [])
        .expect("Failed to clear author");
    assert_eq!(book.author, None);
    assert!(books_of(&store, &author).is_empty());
}

#[test]
fn test_link_without_save_cascade_needs_stored_targets() {
    let store = library();
    let mut book = Book::titled("Solaris");
    store.insert(&mut book).expect("Failed to insert book");

    let mut draft = vec![Chapter {
        heading: "The Arrival".into(),
        ..Default::default()
    }];
    let err = store
        .save_related(&mut book, "chapters", &mut draft)
        .expect_err("chapter is not stored");
    assert!(matches!(err, QuarryError::UnsupportedOperation(_)), "got {err}");
    assert_eq!(count::<Chapter>(&store), 0);

    let mut other = Book::titled("Fiasco");
    store.insert(&mut other).expect("Failed to insert book");
    let mut chapter = Chapter {
        heading: "The Solarists".into(),
        book: other.id,
        ..Default::default()
    };
    store.insert(&mut chapter).expect("Failed to insert chapter");
    store
        .save_related(&mut book, "chapters", std::slice::from_mut(&mut chapter))
        .expect("Failed to move chapter");

    let loaded: Chapter = store
        .find_by_key(chapter.id)
        .expect("find")
        .expect("chapter exists");
    assert_eq!(loaded.book, book.id);
}

#[test]
fn test_many_to_many_links_each_pair_once() {
    let store = library();
    let mut book = Book::titled("Dune");
    let mut tags = vec![Tag::labelled("desert"), Tag::labelled("classic")];
    store
        .save_related(&mut book, "tags", &mut tags)
        .expect("Failed to tag");
    store
        .save_related(&mut book, "tags", &mut tags)
        .expect("Failed to tag again");

    assert_eq!(count::<Tag>(&store), 2);
    assert_eq!(count::<BookTag>(&store), 2);
    assert_eq!(tags_of(&store, &book), vec!["classic", "desert"]);

    let removed = store
        .unlink(&book, "tags", &mut tags[..1])
        .expect("Failed to unlink");
    assert_eq!(removed, 1);
    assert_eq!(tags_of(&store, &book), vec!["classic"]);
    assert_eq!(count::<Tag>(&store), 2);
}

#[test]
fn test_unlink_one_to_many_clears_foreign_key() {
    let store = library();
    let mut author = Author {
        name: "Octavia".into(),
        ..Default::default()
    };
    let mut books = vec![Book::titled("Kindred"), Book::titled("Dawn")];
    store
        .save_related(&mut author, "books", &mut books)
        .expect("Failed to save books");

    let removed = store
        .unlink(&author, "books", &mut books[1..])
        .expect("Failed to unlink");
    assert_eq!(removed, 1);
    assert_eq!(books[1].author, None);
    assert_eq!(books_of(&store, &author), vec!["Kindred"]);
    assert_eq!(count::<Book>(&store), 2);
}

#[test]
fn test_delete_cascades_through_dependents() {
    let store = library();
    let mut author = Author {
        name: "Stanislaw".into(),
        ..Default::default()
    };
    let mut books = vec![Book::titled("Solaris"), Book::titled("Eden")];
    store
        .save_related(&mut author, "books", &mut books)
        .expect("Failed to save books");
    for (i, book) in books.iter_mut().enumerate() {
        let mut chapters: Vec<Chapter> = (0..3)
            .map(|n| Chapter {
                book: book.id,
                heading: format!("{i}.{n}"),
                ..Default::default()
            })
            .collect();
        store.insert_all(&mut chapters).expect("Failed to insert chapters");
        store
            .save_related(book, "tags", &mut [Tag::labelled(&format!("tag-{i}"))])
            .expect("Failed to tag");
    }
    let mut bystander = Book::titled("Unrelated");
    store.insert(&mut bystander).expect("Failed to insert");

    store.delete(&author).expect("Failed to delete author");

    assert_eq!(count::<Author>(&store), 0);
    assert_eq!(count::<Book>(&store), 1);
    assert_eq!(count::<Chapter>(&store), 0);
    assert_eq!(count::<BookTag>(&store), 0);
    // tags are only linked, never owned
    assert_eq!(count::<Tag>(&store), 2);
}

#[test]
fn test_batched_delete_cascades_per_chunk() {
    let store = library();
    let mut authors: Vec<Author> = (0..5)
        .map(|i| Author {
            name: format!("author-{i}"),
            ..Default::default()
        })
        .collect();
    for author in authors.iter_mut() {
        let mut books = vec![Book::titled("first"), Book::titled("second")];
        store
            .save_related(author, "books", &mut books)
            .expect("Failed to save books");
    }
    assert_eq!(count::<Book>(&store), 10);

    store.delete_all(&authors[..3]).expect("Failed to delete authors");
    assert_eq!(count::<Author>(&store), 2);
    assert_eq!(count::<Book>(&store), 4);
}

#[test]
fn test_failed_delete_keeps_cascaded_rows() {
    let store = library();
    let mut author = Author {
        name: "Gene".into(),
        ..Default::default()
    };
    let mut books = vec![Book::titled("Shadow"), Book::titled("Claw")];
    store
        .save_related(&mut author, "books", &mut books)
        .expect("Failed to save books");
    store
        .raw_update(
            "CREATE TRIGGER keep_authors BEFORE DELETE ON author \
             BEGIN SELECT RAISE(ABORT, 'authors are kept'); END",
            &[],
        )
        .expect("Failed to create trigger");

    let err = store.delete(&author).expect_err("trigger aborts the delete");
    assert!(err.to_string().contains("authors are kept"), "got {err}");
    assert_eq!(count::<Author>(&store), 1);
    assert_eq!(books_of(&store, &author), vec!["Claw", "Shadow"]);
}

#[test]
fn test_related_checks_target_type() {
    let store = library();
    let author = Author::default();
    let err = store
        .related::<Author, Tag>(&author, "books")
        .map(|_| ())
        .expect_err("books are not tags");
    assert!(err.to_string().contains("associates book, not tag"), "got {err}");

    let err = store
        .related::<Author, Book>(&author, "name")
        .map(|_| ())
        .expect_err("name is a plain column");
    assert!(err.to_string().contains("not an association"), "got {err}");
}
