use std::sync::Arc;
use tazzina::orm::{Db, Model, auto_migrate};

#[tokio::test]
async fn test_db_basic_crud() {
    use sqlx::FromRow;

    // 1. Create a minimal struct that matches the DB row
    #[derive(Debug, FromRow, PartialEq, Eq)]
    struct Person {
        name: String,
    }

    // 2. Connect and setup schema
    let db = Db::connect("sqlite::memory:").await.unwrap();
    db.execute("CREATE TABLE person (id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .unwrap();
    db.execute("INSERT INTO person (name) VALUES ('Alice')")
        .await
        .unwrap();

    // 3. Fetch rows (using sqlx::FromRow)
    let people: Vec<Person> = db.fetch_all("SELECT name FROM person").await.unwrap();

    // 4. Extract names and assert
    let names: Vec<String> = people.into_iter().map(|person| person.name).collect();
    assert_eq!(names, vec!["Alice"]);
}

// A throwaway model for exercising the migration machinery.
struct Gadget;

impl Model for Gadget {
    fn table_name() -> &'static str {
        "gadget"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS gadget (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL
        )"
        .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        vec![
            ("id".to_string(), "INTEGER PRIMARY KEY AUTOINCREMENT".to_string()),
            ("label".to_string(), "TEXT NOT NULL".to_string()),
        ]
    }
}

// Same table as Gadget, one extra column: simulates a model growing a field.
struct GadgetWithNote;

impl Model for GadgetWithNote {
    fn table_name() -> &'static str {
        "gadget"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS gadget (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL,
            note TEXT
        )"
        .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        vec![
            ("id".to_string(), "INTEGER PRIMARY KEY AUTOINCREMENT".to_string()),
            ("label".to_string(), "TEXT NOT NULL".to_string()),
            ("note".to_string(), "TEXT".to_string()),
        ]
    }
}

#[tokio::test]
async fn test_model_migrate_creates_table_and_meta_row() {
    let db = Arc::new(Db::connect("sqlite::memory:").await.unwrap());
    Gadget::migrate(db.clone()).await.unwrap();

    db.execute("INSERT INTO gadget (label) VALUES ('espresso lever')")
        .await
        .unwrap();
    let labels: Vec<(String,)> = db.fetch_all("SELECT label FROM gadget").await.unwrap();
    assert_eq!(labels, vec![("espresso lever".to_string(),)]);

    let tracked: Vec<(String,)> = db
        .fetch_all("SELECT table_name FROM __tazzina_migrations")
        .await
        .unwrap();
    assert_eq!(tracked, vec![("gadget".to_string(),)]);
}

#[tokio::test]
async fn test_model_migrate_is_idempotent() {
    let db = Arc::new(Db::connect("sqlite::memory:").await.unwrap());
    Gadget::migrate(db.clone()).await.unwrap();
    Gadget::migrate(db.clone()).await.unwrap();

    let tracked: Vec<(String,)> = db
        .fetch_all("SELECT table_name FROM __tazzina_migrations")
        .await
        .unwrap();
    assert_eq!(tracked.len(), 1);

    db.execute("INSERT INTO gadget (label) VALUES ('tamper')")
        .await
        .unwrap();
    let rows: Vec<(i64, String)> = db.fetch_all("SELECT id, label FROM gadget").await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_model_migrate_adds_missing_columns() {
    let db = Arc::new(Db::connect("sqlite::memory:").await.unwrap());
    Gadget::migrate(db.clone()).await.unwrap();
    db.execute("INSERT INTO gadget (label) VALUES ('grinder')")
        .await
        .unwrap();

    // Second migration pass sees the wider schema and ALTERs the table.
    GadgetWithNote::migrate(db.clone()).await.unwrap();

    db.execute("INSERT INTO gadget (label, note) VALUES ('kettle', 'gooseneck')")
        .await
        .unwrap();
    let rows: Vec<(String, Option<String>)> = db
        .fetch_all("SELECT label, note FROM gadget ORDER BY id")
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![
            ("grinder".to_string(), None),
            ("kettle".to_string(), Some("gooseneck".to_string())),
        ]
    );
}

#[tokio::test]
async fn test_auto_migrate_runs_registered_models() {
    let db = Arc::new(Db::connect("sqlite::memory:").await.unwrap());
    auto_migrate(db.clone()).await.unwrap();

    // The cafe model registers itself, so its table must exist now.
    db.execute(
        "INSERT INTO cafe (name, map_url, img_url, location, has_toilet, has_wifi, \
         has_sockets, can_take_calls) \
         VALUES ('Bar Luce', 'https://maps.example.com/luce', \
         'https://img.example.com/luce.jpg', 'Milano', 1, 1, 0, 0)",
    )
    .await
    .unwrap();
    let names: Vec<(String,)> = db.fetch_all("SELECT name FROM cafe").await.unwrap();
    assert_eq!(names, vec![("Bar Luce".to_string(),)]);
}
