//! Database access layer: a pooled sqlite handle plus schema migration.
//!
//! Models describe their own table via the `Model` trait and register a
//! migration entry; `auto_migrate` walks the registry at startup and brings
//! the database in step with the declared schemas. Applied schemas are
//! tracked in the `__tazzina_migrations` meta table, keyed by table name
//! and hashed so drift is visible.
pub use futures::future::BoxFuture;
use log::{debug, error, info};
use sha2::{Digest, Sha256};
pub use sqlx::FromRow;
use sqlx::Row;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Executor, SqlitePool};
use std::sync::Arc;

/// Shared handle to the sqlite connection pool. Cheap to clone.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

/// Migration function pointer for a model.
/// Each model registers one of these so `auto_migrate` can find it.
pub type MigrationFn = fn(Arc<Db>) -> BoxFuture<'static, Result<(), sqlx::Error>>;

pub struct Migration(pub MigrationFn);

impl std::ops::Deref for Migration {
    type Target = MigrationFn;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A type stored in its own sqlite table. Implementors describe the table;
/// the default `migrate` keeps the live database in step with it.
#[async_trait::async_trait]
pub trait Model: Send + Sync {
    fn table_name() -> &'static str;
    fn create_table_sql() -> String;
    fn columns() -> Vec<(String, String)>;

    /// Creates the model's table on first run; afterwards adds any columns
    /// the model declares that the live table is missing. Columns are never
    /// dropped or retyped.
    async fn migrate(db: Arc<Db>) -> Result<(), sqlx::Error> {
        let table_name = Self::table_name();
        let create_sql = Self::create_table_sql();
        let schema_hash = hash(&create_sql);

        db.execute(
            "CREATE TABLE IF NOT EXISTS __tazzina_migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_name TEXT NOT NULL UNIQUE,
                schema_sql TEXT NOT NULL,
                hash TEXT NOT NULL,
                applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .await?;

        let tracked = sqlx::query("SELECT hash FROM __tazzina_migrations WHERE table_name = ?")
            .bind(table_name)
            .fetch_optional(db.pool())
            .await?;

        if tracked.is_none() {
            db.execute(&create_sql).await?;
            sqlx::query(
                "INSERT INTO __tazzina_migrations (table_name, schema_sql, hash) VALUES (?, ?, ?)",
            )
            .bind(table_name)
            .bind(&create_sql)
            .bind(&schema_hash)
            .execute(db.pool())
            .await?;
            info!("Created table `{}` with its initial schema.", table_name);
            return Ok(());
        }

        // Columns the live table already has. Identifiers cannot be bound;
        // they come from the model constants, not request data.
        let existing: Vec<String> = sqlx::query(&format!("PRAGMA table_info({})", table_name))
            .fetch_all(db.pool())
            .await?
            .into_iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        let mut added = Vec::new();
        for (column, sql_type) in Self::columns() {
            if existing.contains(&column) {
                continue;
            }
            db.execute(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                table_name, column, sql_type
            ))
            .await?;
            added.push((column, sql_type));
        }

        if added.is_empty() {
            info!("No schema changes detected for `{}`.", table_name);
            return Ok(());
        }

        info!("Added missing columns to `{}`:", table_name);
        for (column, sql_type) in &added {
            info!("  - {} {}", column, sql_type);
        }
        sqlx::query(
            "UPDATE __tazzina_migrations \
             SET schema_sql = ?, hash = ?, applied_at = CURRENT_TIMESTAMP \
             WHERE table_name = ?",
        )
        .bind(&create_sql)
        .bind(&schema_hash)
        .bind(table_name)
        .execute(db.pool())
        .await?;
        Ok(())
    }
}

// Fingerprint of a schema statement, stored next to it in the meta table.
fn hash(s: &str) -> String {
    format!("{:x}", Sha256::digest(s.as_bytes()))
}

impl Db {
    /// Opens a pool against the given sqlite URI, creating the database
    /// file when the URI asks for it (`mode=rwc`).
    pub async fn connect(uri: &str) -> Result<Self, sqlx::Error> {
        // A pooled in-memory database only behaves like one database if
        // every user shares the single connection.
        let options = if uri.contains(":memory:") {
            SqlitePoolOptions::new().max_connections(1)
        } else {
            SqlitePoolOptions::new()
        };
        let pool = options.connect(uri).await?;
        info!("Database ready at {}", uri);
        Ok(Db { pool })
    }

    /// The raw pool, for queries that bind parameters directly.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the pool, waiting for open connections to be returned.
    pub async fn close(&self) {
        info!("Closing SQLite connection pool");
        self.pool.close().await;
    }

    /// Runs a statement that returns no rows: DDL, INSERT, UPDATE, DELETE.
    pub async fn execute(&self, sql: &str) -> Result<(), sqlx::Error> {
        debug!("execute: {}", sql);
        if let Err(e) = self.pool.execute(sql).await {
            error!("statement failed: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Runs a query and maps every row onto `T`.
    pub async fn fetch_all<T>(&self, sql: &str) -> Result<Vec<T>, sqlx::Error>
    where
        T: for<'r> FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin,
    {
        debug!("fetch_all: {}", sql);
        match sqlx::query_as(sql).fetch_all(&self.pool).await {
            Ok(rows) => {
                debug!("fetch_all: {} rows", rows.len());
                Ok(rows)
            }
            Err(e) => {
                error!("query failed: {}", e);
                Err(e)
            }
        }
    }
}

/// Runs the registered migration of every model, in registration order.
pub async fn auto_migrate(db: Arc<Db>) -> Result<(), sqlx::Error> {
    let mut checked = 0;
    for migration in inventory::iter::<Migration> {
        if let Err(e) = migration(db.clone()).await {
            error!("Startup migration failed: {}", e);
            return Err(e);
        }
        checked += 1;
    }
    info!("Startup migration checked {} models.", checked);
    Ok(())
}
