//! The café record, its schema, and the store handle that persists it.

use crate::orm::{Db, FromRow, Migration, Model};
use log::debug;
use std::sync::Arc;
use thiserror::Error;

/// One café as read back from the store.
#[derive(Clone, Debug, PartialEq, FromRow)]
pub struct Cafe {
    pub id: i64,
    pub name: String,
    pub map_url: String,
    pub img_url: String,
    pub location: String,
    pub seats: Option<String>,
    pub has_toilet: bool,
    pub has_wifi: bool,
    pub has_sockets: bool,
    pub can_take_calls: bool,
    pub coffee_price: Option<String>,
}

/// Insert payload: everything except the store-assigned `id`.
#[derive(Clone, Debug, PartialEq)]
pub struct NewCafe {
    pub name: String,
    pub map_url: String,
    pub img_url: String,
    pub location: String,
    pub seats: Option<String>,
    pub has_toilet: bool,
    pub has_wifi: bool,
    pub has_sockets: bool,
    pub can_take_calls: bool,
    pub coffee_price: Option<String>,
}

impl NewCafe {
    /// Pairs the payload with its store-assigned id.
    pub fn into_cafe(self, id: i64) -> Cafe {
        Cafe {
            id,
            name: self.name,
            map_url: self.map_url,
            img_url: self.img_url,
            location: self.location,
            seats: self.seats,
            has_toilet: self.has_toilet,
            has_wifi: self.has_wifi,
            has_sockets: self.has_sockets,
            can_take_calls: self.can_take_calls,
            coffee_price: self.coffee_price,
        }
    }
}

impl Model for Cafe {
    fn table_name() -> &'static str {
        "cafe"
    }

    // AUTOINCREMENT keeps deleted ids from ever being handed out again.
    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS cafe (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name VARCHAR(250) NOT NULL UNIQUE,
            map_url VARCHAR(500) NOT NULL,
            img_url VARCHAR(500) NOT NULL,
            location VARCHAR(250) NOT NULL,
            seats VARCHAR(250),
            has_toilet BOOLEAN NOT NULL,
            has_wifi BOOLEAN NOT NULL,
            has_sockets BOOLEAN NOT NULL,
            can_take_calls BOOLEAN NOT NULL,
            coffee_price VARCHAR(250)
        )"
        .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        vec![
            ("id".to_string(), "INTEGER PRIMARY KEY AUTOINCREMENT".to_string()),
            ("name".to_string(), "VARCHAR(250) NOT NULL UNIQUE".to_string()),
            ("map_url".to_string(), "VARCHAR(500) NOT NULL".to_string()),
            ("img_url".to_string(), "VARCHAR(500) NOT NULL".to_string()),
            ("location".to_string(), "VARCHAR(250) NOT NULL".to_string()),
            ("seats".to_string(), "VARCHAR(250)".to_string()),
            ("has_toilet".to_string(), "BOOLEAN NOT NULL".to_string()),
            ("has_wifi".to_string(), "BOOLEAN NOT NULL".to_string()),
            ("has_sockets".to_string(), "BOOLEAN NOT NULL".to_string()),
            ("can_take_calls".to_string(), "BOOLEAN NOT NULL".to_string()),
            ("coffee_price".to_string(), "VARCHAR(250)".to_string()),
        ]
    }
}

inventory::submit! {
    Migration(|db| Box::pin(async move { Cafe::migrate(db).await }))
}

/// Errors out of the café store. Uniqueness and NOT NULL violations are
/// split out so callers can tell a duplicate name from a broken store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("constraint violated: {0}")]
    ConstraintViolation(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_error) = e {
            match db_error.kind() {
                sqlx::error::ErrorKind::UniqueViolation => {
                    return StoreError::UniqueViolation(db_error.message().to_string());
                }
                sqlx::error::ErrorKind::NotNullViolation => {
                    return StoreError::ConstraintViolation(db_error.message().to_string());
                }
                _ => {}
            }
        }
        StoreError::Database(e)
    }
}

/// The handle request handlers talk to. Cheap to clone; every operation
/// commits before returning.
#[derive(Clone)]
pub struct CafeStore {
    db: Arc<Db>,
}

impl CafeStore {
    pub fn new(db: Arc<Db>) -> Self {
        CafeStore { db }
    }

    /// Every café, oldest first. `ORDER BY id` is insertion order because
    /// ids are assigned monotonically and never reused.
    pub async fn list_all(&self) -> Result<Vec<Cafe>, StoreError> {
        let cafes = self
            .db
            .fetch_all::<Cafe>("SELECT * FROM cafe ORDER BY id")
            .await?;
        Ok(cafes)
    }

    /// Inserts a new café and returns it with its assigned id. A duplicate
    /// name fails with `UniqueViolation`.
    pub async fn create(&self, new_cafe: NewCafe) -> Result<Cafe, StoreError> {
        let result = sqlx::query(
            "INSERT INTO cafe (name, map_url, img_url, location, seats, has_toilet, \
             has_wifi, has_sockets, can_take_calls, coffee_price) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new_cafe.name)
        .bind(&new_cafe.map_url)
        .bind(&new_cafe.img_url)
        .bind(&new_cafe.location)
        .bind(&new_cafe.seats)
        .bind(new_cafe.has_toilet)
        .bind(new_cafe.has_wifi)
        .bind(new_cafe.has_sockets)
        .bind(new_cafe.can_take_calls)
        .bind(&new_cafe.coffee_price)
        .execute(self.db.pool())
        .await?;

        let id = result.last_insert_rowid();
        debug!("Inserted cafe `{}` as id {}", new_cafe.name, id);
        Ok(new_cafe.into_cafe(id))
    }

    /// Fetch by primary key; `None` when no such café exists.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Cafe>, StoreError> {
        let cafe = sqlx::query_as::<_, Cafe>("SELECT * FROM cafe WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(cafe)
    }

    /// Deletes by primary key. Deleting an id that does not exist is a
    /// silent no-op, not an error.
    pub async fn delete_by_id(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM cafe WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            debug!("Delete of cafe {} matched nothing", id);
        }
        Ok(())
    }
}
