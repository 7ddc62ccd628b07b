//! Canopy Database Layer
//!
//! Provides `SQLite` storage for run headers and the current listing snapshot
//! of every target. Uses `SQLx` with embedded migrations.
//!
//! # Example
//!
//! ```ignore
//! use canopy_db::Database;
//!
//! let db = Database::new("canopy.db").await?;
//! db.run_migrations().await?;
//! let store = db.snapshot_store();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod connection;
pub mod error;
pub mod listings;
pub mod migrations;
pub mod runs;
pub mod store;

// Re-export commonly used types
pub use connection::DatabasePool;
pub use error::{DatabaseError, Result};
pub use store::SqliteSnapshotStore;

use std::path::Path;

/// High-level database interface.
///
/// Wraps a `DatabasePool` and handles migration.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DatabasePool,
}

impl Database {
    /// Open (or create) the database file at `path`.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let pool = DatabasePool::open(path).await?;
        Ok(Self { pool })
    }

    /// Open a migrated in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let db = Self {
            pool: DatabasePool::in_memory().await?,
        };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all pending database migrations.
    ///
    /// # Errors
    /// Returns `DatabaseError::Migration` if any migration fails.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(self.pool.pool()).await
    }

    /// Get the current schema version.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(self.pool.pool()).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Sqlite> {
        self.pool.pool()
    }

    /// Snapshot store sharing this database's pool.
    #[must_use]
    pub fn snapshot_store(&self) -> SqliteSnapshotStore {
        SqliteSnapshotStore::new(self.pool.pool().clone())
    }

    /// Close the database connection gracefully.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
