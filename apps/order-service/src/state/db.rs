//! # Database State
//!
//! Wraps the `Database` connection for use in commands.
//!
//! `Database` holds a `SqlitePool`, so commands run queries concurrently
//! without explicit locking. Writers queue on SQLite's lock for up to the
//! configured busy timeout.

use std::time::Duration;

use kopi_db::{Database, DbConfig, DbResult};

use super::ConfigState;

#[derive(Debug, Clone)]
pub struct DbState {
    db: Database,
}

impl DbState {
    /// Creates a new DbState wrapping the database connection.
    pub fn new(db: Database) -> Self {
        DbState { db }
    }

    /// Opens the configured database file and runs migrations.
    pub async fn open(config: &ConfigState) -> DbResult<Self> {
        let db_config = DbConfig::new(&config.database_path)
            .max_connections(config.max_connections)
            .busy_timeout(Duration::from_secs(5));

        Ok(DbState::new(Database::new(db_config).await?))
    }

    /// Returns a reference to the inner Database.
    pub fn inner(&self) -> &Database {
        &self.db
    }
}
