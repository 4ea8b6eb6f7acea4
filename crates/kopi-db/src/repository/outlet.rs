//! # Outlet Repository
//!
//! Outlets and their dining tables.
//!
//! Table occupancy is the one outlet fact the order pipeline writes. Both
//! directions are single conditional updates run inside the caller's
//! transaction:
//!
//! ```text
//! occupy_table_tx   UPDATE ... SET is_occupied = 1 WHERE id = ? AND is_occupied = 0
//! release_table_tx  UPDATE ... SET is_occupied = 0 WHERE id = ?
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use kopi_core::{DiningTable, Outlet};

/// Repository for outlets and tables.
#[derive(Debug, Clone)]
pub struct OutletRepository {
    pool: SqlitePool,
}

impl OutletRepository {
    /// Creates a new OutletRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OutletRepository { pool }
    }

    /// Gets an outlet by ID.
    pub async fn get_outlet(&self, id: &str) -> DbResult<Option<Outlet>> {
        let outlet = sqlx::query_as::<_, Outlet>(
            "SELECT id, name, is_active FROM outlets WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(outlet)
    }

    /// Gets a table, scoped to its outlet.
    ///
    /// A table id from another outlet returns `None`.
    pub async fn get_table(&self, outlet_id: &str, table_id: &str) -> DbResult<Option<DiningTable>> {
        let table = sqlx::query_as::<_, DiningTable>(
            r#"
            SELECT id, outlet_id, label, is_occupied
            FROM outlet_tables
            WHERE id = ?1 AND outlet_id = ?2
            "#,
        )
        .bind(table_id)
        .bind(outlet_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(table)
    }

    pub async fn insert_outlet(&self, id: &str, name: &str, is_active: bool) -> DbResult<()> {
        debug!(id = %id, name = %name, "Inserting outlet");

        sqlx::query("INSERT INTO outlets (id, name, is_active) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(name)
            .bind(is_active)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn insert_table(&self, id: &str, outlet_id: &str, label: &str) -> DbResult<()> {
        debug!(id = %id, outlet_id = %outlet_id, "Inserting table");

        sqlx::query(
            "INSERT INTO outlet_tables (id, outlet_id, label, is_occupied) VALUES (?1, ?2, ?3, 0)",
        )
        .bind(id)
        .bind(outlet_id)
        .bind(label)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Transaction-scoped writes
// =============================================================================

/// Marks a table occupied if it is currently free.
///
/// Returns `false` when another order took the table first.
pub async fn occupy_table_tx(conn: &mut SqliteConnection, table_id: &str) -> DbResult<bool> {
    debug!(table_id = %table_id, "Occupying table");

    let result = sqlx::query(
        "UPDATE outlet_tables SET is_occupied = 1 WHERE id = ?1 AND is_occupied = 0",
    )
    .bind(table_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Frees a table. Releasing a free table is a no-op.
pub async fn release_table_tx(conn: &mut SqliteConnection, table_id: &str) -> DbResult<()> {
    debug!(table_id = %table_id, "Releasing table");

    sqlx::query("UPDATE outlet_tables SET is_occupied = 0 WHERE id = ?1")
        .bind(table_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
