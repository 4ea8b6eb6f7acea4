//! # Notification Repository
//!
//! The in-app inbox. Written after an order commits, never inside it.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use kopi_core::Notification;

#[derive(Debug, Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    /// Creates a new NotificationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        NotificationRepository { pool }
    }

    pub async fn insert(&self, notification: &Notification) -> DbResult<()> {
        debug!(
            user_id = %notification.user_id,
            kind = ?notification.kind,
            "Inserting notification"
        );

        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, body, order_id, is_read, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.user_id)
        .bind(notification.kind)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.order_id)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// A user's inbox, newest first.
    pub async fn list_for_user(&self, user_id: &str, limit: u32) -> DbResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, kind, title, body, order_id, created_at
            FROM notifications
            WHERE user_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
