//! # Notification Dispatcher
//!
//! Delivers post-commit order events off the request path.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Post-Commit Notification Flow                        │
//! │                                                                         │
//! │  create_order ── tx.commit() ── handle.notify(OrderCreated) ──┐         │
//! │                                                               │ mpsc    │
//! │  update_order_status ── commit ── notify(StatusChanged) ──────┤         │
//! │                                                               ▼         │
//! │                                        ┌─────────────────────────────┐  │
//! │                                        │  NotificationDispatcher     │  │
//! │                                        │  run(): select! {           │  │
//! │                                        │    event    → sink.deliver  │  │
//! │                                        │    shutdown → drain, stop   │  │
//! │                                        │  }                          │  │
//! │                                        └──────────────┬──────────────┘  │
//! │                                                       ▼                 │
//! │                                        NotificationSink (inbox table)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is best-effort. A full queue, a stopped dispatcher or a failing
//! sink is logged at `warn` and never reaches the caller; the order is
//! already committed by then.

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use kopi_core::{Notification, OrderEvent};
use kopi_db::{Database, DbError};

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification queue is full")]
    QueueFull,

    #[error("Notification dispatcher has stopped")]
    Closed,

    #[error("Failed to store notification: {0}")]
    Storage(#[from] DbError),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

// =============================================================================
// Sink
// =============================================================================

/// Where events end up.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &OrderEvent) -> Result<(), NotifyError>;
}

/// Writes events to the `notifications` table as inbox rows.
#[derive(Debug, Clone)]
pub struct StoreNotificationSink {
    db: Database,
}

impl StoreNotificationSink {
    pub fn new(db: Database) -> Self {
        StoreNotificationSink { db }
    }
}

#[async_trait]
impl NotificationSink for StoreNotificationSink {
    async fn deliver(&self, event: &OrderEvent) -> Result<(), NotifyError> {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: event.user_id().to_string(),
            kind: event.kind(),
            title: event.title(),
            body: event.body(),
            order_id: Some(event.order_id().to_string()),
            created_at: Utc::now(),
        };

        self.db.notifications().insert(&notification).await?;
        Ok(())
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Background task draining the event queue into a sink.
pub struct NotificationDispatcher {
    sink: Box<dyn NotificationSink>,
    events_rx: mpsc::Receiver<OrderEvent>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Cloneable sender side held by commands.
#[derive(Debug, Clone)]
pub struct NotificationHandle {
    events_tx: mpsc::Sender<OrderEvent>,
    shutdown_tx: mpsc::Sender<()>,
}

impl NotificationHandle {
    /// Enqueues an event without waiting. Failures are logged, not returned.
    pub fn notify(&self, event: OrderEvent) {
        if let Err(e) = self.try_notify(event) {
            warn!(error = %e, "Dropping order notification");
        }
    }

    pub fn try_notify(&self, event: OrderEvent) -> Result<(), NotifyError> {
        self.events_tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
        })
    }

    /// Asks the dispatcher to deliver what is queued and stop.
    pub async fn shutdown(&self) -> Result<(), NotifyError> {
        self.shutdown_tx.send(()).await.map_err(|_| NotifyError::Closed)
    }
}

impl NotificationDispatcher {
    /// Creates a dispatcher and its handle.
    pub fn new(sink: Box<dyn NotificationSink>, capacity: usize) -> (Self, NotificationHandle) {
        let (events_tx, events_rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let dispatcher = NotificationDispatcher {
            sink,
            events_rx,
            shutdown_rx,
        };
        let handle = NotificationHandle {
            events_tx,
            shutdown_tx,
        };

        (dispatcher, handle)
    }

    /// Runs until shutdown is requested or every handle is dropped.
    pub async fn run(mut self) {
        info!("Notification dispatcher starting");

        loop {
            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(event) => self.deliver(event).await,
                    None => break,
                },

                _ = self.shutdown_rx.recv() => {
                    info!("Notification dispatcher shutting down");
                    while let Ok(event) = self.events_rx.try_recv() {
                        self.deliver(event).await;
                    }
                    break;
                }
            }
        }

        info!("Notification dispatcher stopped");
    }

    async fn deliver(&self, event: OrderEvent) {
        match self.sink.deliver(&event).await {
            Ok(()) => debug!(kind = ?event.kind(), order_id = %event.order_id(), "Notification delivered"),
            Err(e) => warn!(
                error = %e,
                kind = ?event.kind(),
                order_id = %event.order_id(),
                "Notification delivery failed"
            ),
        }
    }
}

// =============================================================================
// Test Sinks
// =============================================================================


#[cfg(test)]
mod tests {
    use super::testing::{FailingSink, RecordingSink};
    use super::*;
    use kopi_core::Money;

    fn created(order_id: &str) -> OrderEvent {
        OrderEvent::OrderCreated {
            user_id: "u1".into(),
            order_id: order_id.into(),
            order_number: "KEMA181026-001".into(),
            total: Money::from_rupiah(77_700),
        }
    }

    #[tokio::test]
    async fn test_events_delivered_before_shutdown_completes() {
        let sink = RecordingSink::default();
        let (dispatcher, handle) = NotificationDispatcher::new(Box::new(sink.clone()), 8);
        let task = tokio::spawn(dispatcher.run());

        handle.notify(created("o1"));
        handle.notify(created("o2"));
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].order_id(), "o2");
    }

    #[tokio::test]
    async fn test_full_queue_reports_without_blocking() {
        let (_dispatcher, handle) = NotificationDispatcher::new(Box::new(RecordingSink::default()), 1);

        handle.try_notify(created("o1")).unwrap();
        assert!(matches!(handle.try_notify(created("o2")), Err(NotifyError::QueueFull)));
        // notify() swallows the same failure
        handle.notify(created("o3"));
    }

    #[tokio::test]
    async fn test_stopped_dispatcher_is_closed() {
        let (dispatcher, handle) = NotificationDispatcher::new(Box::new(RecordingSink::default()), 4);
        drop(dispatcher);

        assert!(matches!(handle.try_notify(created("o1")), Err(NotifyError::Closed)));
    }

    #[tokio::test]
    async fn test_failing_sink_keeps_running() {
        let (dispatcher, handle) = NotificationDispatcher::new(Box::new(FailingSink), 4);
        let task = tokio::spawn(dispatcher.run());

        handle.notify(created("o1"));
        handle.notify(created("o2"));
        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_store_sink_writes_inbox_row() {
        use kopi_core::{NotificationKind, Role, User};
        use kopi_db::DbConfig;

        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.users()
            .insert(&User {
                id: "u1".into(),
                name: "Ayu".into(),
                role: Role::Customer,
                outlet_id: None,
                points_balance: 0,
                tier_id: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        db.outlets().insert_outlet("kemang-01", "Kopi Kemang", true).await.unwrap();
        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, user_id, outlet_id, order_type, subtotal, tax, total,
                                payment_method, created_at, updated_at)
            VALUES ('o1', 'KEMA181026-001', 'u1', 'kemang-01', 'pickup', 0, 0, 0, 'cash',
                    '2026-10-18T00:00:00Z', '2026-10-18T00:00:00Z')
            "#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        let sink = StoreNotificationSink::new(db.clone());
        sink.deliver(&OrderEvent::PointsEarned {
            user_id: "u1".into(),
            order_id: "o1".into(),
            order_number: "KEMA181026-001".into(),
            points: 20,
        })
        .await
        .unwrap();

        let inbox = db.notifications().list_for_user("u1", 10).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::PointsEarned);
        assert_eq!(inbox[0].title, "You earned 20 points");
    }
}
