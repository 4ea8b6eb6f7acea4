//! # Repository Module
//!
//! Database repository implementations for the Kopi order platform.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Pool Reads vs Transaction Writes                     │
//! │                                                                         │
//! │  Command                                                               │
//! │       │                                                                 │
//! │       ├── db.catalog().get_product(id)        (pool, read)             │
//! │       ├── db.vouchers().get_by_code(code)     (pool, read)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  let mut tx = db.begin()                                               │
//! │       ├── order::next_sequence_tx(&mut tx, key)    ← takes write lock  │
//! │       ├── voucher::increment_usage_tx(&mut tx, id) ← conditional       │
//! │       ├── user::debit_points_tx(&mut tx, id, pts)  ← conditional       │
//! │       ├── outlet::occupy_table_tx(&mut tx, id)     ← conditional       │
//! │       └── order::insert_order_tx(&mut tx, ...)                         │
//! │  tx.commit()                                                           │
//! │                                                                         │
//! │  A conditional write that touches zero rows means a concurrent         │
//! │  request won; the command drops `tx` and the whole order rolls back.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Products with options and modifiers
//! - [`OutletRepository`](outlet::OutletRepository) - Outlets and dining tables
//! - [`UserRepository`](user::UserRepository) - Users, cached balance and tier
//! - [`OrderRepository`](order::OrderRepository) - Orders, items and the sequence counter
//! - [`VoucherRepository`](voucher::VoucherRepository) - Vouchers, scopes and usage rows
//! - [`LoyaltyRepository`](loyalty::LoyaltyRepository) - Program setting, tiers and the ledger
//! - [`NotificationRepository`](notification::NotificationRepository) - In-app inbox

pub mod catalog;
pub mod loyalty;
pub mod notification;
pub mod order;
pub mod outlet;
pub mod user;
pub mod voucher;

/// Shared rows for repository tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use kopi_core::{Role, User};

    use crate::{Database, DbConfig};

    pub const OUTLET: &str = "kemang-01";

    /// Fresh in-memory database with one outlet, one table and one customer.
    pub async fn database() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        db.outlets().insert_outlet(OUTLET, "Kopi Kemang", true).await.unwrap();
        db.outlets().insert_table("t1", OUTLET, "T1").await.unwrap();
        db.users().insert(&customer("u1")).await.unwrap();

        db
    }

    pub fn customer(id: &str) -> User {
        User {
            id: id.to_string(),
            name: format!("Customer {}", id),
            role: Role::Customer,
            outlet_id: None,
            points_balance: 0,
            tier_id: None,
            created_at: Utc::now(),
        }
    }
}
