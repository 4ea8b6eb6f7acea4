//! # kopi-db: Database Layer for the Kopi Order Platform
//!
//! SQLite storage for orders, vouchers, the points ledger and the catalog
//! facts the order pipeline reads.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kopi Data Flow                                   │
//! │                                                                         │
//! │  order-service command (create_order)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kopi-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ CatalogRepo   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ OrderRepo     │    │ 001_initial  │  │   │
//! │  │   │ begin() → tx  │    │ VoucherRepo   │    │   _schema    │  │   │
//! │  │   │               │    │ LoyaltyRepo   │    │              │  │   │
//! │  │   └───────────────┘    │ ...           │    └──────────────┘  │   │
//! │  │                        └───────────────┘                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Kinds of Operations
//!
//! - Repository methods (`db.orders().get(id)`) run on the pool.
//! - `*_tx` functions take `&mut SqliteConnection` and run inside a
//!   transaction the caller opened with [`Database::begin`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kopi_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("kopi.db")).await?;
//!
//! let mut tx = db.begin().await?;
//! let seq = kopi_db::repository::order::next_sequence_tx(&mut tx, "KEMA181026").await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::catalog::CatalogRepository;
pub use repository::loyalty::LoyaltyRepository;
pub use repository::notification::NotificationRepository;
pub use repository::order::OrderRepository;
pub use repository::outlet::OutletRepository;
pub use repository::user::UserRepository;
pub use repository::voucher::VoucherRepository;
