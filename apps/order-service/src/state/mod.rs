//! # State Module
//!
//! Shared state handed to every command.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Architecture                                   │
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌──────────────────────────┐  │
//! │  │   DbState    │  │   ConfigState    │  │   NotificationHandle     │  │
//! │  │              │  │                  │  │                          │  │
//! │  │  Database    │  │  tax rate        │  │  mpsc sender to the      │  │
//! │  │  (SQLite     │  │  pickup lead     │  │  dispatcher task         │  │
//! │  │   pool)      │  │  delivery fee    │  │                          │  │
//! │  └──────────────┘  └──────────────────┘  └──────────────────────────┘  │
//! │                                                                         │
//! │  THREAD SAFETY:                                                        │
//! │  • DbState: internal connection pool                                   │
//! │  • ConfigState: read-only after initialization                         │
//! │  • NotificationHandle: cloneable channel sender                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing mutable is cached here between commands: every balance, counter
//! and table flag is read from storage inside the command that needs it.

mod config;
mod db;

pub use config::{ConfigError, ConfigState};
pub use db::DbState;
