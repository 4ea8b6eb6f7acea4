//! # Kopi Order Service Entry Point
//!
//! Reads request envelopes from stdin, writes responses to stdout, logs to
//! stderr.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kopi Order Service                               │
//! │                                                                         │
//! │  API gateway (sessions, HTTP) ── JSON lines ──► this process            │
//! │                                                    │                    │
//! │                                                    ▼                    │
//! │                                        commands/ ──► kopi.db (SQLite)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The actual setup is in lib.rs for testability.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kopi_order_service::run().await
}
