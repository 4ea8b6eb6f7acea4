//! # Kopi Order Service Library
//!
//! Order creation and settlement for the Kopi coffee chain: pricing,
//! vouchers, loyalty points, tiers and order numbering behind one
//! request protocol.
//!
//! ## Module Organization
//! ```text
//! kopi_order_service/
//! ├── lib.rs          ◄─── You are here (startup & run)
//! ├── state/
//! │   ├── mod.rs      ◄─── State type exports
//! │   ├── db.rs       ◄─── Database state wrapper
//! │   └── config.rs   ◄─── Configuration state (TOML + env)
//! ├── commands/
//! │   ├── mod.rs      ◄─── Command exports
//! │   ├── order.rs    ◄─── Order transaction orchestration
//! │   ├── voucher.rs  ◄─── Voucher check
//! │   └── loyalty.rs  ◄─── Profile, history, reward claims
//! ├── notify.rs       ◄─── Post-commit notification dispatcher
//! ├── protocol.rs     ◄─── JSON-lines envelopes and the serve loop
//! └── error.rs        ◄─── API error type for commands
//! ```
//!
//! ## State
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────────┐    │
//! │  │    DbState       │ │   ConfigState    │ │  NotificationHandle  │    │
//! │  │                  │ │                  │ │                      │    │
//! │  │  • SQLite pool   │ │  • Tax rate      │ │  • mpsc sender       │    │
//! │  │  • Repositories  │ │  • Pickup lead   │ │  • Shutdown signal   │    │
//! │  │                  │ │  • Delivery fee  │ │                      │    │
//! │  └──────────────────┘ └──────────────────┘ └──────────────────────┘    │
//! │                                                                         │
//! │  Each command takes only the state it needs.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod error;
pub mod notify;
pub mod protocol;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Context;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kopi_core::tier::validate_tiers;
use notify::{NotificationDispatcher, StoreNotificationSink};
use protocol::{serve, Router};
use state::{ConfigState, DbState};

/// Runs the service until stdin closes or a shutdown signal arrives.
///
/// ## Startup Sequence
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  1. Initialize Logging ── stderr, RUST_LOG or "info,kopi=debug"         │
/// │  2. Load Config ───────── defaults ◄ KOPI_CONFIG file ◄ KOPI_* env      │
/// │  3. Open Database ─────── WAL, busy timeout, migrations, tier check     │
/// │  4. Spawn Dispatcher ──── notifications → inbox table                   │
/// │  5. Serve ─────────────── stdin lines → Router → stdout lines           │
/// │  6. Shutdown ──────────── drain notifications, close pool               │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Kopi order service");

    let config = ConfigState::load().context("Failed to load configuration")?;
    info!(
        database = %config.database_path.display(),
        tax_bps = config.tax_bps,
        utc_offset_hours = config.utc_offset_hours,
        "Configuration loaded"
    );

    let db = DbState::open(&config).await.context("Failed to open database")?;
    info!("Database connected and migrations applied");

    let tiers = db.inner().loyalty().tiers().await.context("Failed to load membership tiers")?;
    if let Err(e) = validate_tiers(&tiers) {
        warn!(error = %e, "Membership tiers do not cover every balance");
    }

    let sink = StoreNotificationSink::new(db.inner().clone());
    let (dispatcher, notify) = NotificationDispatcher::new(Box::new(sink), config.notification_queue);
    let dispatcher_task = tokio::spawn(dispatcher.run());

    let router = Arc::new(Router::new(db.clone(), config, notify.clone()));
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    let served = tokio::select! {
        result = serve(router, stdin, stdout) => result,
        _ = shutdown_signal() => Ok(()),
    };

    if let Err(e) = notify.shutdown().await {
        warn!(error = %e, "Notification dispatcher already stopped");
    }
    if let Err(e) = dispatcher_task.await {
        error!(error = %e, "Notification dispatcher panicked");
    }
    db.inner().close().await;

    info!("Service stopped");
    served.context("Request stream failed")
}

/// Initializes the tracing subscriber for structured logging.
///
/// Logs go to stderr; stdout carries protocol responses only.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=kopi=trace` - Show trace for kopi crates only
/// - Default: `info,kopi=debug,sqlx=warn`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kopi=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Completes on Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
