//! # kopi-core: Pure Settlement Logic for the Kopi Order Platform
//!
//! This crate turns a validated cart into money: line prices, voucher
//! discounts, points redemption and earning, tier assignment and order
//! numbers. Everything here is a pure function with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kopi Architecture                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               Customer App / Admin Dashboard                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ JSON lines                             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    order-service commands                       │   │
//! │  │    create_order, update_order_status, check_voucher, ...        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kopi-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐          │   │
//! │  │   │ pricing  │ │ voucher  │ │ loyalty  │ │   tier   │          │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────┘          │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────┐      │   │
//! │  │   │  money   │ │  types   │ │validation│ │ order_number │      │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────────┘      │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    kopi-db (Database Layer)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Rupiah amounts with integer arithmetic
//! - [`types`] - Orders, catalog facts, users, outlets, events
//! - [`request`] - Raw request bodies and their validated forms
//! - [`validation`] - The request validation boundary
//! - [`pricing`] - Line pricing and order totals
//! - [`voucher`] - Voucher definitions and rule evaluation
//! - [`loyalty`] - Points earning, redemption and ledger checks
//! - [`tier`] - Membership tier classification and progress
//! - [`order_number`] - Per-outlet, per-day order numbers
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use kopi_core::money::Money;
//! use kopi_core::types::TaxRate;
//!
//! let subtotal = Money::from_rupiah(70_000);
//! let tax = subtotal.calculate_tax(TaxRate::STANDARD);
//! assert_eq!(tax.rupiah(), 7_700);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod loyalty;
pub mod money;
pub mod order_number;
pub mod pricing;
pub mod request;
pub mod tier;
pub mod types;
pub mod validation;
pub mod voucher;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, PricingError, ValidationError};
pub use loyalty::{LedgerEntryKind, LoyaltySetting, LoyaltyTransaction, PointsRejection};
pub use money::Money;
pub use tier::MembershipTier;
pub use types::*;
pub use voucher::{Voucher, VoucherRejection};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of lines in a single order.
pub const MAX_CART_LINES: usize = 50;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (typing 100 instead of 10 cups).
pub const MAX_ITEM_QUANTITY: i64 = 99;

/// Maximum quantity of one modifier on one line (e.g. extra shots).
pub const MAX_MODIFIER_QUANTITY: i64 = 10;

/// Minimum lead time for pickup orders, in minutes.
pub const PICKUP_LEAD_MINUTES: i64 = 20;

/// Maximum length of free-text notes on a line.
pub const MAX_NOTE_LENGTH: usize = 200;
