//! # Error Types
//!
//! Domain-specific error types for kopi-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kopi-core errors                                                      │
//! │  ├── CoreError         - Everything the order pipeline can reject      │
//! │  ├── ValidationError   - Request shape (this file)                     │
//! │  ├── PricingError      - Line pricing (this file)                      │
//! │  ├── VoucherRejection  - Voucher rules (voucher.rs)                    │
//! │  └── PointsRejection   - Points rules (loyalty.rs)                     │
//! │                                                                         │
//! │  kopi-db errors (separate crate)                                       │
//! │  └── DbError           - Database operation failures                   │
//! │                                                                         │
//! │  order-service errors                                                  │
//! │  └── ApiError          - What the app sees {code, reason, message}     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reasons
//! Every rejection carries a stable snake_case `reason()` the customer app
//! can switch on. The `Display` text is the human message.

use thiserror::Error;

use crate::loyalty::PointsRejection;
use crate::money::Money;
use crate::types::{OrderStatus, PaymentStatus};
use crate::voucher::VoucherRejection;

// =============================================================================
// Error Kind
// =============================================================================

/// Broad category of a rejection, used to pick the API error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request body is malformed or out of range.
    RequestShape,
    /// Something the order depends on is missing or unusable.
    Precondition,
    /// A business rule said no.
    RuleViolation,
    /// The caller may not do this.
    Permission,
    /// Stored data disagrees with itself.
    Consistency,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Voucher(#[from] VoucherRejection),

    #[error(transparent)]
    Points(#[from] PointsRejection),

    #[error("Outlet not found: {0}")]
    OutletNotFound(String),

    /// ## When This Occurs
    /// - Outlet closed by an admin
    /// - Outlet being set up and not yet live
    #[error("Outlet {0} is not accepting orders")]
    OutletInactive(String),

    #[error("Table not found at this outlet: {0}")]
    TableNotFound(String),

    /// ## When This Occurs
    /// - A guest is still seated
    /// - Two dine-in orders raced for the same table and this one lost
    #[error("Table {0} is occupied")]
    TableOccupied(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Voucher {0} cannot be claimed with points")]
    VoucherNotRedeemable(String),

    #[error("Cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Cannot change payment from {} to {}", .from.as_str(), .to.as_str())]
    InvalidPaymentTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Order total would be negative ({total})")]
    NegativeTotal { total: Money },

    /// Cached balance and ledger sum disagree.
    ///
    /// ## When This Occurs
    /// Only if a write bypassed the ledger. Nothing in this workspace does,
    /// so seeing this means someone edited the database by hand.
    #[error("Points ledger for {user_id} sums to {ledger_sum} but balance is {balance}")]
    LedgerDivergence {
        user_id: String,
        balance: i64,
        ledger_sum: i64,
    },
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::RequestShape,
            CoreError::OutletNotFound(_)
            | CoreError::OutletInactive(_)
            | CoreError::TableNotFound(_)
            | CoreError::TableOccupied(_)
            | CoreError::ProductNotFound(_)
            | CoreError::OrderNotFound(_)
            | CoreError::UserNotFound(_) => ErrorKind::Precondition,
            CoreError::Pricing(_)
            | CoreError::Voucher(_)
            | CoreError::Points(_)
            | CoreError::VoucherNotRedeemable(_)
            | CoreError::InvalidStatusTransition { .. }
            | CoreError::InvalidPaymentTransition { .. }
            | CoreError::NegativeTotal { .. } => ErrorKind::RuleViolation,
            CoreError::Forbidden(_) => ErrorKind::Permission,
            CoreError::LedgerDivergence { .. } => ErrorKind::Consistency,
        }
    }

    /// Stable machine-readable reason.
    pub fn reason(&self) -> &'static str {
        match self {
            CoreError::Validation(e) => e.reason(),
            CoreError::Pricing(e) => e.reason(),
            CoreError::Voucher(e) => e.reason(),
            CoreError::Points(e) => e.reason(),
            CoreError::OutletNotFound(_) => "outlet_not_found",
            CoreError::OutletInactive(_) => "outlet_inactive",
            CoreError::TableNotFound(_) => "table_not_found",
            CoreError::TableOccupied(_) => "table_occupied",
            CoreError::ProductNotFound(_) => "product_not_found",
            CoreError::OrderNotFound(_) => "order_not_found",
            CoreError::UserNotFound(_) => "user_not_found",
            CoreError::VoucherNotRedeemable(_) => "voucher_not_redeemable",
            CoreError::InvalidStatusTransition { .. } => "invalid_status_transition",
            CoreError::InvalidPaymentTransition { .. } => "invalid_payment_transition",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::NegativeTotal { .. } => "negative_total",
            CoreError::LedgerDivergence { .. } => "ledger_divergence",
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Request shape errors, raised once at the boundary.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },

    /// Pickup scheduled inside the preparation lead time.
    #[error("{field} must be at least {minutes} minutes from now")]
    TooSoon { field: String, minutes: i64 },

    #[error("{field} does not apply to {order_type} orders")]
    NotApplicable { field: String, order_type: String },
}

impl ValidationError {
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::Required { .. } => "required",
            ValidationError::TooLong { .. } => "too_long",
            ValidationError::OutOfRange { .. } => "out_of_range",
            ValidationError::MustBePositive { .. } => "must_be_positive",
            ValidationError::InvalidFormat { .. } => "invalid_format",
            ValidationError::Duplicate { .. } => "duplicate",
            ValidationError::TooSoon { .. } => "too_soon",
            ValidationError::NotApplicable { .. } => "not_applicable",
        }
    }
}

// =============================================================================
// Pricing Error
// =============================================================================

/// A line that cannot be priced. Any of these aborts the whole order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Product {product_id} is not available")]
    ProductUnavailable { product_id: String },

    #[error("Option {option_id} does not belong to product {product_id}")]
    UnknownOption {
        product_id: String,
        option_id: String,
    },

    #[error("Value {value_id} does not belong to option {option_id}")]
    UnknownOptionValue { option_id: String, value_id: String },

    #[error("Modifier {modifier_id} does not belong to product {product_id}")]
    UnknownModifier {
        product_id: String,
        modifier_id: String,
    },

    #[error("Modifier {modifier_id} is not available")]
    UnavailableModifier { modifier_id: String },

    /// ## When This Occurs
    /// - A required option (min 1) was left unselected
    /// - Two sizes chosen on a single-choice option
    #[error("Option {option_id} needs between {min} and {max} selections, got {selected}")]
    OptionSelectionCount {
        option_id: String,
        min: i64,
        max: i64,
        selected: i64,
    },
}

impl PricingError {
    pub fn reason(&self) -> &'static str {
        match self {
            PricingError::ProductUnavailable { .. } => "product_unavailable",
            PricingError::UnknownOption { .. } => "unknown_option",
            PricingError::UnknownOptionValue { .. } => "unknown_option_value",
            PricingError::UnknownModifier { .. } => "unknown_modifier",
            PricingError::UnavailableModifier { .. } => "unavailable_modifier",
            PricingError::OptionSelectionCount { .. } => "option_selection_count",
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
