//! # API Error Type
//!
//! Unified error type for service commands.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Order Service                      │
//! │                                                                         │
//! │  Command Function ── Result<T, ApiError>                                │
//! │         │                                                               │
//! │         ├── ValidationError    ──► VALIDATION_ERROR    (request shape)  │
//! │         ├── OutletNotFound ... ──► NOT_FOUND           (precondition)   │
//! │         ├── TableOccupied  ... ──► PRECONDITION_FAILED (precondition)   │
//! │         ├── VoucherRejection   ──► RULE_VIOLATION      (rule)           │
//! │         ├── Forbidden          ──► FORBIDDEN           (permission)     │
//! │         ├── LedgerDivergence   ──► CONSISTENCY_ERROR   (consistency)    │
//! │         └── DbError            ──► DATABASE_ERROR      (logged, generic)│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! What the client receives:
//! ```json
//! {
//!   "code": "RULE_VIOLATION",
//!   "reason": "usage_limit_reached",
//!   "message": "Voucher has been fully used"
//! }
//! ```

use serde::Serialize;

use kopi_core::{
    CoreError, ErrorKind, PointsRejection, PricingError, ValidationError, VoucherRejection,
};
use kopi_db::DbError;

/// API error returned from commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error class.
    pub code: ErrorCode,

    /// Stable snake_case reason for rule and precondition failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message for display.
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request body failed validation (400)
    ValidationError,

    /// Referenced outlet, table, product, order or user missing (404)
    NotFound,

    /// Resource exists but is not in a usable state (409)
    PreconditionFailed,

    /// Business rule refused the request (422)
    RuleViolation,

    /// Caller may not perform this action (403)
    Forbidden,

    /// Stored data disagrees with itself (500)
    ConsistencyError,

    /// Database operation failed (500)
    DatabaseError,

    /// Unknown command or malformed envelope (400)
    BadRequest,

    /// Internal server error (500)
    Internal,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            reason: None,
            message: message.into(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::BadRequest, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }

    /// The reason string, if any.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// Converts database errors to API errors.
///
/// Details are logged; the client gets a generic message.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => {
                ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", entity, id))
                    .with_reason(format!("{}_not_found", entity.to_lowercase()))
            }
            DbError::Busy => {
                tracing::error!("Database busy past the busy timeout");
                ApiError::new(ErrorCode::DatabaseError, "Database is busy, try again")
            }
            DbError::PoolExhausted => {
                tracing::error!("Database pool exhausted");
                ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            DbError::ConnectionFailed(e) => {
                tracing::error!("Database connection failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::TransactionFailed(e) => {
                tracing::error!("Transaction failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database transaction failed")
            }
            other => {
                tracing::error!("Database operation failed: {}", other);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let code = match err.kind() {
            ErrorKind::RequestShape => ErrorCode::ValidationError,
            ErrorKind::Precondition => match &err {
                CoreError::OutletInactive(_) | CoreError::TableOccupied(_) => {
                    ErrorCode::PreconditionFailed
                }
                _ => ErrorCode::NotFound,
            },
            ErrorKind::RuleViolation => ErrorCode::RuleViolation,
            ErrorKind::Permission => ErrorCode::Forbidden,
            ErrorKind::Consistency => {
                tracing::error!("Consistency check failed: {}", err);
                ErrorCode::ConsistencyError
            }
        };

        ApiError::new(code, err.to_string()).with_reason(err.reason())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        CoreError::from(err).into()
    }
}

impl From<PricingError> for ApiError {
    fn from(err: PricingError) -> Self {
        CoreError::from(err).into()
    }
}

impl From<VoucherRejection> for ApiError {
    fn from(err: VoucherRejection) -> Self {
        CoreError::from(err).into()
    }
}

impl From<PointsRejection> for ApiError {
    fn from(err: PointsRejection) -> Self {
        CoreError::from(err).into()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_violation_keeps_reason() {
        let err: ApiError = VoucherRejection::UsageLimitReached.into();
        assert_eq!(err.code, ErrorCode::RuleViolation);
        assert_eq!(err.reason(), Some("usage_limit_reached"));

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "RULE_VIOLATION");
        assert_eq!(json["reason"], "usage_limit_reached");
    }

    #[test]
    fn test_precondition_split() {
        let err: ApiError = CoreError::TableOccupied("t1".into()).into();
        assert_eq!(err.code, ErrorCode::PreconditionFailed);

        let err: ApiError = CoreError::OutletNotFound("x".into()).into();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.reason(), Some("outlet_not_found"));
    }

    #[test]
    fn test_db_error_is_generic() {
        let err: ApiError = DbError::QueryFailed("near \"SELEC\": syntax error".into()).into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert_eq!(err.message, "Database operation failed");
        assert!(err.reason().is_none());
    }
}
