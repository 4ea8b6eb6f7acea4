//! # Voucher Commands
//!
//! The speculative cart-screen check and the caller's claimed rewards.
//! [`evaluate_voucher`] is shared with `create_order` so both paths apply
//! exactly the same rules.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::commands::order::price_lines;
use crate::error::ApiError;
use crate::state::DbState;
use kopi_core::pricing::{cart_subtotal, PricedLine};
use kopi_core::request::CheckVoucherRequest;
use kopi_core::validation::{normalize_voucher_code, validate_cart_lines};
use kopi_core::voucher::{evaluate, CartLine, VoucherCheck, VoucherContext};
use kopi_core::{CallerContext, Money, OrderType, UserVoucher, ValidationError, Voucher, VoucherRejection};
use kopi_db::Database;

/// Loads a voucher by code with the caller's usage counts and runs the rules.
///
/// The inner result is the rule outcome; the outer one is a storage failure.
pub(crate) async fn evaluate_voucher(
    database: &Database,
    user_id: &str,
    code: &str,
    order_type: OrderType,
    lines: &[PricedLine],
    subtotal: Money,
    now: DateTime<Utc>,
) -> Result<(Option<Voucher>, Result<Money, VoucherRejection>), ApiError> {
    let voucher = database.vouchers().get_by_code(code).await?;

    let (user_usage_count, unused_claims) = match &voucher {
        Some(v) => (
            database.vouchers().count_user_usage(user_id, &v.id).await?,
            database.vouchers().count_unused_claims(user_id, &v.id).await?,
        ),
        None => (0, 0),
    };
    let prior_order_count = database.orders().count_active_for_user(user_id).await?;

    let cart: Vec<CartLine> = lines.iter().map(PricedLine::cart_line).collect();
    let ctx = VoucherContext {
        user_id,
        subtotal,
        order_type,
        lines: &cart,
        now,
        user_usage_count,
        prior_order_count,
        unused_claims,
    };

    let outcome = evaluate(voucher.as_ref(), &ctx);
    debug!(code = %code, ok = outcome.is_ok(), "Voucher evaluated");

    Ok((voucher, outcome))
}

/// Runs the voucher rules against a cart without writing anything.
///
/// A rejected voucher is a successful check with `valid: false`.
pub async fn check_voucher(
    db: &DbState,
    caller: &CallerContext,
    request: CheckVoucherRequest,
) -> Result<VoucherCheck, ApiError> {
    debug!(user_id = %caller.user_id, "check_voucher command");

    let code = normalize_voucher_code(&request.code)?.ok_or_else(|| ValidationError::Required {
        field: "code".to_string(),
    })?;
    let lines = validate_cart_lines(&request.items)?;

    let database = db.inner();
    let priced = price_lines(database, &lines).await?;
    let subtotal = cart_subtotal(&priced);

    let (_, outcome) = evaluate_voucher(
        database,
        &caller.user_id,
        &code,
        request.order_type,
        &priced,
        subtotal,
        Utc::now(),
    )
    .await?;

    Ok(VoucherCheck::from_outcome(&code, subtotal, outcome))
}

/// Reward vouchers the caller has claimed, newest first.
pub async fn list_my_vouchers(db: &DbState, caller: &CallerContext) -> Result<Vec<UserVoucher>, ApiError> {
    Ok(db.inner().vouchers().list_claims(&caller.user_id).await?)
}
