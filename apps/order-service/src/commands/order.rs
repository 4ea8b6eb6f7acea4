//! # Order Commands
//!
//! Order creation, status and payment transitions, and order reads.
//!
//! ## create_order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate request ─► outlet active ─► table free (dine-in)              │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  price lines ─► voucher ─► points ─► totals (abort if negative)         │
//! │        │                      (pool reads, no writes yet)               │
//! │        ▼                                                                │
//! │  BEGIN                                                                  │
//! │    next_sequence_tx          ← first statement, takes the write lock    │
//! │    insert order + items                                                 │
//! │    increment_usage_tx        ← 0 rows: usage_limit_reached              │
//! │    record_usage_tx / consume_claim_tx                                   │
//! │    debit_points_tx + ledger  ← 0 rows: insufficient_points              │
//! │    occupy_table_tx           ← 0 rows: table_occupied                   │
//! │  COMMIT                                                                 │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  notify(OrderCreated)        ← best-effort, after commit                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any early return drops the transaction, which rolls every write back.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::commands::loyalty::{apply_tier_tx, verified_balance};
use crate::commands::voucher::evaluate_voucher;
use crate::error::ApiError;
use crate::notify::NotificationHandle;
use crate::state::{ConfigState, DbState};
use kopi_core::loyalty::{points_for_order, validate_redemption, PointsRedemption};
use kopi_core::order_number::{business_date, format_order_number, sequence_key};
use kopi_core::pricing::{bill_before_points, cart_subtotal, price_line, OrderTotals, PricedLine};
use kopi_core::request::{
    CreateOrderRequest, GetOrderRequest, UpdatePaymentRequest, UpdateStatusRequest, ValidatedLine,
};
use kopi_core::validation::validate_order_request;
use kopi_core::{
    CallerContext, CoreError, LedgerEntryKind, LoyaltySetting, LoyaltyTransaction, MembershipTier, Money, Order, OrderDetail,
    OrderEvent, OrderItem, OrderStatus, OrderSummary, OrderType, PaymentStatus, PointsRejection,
    UserVoucher, Voucher, VoucherRejection, VoucherSource,
};
use kopi_db::repository::{loyalty as loyalty_repo, order as order_repo, outlet as outlet_repo};
use kopi_db::repository::{user as user_repo, voucher as voucher_repo};
use kopi_db::{Database, DbError, DbResult};

// =============================================================================
// create_order
// =============================================================================

pub async fn create_order(
    db: &DbState,
    config: &ConfigState,
    notify: &NotificationHandle,
    caller: &CallerContext,
    request: CreateOrderRequest,
) -> Result<OrderSummary, ApiError> {
    debug!(user_id = %caller.user_id, "create_order command");

    let database = db.inner();
    let now = Utc::now();
    let validated = validate_order_request(request, now, config.pickup_lead())?;
    let order_type = validated.order_type();

    let user = database
        .users()
        .get(&caller.user_id)
        .await?
        .ok_or_else(|| CoreError::UserNotFound(caller.user_id.clone()))?;

    // Preconditions
    let outlet = database
        .outlets()
        .get_outlet(&validated.outlet_id)
        .await?
        .ok_or_else(|| CoreError::OutletNotFound(validated.outlet_id.clone()))?;
    if !outlet.is_active {
        return Err(CoreError::OutletInactive(outlet.id).into());
    }

    if let Some(table_id) = validated.fulfillment.table_id() {
        let table = database
            .outlets()
            .get_table(&outlet.id, table_id)
            .await?
            .ok_or_else(|| CoreError::TableNotFound(table_id.to_string()))?;
        if table.is_occupied {
            return Err(CoreError::TableOccupied(table.id).into());
        }
    }

    // Pricing
    let lines = price_lines(database, &validated.lines).await?;
    let subtotal = cart_subtotal(&lines);

    // Voucher
    let applied: Option<(Voucher, Money)> = match validated.voucher_code.as_deref() {
        Some(code) => {
            let (voucher, outcome) =
                evaluate_voucher(database, &user.id, code, order_type, &lines, subtotal, now).await?;
            let discount = outcome?;
            voucher.map(|v| (v, discount))
        }
        None => None,
    };
    let discount = applied.as_ref().map(|(_, d)| *d).unwrap_or_else(Money::zero);

    // Points; zero or absent means no redemption
    let tiers = database.loyalty().tiers().await?;
    let redemption: Option<PointsRedemption> = match validated.points_to_redeem {
        Some(points) if points > 0 => {
            let balance = verified_balance(database, &user.id, &tiers).await?;
            let setting = database.loyalty().active_setting().await?;
            let bill = bill_before_points(subtotal, config.tax_rate(), discount);
            Some(validate_redemption(setting.as_ref(), points, balance, bill)?)
        }
        _ => None,
    };
    let points_discount = redemption.map(|r| r.discount).unwrap_or_else(Money::zero);

    let delivery_fee = if order_type == OrderType::Delivery {
        config.delivery_fee()
    } else {
        Money::zero()
    };
    let totals = OrderTotals::compute(
        subtotal,
        config.tax_rate(),
        discount,
        points_discount,
        delivery_fee,
    )?;

    // Atomic write phase
    let mut tx = database.begin().await?;

    let key = sequence_key(&outlet.id, business_date(now, config.business_offset()));
    let sequence = order_repo::next_sequence_tx(&mut tx, &key).await?;

    let order = Order {
        id: Uuid::new_v4().to_string(),
        order_number: format_order_number(&key, sequence),
        user_id: user.id.clone(),
        outlet_id: outlet.id.clone(),
        table_id: validated.fulfillment.table_id().map(str::to_string),
        order_type,
        status: OrderStatus::Pending,
        scheduled_at: validated.fulfillment.scheduled_at(),
        delivery_address: validated.fulfillment.delivery_address().cloned(),
        subtotal: totals.subtotal,
        tax: totals.tax,
        discount: totals.discount,
        points_discount: totals.points_discount,
        points_redeemed: redemption.map(|r| r.points).unwrap_or(0),
        delivery_fee: totals.delivery_fee,
        total: totals.total,
        voucher_id: applied.as_ref().map(|(v, _)| v.id.clone()),
        payment_method: validated.payment_method,
        payment_status: PaymentStatus::Unpaid,
        created_at: now,
        updated_at: now,
    };

    order_repo::insert_order_tx(&mut tx, &order).await?;
    for (position, line) in lines.into_iter().enumerate() {
        order_repo::insert_item_tx(&mut tx, &order_item(&order.id, line), position).await?;
    }

    if let Some((voucher, _)) = &applied {
        if !voucher_repo::increment_usage_tx(&mut tx, &voucher.id).await? {
            return Err(VoucherRejection::UsageLimitReached.into());
        }

        if voucher.is_redeemable {
            let consumed = voucher_repo::consume_claim_tx(
                &mut tx,
                &user.id,
                &voucher.id,
                &order.id,
                voucher.per_user_limit,
            )
            .await?;
            if !consumed {
                return Err(VoucherRejection::NotClaimed.into());
            }
        } else {
            let usage = UserVoucher {
                id: Uuid::new_v4().to_string(),
                user_id: user.id.clone(),
                voucher_id: voucher.id.clone(),
                order_id: Some(order.id.clone()),
                source: VoucherSource::Order,
                created_at: now,
            };
            if !voucher_repo::record_usage_tx(&mut tx, &usage, voucher.per_user_limit).await? {
                return Err(VoucherRejection::PerUserLimitReached.into());
            }
        }
    }

    let mut points_balance = user.points_balance;
    if let Some(redemption) = redemption {
        points_balance = user_repo::debit_points_tx(&mut tx, &user.id, redemption.points)
            .await?
            .ok_or(PointsRejection::InsufficientBalance {
                balance: user.points_balance,
                requested: redemption.points,
            })?;

        loyalty_repo::append_entry_tx(
            &mut tx,
            &LoyaltyTransaction {
                id: Uuid::new_v4().to_string(),
                user_id: user.id.clone(),
                order_id: Some(order.id.clone()),
                kind: LedgerEntryKind::Redeemed,
                points: -redemption.points,
                balance_after: points_balance,
                description: format!("Redeemed on order {}", order.order_number),
                created_at: now,
            },
        )
        .await?;

        apply_tier_tx(&mut tx, &user.id, &tiers, points_balance).await?;
    }

    if let Some(table_id) = &order.table_id {
        if !outlet_repo::occupy_table_tx(&mut tx, table_id).await? {
            return Err(CoreError::TableOccupied(table_id.clone()).into());
        }
    }

    tx.commit().await.map_err(DbError::from)?;

    info!(
        order_id = %order.id,
        order_number = %order.order_number,
        total = %order.total,
        "Order created"
    );

    notify.notify(OrderEvent::OrderCreated {
        user_id: order.user_id.clone(),
        order_id: order.id.clone(),
        order_number: order.order_number.clone(),
        total: order.total,
    });

    Ok(OrderSummary::from_order(&order, Some(points_balance)))
}

/// Prices every line against the catalog, stopping at the first failure.
pub(crate) async fn price_lines(
    database: &Database,
    lines: &[ValidatedLine],
) -> Result<Vec<PricedLine>, ApiError> {
    let mut priced = Vec::with_capacity(lines.len());
    for line in lines {
        let product = database
            .catalog()
            .get_product(&line.product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;
        priced.push(price_line(&product, line)?);
    }
    Ok(priced)
}

fn order_item(order_id: &str, line: PricedLine) -> OrderItem {
    OrderItem {
        id: Uuid::new_v4().to_string(),
        order_id: order_id.to_string(),
        product_id: line.product_id,
        product_name: line.product_name,
        quantity: line.quantity,
        unit_price: line.unit_price,
        line_amount: line.line_amount,
        notes: line.notes,
        options: line.options,
        modifiers: line.modifiers,
    }
}

// =============================================================================
// update_order_status
// =============================================================================

/// Moves an order through its lifecycle. Staff of the order's outlet or admin.
///
/// Reaching `completed` credits points in the same transaction as the
/// status change, so a completed order always carries its `earned` entry.
///
/// ```text
/// BEGIN
///   update_status_tx        ← first statement, takes the write lock
///   release_table_tx        (terminal statuses, dine-in)
///   earn_points_tx          (completed only, at most once per order)
/// COMMIT
/// ```
pub async fn update_order_status(
    db: &DbState,
    notify: &NotificationHandle,
    caller: &CallerContext,
    request: UpdateStatusRequest,
) -> Result<OrderSummary, ApiError> {
    debug!(order_id = %request.order_id, status = %request.new_status, "update_order_status command");

    let database = db.inner();
    let mut order = database
        .orders()
        .get(&request.order_id)
        .await?
        .ok_or_else(|| CoreError::OrderNotFound(request.order_id.clone()))?;

    if !caller.manages_outlet(&order.outlet_id) {
        return Err(CoreError::Forbidden("only staff of this outlet can update the order".into()).into());
    }

    let from = order.status;
    let to = request.new_status;
    let now = Utc::now();

    if from == to {
        debug!(order_id = %order.id, status = %to, "Status unchanged");
        return Ok(OrderSummary::from_order(&order, None));
    }

    if !from.can_transition_to(to) {
        return Err(CoreError::InvalidStatusTransition { from, to }.into());
    }

    let earning = if to == OrderStatus::Completed {
        Some((database.loyalty().active_setting().await?, database.loyalty().tiers().await?))
    } else {
        None
    };

    let mut tx = database.begin().await?;
    if !order_repo::update_status_tx(&mut tx, &order.id, from, to, now).await? {
        // Another update moved the order after we read it
        return Err(CoreError::InvalidStatusTransition { from, to }.into());
    }
    if to.is_terminal() {
        if let Some(table_id) = &order.table_id {
            outlet_repo::release_table_tx(&mut tx, table_id).await?;
        }
    }
    let earned = match &earning {
        Some((setting, tiers)) => earn_points_tx(&mut tx, &order, setting.as_ref(), tiers, now).await?,
        None => None,
    };
    tx.commit().await.map_err(DbError::from)?;

    order.status = to;
    order.updated_at = now;

    info!(order_id = %order.id, from = %from, to = %to, "Order status updated");

    notify.notify(OrderEvent::OrderStatusChanged {
        user_id: order.user_id.clone(),
        order_id: order.id.clone(),
        order_number: order.order_number.clone(),
        status: to,
    });

    if let Some(points) = earned {
        info!(order_id = %order.id, user_id = %order.user_id, points, "Points earned");
        notify.notify(points_event(&order, points));
    }

    Ok(OrderSummary::from_order(&order, None))
}

/// Credits points for a completed order, at most once.
///
/// Must run after a write in the same transaction. Returns the points
/// credited, or `None` when nothing was due.
async fn earn_points_tx(
    conn: &mut SqliteConnection,
    order: &Order,
    setting: Option<&LoyaltySetting>,
    tiers: &[MembershipTier],
    now: DateTime<Utc>,
) -> DbResult<Option<i64>> {
    if loyalty_repo::has_earned_entry_tx(conn, &order.id).await? {
        debug!(order_id = %order.id, "Points already earned");
        return Ok(None);
    }

    let quantity = order_repo::total_quantity_tx(conn, &order.id).await?;
    let points = points_for_order(setting, quantity);
    if points <= 0 {
        return Ok(None);
    }

    let balance = user_repo::credit_points_tx(conn, &order.user_id, points).await?;
    loyalty_repo::append_entry_tx(
        conn,
        &LoyaltyTransaction {
            id: Uuid::new_v4().to_string(),
            user_id: order.user_id.clone(),
            order_id: Some(order.id.clone()),
            kind: LedgerEntryKind::Earned,
            points,
            balance_after: balance,
            description: format!("Earned on order {}", order.order_number),
            created_at: now,
        },
    )
    .await?;
    apply_tier_tx(conn, &order.user_id, tiers, balance).await?;

    Ok(Some(points))
}

fn points_event(order: &Order, points: i64) -> OrderEvent {
    OrderEvent::PointsEarned {
        user_id: order.user_id.clone(),
        order_id: order.id.clone(),
        order_number: order.order_number.clone(),
        points,
    }
}

// =============================================================================
// update_payment_status
// =============================================================================

/// Toggles the manual payment flag. Staff of the order's outlet or admin.
pub async fn update_payment_status(
    db: &DbState,
    caller: &CallerContext,
    request: UpdatePaymentRequest,
) -> Result<OrderSummary, ApiError> {
    debug!(order_id = %request.order_id, "update_payment_status command");

    let database = db.inner();
    let mut order = database
        .orders()
        .get(&request.order_id)
        .await?
        .ok_or_else(|| CoreError::OrderNotFound(request.order_id.clone()))?;

    if !caller.manages_outlet(&order.outlet_id) {
        return Err(CoreError::Forbidden("only staff of this outlet can change payment".into()).into());
    }

    let from = order.payment_status;
    let to = request.payment_status;
    if from == to {
        return Ok(OrderSummary::from_order(&order, None));
    }
    if !from.can_transition_to(to) {
        return Err(CoreError::InvalidPaymentTransition { from, to }.into());
    }

    let now = Utc::now();
    if !database.orders().update_payment_status(&order.id, from, to, now).await? {
        return Err(CoreError::InvalidPaymentTransition { from, to }.into());
    }

    order.payment_status = to;
    order.updated_at = now;
    info!(order_id = %order.id, from = from.as_str(), to = to.as_str(), "Payment status updated");

    Ok(OrderSummary::from_order(&order, None))
}

// =============================================================================
// get_order
// =============================================================================

/// The order with its lines. Owner, staff of the outlet, or admin.
pub async fn get_order(
    db: &DbState,
    caller: &CallerContext,
    request: GetOrderRequest,
) -> Result<OrderDetail, ApiError> {
    let detail = db
        .inner()
        .orders()
        .get_detail(&request.order_id)
        .await?
        .ok_or_else(|| CoreError::OrderNotFound(request.order_id.clone()))?;

    if !caller.can_view_order(&detail.order) {
        return Err(CoreError::Forbidden("not your order".into()).into());
    }

    Ok(detail)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::*;
    use kopi_core::request::{SelectedModifier, SelectedOption};
    use kopi_core::{NotificationKind, PaymentMethod};

    // -------------------------------------------------------------------------
    // Totals
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_two_lattes_total() {
        let svc = TestService::start().await;

        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line(LATTE, 2)]))
            .await
            .unwrap();

        assert_eq!(summary.subtotal.rupiah(), 70_000);
        assert_eq!(summary.tax.rupiah(), 7_700);
        assert_eq!(summary.total.rupiah(), 77_700);
        assert_eq!(summary.status, OrderStatus::Pending);

        let detail = svc.db.inner().orders().get_detail(&summary.order_id).await.unwrap().unwrap();
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.items[0].quantity, 2);
        assert_eq!(detail.order.payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_options_and_modifiers_priced_and_stored() {
        let svc = TestService::start().await;
        let mut latte = line(LATTE, 1);
        latte.selected_options = vec![SelectedOption {
            option_id: "latte-size".into(),
            value_id: "latte-large".into(),
        }];
        latte.selected_modifiers = vec![SelectedModifier {
            modifier_id: "latte-shot".into(),
            quantity: 2,
        }];

        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![latte]))
            .await
            .unwrap();

        // 35000 + 5000 + 2 × 6000
        assert_eq!(summary.subtotal.rupiah(), 52_000);

        let detail = svc.db.inner().orders().get_detail(&summary.order_id).await.unwrap().unwrap();
        assert_eq!(detail.items[0].unit_price.rupiah(), 52_000);
        assert_eq!(detail.items[0].options.len(), 1);
        assert_eq!(detail.items[0].modifiers[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_foreign_option_rejects_without_writes() {
        let svc = TestService::start().await;
        let mut croissant = line(CROISSANT, 1);
        croissant.selected_options = vec![SelectedOption {
            option_id: "latte-size".into(),
            value_id: "latte-large".into(),
        }];

        let err = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![croissant]))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::RuleViolation);
        assert_eq!(err.reason(), Some("unknown_option"));
        assert_eq!(order_count(&svc).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let svc = TestService::start().await;
        let err = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line("ghost", 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.reason(), Some("product_not_found"));
    }

    #[tokio::test]
    async fn test_switched_off_product_rejects_whole_order() {
        let svc = TestService::start().await;
        svc.db.inner().catalog().set_available(CROISSANT, false).await.unwrap();

        let err = create_order(
            &svc.db,
            &svc.config,
            &svc.notify,
            &customer(),
            pickup(vec![line(LATTE, 1), line(CROISSANT, 1)]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::RuleViolation);
        assert_eq!(err.reason(), Some("product_unavailable"));
        assert_eq!(order_count(&svc).await, 0);
    }

    #[tokio::test]
    async fn test_delivery_fee_applies_to_delivery_only() {
        let mut config = ConfigState::default();
        config.delivery_fee = 10_000;
        let svc = TestService::start_with(config).await;

        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), delivery(vec![line(LATTE, 2)]))
            .await
            .unwrap();
        assert_eq!(summary.delivery_fee.rupiah(), 10_000);
        assert_eq!(summary.total.rupiah(), 87_700);

        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line(LATTE, 2)]))
            .await
            .unwrap();
        assert!(summary.delivery_fee.is_zero());
    }

    #[tokio::test]
    async fn test_pickup_too_soon_rejected() {
        let svc = TestService::start().await;
        let mut request = pickup(vec![line(LATTE, 1)]);
        request.scheduled_time = Some(Utc::now() + chrono::Duration::minutes(5));

        let err = create_order(&svc.db, &svc.config, &svc.notify, &customer(), request)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.reason(), Some("too_soon"));
    }

    #[tokio::test]
    async fn test_inactive_outlet_rejected() {
        let svc = TestService::start().await;
        svc.db.inner().outlets().insert_outlet("closed-01", "Closed", false).await.unwrap();
        let mut request = pickup(vec![line(LATTE, 1)]);
        request.outlet_id = "closed-01".into();

        let err = create_order(&svc.db, &svc.config, &svc.notify, &customer(), request)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PreconditionFailed);
        assert_eq!(err.reason(), Some("outlet_inactive"));
    }

    // -------------------------------------------------------------------------
    // Tables
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_dine_in_occupies_table_and_terminal_status_releases() {
        let svc = TestService::start().await;

        let first = create_order(&svc.db, &svc.config, &svc.notify, &customer(), dine_in(TABLE, vec![line(LATTE, 1)]))
            .await
            .unwrap();

        let err = create_order(&svc.db, &svc.config, &svc.notify, &customer(), dine_in(TABLE, vec![line(LATTE, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some("table_occupied"));

        update_order_status(&svc.db, &svc.notify, &staff(), status(&first.order_id, OrderStatus::Cancelled))
            .await
            .unwrap();

        let table = svc.db.inner().outlets().get_table(OUTLET, TABLE).await.unwrap().unwrap();
        assert!(!table.is_occupied);
        create_order(&svc.db, &svc.config, &svc.notify, &customer(), dine_in(TABLE, vec![line(LATTE, 1)]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_table_of_other_outlet_not_found() {
        let svc = TestService::start().await;
        let err = create_order(&svc.db, &svc.config, &svc.notify, &customer(), dine_in("nowhere", vec![line(LATTE, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some("table_not_found"));
    }

    // -------------------------------------------------------------------------
    // Vouchers
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_percentage_voucher_capped() {
        let svc = TestService::start().await;
        svc.add_voucher(percent_voucher("v10", "HEMAT10", 10, Some(10_000))).await;

        // 100000 subtotal → 10000
        let mut request = pickup(vec![line(CROISSANT, 5)]);
        request.voucher_code = Some("hemat10".into());
        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), request).await.unwrap();
        assert_eq!(summary.subtotal.rupiah(), 100_000);
        assert_eq!(summary.discount.rupiah(), 10_000);
        assert_eq!(summary.total.rupiah(), 100_000 + 11_000 - 10_000);

        // 200000 subtotal → still 10000
        let mut request = pickup(vec![line(CROISSANT, 10)]);
        request.voucher_code = Some("HEMAT10".into());
        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), request).await.unwrap();
        assert_eq!(summary.discount.rupiah(), 10_000);

        let voucher = svc.db.inner().vouchers().get_by_code("HEMAT10").await.unwrap().unwrap();
        assert_eq!(voucher.used_count, 2);
    }

    #[tokio::test]
    async fn test_usage_limit_n_plus_one() {
        let svc = TestService::start().await;
        let mut voucher = percent_voucher("v10", "HEMAT10", 10, None);
        voucher.usage_limit = Some(2);
        svc.add_voucher(voucher).await;

        for _ in 0..2 {
            let mut request = pickup(vec![line(LATTE, 1)]);
            request.voucher_code = Some("HEMAT10".into());
            create_order(&svc.db, &svc.config, &svc.notify, &customer(), request).await.unwrap();
        }

        let mut request = pickup(vec![line(LATTE, 1)]);
        request.voucher_code = Some("HEMAT10".into());
        let err = create_order(&svc.db, &svc.config, &svc.notify, &customer(), request).await.unwrap_err();
        assert_eq!(err.reason(), Some("usage_limit_reached"));
        assert_eq!(order_count(&svc).await, 2);
    }

    #[tokio::test]
    async fn test_per_user_limit() {
        let svc = TestService::start().await;
        let mut voucher = percent_voucher("v10", "HEMAT10", 10, None);
        voucher.per_user_limit = Some(1);
        svc.add_voucher(voucher).await;

        let mut request = pickup(vec![line(LATTE, 1)]);
        request.voucher_code = Some("HEMAT10".into());
        create_order(&svc.db, &svc.config, &svc.notify, &customer(), request.clone()).await.unwrap();

        let err = create_order(&svc.db, &svc.config, &svc.notify, &customer(), request).await.unwrap_err();
        assert_eq!(err.reason(), Some("per_user_limit_reached"));
    }

    #[tokio::test]
    async fn test_unknown_voucher_aborts_order() {
        let svc = TestService::start().await;
        let mut request = pickup(vec![line(LATTE, 1)]);
        request.voucher_code = Some("NOPE".into());

        let err = create_order(&svc.db, &svc.config, &svc.notify, &customer(), request).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RuleViolation);
        assert_eq!(err.reason(), Some("voucher_not_found"));
        assert_eq!(order_count(&svc).await, 0);
    }

    // -------------------------------------------------------------------------
    // Points
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_redeem_points() {
        let svc = TestService::start().await;
        svc.give_points(CUSTOMER, 300).await;

        let mut request = pickup(vec![line(LATTE, 2)]);
        request.points_to_redeem = Some(100);
        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), request).await.unwrap();

        assert_eq!(summary.points_discount.rupiah(), 10_000);
        assert_eq!(summary.total.rupiah(), 67_700);
        assert_eq!(summary.points_balance, Some(200));

        let history = svc.db.inner().loyalty().history(CUSTOMER, 10).await.unwrap();
        assert_eq!(history[0].kind, LedgerEntryKind::Redeemed);
        assert_eq!(history[0].points, -100);
        assert_eq!(history[0].balance_after, 200);

        let snapshot = svc.db.inner().users().points_snapshot(CUSTOMER).await.unwrap().unwrap();
        assert_eq!(snapshot.balance, snapshot.ledger_sum);
    }

    #[tokio::test]
    async fn test_redeem_more_than_balance() {
        let svc = TestService::start().await;
        svc.give_points(CUSTOMER, 80).await;

        let mut request = pickup(vec![line(LATTE, 2)]);
        request.points_to_redeem = Some(100);
        let err = create_order(&svc.db, &svc.config, &svc.notify, &customer(), request).await.unwrap_err();

        assert_eq!(err.reason(), Some("insufficient_points"));
        let user = svc.db.inner().users().get(CUSTOMER).await.unwrap().unwrap();
        assert_eq!(user.points_balance, 80);
    }

    #[tokio::test]
    async fn test_redeem_below_minimum() {
        let svc = TestService::start().await;
        svc.give_points(CUSTOMER, 300).await;

        let mut request = pickup(vec![line(LATTE, 2)]);
        request.points_to_redeem = Some(10);
        let err = create_order(&svc.db, &svc.config, &svc.notify, &customer(), request).await.unwrap_err();
        assert_eq!(err.reason(), Some("below_minimum_points"));
    }

    #[tokio::test]
    async fn test_zero_points_is_no_redemption() {
        let svc = TestService::start().await;
        let mut request = pickup(vec![line(LATTE, 1)]);
        request.points_to_redeem = Some(0);

        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), request).await.unwrap();
        assert!(summary.points_discount.is_zero());
        assert!(svc.db.inner().loyalty().history(CUSTOMER, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redeem_refuses_divergent_balance() {
        let svc = TestService::start().await;
        svc.give_points(CUSTOMER, 60).await;
        sqlx::query("UPDATE users SET points_balance = 300 WHERE id = ?1")
            .bind(CUSTOMER)
            .execute(svc.db.inner().pool())
            .await
            .unwrap();

        let mut request = pickup(vec![line(LATTE, 2)]);
        request.points_to_redeem = Some(100);
        let err = create_order(&svc.db, &svc.config, &svc.notify, &customer(), request)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConsistencyError);
        assert_eq!(order_count(&svc).await, 0);
    }

    #[tokio::test]
    async fn test_redeem_drops_tier() {
        let svc = TestService::start().await;
        svc.give_points(CUSTOMER, 550).await;
        assert_eq!(tier_of(&svc, CUSTOMER).await.as_deref(), Some("silver"));

        let mut request = pickup(vec![line(CROISSANT, 5)]);
        request.points_to_redeem = Some(100);
        create_order(&svc.db, &svc.config, &svc.notify, &customer(), request).await.unwrap();

        assert_eq!(tier_of(&svc, CUSTOMER).await.as_deref(), Some("bronze"));
    }

    // -------------------------------------------------------------------------
    // Order numbers
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_order_numbers_consecutive() {
        let svc = TestService::start().await;
        let mut numbers = Vec::new();
        for _ in 0..3 {
            let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line(LATTE, 1)]))
                .await
                .unwrap();
            numbers.push(summary.order_number);
        }

        let key = numbers[0].trim_end_matches("-001").to_string();
        assert!(key.starts_with("KEMA"));
        assert_eq!(numbers, vec![format!("{}-001", key), format!("{}-002", key), format!("{}-003", key)]);
    }

    #[tokio::test]
    async fn test_outlets_sharing_prefix_share_counter() {
        let svc = TestService::start().await;
        svc.db.inner().outlets().insert_outlet("kema-02", "Kopi Kemang Timur", true).await.unwrap();

        let first = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line(LATTE, 1)]))
            .await
            .unwrap();
        let mut request = pickup(vec![line(LATTE, 1)]);
        request.outlet_id = "kema-02".into();
        let second = create_order(&svc.db, &svc.config, &svc.notify, &customer(), request)
            .await
            .unwrap();

        assert!(first.order_number.starts_with("KEMA") && first.order_number.ends_with("-001"));
        assert!(second.order_number.starts_with("KEMA") && second.order_number.ends_with("-002"));
    }

    #[tokio::test]
    async fn test_rejected_order_does_not_consume_number() {
        let svc = TestService::start().await;
        svc.give_points(CUSTOMER, 300).await;

        create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line(LATTE, 1)]))
            .await
            .unwrap();

        let mut request = pickup(vec![line(LATTE, 1)]);
        request.points_to_redeem = Some(1_000);
        assert!(create_order(&svc.db, &svc.config, &svc.notify, &customer(), request).await.is_err());

        let next = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line(LATTE, 1)]))
            .await
            .unwrap();
        assert!(next.order_number.ends_with("-002"));
    }

    // -------------------------------------------------------------------------
    // Status transitions
    // -------------------------------------------------------------------------

    async fn complete(svc: &TestService, order_id: &str) {
        for next in [
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Completed,
        ] {
            update_order_status(&svc.db, &svc.notify, &staff(), status(order_id, next))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_completion_earns_once() {
        let svc = TestService::start().await;
        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line(LATTE, 2), line(CROISSANT, 1)]))
            .await
            .unwrap();

        complete(&svc, &summary.order_id).await;
        // Repeating completed is a no-op
        update_order_status(&svc.db, &svc.notify, &staff(), status(&summary.order_id, OrderStatus::Completed))
            .await
            .unwrap();

        let history = svc.db.inner().loyalty().history(CUSTOMER, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, LedgerEntryKind::Earned);
        assert_eq!(history[0].points, 30);

        let user = svc.db.inner().users().get(CUSTOMER).await.unwrap().unwrap();
        assert_eq!(user.points_balance, 30);
        assert_eq!(user.tier_id.as_deref(), Some("bronze"));
    }

    #[tokio::test]
    async fn test_earning_promotes_tier() {
        let svc = TestService::start().await;
        svc.give_points(CUSTOMER, 480).await;

        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line(CROISSANT, 3)]))
            .await
            .unwrap();
        complete(&svc, &summary.order_id).await;

        assert_eq!(tier_of(&svc, CUSTOMER).await.as_deref(), Some("silver"));
    }

    #[tokio::test]
    async fn test_rejected_order_earns_nothing() {
        let svc = TestService::start().await;
        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line(LATTE, 2)]))
            .await
            .unwrap();

        update_order_status(&svc.db, &svc.notify, &staff(), status(&summary.order_id, OrderStatus::Rejected))
            .await
            .unwrap();
        let err = update_order_status(&svc.db, &svc.notify, &staff(), status(&summary.order_id, OrderStatus::Completed))
            .await
            .unwrap_err();

        assert_eq!(err.reason(), Some("invalid_status_transition"));
        assert!(svc.db.inner().loyalty().history(CUSTOMER, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_permissions() {
        let svc = TestService::start().await;
        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line(LATTE, 1)]))
            .await
            .unwrap();

        let err = update_order_status(&svc.db, &svc.notify, &customer(), status(&summary.order_id, OrderStatus::Confirmed))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);

        let err = update_order_status(&svc.db, &svc.notify, &other_staff(), status(&summary.order_id, OrderStatus::Confirmed))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);

        let updated = update_order_status(&svc.db, &svc.notify, &admin(), status(&summary.order_id, OrderStatus::Confirmed))
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_events_after_commit() {
        let svc = TestService::start().await;
        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line(LATTE, 1)]))
            .await
            .unwrap();
        complete(&svc, &summary.order_id).await;

        let kinds: Vec<NotificationKind> = svc.finish().await.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds.first(), Some(&NotificationKind::OrderCreated));
        assert_eq!(kinds.last(), Some(&NotificationKind::PointsEarned));
        assert_eq!(
            kinds.iter().filter(|k| **k == NotificationKind::OrderStatusChanged).count(),
            4
        );
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_order() {
        let svc = TestService::start_failing().await;
        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line(LATTE, 1)]))
            .await
            .unwrap();
        assert!(summary.total.is_positive());
        assert_eq!(order_count(&svc).await, 1);
    }

    // -------------------------------------------------------------------------
    // Concurrent writers
    // -------------------------------------------------------------------------

    /// Fires `n` identical orders at once and returns their outcomes.
    async fn race(svc: &TestService, n: usize, request: CreateOrderRequest) -> Vec<Result<OrderSummary, ApiError>> {
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..n {
            let (db, config, notify) = (svc.db.clone(), svc.config.clone(), svc.notify.clone());
            let request = request.clone();
            tasks.spawn(async move { create_order(&db, &config, &notify, &customer(), request).await });
        }

        let mut results = Vec::with_capacity(n);
        while let Some(joined) = tasks.join_next().await {
            results.push(joined.unwrap());
        }
        results
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_orders_get_distinct_numbers() {
        let svc = TestService::start_on_file().await;

        let results = race(&svc, 10, pickup(vec![line(LATTE, 1)])).await;

        let mut numbers: Vec<String> = results.into_iter().map(|r| r.unwrap().order_number).collect();
        numbers.sort();
        numbers.dedup();
        assert_eq!(numbers.len(), 10);
        assert!(numbers[0].ends_with("-001"));
        assert!(numbers[9].ends_with("-010"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_voucher_use_stops_at_limit() {
        let svc = TestService::start_on_file().await;
        let mut voucher = percent_voucher("v10", "HEMAT10", 10, None);
        voucher.usage_limit = Some(3);
        svc.add_voucher(voucher).await;

        let mut request = pickup(vec![line(LATTE, 1)]);
        request.voucher_code = Some("HEMAT10".into());
        let results = race(&svc, 8, request).await;

        let won = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(won, 3);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.reason() == Some("usage_limit_reached")));

        let voucher = svc.db.inner().vouchers().get_by_code("HEMAT10").await.unwrap().unwrap();
        assert_eq!(voucher.used_count, 3);
        assert_eq!(order_count(&svc).await, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redemptions_never_overdraw() {
        let svc = TestService::start_on_file().await;
        svc.give_points(CUSTOMER, 150).await;

        let mut request = pickup(vec![line(LATTE, 2)]);
        request.points_to_redeem = Some(100);
        let results = race(&svc, 2, request).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(loser.reason(), Some("insufficient_points"));

        let snapshot = svc.db.inner().users().points_snapshot(CUSTOMER).await.unwrap().unwrap();
        assert_eq!(snapshot.balance, 50);
        assert_eq!(snapshot.ledger_sum, 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_completions_all_earn() {
        let svc = TestService::start_on_file().await;

        let mut order_ids = Vec::new();
        for _ in 0..12 {
            let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line(LATTE, 1)]))
                .await
                .unwrap();
            for next in [OrderStatus::Confirmed, OrderStatus::Preparing, OrderStatus::Ready] {
                update_order_status(&svc.db, &svc.notify, &staff(), status(&summary.order_id, next))
                    .await
                    .unwrap();
            }
            order_ids.push(summary.order_id);
        }

        let mut tasks = tokio::task::JoinSet::new();
        for order_id in order_ids {
            let (db, notify) = (svc.db.clone(), svc.notify.clone());
            tasks.spawn(async move {
                update_order_status(&db, &notify, &staff(), status(&order_id, OrderStatus::Completed)).await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            assert_eq!(joined.unwrap().unwrap().status, OrderStatus::Completed);
        }

        let history = svc.db.inner().loyalty().history(CUSTOMER, 100).await.unwrap();
        assert_eq!(history.iter().filter(|e| e.kind == LedgerEntryKind::Earned).count(), 12);

        let snapshot = svc.db.inner().users().points_snapshot(CUSTOMER).await.unwrap().unwrap();
        assert_eq!(snapshot.balance, 120);
        assert_eq!(snapshot.ledger_sum, 120);
    }

    // -------------------------------------------------------------------------
    // Payment & reads
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_payment_toggle() {
        let svc = TestService::start().await;
        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line(LATTE, 1)]))
            .await
            .unwrap();

        let request = |to| UpdatePaymentRequest {
            order_id: summary.order_id.clone(),
            payment_status: to,
        };

        let err = update_payment_status(&svc.db, &customer(), request(PaymentStatus::Paid)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);

        let err = update_payment_status(&svc.db, &staff(), request(PaymentStatus::Refunded)).await.unwrap_err();
        assert_eq!(err.reason(), Some("invalid_payment_transition"));

        update_payment_status(&svc.db, &staff(), request(PaymentStatus::Paid)).await.unwrap();
        update_payment_status(&svc.db, &staff(), request(PaymentStatus::Refunded)).await.unwrap();

        let order = svc.db.inner().orders().get(&summary.order_id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Refunded);
        assert_eq!(order.payment_method, PaymentMethod::Qris);
    }

    #[tokio::test]
    async fn test_get_order_visibility() {
        let svc = TestService::start().await;
        let summary = create_order(&svc.db, &svc.config, &svc.notify, &customer(), pickup(vec![line(LATTE, 1)]))
            .await
            .unwrap();
        let request = || GetOrderRequest {
            order_id: summary.order_id.clone(),
        };

        assert_eq!(get_order(&svc.db, &customer(), request()).await.unwrap().items.len(), 1);
        assert!(get_order(&svc.db, &staff(), request()).await.is_ok());
        let err = get_order(&svc.db, &stranger(), request()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
        let err = get_order(&svc.db, &other_staff(), request()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }
}
