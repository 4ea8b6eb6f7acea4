//! Shared fixture for command and protocol tests.
//!
//! One outlet with two tables, a small catalog, three tiers and an enabled
//! loyalty program:
//!
//! ```text
//! kemang-01 ── t1, t2          latte 35000 (coffee)    bronze    0..500
//! senopati-01                    size: large +5000     silver  500..2000
//!                                shot: +6000           gold   2000..
//! u1 customer   u2 customer    croissant 20000 (pastry)
//! s1 staff@kemang   s2 staff@senopati   a1 admin
//!
//! 10 points per item, 1 point = Rp100, redeem 50..=1000, at most 50% of bill
//! ```

use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::commands::loyalty::apply_tier_tx;
use crate::notify::testing::{FailingSink, RecordingSink};
use crate::notify::{NotificationDispatcher, NotificationHandle, NotificationSink, StoreNotificationSink};
use crate::state::{ConfigState, DbState};
use kopi_core::request::{CartLineRequest, CreateOrderRequest, UpdateStatusRequest};
use kopi_core::voucher::{CustomerEligibility, DiscountKind};
use kopi_core::{
    CallerContext, DeliveryAddress, LedgerEntryKind, LoyaltySetting, LoyaltyTransaction,
    MembershipTier, Modifier, Money, OptionValue, OrderEvent, OrderStatus, OrderType,
    PaymentMethod, Product, ProductOption, Role, User, Voucher,
};
use kopi_db::repository::{loyalty as loyalty_repo, user as user_repo};
use kopi_db::{Database, DbConfig};

pub const OUTLET: &str = "kemang-01";
pub const OTHER_OUTLET: &str = "senopati-01";
pub const TABLE: &str = "t1";
pub const CUSTOMER: &str = "u1";
pub const LATTE: &str = "latte";
pub const CROISSANT: &str = "croissant";

// =============================================================================
// Service
// =============================================================================

pub struct TestService {
    pub db: DbState,
    pub config: ConfigState,
    pub notify: NotificationHandle,
    dispatcher: JoinHandle<()>,
    events: Arc<Mutex<Vec<OrderEvent>>>,
}

impl TestService {
    /// In-memory database, default config, recording sink.
    pub async fn start() -> Self {
        Self::start_with(ConfigState::default()).await
    }

    pub async fn start_with(config: ConfigState) -> Self {
        let db = seeded(Database::new(DbConfig::in_memory()).await.unwrap()).await;
        let sink = RecordingSink::default();
        let events = sink.events.clone();
        Self::assemble(db, config, Box::new(sink), events)
    }

    /// Every notification delivery fails.
    pub async fn start_failing() -> Self {
        let db = seeded(Database::new(DbConfig::in_memory()).await.unwrap()).await;
        Self::assemble(db, ConfigState::default(), Box::new(FailingSink), Default::default())
    }

    /// Notifications go to the inbox table.
    pub async fn start_with_store() -> Self {
        let db = seeded(Database::new(DbConfig::in_memory()).await.unwrap()).await;
        let sink = StoreNotificationSink::new(db.clone());
        Self::assemble(db, ConfigState::default(), Box::new(sink), Default::default())
    }

    /// File-backed database with a real pool, for concurrent writers.
    pub async fn start_on_file() -> Self {
        let path = std::env::temp_dir().join(format!("kopi-test-{}.db", Uuid::new_v4()));
        let config = DbConfig::new(path).max_connections(4);
        let db = seeded(Database::new(config).await.unwrap()).await;
        let sink = RecordingSink::default();
        let events = sink.events.clone();
        Self::assemble(db, ConfigState::default(), Box::new(sink), events)
    }

    fn assemble(
        db: Database,
        config: ConfigState,
        sink: Box<dyn NotificationSink>,
        events: Arc<Mutex<Vec<OrderEvent>>>,
    ) -> Self {
        let (dispatcher, notify) = NotificationDispatcher::new(sink, 64);
        TestService {
            db: DbState::new(db),
            config,
            notify,
            dispatcher: tokio::spawn(dispatcher.run()),
            events,
        }
    }

    /// Stops the dispatcher and returns what the recording sink saw.
    pub async fn finish(self) -> Vec<OrderEvent> {
        self.notify.shutdown().await.unwrap();
        self.dispatcher.await.unwrap();
        let events = self.events.lock().unwrap().clone();
        events
    }

    pub async fn add_voucher(&self, voucher: Voucher) {
        self.db.inner().vouchers().insert(&voucher).await.unwrap();
    }

    /// Credits points with a matching ledger entry and tier.
    pub async fn give_points(&self, user_id: &str, points: i64) {
        let database = self.db.inner();
        let tiers = database.loyalty().tiers().await.unwrap();

        let mut tx = database.begin().await.unwrap();
        let balance = user_repo::credit_points_tx(&mut tx, user_id, points).await.unwrap();
        loyalty_repo::append_entry_tx(
            &mut tx,
            &LoyaltyTransaction {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                order_id: None,
                kind: LedgerEntryKind::Earned,
                points,
                balance_after: balance,
                description: "Welcome bonus".to_string(),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        apply_tier_tx(&mut tx, user_id, &tiers, balance).await.unwrap();
        tx.commit().await.unwrap();
    }
}

pub async fn tier_of(svc: &TestService, user_id: &str) -> Option<String> {
    svc.db.inner().users().get(user_id).await.unwrap().unwrap().tier_id
}

pub async fn order_count(svc: &TestService) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(svc.db.inner().pool())
        .await
        .unwrap()
}

// =============================================================================
// Seed Data
// =============================================================================

async fn seeded(db: Database) -> Database {
    db.outlets().insert_outlet(OUTLET, "Kopi Kemang", true).await.unwrap();
    db.outlets().insert_outlet(OTHER_OUTLET, "Kopi Senopati", true).await.unwrap();
    db.outlets().insert_table(TABLE, OUTLET, "T1").await.unwrap();
    db.outlets().insert_table("t2", OUTLET, "T2").await.unwrap();

    for (id, role, outlet) in [
        (CUSTOMER, Role::Customer, None),
        ("u2", Role::Customer, None),
        ("s1", Role::Staff, Some(OUTLET)),
        ("s2", Role::Staff, Some(OTHER_OUTLET)),
        ("a1", Role::Admin, None),
    ] {
        db.users()
            .insert(&User {
                id: id.to_string(),
                name: format!("User {}", id),
                role,
                outlet_id: outlet.map(str::to_string),
                points_balance: 0,
                tier_id: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    db.catalog().insert_category("coffee", "Coffee").await.unwrap();
    db.catalog().insert_category("pastry", "Pastry").await.unwrap();
    db.catalog().insert_product(&latte()).await.unwrap();
    db.catalog()
        .insert_product(&Product {
            id: CROISSANT.to_string(),
            category_id: "pastry".to_string(),
            name: "Butter Croissant".to_string(),
            base_price: Money::from_rupiah(20_000),
            is_available: true,
            options: vec![],
            modifiers: vec![],
        })
        .await
        .unwrap();

    for (level, id, min, max) in [
        (1, "bronze", 0, Some(500)),
        (2, "silver", 500, Some(2_000)),
        (3, "gold", 2_000, None),
    ] {
        db.loyalty()
            .insert_tier(&MembershipTier {
                id: id.to_string(),
                level,
                name: id.to_string(),
                min_points: min,
                max_points: max,
                benefits: None,
            })
            .await
            .unwrap();
    }

    db.loyalty()
        .insert_setting(
            &LoyaltySetting {
                id: "default".to_string(),
                is_enabled: true,
                points_per_item: 10,
                point_value_idr: 100,
                min_redeem_points: 50,
                max_redeem_points: Some(1_000),
                max_redeem_percentage: 50,
            },
            Utc::now(),
        )
        .await
        .unwrap();

    db
}

fn latte() -> Product {
    Product {
        id: LATTE.to_string(),
        category_id: "coffee".to_string(),
        name: "Caffe Latte".to_string(),
        base_price: Money::from_rupiah(35_000),
        is_available: true,
        options: vec![ProductOption {
            id: "latte-size".to_string(),
            name: "Size".to_string(),
            min_select: 0,
            max_select: 1,
            values: vec![
                OptionValue {
                    id: "latte-regular".to_string(),
                    name: "Regular".to_string(),
                    price_delta: Money::zero(),
                },
                OptionValue {
                    id: "latte-large".to_string(),
                    name: "Large".to_string(),
                    price_delta: Money::from_rupiah(5_000),
                },
            ],
        }],
        modifiers: vec![Modifier {
            id: "latte-shot".to_string(),
            name: "Extra Shot".to_string(),
            price: Money::from_rupiah(6_000),
            is_available: true,
        }],
    }
}

// =============================================================================
// Callers
// =============================================================================

fn caller(user_id: &str, role: Role, outlet_id: Option<&str>) -> CallerContext {
    CallerContext {
        user_id: user_id.to_string(),
        role,
        outlet_id: outlet_id.map(str::to_string),
    }
}

pub fn customer() -> CallerContext {
    caller(CUSTOMER, Role::Customer, None)
}

/// A customer who owns none of the fixture's orders.
pub fn stranger() -> CallerContext {
    caller("u2", Role::Customer, None)
}

pub fn staff() -> CallerContext {
    caller("s1", Role::Staff, Some(OUTLET))
}

pub fn other_staff() -> CallerContext {
    caller("s2", Role::Staff, Some(OTHER_OUTLET))
}

pub fn admin() -> CallerContext {
    caller("a1", Role::Admin, None)
}

// =============================================================================
// Requests
// =============================================================================

pub fn line(product_id: &str, quantity: i64) -> CartLineRequest {
    CartLineRequest {
        product_id: product_id.to_string(),
        quantity,
        selected_options: vec![],
        selected_modifiers: vec![],
        notes: None,
    }
}

fn order_request(order_type: OrderType, items: Vec<CartLineRequest>) -> CreateOrderRequest {
    CreateOrderRequest {
        outlet_id: OUTLET.to_string(),
        order_type,
        table_id: None,
        scheduled_time: None,
        delivery_address: None,
        items,
        payment_method: PaymentMethod::Qris,
        voucher_code: None,
        points_to_redeem: None,
    }
}

/// Pickup an hour from now.
pub fn pickup(items: Vec<CartLineRequest>) -> CreateOrderRequest {
    CreateOrderRequest {
        scheduled_time: Some(Utc::now() + Duration::hours(1)),
        ..order_request(OrderType::Pickup, items)
    }
}

pub fn dine_in(table_id: &str, items: Vec<CartLineRequest>) -> CreateOrderRequest {
    CreateOrderRequest {
        table_id: Some(table_id.to_string()),
        ..order_request(OrderType::DineIn, items)
    }
}

pub fn delivery(items: Vec<CartLineRequest>) -> CreateOrderRequest {
    CreateOrderRequest {
        delivery_address: Some(DeliveryAddress {
            recipient_name: "Ayu".to_string(),
            phone: "081234567890".to_string(),
            address_line: "Jl. Kemang Raya 10".to_string(),
            city: Some("Jakarta".to_string()),
            postal_code: None,
            notes: None,
        }),
        ..order_request(OrderType::Delivery, items)
    }
}

pub fn status(order_id: &str, new_status: OrderStatus) -> UpdateStatusRequest {
    UpdateStatusRequest {
        order_id: order_id.to_string(),
        new_status,
    }
}

// =============================================================================
// Vouchers
// =============================================================================

pub fn percent_voucher(id: &str, code: &str, percent: i64, cap: Option<i64>) -> Voucher {
    Voucher {
        id: id.to_string(),
        code: code.to_string(),
        name: format!("{}% off", percent),
        discount: DiscountKind::Percentage {
            percent,
            max_discount: cap.map(Money::from_rupiah),
        },
        min_order: Money::zero(),
        starts_at: None,
        ends_at: None,
        usage_limit: None,
        used_count: 0,
        per_user_limit: None,
        order_types: vec![],
        product_ids: vec![],
        category_ids: vec![],
        eligibility: CustomerEligibility::All,
        eligible_user_ids: vec![],
        points_cost: None,
        is_redeemable: false,
        is_active: true,
    }
}

/// Rp15.000 off, claimable for `cost` points.
pub fn reward_voucher(id: &str, code: &str, cost: i64) -> Voucher {
    Voucher {
        name: "Free drink".to_string(),
        discount: DiscountKind::Fixed {
            amount: Money::from_rupiah(15_000),
        },
        points_cost: Some(cost),
        is_redeemable: true,
        ..percent_voucher(id, code, 0, None)
    }
}
