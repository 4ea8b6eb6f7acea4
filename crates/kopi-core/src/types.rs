//! # Domain Types
//!
//! Core domain types used throughout the Kopi order platform.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │     Order       │   │   OrderItem     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  base_price     │   │  order_number   │   │  unit_price     │       │
//! │  │  options[]      │   │  status         │   │  (snapshot)     │       │
//! │  │  modifiers[]    │   │  total          │   │  options[]      │       │
//! │  └─────────────────┘   └─────────────────┘   │  modifiers[]    │       │
//! │                                              └─────────────────┘       │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   OrderType     │   │  OrderStatus    │   │  CallerContext  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  DineIn         │   │  Pending ──►    │   │  user_id        │       │
//! │  │  Pickup         │   │  ... Completed  │   │  role           │       │
//! │  │  Delivery       │   │  Cancelled      │   │  outlet_id      │       │
//! │  └─────────────────┘   │  Rejected       │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! Order items copy the product name and every resolved price at order time.
//! Later catalog edits never change a historical order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so the flat Indonesian VAT of 11% is 1100 bps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// The flat 11% rate applied to every order.
    pub const STANDARD: TaxRate = TaxRate(1100);

    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::STANDARD
    }
}

// =============================================================================
// Callers
// =============================================================================

/// Role of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Staff,
    Admin,
}

/// The already-authenticated identity behind a request.
///
/// Session verification happens upstream; this value is trusted as given.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CallerContext {
    pub user_id: String,
    pub role: Role,
    /// Assigned outlet for staff accounts.
    #[serde(default)]
    pub outlet_id: Option<String>,
}

impl CallerContext {
    /// Admins manage every outlet; staff only their assigned one.
    pub fn manages_outlet(&self, outlet_id: &str) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Staff => self.outlet_id.as_deref() == Some(outlet_id),
            Role::Customer => false,
        }
    }

    /// Owner, staff of the order's outlet, or admin.
    pub fn can_view_order(&self, order: &Order) -> bool {
        self.user_id == order.user_id || self.manages_outlet(&order.outlet_id)
    }
}

// =============================================================================
// Order Type
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    DineIn,
    Pickup,
    Delivery,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::DineIn => "dine_in",
            OrderType::Pickup => "pickup",
            OrderType::Delivery => "delivery",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dine_in" => Some(OrderType::DineIn),
            "pickup" => Some(OrderType::Pickup),
            "delivery" => Some(OrderType::Delivery),
            _ => None,
        }
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// Lifecycle status of an order.
///
/// ## State Machine
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                                                                         │
/// │  Pending ──► Confirmed ──► Preparing ──► Ready ──► Completed            │
/// │     │            │             │           │       (earns points)       │
/// │     │            └─────────────┴───────────┴──► Cancelled              │
/// │     ├──────────────────────────────────────────► Cancelled              │
/// │     └──────────────────────────────────────────► Rejected               │
/// │                                                                         │
/// │  Completed, Cancelled and Rejected are terminal.                       │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Completed,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    /// Whether `next` is a legal move from this status.
    ///
    /// Repeating the current status is not a transition; callers treat it
    /// as a no-op before asking.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Confirmed)
            | (Confirmed, Preparing)
            | (Preparing, Ready)
            | (Ready, Completed)
            | (Pending, Rejected) => true,
            (current, Cancelled) => !current.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Qris,
    EWallet,
}

/// Manually toggled payment flag. There is no gateway behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

impl PaymentStatus {
    /// `unpaid ↔ paid`, and `refunded` only from `paid`.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!((self, next), (Unpaid, Paid) | (Paid, Unpaid) | (Paid, Refunded))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Unpaid
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A product with everything needed to price a line.
///
/// Read from the catalog at transaction time and treated as immutable for
/// the rest of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub category_id: String,
    pub name: String,
    pub base_price: Money,
    pub is_available: bool,
    pub options: Vec<ProductOption>,
    pub modifiers: Vec<Modifier>,
}

impl Product {
    pub fn option(&self, option_id: &str) -> Option<&ProductOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    pub fn modifier(&self, modifier_id: &str) -> Option<&Modifier> {
        self.modifiers.iter().find(|m| m.id == modifier_id)
    }
}

/// A choice group on a product (Size, Milk, Sugar level).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProductOption {
    pub id: String,
    pub name: String,
    /// Minimum number of values to choose. 1 makes the option required.
    pub min_select: i64,
    pub max_select: i64,
    pub values: Vec<OptionValue>,
}

impl ProductOption {
    pub fn value(&self, value_id: &str) -> Option<&OptionValue> {
        self.values.iter().find(|v| v.id == value_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OptionValue {
    pub id: String,
    pub name: String,
    /// Added to the base price. May be zero.
    pub price_delta: Money,
}

/// An optional add-on (extra shot, whipped cream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Modifier {
    pub id: String,
    pub name: String,
    pub price: Money,
    pub is_available: bool,
}

// =============================================================================
// Outlets & Users
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Outlet {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

/// A dine-in table. Occupancy is the only mutable fact the order flow uses.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DiningTable {
    pub id: String,
    pub outlet_id: String,
    pub label: String,
    pub is_occupied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub outlet_id: Option<String>,
    /// Cached sum of the user's ledger entries.
    pub points_balance: i64,
    /// Cached tier, recomputed from `points_balance`.
    pub tier_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    pub recipient_name: String,
    pub phone: String,
    pub address_line: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A persisted order with its full monetary breakdown.
///
/// `total = subtotal + tax - discount - points_discount + delivery_fee`,
/// never negative.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub user_id: String,
    pub outlet_id: String,
    pub table_id: Option<String>,
    pub order_type: OrderType,
    pub status: OrderStatus,
    #[ts(as = "Option<String>")]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub delivery_address: Option<DeliveryAddress>,
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub points_discount: Money,
    pub points_redeemed: i64,
    pub delivery_fee: Money,
    pub total: Money,
    pub voucher_id: Option<String>,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// A line item, frozen at order time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// Product name at time of order (frozen).
    pub product_name: String,
    pub quantity: i64,
    /// Base price plus option deltas plus modifiers, per unit.
    pub unit_price: Money,
    /// `unit_price × quantity`.
    pub line_amount: Money,
    pub notes: Option<String>,
    pub options: Vec<OrderItemOption>,
    pub modifiers: Vec<OrderItemModifier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemOption {
    pub option_id: String,
    pub option_name: String,
    pub value_id: String,
    pub value_name: String,
    pub price_delta: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemModifier {
    pub modifier_id: String,
    pub modifier_name: String,
    pub quantity: i64,
    pub unit_price: Money,
}

/// An order together with its line items.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// What `create_order` returns to the customer app.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub points_discount: Money,
    pub delivery_fee: Money,
    pub total: Money,
    /// Balance after redemption, when points were redeemed.
    pub points_balance: Option<i64>,
}

impl OrderSummary {
    pub fn from_order(order: &Order, points_balance: Option<i64>) -> Self {
        OrderSummary {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            status: order.status,
            subtotal: order.subtotal,
            tax: order.tax,
            discount: order.discount,
            points_discount: order.points_discount,
            delivery_fee: order.delivery_fee,
            total: order.total,
            points_balance,
        }
    }
}

// =============================================================================
// User Vouchers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum VoucherSource {
    /// Consumed by an order.
    Order,
    /// Claimed from the reward catalog with points.
    Reward,
}

/// One user's use of one voucher, or one reward claim.
///
/// A reward claim has `order_id = None` until an order consumes it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UserVoucher {
    pub id: String,
    pub user_id: String,
    pub voucher_id: String,
    pub order_id: Option<String>,
    pub source: VoucherSource,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Events & Notifications
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderCreated,
    OrderStatusChanged,
    PointsEarned,
}

/// Events emitted after a commit. Delivery is best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    OrderCreated {
        user_id: String,
        order_id: String,
        order_number: String,
        total: Money,
    },
    OrderStatusChanged {
        user_id: String,
        order_id: String,
        order_number: String,
        status: OrderStatus,
    },
    PointsEarned {
        user_id: String,
        order_id: String,
        order_number: String,
        points: i64,
    },
}

impl OrderEvent {
    pub fn kind(&self) -> NotificationKind {
        match self {
            OrderEvent::OrderCreated { .. } => NotificationKind::OrderCreated,
            OrderEvent::OrderStatusChanged { .. } => NotificationKind::OrderStatusChanged,
            OrderEvent::PointsEarned { .. } => NotificationKind::PointsEarned,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            OrderEvent::OrderCreated { user_id, .. }
            | OrderEvent::OrderStatusChanged { user_id, .. }
            | OrderEvent::PointsEarned { user_id, .. } => user_id,
        }
    }

    pub fn order_id(&self) -> &str {
        match self {
            OrderEvent::OrderCreated { order_id, .. }
            | OrderEvent::OrderStatusChanged { order_id, .. }
            | OrderEvent::PointsEarned { order_id, .. } => order_id,
        }
    }

    /// Inbox title shown in the customer app.
    pub fn title(&self) -> String {
        match self {
            OrderEvent::OrderCreated { order_number, .. } => {
                format!("Order {} received", order_number)
            }
            OrderEvent::OrderStatusChanged {
                order_number,
                status,
                ..
            } => format!("Order {} is {}", order_number, status),
            OrderEvent::PointsEarned { points, .. } => format!("You earned {} points", points),
        }
    }

    pub fn body(&self) -> String {
        match self {
            OrderEvent::OrderCreated { total, .. } => {
                format!("We have your order. Total to pay: {}.", total)
            }
            OrderEvent::OrderStatusChanged { status, .. } => match status {
                OrderStatus::Ready => "Your order is ready.".to_string(),
                OrderStatus::Completed => "Thanks for ordering. Enjoy!".to_string(),
                OrderStatus::Cancelled => "Your order was cancelled.".to_string(),
                OrderStatus::Rejected => "The outlet could not accept your order.".to_string(),
                _ => format!("Your order is now {}.", status),
            },
            OrderEvent::PointsEarned {
                points,
                order_number,
                ..
            } => format!("{} points were added for order {}.", points, order_number),
        }
    }
}

/// A row in a user's in-app inbox.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub order_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
