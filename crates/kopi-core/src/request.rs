//! # Requests
//!
//! Raw request bodies as they arrive from the customer app, and the typed
//! forms they become after [`crate::validation`].
//!
//! ```text
//! CreateOrderRequest ──validate_order_request──► ValidatedOrder
//!   orderType + tableId?                           fulfillment: Fulfillment
//!   scheduledTime? deliveryAddress?                  DineIn { table_id }
//!   items[]                                          Pickup { scheduled_at }
//!                                                    Delivery { address }
//!                                                  lines: Vec<ValidatedLine>
//! ```
//!
//! Deeper layers only ever see the validated forms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{DeliveryAddress, OrderStatus, OrderType, PaymentMethod, PaymentStatus};

// =============================================================================
// Raw Requests
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub outlet_id: String,
    pub order_type: OrderType,
    #[serde(default)]
    pub table_id: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivery_address: Option<DeliveryAddress>,
    pub items: Vec<CartLineRequest>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub voucher_code: Option<String>,
    #[serde(default)]
    pub points_to_redeem: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartLineRequest {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub selected_options: Vec<SelectedOption>,
    #[serde(default)]
    pub selected_modifiers: Vec<SelectedModifier>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SelectedOption {
    pub option_id: String,
    pub value_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SelectedModifier {
    pub modifier_id: String,
    #[serde(default = "default_modifier_quantity")]
    pub quantity: i64,
}

fn default_modifier_quantity() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub order_id: String,
    pub new_status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentRequest {
    pub order_id: String,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct GetOrderRequest {
    pub order_id: String,
}

/// Speculative voucher check from the cart screen. No writes.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CheckVoucherRequest {
    pub code: String,
    pub order_type: OrderType,
    pub items: Vec<CartLineRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRewardRequest {
    pub voucher_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PointsHistoryRequest {
    #[serde(default)]
    pub limit: Option<i64>,
}

// =============================================================================
// Validated Forms
// =============================================================================

/// How the order reaches the customer. Each variant carries exactly the
/// data its order type needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fulfillment {
    DineIn { table_id: String },
    Pickup { scheduled_at: DateTime<Utc> },
    Delivery { address: DeliveryAddress },
}

impl Fulfillment {
    pub fn order_type(&self) -> OrderType {
        match self {
            Fulfillment::DineIn { .. } => OrderType::DineIn,
            Fulfillment::Pickup { .. } => OrderType::Pickup,
            Fulfillment::Delivery { .. } => OrderType::Delivery,
        }
    }

    pub fn table_id(&self) -> Option<&str> {
        match self {
            Fulfillment::DineIn { table_id } => Some(table_id),
            _ => None,
        }
    }

    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Fulfillment::Pickup { scheduled_at } => Some(*scheduled_at),
            _ => None,
        }
    }

    pub fn delivery_address(&self) -> Option<&DeliveryAddress> {
        match self {
            Fulfillment::Delivery { address } => Some(address),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLine {
    pub product_id: String,
    pub quantity: i64,
    pub options: Vec<SelectedOption>,
    pub modifiers: Vec<SelectedModifier>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidatedOrder {
    pub outlet_id: String,
    pub fulfillment: Fulfillment,
    pub lines: Vec<ValidatedLine>,
    pub payment_method: PaymentMethod,
    /// Uppercased and trimmed.
    pub voucher_code: Option<String>,
    /// Always positive when present.
    pub points_to_redeem: Option<i64>,
}

impl ValidatedOrder {
    #[inline]
    pub fn order_type(&self) -> OrderType {
        self.fulfillment.order_type()
    }
}
