//! # Validation Module
//!
//! The single boundary where raw request bodies become typed domain objects.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Deserialization (serde)                                      │
//! │  ├── Unknown orderType / paymentMethod rejected                        │
//! │  └── Missing required fields rejected                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Ranges, lengths, duplicates                                       │
//! │  ├── Order-type shape (tableId / scheduledTime / deliveryAddress)      │
//! │  └── Produces ValidatedOrder + Fulfillment                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Orchestrator (facts from storage)                            │
//! │  ├── Outlet active, table free, product priceable                      │
//! │  └── Voucher and points rules                                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: Database constraints (UNIQUE, FK, conditional updates)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kopi_core::validation::validate_quantity;
//!
//! assert!(validate_quantity(2).is_ok());
//! assert!(validate_quantity(0).is_err());
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::error::ValidationError;
use crate::request::{
    CartLineRequest, CreateOrderRequest, Fulfillment, ValidatedLine, ValidatedOrder,
};
use crate::types::{DeliveryAddress, OrderType};
use crate::{MAX_CART_LINES, MAX_ITEM_QUANTITY, MAX_MODIFIER_QUANTITY, MAX_NOTE_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest voucher code accepted.
const MAX_VOUCHER_CODE_LENGTH: usize = 32;

// =============================================================================
// Order Request
// =============================================================================

/// Validates a create-order request into a [`ValidatedOrder`].
///
/// `now` and `pickup_lead` come from the caller so this stays pure.
///
/// ## Order-Type Shape
/// ```text
/// dine_in   needs tableId           rejects nothing else
/// pickup    needs scheduledTime ≥ now + lead, rejects tableId
/// delivery  needs deliveryAddress,  rejects tableId
/// ```
pub fn validate_order_request(
    req: CreateOrderRequest,
    now: DateTime<Utc>,
    pickup_lead: Duration,
) -> ValidationResult<ValidatedOrder> {
    let outlet_id = required_id("outletId", &req.outlet_id)?;
    let lines = validate_cart_lines(&req.items)?;

    let table_id = req
        .table_id
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if req.order_type != OrderType::DineIn && table_id.is_some() {
        return Err(ValidationError::NotApplicable {
            field: "tableId".to_string(),
            order_type: req.order_type.as_str().to_string(),
        });
    }

    let fulfillment = match req.order_type {
        OrderType::DineIn => {
            let table_id = table_id.ok_or_else(|| ValidationError::Required {
                field: "tableId".to_string(),
            })?;
            Fulfillment::DineIn {
                table_id: table_id.to_string(),
            }
        }
        OrderType::Pickup => {
            let scheduled_at = req.scheduled_time.ok_or_else(|| ValidationError::Required {
                field: "scheduledTime".to_string(),
            })?;
            validate_pickup_time(scheduled_at, now, pickup_lead)?;
            Fulfillment::Pickup { scheduled_at }
        }
        OrderType::Delivery => {
            let address = req
                .delivery_address
                .ok_or_else(|| ValidationError::Required {
                    field: "deliveryAddress".to_string(),
                })?;
            Fulfillment::Delivery {
                address: validate_delivery_address(address)?,
            }
        }
    };

    let voucher_code = req
        .voucher_code
        .as_deref()
        .map(normalize_voucher_code)
        .transpose()?
        .flatten();

    let points_to_redeem = validate_points_to_redeem(req.points_to_redeem)?;

    Ok(ValidatedOrder {
        outlet_id,
        fulfillment,
        lines,
        payment_method: req.payment_method,
        voucher_code,
        points_to_redeem,
    })
}

// =============================================================================
// Cart Lines
// =============================================================================

/// Validates cart lines. Shared by order creation and voucher checks.
pub fn validate_cart_lines(items: &[CartLineRequest]) -> ValidationResult<Vec<ValidatedLine>> {
    if items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    if items.len() > MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_CART_LINES as i64,
        });
    }

    items.iter().map(validate_cart_line).collect()
}

fn validate_cart_line(item: &CartLineRequest) -> ValidationResult<ValidatedLine> {
    let product_id = required_id("productId", &item.product_id)?;
    validate_quantity(item.quantity)?;

    let mut seen_values = HashSet::new();
    for selected in &item.selected_options {
        required_id("optionId", &selected.option_id)?;
        required_id("valueId", &selected.value_id)?;
        if !seen_values.insert((&selected.option_id, &selected.value_id)) {
            return Err(ValidationError::Duplicate {
                field: "selectedOptions".to_string(),
                value: selected.value_id.clone(),
            });
        }
    }

    let mut seen_modifiers = HashSet::new();
    for modifier in &item.selected_modifiers {
        required_id("modifierId", &modifier.modifier_id)?;
        if modifier.quantity <= 0 || modifier.quantity > MAX_MODIFIER_QUANTITY {
            return Err(ValidationError::OutOfRange {
                field: "modifier quantity".to_string(),
                min: 1,
                max: MAX_MODIFIER_QUANTITY,
            });
        }
        if !seen_modifiers.insert(&modifier.modifier_id) {
            return Err(ValidationError::Duplicate {
                field: "selectedModifiers".to_string(),
                value: modifier.modifier_id.clone(),
            });
        }
    }

    let notes = match item.notes.as_deref().map(str::trim) {
        Some(n) if n.chars().count() > MAX_NOTE_LENGTH => {
            return Err(ValidationError::TooLong {
                field: "notes".to_string(),
                max: MAX_NOTE_LENGTH,
            })
        }
        Some(n) if !n.is_empty() => Some(n.to_string()),
        _ => None,
    };

    Ok(ValidatedLine {
        product_id,
        quantity: item.quantity,
        options: item.selected_options.clone(),
        modifiers: item.selected_modifiers.clone(),
        notes,
    })
}

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (99)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Pickup must leave the bar at least `lead` to prepare the order.
pub fn validate_pickup_time(
    scheduled_at: DateTime<Utc>,
    now: DateTime<Utc>,
    lead: Duration,
) -> ValidationResult<()> {
    if scheduled_at < now + lead {
        return Err(ValidationError::TooSoon {
            field: "scheduledTime".to_string(),
            minutes: lead.num_minutes(),
        });
    }
    Ok(())
}

fn validate_delivery_address(address: DeliveryAddress) -> ValidationResult<DeliveryAddress> {
    let recipient_name = address.recipient_name.trim().to_string();
    let phone = address.phone.trim().to_string();
    let address_line = address.address_line.trim().to_string();

    if recipient_name.is_empty() {
        return Err(ValidationError::Required {
            field: "deliveryAddress.recipientName".to_string(),
        });
    }
    if address_line.is_empty() {
        return Err(ValidationError::Required {
            field: "deliveryAddress.addressLine".to_string(),
        });
    }
    if phone.is_empty() {
        return Err(ValidationError::Required {
            field: "deliveryAddress.phone".to_string(),
        });
    }
    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || c == '+' || c == '-' || c == ' ')
    {
        return Err(ValidationError::InvalidFormat {
            field: "deliveryAddress.phone".to_string(),
            reason: "must contain only digits, spaces, '+' and '-'".to_string(),
        });
    }

    Ok(DeliveryAddress {
        recipient_name,
        phone,
        address_line,
        ..address
    })
}

/// Trims and uppercases a voucher code. Blank codes mean "no voucher".
///
/// ## Example
/// ```rust
/// use kopi_core::validation::normalize_voucher_code;
///
/// assert_eq!(normalize_voucher_code(" hemat10 ").unwrap(), Some("HEMAT10".to_string()));
/// assert_eq!(normalize_voucher_code("  ").unwrap(), None);
/// ```
pub fn normalize_voucher_code(code: &str) -> ValidationResult<Option<String>> {
    let code = code.trim();
    if code.is_empty() {
        return Ok(None);
    }

    if code.len() > MAX_VOUCHER_CODE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "voucherCode".to_string(),
            max: MAX_VOUCHER_CODE_LENGTH,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "voucherCode".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(Some(code.to_ascii_uppercase()))
}

/// Zero means no redemption; negatives are rejected.
fn validate_points_to_redeem(points: Option<i64>) -> ValidationResult<Option<i64>> {
    match points {
        None | Some(0) => Ok(None),
        Some(p) if p < 0 => Err(ValidationError::MustBePositive {
            field: "pointsToRedeem".to_string(),
        }),
        Some(p) => Ok(Some(p)),
    }
}

fn required_id(field: &str, value: &str) -> ValidationResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if value.len() > 64 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 64,
        });
    }
    Ok(value.to_string())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{SelectedModifier, SelectedOption};
    use crate::types::PaymentMethod;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-18T03:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn line() -> CartLineRequest {
        CartLineRequest {
            product_id: "p-latte".to_string(),
            quantity: 2,
            selected_options: vec![],
            selected_modifiers: vec![],
            notes: None,
        }
    }

    fn request(order_type: OrderType) -> CreateOrderRequest {
        CreateOrderRequest {
            outlet_id: "outlet-1".to_string(),
            order_type,
            table_id: None,
            scheduled_time: None,
            delivery_address: None,
            items: vec![line()],
            payment_method: PaymentMethod::Cash,
            voucher_code: None,
            points_to_redeem: None,
        }
    }

    fn lead() -> Duration {
        Duration::minutes(20)
    }

    #[test]
    fn test_dine_in_needs_table() {
        let err = validate_order_request(request(OrderType::DineIn), now(), lead()).unwrap_err();
        assert_eq!(err.reason(), "required");

        let mut req = request(OrderType::DineIn);
        req.table_id = Some("t-1".to_string());
        let order = validate_order_request(req, now(), lead()).unwrap();
        assert_eq!(order.fulfillment.table_id(), Some("t-1"));
    }

    #[test]
    fn test_pickup_lead_time() {
        let mut req = request(OrderType::Pickup);
        req.scheduled_time = Some(now() + Duration::minutes(10));
        let err = validate_order_request(req, now(), lead()).unwrap_err();
        assert!(matches!(err, ValidationError::TooSoon { minutes: 20, .. }));

        let mut req = request(OrderType::Pickup);
        req.scheduled_time = Some(now() + Duration::minutes(20));
        let order = validate_order_request(req, now(), lead()).unwrap();
        assert_eq!(order.order_type(), OrderType::Pickup);
    }

    #[test]
    fn test_table_rejected_on_pickup() {
        let mut req = request(OrderType::Pickup);
        req.scheduled_time = Some(now() + Duration::hours(1));
        req.table_id = Some("t-1".to_string());
        let err = validate_order_request(req, now(), lead()).unwrap_err();
        assert_eq!(err.reason(), "not_applicable");
    }

    #[test]
    fn test_delivery_needs_address() {
        let err = validate_order_request(request(OrderType::Delivery), now(), lead()).unwrap_err();
        assert_eq!(err.reason(), "required");

        let mut req = request(OrderType::Delivery);
        req.delivery_address = Some(DeliveryAddress {
            recipient_name: " Sari ".to_string(),
            phone: "+62 812-0000".to_string(),
            address_line: "Jl. Kemang Raya 10".to_string(),
            city: Some("Jakarta".to_string()),
            postal_code: None,
            notes: None,
        });
        let order = validate_order_request(req, now(), lead()).unwrap();
        let address = order.fulfillment.delivery_address().unwrap();
        assert_eq!(address.recipient_name, "Sari");
    }

    #[test]
    fn test_empty_cart_rejected() {
        let mut req = request(OrderType::DineIn);
        req.table_id = Some("t-1".to_string());
        req.items.clear();
        let err = validate_order_request(req, now(), lead()).unwrap_err();
        assert!(matches!(err, ValidationError::Required { ref field } if field == "items"));
    }

    #[test]
    fn test_voucher_code_normalized() {
        let mut req = request(OrderType::DineIn);
        req.table_id = Some("t-1".to_string());
        req.voucher_code = Some(" kopi10 ".to_string());
        let order = validate_order_request(req, now(), lead()).unwrap();
        assert_eq!(order.voucher_code.as_deref(), Some("KOPI10"));

        assert!(normalize_voucher_code("bad code!").is_err());
    }

    #[test]
    fn test_points_to_redeem() {
        assert_eq!(validate_points_to_redeem(Some(0)).unwrap(), None);
        assert_eq!(validate_points_to_redeem(Some(100)).unwrap(), Some(100));
        assert!(validate_points_to_redeem(Some(-5)).is_err());
    }

    #[test]
    fn test_duplicate_selections_rejected() {
        let mut item = line();
        item.selected_options = vec![
            SelectedOption {
                option_id: "size".to_string(),
                value_id: "large".to_string(),
            },
            SelectedOption {
                option_id: "size".to_string(),
                value_id: "large".to_string(),
            },
        ];
        assert_eq!(
            validate_cart_lines(&[item]).unwrap_err().reason(),
            "duplicate"
        );

        let mut item = line();
        item.selected_modifiers = vec![
            SelectedModifier {
                modifier_id: "shot".to_string(),
                quantity: 1,
            },
            SelectedModifier {
                modifier_id: "shot".to_string(),
                quantity: 2,
            },
        ];
        assert!(validate_cart_lines(&[item]).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(99).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(100).is_err());
    }

    #[test]
    fn test_blank_notes_dropped() {
        let mut item = line();
        item.notes = Some("   ".to_string());
        let lines = validate_cart_lines(&[item]).unwrap();
        assert_eq!(lines[0].notes, None);
    }
}
