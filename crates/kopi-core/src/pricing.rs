//! # Pricing
//!
//! Line prices and order totals.
//!
//! ```text
//! unit  = base_price + Σ option value deltas + Σ modifier price × modifier qty
//! line  = unit × quantity
//! subtotal = Σ line
//! tax   = round_half_up(subtotal × 11%)
//! total = subtotal + tax − discount − points_discount + delivery_fee   (≥ 0)
//! ```
//!
//! Selections are checked against the product being ordered: an option
//! value declared under the wrong option, or a modifier from another
//! product, rejects the line.

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult, PricingError};
use crate::money::Money;
use crate::request::ValidatedLine;
use crate::types::{OrderItemModifier, OrderItemOption, Product, TaxRate};
use crate::voucher::CartLine;

// =============================================================================
// Line Pricing
// =============================================================================

/// A line with every price resolved, ready to persist as an order item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: String,
    pub product_name: String,
    pub category_id: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_amount: Money,
    pub notes: Option<String>,
    pub options: Vec<OrderItemOption>,
    pub modifiers: Vec<OrderItemModifier>,
}

impl PricedLine {
    /// The view of this line the voucher rules need.
    pub fn cart_line(&self) -> CartLine {
        CartLine {
            product_id: self.product_id.clone(),
            category_id: self.category_id.clone(),
            line_amount: self.line_amount,
            quantity: self.quantity,
        }
    }
}

/// Prices one validated line against its product.
///
/// ## Errors
/// - `ProductUnavailable`: product switched off
/// - `UnknownOption` / `UnknownOptionValue`: selection not on this product
/// - `UnknownModifier` / `UnavailableModifier`
/// - `OptionSelectionCount`: too few or too many values for an option
pub fn price_line(product: &Product, line: &ValidatedLine) -> Result<PricedLine, PricingError> {
    if !product.is_available {
        return Err(PricingError::ProductUnavailable {
            product_id: product.id.clone(),
        });
    }

    let mut unit_price = product.base_price;
    let mut options = Vec::with_capacity(line.options.len());
    let mut selected_per_option: HashMap<&str, i64> = HashMap::new();

    for selected in &line.options {
        let option = product
            .option(&selected.option_id)
            .ok_or_else(|| PricingError::UnknownOption {
                product_id: product.id.clone(),
                option_id: selected.option_id.clone(),
            })?;
        let value = option
            .value(&selected.value_id)
            .ok_or_else(|| PricingError::UnknownOptionValue {
                option_id: option.id.clone(),
                value_id: selected.value_id.clone(),
            })?;

        *selected_per_option.entry(option.id.as_str()).or_insert(0) += 1;
        unit_price += value.price_delta;
        options.push(OrderItemOption {
            option_id: option.id.clone(),
            option_name: option.name.clone(),
            value_id: value.id.clone(),
            value_name: value.name.clone(),
            price_delta: value.price_delta,
        });
    }

    for option in &product.options {
        let selected = selected_per_option
            .get(option.id.as_str())
            .copied()
            .unwrap_or(0);
        if selected < option.min_select || selected > option.max_select {
            return Err(PricingError::OptionSelectionCount {
                option_id: option.id.clone(),
                min: option.min_select,
                max: option.max_select,
                selected,
            });
        }
    }

    let mut modifiers = Vec::with_capacity(line.modifiers.len());
    for selected in &line.modifiers {
        let modifier = product
            .modifier(&selected.modifier_id)
            .ok_or_else(|| PricingError::UnknownModifier {
                product_id: product.id.clone(),
                modifier_id: selected.modifier_id.clone(),
            })?;
        if !modifier.is_available {
            return Err(PricingError::UnavailableModifier {
                modifier_id: modifier.id.clone(),
            });
        }

        unit_price += modifier.price.multiply_quantity(selected.quantity);
        modifiers.push(OrderItemModifier {
            modifier_id: modifier.id.clone(),
            modifier_name: modifier.name.clone(),
            quantity: selected.quantity,
            unit_price: modifier.price,
        });
    }

    Ok(PricedLine {
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        category_id: product.category_id.clone(),
        quantity: line.quantity,
        unit_price,
        line_amount: unit_price.multiply_quantity(line.quantity),
        notes: line.notes.clone(),
        options,
        modifiers,
    })
}

/// Sum of line amounts.
pub fn cart_subtotal(lines: &[PricedLine]) -> Money {
    lines.iter().map(|l| l.line_amount).sum()
}

// =============================================================================
// Order Totals
// =============================================================================

/// The monetary breakdown of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub points_discount: Money,
    pub delivery_fee: Money,
    pub total: Money,
}

impl OrderTotals {
    /// Computes the total, rejecting a negative result before anything is
    /// persisted.
    ///
    /// ## Example
    /// ```rust
    /// use kopi_core::money::Money;
    /// use kopi_core::pricing::OrderTotals;
    /// use kopi_core::types::TaxRate;
    ///
    /// let totals = OrderTotals::compute(
    ///     Money::from_rupiah(70_000),
    ///     TaxRate::STANDARD,
    ///     Money::zero(),
    ///     Money::zero(),
    ///     Money::zero(),
    /// ).unwrap();
    /// assert_eq!(totals.tax.rupiah(), 7_700);
    /// assert_eq!(totals.total.rupiah(), 77_700);
    /// ```
    pub fn compute(
        subtotal: Money,
        tax_rate: TaxRate,
        discount: Money,
        points_discount: Money,
        delivery_fee: Money,
    ) -> CoreResult<Self> {
        let tax = subtotal.calculate_tax(tax_rate);
        let total = subtotal + tax - discount - points_discount + delivery_fee;

        if total.is_negative() {
            return Err(CoreError::NegativeTotal { total });
        }

        Ok(OrderTotals {
            subtotal,
            tax,
            discount,
            points_discount,
            delivery_fee,
            total,
        })
    }
}

/// The amount points may pay towards: subtotal plus tax, after the voucher.
pub fn bill_before_points(subtotal: Money, tax_rate: TaxRate, discount: Money) -> Money {
    subtotal + subtotal.calculate_tax(tax_rate) - discount
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{SelectedModifier, SelectedOption};
    use crate::types::{Modifier, OptionValue, ProductOption};

    fn latte() -> Product {
        Product {
            id: "p-latte".into(),
            category_id: "c-coffee".into(),
            name: "Caffe Latte".into(),
            base_price: Money::from_rupiah(35_000),
            is_available: true,
            options: vec![ProductOption {
                id: "o-size".into(),
                name: "Size".into(),
                min_select: 1,
                max_select: 1,
                values: vec![
                    OptionValue {
                        id: "v-regular".into(),
                        name: "Regular".into(),
                        price_delta: Money::zero(),
                    },
                    OptionValue {
                        id: "v-large".into(),
                        name: "Large".into(),
                        price_delta: Money::from_rupiah(5_000),
                    },
                ],
            }],
            modifiers: vec![
                Modifier {
                    id: "m-shot".into(),
                    name: "Extra Shot".into(),
                    price: Money::from_rupiah(6_000),
                    is_available: true,
                },
                Modifier {
                    id: "m-cream".into(),
                    name: "Whipped Cream".into(),
                    price: Money::from_rupiah(4_000),
                    is_available: false,
                },
            ],
        }
    }

    fn line(value: &str, modifiers: Vec<(&str, i64)>, quantity: i64) -> ValidatedLine {
        ValidatedLine {
            product_id: "p-latte".into(),
            quantity,
            options: vec![SelectedOption {
                option_id: "o-size".into(),
                value_id: value.into(),
            }],
            modifiers: modifiers
                .into_iter()
                .map(|(id, qty)| SelectedModifier {
                    modifier_id: id.into(),
                    quantity: qty,
                })
                .collect(),
            notes: None,
        }
    }

    #[test]
    fn test_unit_price_formula() {
        // 35.000 + 5.000 + 2 × 6.000 = 52.000; × 3 = 156.000
        let priced = price_line(&latte(), &line("v-large", vec![("m-shot", 2)], 3)).unwrap();
        assert_eq!(priced.unit_price.rupiah(), 52_000);
        assert_eq!(priced.line_amount.rupiah(), 156_000);
        assert_eq!(priced.options[0].value_name, "Large");
        assert_eq!(priced.modifiers[0].unit_price.rupiah(), 6_000);
    }

    #[test]
    fn test_two_lattes_scenario() {
        let priced = price_line(&latte(), &line("v-regular", vec![], 2)).unwrap();
        let subtotal = cart_subtotal(&[priced]);
        let totals = OrderTotals::compute(
            subtotal,
            TaxRate::STANDARD,
            Money::zero(),
            Money::zero(),
            Money::zero(),
        )
        .unwrap();
        assert_eq!(totals.subtotal.rupiah(), 70_000);
        assert_eq!(totals.tax.rupiah(), 7_700);
        assert_eq!(totals.total.rupiah(), 77_700);
    }

    #[test]
    fn test_foreign_option_value_rejected() {
        let err = price_line(&latte(), &line("v-oat-milk", vec![], 1)).unwrap_err();
        assert!(matches!(err, PricingError::UnknownOptionValue { .. }));

        let mut foreign = line("v-regular", vec![], 1);
        foreign.options[0].option_id = "o-milk".into();
        let err = price_line(&latte(), &foreign).unwrap_err();
        assert!(matches!(err, PricingError::UnknownOption { .. }));
    }

    #[test]
    fn test_modifier_errors() {
        let err = price_line(&latte(), &line("v-regular", vec![("m-cream", 1)], 1)).unwrap_err();
        assert_eq!(err.reason(), "unavailable_modifier");

        let err = price_line(&latte(), &line("v-regular", vec![("m-boba", 1)], 1)).unwrap_err();
        assert_eq!(err.reason(), "unknown_modifier");
    }

    #[test]
    fn test_required_option_missing() {
        let mut no_size = line("v-regular", vec![], 1);
        no_size.options.clear();
        let err = price_line(&latte(), &no_size).unwrap_err();
        assert_eq!(
            err,
            PricingError::OptionSelectionCount {
                option_id: "o-size".into(),
                min: 1,
                max: 1,
                selected: 0,
            }
        );
    }

    #[test]
    fn test_too_many_selections() {
        let mut both = line("v-regular", vec![], 1);
        both.options.push(SelectedOption {
            option_id: "o-size".into(),
            value_id: "v-large".into(),
        });
        let err = price_line(&latte(), &both).unwrap_err();
        assert_eq!(err.reason(), "option_selection_count");
    }

    #[test]
    fn test_unavailable_product() {
        let mut product = latte();
        product.is_available = false;
        let err = price_line(&product, &line("v-regular", vec![], 1)).unwrap_err();
        assert_eq!(err.reason(), "product_unavailable");
    }

    #[test]
    fn test_negative_total_rejected() {
        let err = OrderTotals::compute(
            Money::from_rupiah(10_000),
            TaxRate::STANDARD,
            Money::from_rupiah(10_000),
            Money::from_rupiah(5_000),
            Money::zero(),
        )
        .unwrap_err();
        assert_eq!(err.reason(), "negative_total");
    }

    #[test]
    fn test_delivery_fee_added() {
        let totals = OrderTotals::compute(
            Money::from_rupiah(100_000),
            TaxRate::STANDARD,
            Money::from_rupiah(10_000),
            Money::from_rupiah(10_000),
            Money::from_rupiah(8_000),
        )
        .unwrap();
        assert_eq!(totals.total.rupiah(), 100_000 + 11_000 - 20_000 + 8_000);
    }
}
