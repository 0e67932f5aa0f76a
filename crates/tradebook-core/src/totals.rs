//! # Totals Engine
//!
//! Turns validated line items plus levy/VAT configuration into the five
//! monetary fields stored on an invoice.
//!
//! ## Layering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Σ quantity × rate   (exact, unrounded)                                │
//! │       │ round half-up to cents                                         │
//! │       ▼                                                                 │
//! │  gross_total ──────────────┐                                           │
//! │       │ × levy %           │ (only when apply_levy)                    │
//! │       ▼                    │                                           │
//! │  levy_amount ──────────────┤                                           │
//! │                            ▼                                           │
//! │                     amount_before_vat = gross + levy                   │
//! │                            │ × VAT %                                   │
//! │                            ▼                                           │
//! │                     vat_amount                                         │
//! │                            │                                           │
//! │                            ▼                                           │
//! │                     total_net_amount = before_vat + vat                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The gross total is computed from the unrounded products, never from the
//! already-rounded line totals. Each percentage step rounds its own result,
//! so `amount_before_vat - gross_total == levy_amount` and
//! `total_net_amount - amount_before_vat == vat_amount` hold exactly.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{Money, PercentRate};
use crate::types::LineItem;
use crate::validation::ValidationResult;

/// Levy and VAT settings for one invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LevyConfig {
    /// Whether the procurement levy applies to this invoice.
    pub apply_levy: bool,
    pub levy_rate: PercentRate,
    pub vat_rate: PercentRate,
}

impl LevyConfig {
    /// Levy rate actually charged (zero when the levy is off).
    #[inline]
    pub fn effective_levy_rate(&self) -> PercentRate {
        if self.apply_levy {
            self.levy_rate
        } else {
            PercentRate::zero()
        }
    }
}

/// Financial breakdown of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceTotals {
    pub gross_total: Money,
    pub levy_amount: Money,
    pub amount_before_vat: Money,
    pub vat_amount: Money,
    pub total_net_amount: Money,
}

/// Computes the invoice breakdown.
///
/// ## Errors
/// - [`ValidationError::NoItems`] when `items` is empty
/// - [`ValidationError::OutOfRange`] when any stage (gross, levy, before
///   VAT, VAT, net) does not fit in i64 cents
///
/// Per-item checks (quantity > 0, rate ≥ 0) are guaranteed by
/// [`LineItem::new`].
///
/// ## Example
/// ```rust
/// use rust_decimal::Decimal;
/// use tradebook_core::money::PercentRate;
/// use tradebook_core::totals::{compute_totals, LevyConfig};
/// use tradebook_core::types::LineItem;
///
/// let items = vec![LineItem::new(None, "Bolt", Decimal::from(3), "pc", Decimal::new(333, 2)).unwrap()];
/// let totals = compute_totals(&items, &LevyConfig::default()).unwrap();
/// assert_eq!(totals.gross_total.cents(), 999);
/// assert_eq!(totals.total_net_amount.cents(), 999);
/// ```
pub fn compute_totals(items: &[LineItem], config: &LevyConfig) -> ValidationResult<InvoiceTotals> {
    if items.is_empty() {
        return Err(ValidationError::NoItems);
    }

    let out_of_range = |field: &str| ValidationError::OutOfRange {
        field: field.to_string(),
        min: "0".to_string(),
        max: Money::from_cents(i64::MAX).to_string(),
    };

    let raw_gross = items
        .iter()
        .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.extended()))
        .ok_or_else(|| out_of_range("gross total"))?;
    let gross_total = Money::try_from_decimal(raw_gross).ok_or_else(|| out_of_range("gross total"))?;

    let levy_amount = gross_total
        .checked_apply_rate(config.effective_levy_rate())
        .ok_or_else(|| out_of_range("levy amount"))?;
    let amount_before_vat = gross_total
        .checked_add(levy_amount)
        .ok_or_else(|| out_of_range("amount before VAT"))?;
    let vat_amount = amount_before_vat
        .checked_apply_rate(config.vat_rate)
        .ok_or_else(|| out_of_range("VAT amount"))?;
    let total_net_amount = amount_before_vat
        .checked_add(vat_amount)
        .ok_or_else(|| out_of_range("net total"))?;

    Ok(InvoiceTotals {
        gross_total,
        levy_amount,
        amount_before_vat,
        vat_amount,
        total_net_amount,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(qty: Decimal, rate: Decimal) -> LineItem {
        LineItem::new(None, "item", qty, "pc", rate).unwrap()
    }

    fn levy_and_vat(levy_bps: u32, vat_bps: u32) -> LevyConfig {
        LevyConfig {
            apply_levy: true,
            levy_rate: PercentRate::from_bps(levy_bps),
            vat_rate: PercentRate::from_bps(vat_bps),
        }
    }

    #[test]
    fn test_golden_vector() {
        let items = vec![item(dec!(2), dec!(50.00)), item(dec!(1), dec!(25.50))];
        let totals = compute_totals(&items, &levy_and_vat(100, 1650)).unwrap();

        assert_eq!(totals.gross_total.cents(), 12550);
        assert_eq!(totals.levy_amount.cents(), 126);
        assert_eq!(totals.amount_before_vat.cents(), 12676);
        assert_eq!(totals.vat_amount.cents(), 2092);
        assert_eq!(totals.total_net_amount.cents(), 14768);
    }

    #[test]
    fn test_levy_skipped_when_not_applied() {
        let items = vec![item(dec!(2), dec!(50.00)), item(dec!(1), dec!(25.50))];
        let mut config = levy_and_vat(100, 1650);
        config.apply_levy = false;

        let totals = compute_totals(&items, &config).unwrap();
        assert_eq!(totals.levy_amount, Money::zero());
        assert_eq!(totals.amount_before_vat.cents(), 12550);
        // 125.50 × 16.5% = 20.7075 → 20.71
        assert_eq!(totals.vat_amount.cents(), 2071);
        assert_eq!(totals.total_net_amount.cents(), 14621);
    }

    #[test]
    fn test_gross_uses_unrounded_products() {
        // Each line rounds to 0.33; the exact sum 0.9999 rounds to 1.00.
        let items = vec![
            item(dec!(1), dec!(0.3333)),
            item(dec!(1), dec!(0.3333)),
            item(dec!(1), dec!(0.3333)),
        ];
        let totals = compute_totals(&items, &LevyConfig::default()).unwrap();

        let rounded_line_sum: i64 = items.iter().map(|i| i.line_total().cents()).sum();
        assert_eq!(rounded_line_sum, 99);
        // 0.9999 → 1.00
        assert_eq!(totals.gross_total.cents(), 100);
    }

    #[test]
    fn test_layering_identities_hold_exactly() {
        let cases = [
            (dec!(3), dec!(19.99), 100, 1650),
            (dec!(0.125), dec!(7.77), 250, 1500),
            (dec!(12), dec!(0), 100, 1650),
            (dec!(1.5), dec!(1234.5678), 75, 1800),
        ];

        for (qty, rate, levy_bps, vat_bps) in cases {
            let totals = compute_totals(&[item(qty, rate)], &levy_and_vat(levy_bps, vat_bps)).unwrap();
            assert_eq!(totals.amount_before_vat - totals.gross_total, totals.levy_amount);
            assert_eq!(totals.total_net_amount - totals.amount_before_vat, totals.vat_amount);
        }
    }

    #[test]
    fn test_overflow_after_gross_is_rejected() {
        use crate::validation::{parse_quantity, parse_rate};

        // Gross of 9e18 cents fits in i64; gross plus 10% levy does not.
        let qty = parse_quantity("90000000000").unwrap();
        let rate = parse_rate("1000000").unwrap();
        let items = [item(qty, rate)];

        let result = compute_totals(&items, &levy_and_vat(1000, 1650));
        assert!(matches!(
            result,
            Err(ValidationError::OutOfRange { ref field, .. }) if field == "amount before VAT"
        ));

        // Without the levy, VAT pushes the net total over.
        let mut vat_only = levy_and_vat(1000, 1650);
        vat_only.apply_levy = false;
        let result = compute_totals(&items, &vat_only);
        assert!(matches!(
            result,
            Err(ValidationError::OutOfRange { ref field, .. }) if field == "net total"
        ));
    }

    #[test]
    fn test_empty_items_rejected() {
        let result = compute_totals(&[], &LevyConfig::default());
        assert!(matches!(result, Err(ValidationError::NoItems)));
    }

    #[test]
    fn test_zero_rate_invoice_totals_zero() {
        let totals = compute_totals(&[item(dec!(5), dec!(0))], &levy_and_vat(100, 1650)).unwrap();
        assert_eq!(totals.total_net_amount, Money::zero());
    }
}
