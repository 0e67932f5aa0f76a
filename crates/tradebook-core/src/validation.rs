//! # Validation Module
//!
//! One validation pass that turns raw form input into typed, validated
//! structures before the Totals Engine or the database ever sees them.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI form (out of scope)                                       │
//! │  └── Strings as typed by the user                                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── RawInvoiceHeader + Vec<RawLineItem> → ValidatedInvoice            │
//! │  ├── RawPayment → NewPayment                                           │
//! │  └── First bad field aborts the whole submission                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  ├── UNIQUE invoice_number                                             │
//! │  └── Foreign keys to shops, customers, products                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tradebook_core::validation::{validate_line_items, RawLineItem};
//!
//! let rows = vec![RawLineItem {
//!     product_id: None,
//!     description: "Cement 50kg".into(),
//!     quantity: "2".into(),
//!     unit: "bag".into(),
//!     rate_per_unit: "50.00".into(),
//! }];
//! let items = validate_line_items(&rows).unwrap();
//! assert_eq!(items[0].line_total().cents(), 10000);
//! ```

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{Money, PercentRate};
use crate::totals::LevyConfig;
use crate::types::{InvoiceHeader, InvoiceStatus, LineItem, NewPayment, PaymentMethod, ValidatedInvoice};
use crate::{MAX_INVOICE_ITEMS, MAX_QUANTITY_SCALE, MAX_RATE_SCALE, MONEY_DECIMAL_PLACES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const DATE_FORMAT: &str = "%Y-%m-%d";
const MAX_DESCRIPTION_LEN: usize = 500;
const MAX_UNIT_LEN: usize = 20;
const MAX_SHORT_TEXT_LEN: usize = 100;
const MAX_NOTES_LEN: usize = 2000;

// =============================================================================
// Raw Input Types
// =============================================================================

/// An invoice line exactly as submitted by a form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RawLineItem {
    /// Empty or missing means a free-text line.
    pub product_id: Option<String>,
    pub description: String,
    pub quantity: String,
    pub unit: String,
    pub rate_per_unit: String,
}

/// Invoice header fields exactly as submitted by a form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RawInvoiceHeader {
    pub shop_id: String,
    pub customer_id: String,
    pub quotation_id: Option<String>,
    /// `YYYY-MM-DD`
    pub issue_date: String,
    /// `YYYY-MM-DD`; when missing the deployment's payment terms apply.
    pub due_date: Option<String>,
    pub payment_terms: Option<String>,
    pub apply_levy: bool,
    /// Missing means the deployment default.
    pub levy_pct: Option<String>,
    /// Missing means the deployment default.
    pub vat_pct: Option<String>,
    /// "draft" or "finalized"; missing means draft.
    pub status: Option<String>,
    pub notes: Option<String>,
}

/// A payment exactly as submitted by a form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RawPayment {
    /// `YYYY-MM-DD`
    pub payment_date: String,
    pub amount: String,
    pub method: String,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}

// =============================================================================
// Field Validators
// =============================================================================

/// Parses a decimal number typed by a user.
///
/// ## Rules
/// - Surrounding whitespace and thousands separators (`,`) are ignored
/// - Anything else that is not a plain decimal is [`ValidationError::NotNumeric`]
///
/// ## Example
/// ```rust
/// use tradebook_core::validation::parse_decimal;
///
/// assert_eq!(parse_decimal("quantity", " 1,250.5 ").unwrap().to_string(), "1250.5");
/// assert!(parse_decimal("quantity", "two").is_err());
/// assert!(parse_decimal("quantity", "").is_err());
/// ```
pub fn parse_decimal(field: &str, raw: &str) -> ValidationResult<Decimal> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    Decimal::from_str(&cleaned).map_err(|_| ValidationError::NotNumeric {
        field: field.to_string(),
        value: raw.trim().to_string(),
    })
}

/// Validates and parses an item quantity.
///
/// ## Rules
/// - Must be numeric
/// - Must be > 0
/// - At most [`MAX_QUANTITY_SCALE`] decimal places (1.125 kg is fine)
pub fn parse_quantity(raw: &str) -> ValidationResult<Decimal> {
    let qty = parse_decimal("quantity", raw)?;

    if qty <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty.normalize().scale() > MAX_QUANTITY_SCALE {
        return Err(ValidationError::InvalidFormat {
            field: "quantity".to_string(),
            reason: format!("at most {} decimal places", MAX_QUANTITY_SCALE),
        });
    }

    Ok(qty)
}

/// Validates and parses a rate per unit.
///
/// ## Rules
/// - Must be numeric
/// - Must be ≥ 0 (free items are allowed)
/// - At most [`MAX_RATE_SCALE`] decimal places
pub fn parse_rate(raw: &str) -> ValidationResult<Decimal> {
    let rate = parse_decimal("rate per unit", raw)?;

    if rate < Decimal::ZERO {
        return Err(ValidationError::MustNotBeNegative {
            field: "rate per unit".to_string(),
        });
    }

    if rate.normalize().scale() > MAX_RATE_SCALE {
        return Err(ValidationError::InvalidFormat {
            field: "rate per unit".to_string(),
            reason: format!("at most {} decimal places", MAX_RATE_SCALE),
        });
    }

    Ok(rate)
}

/// Validates and parses a levy or VAT percentage (0–100, two decimals).
pub fn parse_percentage(field: &str, raw: &str) -> ValidationResult<PercentRate> {
    let pct = parse_decimal(field, raw)?;

    if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: "0".to_string(),
            max: "100".to_string(),
        });
    }

    PercentRate::from_percentage(pct).ok_or_else(|| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "at most 2 decimal places".to_string(),
    })
}

/// Validates and parses a money amount that must be positive (payments).
pub fn parse_positive_amount(field: &str, raw: &str) -> ValidationResult<Money> {
    let amount = parse_decimal(field, raw)?;

    if amount <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    if amount.normalize().scale() > MONEY_DECIMAL_PLACES {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "at most 2 decimal places".to_string(),
        });
    }

    Money::try_from_decimal(amount).ok_or_else(|| ValidationError::OutOfRange {
        field: field.to_string(),
        min: "0.01".to_string(),
        max: i64::MAX.to_string(),
    })
}

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(field: &str, raw: &str) -> ValidationResult<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "expected YYYY-MM-DD".to_string(),
    })
}

/// Validates a required reference (shop, customer, actor id).
///
/// ## Returns
/// The trimmed value.
pub fn validate_reference(field: &str, value: &str) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_SHORT_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_SHORT_TEXT_LEN,
        });
    }

    Ok(value.to_string())
}

/// Validates the id of the user performing a mutation.
pub fn validate_actor(actor_id: &str) -> ValidationResult<String> {
    validate_reference("actor", actor_id)
}

/// Trims optional free text; blank becomes `None`.
fn optional_text(field: &str, value: Option<&str>, max: usize) -> ValidationResult<Option<String>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if value.len() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(Some(value.to_string()))
}

// =============================================================================
// Line Items
// =============================================================================

/// Validates one raw line.
pub fn validate_line_item(raw: &RawLineItem) -> ValidationResult<LineItem> {
    let description = raw.description.trim();
    if description.is_empty() {
        return Err(ValidationError::Required {
            field: "description".to_string(),
        });
    }
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::TooLong {
            field: "description".to_string(),
            max: MAX_DESCRIPTION_LEN,
        });
    }
    if raw.unit.trim().len() > MAX_UNIT_LEN {
        return Err(ValidationError::TooLong {
            field: "unit".to_string(),
            max: MAX_UNIT_LEN,
        });
    }

    let quantity = parse_quantity(&raw.quantity)?;
    let rate = parse_rate(&raw.rate_per_unit)?;

    LineItem::new(raw.product_id.clone(), description, quantity, raw.unit.as_str(), rate)
}

/// Validates every raw line, stopping at the first bad one.
///
/// ## Rules
/// - At least one line
/// - At most [`MAX_INVOICE_ITEMS`] lines
/// - Errors carry the 1-based position of the offending line
pub fn validate_line_items(rows: &[RawLineItem]) -> ValidationResult<Vec<LineItem>> {
    if rows.is_empty() {
        return Err(ValidationError::NoItems);
    }

    if rows.len() > MAX_INVOICE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "invoice items".to_string(),
            min: "1".to_string(),
            max: MAX_INVOICE_ITEMS.to_string(),
        });
    }

    rows.iter()
        .enumerate()
        .map(|(idx, row)| validate_line_item(row).map_err(|e| e.at_item(idx + 1)))
        .collect()
}

// =============================================================================
// Invoice
// =============================================================================

/// Validates a complete invoice submission.
///
/// ## Arguments
/// * `header` - Raw header fields
/// * `rows` - Raw line items
/// * `defaults` - Deployment levy/VAT rates used when the form leaves them out
///
/// ## Rules
/// - shop and customer references are required
/// - issue date is required; due date must not precede it
/// - levy and VAT are 0–100% with at most two decimals
/// - initial status is Draft or Finalized
/// - every line passes [`validate_line_item`]
pub fn validate_invoice(
    header: &RawInvoiceHeader,
    rows: &[RawLineItem],
    defaults: &LevyConfig,
) -> ValidationResult<ValidatedInvoice> {
    let shop_id = validate_reference("shop", &header.shop_id)?;
    let customer_id = validate_reference("customer", &header.customer_id)?;
    let quotation_id = optional_text("quotation", header.quotation_id.as_deref(), MAX_SHORT_TEXT_LEN)?;

    let issue_date = parse_date("issue date", &header.issue_date)?;
    let due_date = match header.due_date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(raw) => Some(parse_date("due date", raw)?),
        None => None,
    };
    if let Some(due) = due_date {
        if due < issue_date {
            return Err(ValidationError::InvalidFormat {
                field: "due date".to_string(),
                reason: "must not be before the issue date".to_string(),
            });
        }
    }

    let levy_rate = match header.levy_pct.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(raw) => parse_percentage("levy percentage", raw)?,
        None => defaults.levy_rate,
    };
    let vat_rate = match header.vat_pct.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(raw) => parse_percentage("VAT percentage", raw)?,
        None => defaults.vat_rate,
    };

    let initial_status = match header.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => raw.parse::<InvoiceStatus>()?,
        None => InvoiceStatus::Draft,
    };
    if !matches!(initial_status, InvoiceStatus::Draft | InvoiceStatus::Finalized) {
        return Err(ValidationError::NotAllowed {
            field: "status".to_string(),
            allowed: vec!["draft".to_string(), "finalized".to_string()],
        });
    }

    let payment_terms = optional_text("payment terms", header.payment_terms.as_deref(), MAX_SHORT_TEXT_LEN)?;
    let notes = optional_text("notes", header.notes.as_deref(), MAX_NOTES_LEN)?;

    let items = validate_line_items(rows)?;

    Ok(ValidatedInvoice {
        header: InvoiceHeader {
            shop_id,
            customer_id,
            quotation_id,
            issue_date,
            due_date,
            payment_terms,
            levy: LevyConfig {
                apply_levy: header.apply_levy,
                levy_rate,
                vat_rate,
            },
            initial_status,
            notes,
        },
        items,
    })
}

// =============================================================================
// Payment
// =============================================================================

/// Validates a payment submission.
pub fn validate_payment(raw: &RawPayment) -> ValidationResult<NewPayment> {
    Ok(NewPayment {
        payment_date: parse_date("payment date", &raw.payment_date)?,
        amount: parse_positive_amount("payment amount", &raw.amount)?,
        method: raw.method.parse::<PaymentMethod>()?,
        reference_number: optional_text(
            "reference number",
            raw.reference_number.as_deref(),
            MAX_SHORT_TEXT_LEN,
        )?,
        notes: optional_text("notes", raw.notes.as_deref(), MAX_NOTES_LEN)?,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(qty: &str, rate: &str) -> RawLineItem {
        RawLineItem {
            product_id: None,
            description: "Cement".to_string(),
            quantity: qty.to_string(),
            unit: "bag".to_string(),
            rate_per_unit: rate.to_string(),
        }
    }

    fn header() -> RawInvoiceHeader {
        RawInvoiceHeader {
            shop_id: "shop-1".to_string(),
            customer_id: "cust-1".to_string(),
            issue_date: "2026-01-10".to_string(),
            due_date: Some("2026-02-09".to_string()),
            apply_levy: true,
            levy_pct: Some("1".to_string()),
            vat_pct: Some("16.5".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("2").unwrap(), dec!(2));
        assert_eq!(parse_quantity("1.125").unwrap(), dec!(1.125));
        assert_eq!(parse_quantity("1.500").unwrap(), dec!(1.500));

        assert!(matches!(parse_quantity("two"), Err(ValidationError::NotNumeric { .. })));
        assert!(matches!(parse_quantity("0"), Err(ValidationError::MustBePositive { .. })));
        assert!(matches!(parse_quantity("-3"), Err(ValidationError::MustBePositive { .. })));
        assert!(matches!(parse_quantity("1.0001"), Err(ValidationError::InvalidFormat { .. })));
        assert!(matches!(parse_quantity(""), Err(ValidationError::Required { .. })));
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("0").unwrap(), dec!(0));
        assert_eq!(parse_rate("1,250.50").unwrap(), dec!(1250.50));
        assert!(matches!(parse_rate("-0.01"), Err(ValidationError::MustNotBeNegative { .. })));
        assert!(matches!(parse_rate("12abc"), Err(ValidationError::NotNumeric { .. })));
    }

    #[test]
    fn test_parse_percentage() {
        assert_eq!(parse_percentage("vat", "16.5").unwrap().bps(), 1650);
        assert!(parse_percentage("vat", "101").is_err());
        assert!(parse_percentage("vat", "-1").is_err());
        assert!(parse_percentage("vat", "16.525").is_err());
    }

    #[test]
    fn test_parse_positive_amount() {
        assert_eq!(parse_positive_amount("amount", "147.68").unwrap().cents(), 14768);
        assert!(parse_positive_amount("amount", "0").is_err());
        assert!(parse_positive_amount("amount", "10.001").is_err());
    }

    #[test]
    fn test_bad_item_aborts_whole_list() {
        let rows = vec![row("2", "50"), row("x", "10"), row("1", "5")];
        let err = validate_line_items(&rows).unwrap_err();
        match err {
            ValidationError::Item { position, source } => {
                assert_eq!(position, 2);
                assert!(matches!(*source, ValidationError::NotNumeric { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_items_rejected() {
        assert!(matches!(validate_line_items(&[]), Err(ValidationError::NoItems)));
    }

    #[test]
    fn test_empty_description_rejected() {
        let mut bad = row("1", "1");
        bad.description = "   ".to_string();
        assert!(validate_line_items(&[bad]).is_err());
    }

    #[test]
    fn test_validate_invoice() {
        let validated = validate_invoice(&header(), &[row("2", "50.00")], &LevyConfig::default()).unwrap();

        assert_eq!(validated.header.shop_id, "shop-1");
        assert_eq!(validated.header.levy.levy_rate.bps(), 100);
        assert_eq!(validated.header.levy.vat_rate.bps(), 1650);
        assert_eq!(validated.header.initial_status, InvoiceStatus::Draft);
        assert_eq!(validated.items.len(), 1);
    }

    #[test]
    fn test_validate_invoice_uses_default_rates() {
        let mut raw = header();
        raw.levy_pct = None;
        raw.vat_pct = Some("  ".to_string());
        let defaults = LevyConfig {
            apply_levy: false,
            levy_rate: PercentRate::from_bps(150),
            vat_rate: PercentRate::from_bps(1600),
        };

        let validated = validate_invoice(&raw, &[row("1", "1")], &defaults).unwrap();
        assert_eq!(validated.header.levy.levy_rate.bps(), 150);
        assert_eq!(validated.header.levy.vat_rate.bps(), 1600);
        assert!(validated.header.levy.apply_levy);
    }

    #[test]
    fn test_validate_invoice_rejects_bad_header() {
        let mut raw = header();
        raw.customer_id = " ".to_string();
        assert!(validate_invoice(&raw, &[row("1", "1")], &LevyConfig::default()).is_err());

        let mut raw = header();
        raw.due_date = Some("2026-01-01".to_string());
        assert!(validate_invoice(&raw, &[row("1", "1")], &LevyConfig::default()).is_err());

        let mut raw = header();
        raw.status = Some("paid".to_string());
        assert!(matches!(
            validate_invoice(&raw, &[row("1", "1")], &LevyConfig::default()),
            Err(ValidationError::NotAllowed { .. })
        ));

        let mut raw = header();
        raw.issue_date = "10/01/2026".to_string();
        assert!(validate_invoice(&raw, &[row("1", "1")], &LevyConfig::default()).is_err());
    }

    #[test]
    fn test_validate_payment() {
        let payment = validate_payment(&RawPayment {
            payment_date: "2026-01-20".to_string(),
            amount: "50.00".to_string(),
            method: "cash".to_string(),
            reference_number: Some("  ".to_string()),
            notes: None,
        })
        .unwrap();

        assert_eq!(payment.amount.cents(), 5000);
        assert_eq!(payment.method, PaymentMethod::Cash);
        assert_eq!(payment.reference_number, None);
    }

    #[test]
    fn test_validate_actor() {
        assert_eq!(validate_actor(" user-7 ").unwrap(), "user-7");
        assert!(validate_actor("").is_err());
    }
}
