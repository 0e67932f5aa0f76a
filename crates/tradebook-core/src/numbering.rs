//! # Invoice Numbering
//!
//! Pure formatting half of the invoice number generator. Allocation (reading
//! the current maximum, bumping counters) happens inside the database
//! transaction in `tradebook-db`.
//!
//! ## Formats
//! ```text
//! Monthly           INV-202601-0001, INV-202601-0002, ...   (resets each month)
//! PerShopCustomer   INV-LL01/CUST0042-001, ...              (one counter per pair)
//! ```

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

const PREFIX: &str = "INV";

/// How a deployment numbers its invoices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NumberingStrategy {
    /// `INV-<YYYYMM>-<NNNN>`
    #[default]
    Monthly,
    /// `INV-<SHOPCODE>/CUST<CUSTCODE>-<NNN>`
    PerShopCustomer,
}

impl NumberingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumberingStrategy::Monthly => "monthly",
            NumberingStrategy::PerShopCustomer => "per_shop_customer",
        }
    }
}

impl fmt::Display for NumberingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NumberingStrategy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "monthly" => Ok(NumberingStrategy::Monthly),
            "per_shop_customer" | "shop_customer" => Ok(NumberingStrategy::PerShopCustomer),
            _ => Err(ValidationError::NotAllowed {
                field: "numbering strategy".to_string(),
                allowed: vec!["monthly".to_string(), "per_shop_customer".to_string()],
            }),
        }
    }
}

/// Prefix shared by every monthly number issued in `date`'s month.
///
/// ```rust
/// use chrono::NaiveDate;
/// use tradebook_core::numbering::monthly_prefix;
///
/// let date = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
/// assert_eq!(monthly_prefix(date), "INV-202601-");
/// ```
pub fn monthly_prefix(date: NaiveDate) -> String {
    format!("{}-{:04}{:02}-", PREFIX, date.year(), date.month())
}

/// Formats a monthly number. Sequences above 9999 simply widen.
pub fn format_monthly(date: NaiveDate, sequence: u32) -> String {
    format!("{}{:04}", monthly_prefix(date), sequence)
}

/// Next monthly sequence given the highest number already issued with the
/// month's prefix.
///
/// A missing or unparseable suffix counts as zero.
///
/// ```rust
/// use chrono::NaiveDate;
/// use tradebook_core::numbering::next_monthly_sequence;
///
/// let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
/// assert_eq!(next_monthly_sequence(date, None), 1);
/// assert_eq!(next_monthly_sequence(date, Some("INV-202601-0041")), 42);
/// ```
pub fn next_monthly_sequence(date: NaiveDate, highest: Option<&str>) -> u32 {
    let prefix = monthly_prefix(date);
    highest
        .and_then(|number| number.strip_prefix(prefix.as_str()))
        .and_then(|suffix| suffix.parse::<u32>().ok())
        .map_or(1, |last| last.saturating_add(1))
}

/// Formats a per-shop+customer number.
///
/// ```rust
/// use tradebook_core::numbering::format_shop_customer;
///
/// assert_eq!(format_shop_customer("ll01", "0042", 7), "INV-LL01/CUST0042-007");
/// ```
pub fn format_shop_customer(shop_code: &str, customer_code: &str, sequence: u32) -> String {
    format!(
        "{}-{}/CUST{}-{:03}",
        PREFIX,
        shop_code.trim().to_uppercase(),
        customer_code.trim().to_uppercase(),
        sequence
    )
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_monthly_format() {
        assert_eq!(format_monthly(date(2026, 3, 9), 1), "INV-202603-0001");
        assert_eq!(format_monthly(date(2026, 12, 1), 10000), "INV-202612-10000");
    }

    #[test]
    fn test_next_sequence_ignores_other_months() {
        let march = date(2026, 3, 1);
        assert_eq!(next_monthly_sequence(march, Some("INV-202602-0099")), 1);
        assert_eq!(next_monthly_sequence(march, Some("INV-202603-0099")), 100);
        assert_eq!(next_monthly_sequence(march, Some("INV-202603-abcd")), 1);
    }

    #[test]
    fn test_shop_customer_format() {
        assert_eq!(format_shop_customer("LL01", "0042", 1), "INV-LL01/CUST0042-001");
        assert_eq!(format_shop_customer("LL01", "0042", 1234), "INV-LL01/CUST0042-1234");
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("monthly".parse::<NumberingStrategy>().unwrap(), NumberingStrategy::Monthly);
        assert_eq!(
            "per-shop-customer".parse::<NumberingStrategy>().unwrap(),
            NumberingStrategy::PerShopCustomer
        );
        assert!("yearly".parse::<NumberingStrategy>().is_err());
        assert_eq!(NumberingStrategy::default(), NumberingStrategy::Monthly);
    }
}
