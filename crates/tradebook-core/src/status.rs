//! # Status Derivation
//!
//! Recomputes an invoice's status from its money and the calendar.
//!
//! ## Decision Table
//! ```text
//! ┌──────────────────────┬──────────────────────────────┬────────────────┐
//! │ current              │ condition                    │ result         │
//! ├──────────────────────┼──────────────────────────────┼────────────────┤
//! │ Draft / Cancelled    │ (anything)                   │ unchanged      │
//! │ other                │ total_net <= 0               │ Paid           │
//! │ other                │ total_paid >= total_net      │ Paid           │
//! │ other                │ 0 < total_paid < total_net   │ PartiallyPaid  │
//! │ other                │ nothing paid, due < today    │ Overdue        │
//! │ other                │ nothing paid, not yet due    │ Finalized      │
//! └──────────────────────┴──────────────────────────────┴────────────────┘
//! ```
//!
//! The function depends only on its arguments, so calling it again with the
//! same inputs returns the same status.

use chrono::NaiveDate;

use crate::money::Money;
use crate::types::InvoiceStatus;

/// Derives the status an invoice should have.
///
/// ## Arguments
/// * `current` - Status currently stored
/// * `total_net` - Invoice net total
/// * `total_paid` - Sum of non-voided payments
/// * `due_date` - Optional due date
/// * `today` - The caller's business date (the clock is never read here)
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use tradebook_core::money::Money;
/// use tradebook_core::status::derive_status;
/// use tradebook_core::types::InvoiceStatus;
///
/// let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
/// let status = derive_status(
///     InvoiceStatus::Finalized,
///     Money::from_cents(14768),
///     Money::from_cents(5000),
///     None,
///     today,
/// );
/// assert_eq!(status, InvoiceStatus::PartiallyPaid);
/// ```
pub fn derive_status(
    current: InvoiceStatus,
    total_net: Money,
    total_paid: Money,
    due_date: Option<NaiveDate>,
    today: NaiveDate,
) -> InvoiceStatus {
    if current.is_sticky() {
        return current;
    }

    if !total_net.is_positive() || total_paid >= total_net {
        return InvoiceStatus::Paid;
    }

    if total_paid.is_positive() {
        return InvoiceStatus::PartiallyPaid;
    }

    match due_date {
        Some(due) if due < today => InvoiceStatus::Overdue,
        _ => InvoiceStatus::Finalized,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
