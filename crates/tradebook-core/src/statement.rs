//! # Customer Statements
//!
//! Builds a statement of account from a customer's invoices and payments.
//! Invoices are debits, payments are credits. Draft and Cancelled invoices,
//! payments recorded against them, and voided payments never appear.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::InvoiceStatus;
use crate::validation::ValidationResult;

/// An invoice as seen by the statement builder.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementInvoice {
    pub invoice_id: String,
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    pub total_net_amount: Money,
    pub status: InvoiceStatus,
}

/// A payment as seen by the statement builder.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementPayment {
    pub payment_id: String,
    pub invoice_number: String,
    pub payment_date: NaiveDate,
    pub amount: Money,
    pub is_voided: bool,
    /// Current status of the invoice the payment was recorded against.
    pub invoice_status: InvoiceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StatementEntryKind {
    Invoice,
    Payment,
}

/// One line of a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StatementEntry {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub kind: StatementEntryKind,
    /// Invoice id or payment id.
    pub source_id: String,
    /// Invoice number the entry relates to.
    pub reference: String,
    pub debit: Money,
    pub credit: Money,
    /// Balance after this entry.
    pub balance: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerStatement {
    pub customer_id: String,
    #[ts(as = "String")]
    pub from: NaiveDate,
    #[ts(as = "String")]
    pub to: NaiveDate,
    pub opening_balance: Money,
    pub entries: Vec<StatementEntry>,
    pub total_debits: Money,
    pub total_credits: Money,
    pub closing_balance: Money,
}

fn counts_on_statement(status: InvoiceStatus) -> bool {
    !status.is_sticky()
}

/// Builds a statement for the inclusive period `from..=to`.
///
/// Everything dated before `from` folds into the opening balance; anything
/// after `to` is ignored. Entries are ordered by date, invoices before
/// payments on the same day.
///
/// ## Errors
/// [`ValidationError::OutOfRange`] when `from` is after `to`.
pub fn build_statement(
    customer_id: &str,
    from: NaiveDate,
    to: NaiveDate,
    invoices: &[StatementInvoice],
    payments: &[StatementPayment],
) -> ValidationResult<CustomerStatement> {
    if from > to {
        return Err(ValidationError::OutOfRange {
            field: "statement period".to_string(),
            min: from.to_string(),
            max: to.to_string(),
        });
    }

    let mut opening_balance = Money::zero();
    let mut entries = Vec::new();

    for invoice in invoices.iter().filter(|i| counts_on_statement(i.status)) {
        if invoice.issue_date < from {
            opening_balance += invoice.total_net_amount;
        } else if invoice.issue_date <= to {
            entries.push(StatementEntry {
                date: invoice.issue_date,
                kind: StatementEntryKind::Invoice,
                source_id: invoice.invoice_id.clone(),
                reference: invoice.invoice_number.clone(),
                debit: invoice.total_net_amount,
                credit: Money::zero(),
                balance: Money::zero(),
            });
        }
    }

    // A payment only credits the account once its invoice is a debit on it.
    for payment in payments
        .iter()
        .filter(|p| !p.is_voided && counts_on_statement(p.invoice_status))
    {
        if payment.payment_date < from {
            opening_balance -= payment.amount;
        } else if payment.payment_date <= to {
            entries.push(StatementEntry {
                date: payment.payment_date,
                kind: StatementEntryKind::Payment,
                source_id: payment.payment_id.clone(),
                reference: payment.invoice_number.clone(),
                debit: Money::zero(),
                credit: payment.amount,
                balance: Money::zero(),
            });
        }
    }

    // Stable sort keeps caller order within the same day and kind.
    entries.sort_by_key(|entry| (entry.date, entry.kind == StatementEntryKind::Payment));

    let mut running = opening_balance;
    for entry in &mut entries {
        running += entry.debit;
        running -= entry.credit;
        entry.balance = running;
    }

    let total_debits = entries.iter().map(|e| e.debit).sum();
    let total_credits = entries.iter().map(|e| e.credit).sum();

    Ok(CustomerStatement {
        customer_id: customer_id.to_string(),
        from,
        to,
        opening_balance,
        entries,
        total_debits,
        total_credits,
        closing_balance: running,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn invoice(number: &str, issued: NaiveDate, cents: i64, status: InvoiceStatus) -> StatementInvoice {
        StatementInvoice {
            invoice_id: format!("id-{number}"),
            invoice_number: number.to_string(),
            issue_date: issued,
            total_net_amount: Money::from_cents(cents),
            status,
        }
    }

    fn payment(number: &str, paid: NaiveDate, cents: i64, voided: bool) -> StatementPayment {
        StatementPayment {
            payment_id: format!("pay-{number}-{cents}"),
            invoice_number: number.to_string(),
            payment_date: paid,
            amount: Money::from_cents(cents),
            is_voided: voided,
            invoice_status: InvoiceStatus::Finalized,
        }
    }

    #[test]
    fn test_opening_running_and_closing_balance() {
        let invoices = vec![
            invoice("INV-1", date(1, 10), 10000, InvoiceStatus::Paid),
            invoice("INV-2", date(2, 5), 14768, InvoiceStatus::PartiallyPaid),
        ];
        let payments = vec![
            payment("INV-1", date(1, 20), 10000, false),
            payment("INV-2", date(2, 5), 5000, false),
        ];

        let statement = build_statement("c1", date(2, 1), date(2, 28), &invoices, &payments).unwrap();

        assert_eq!(statement.opening_balance, Money::zero());
        assert_eq!(statement.entries.len(), 2);
        assert_eq!(statement.entries[0].kind, StatementEntryKind::Invoice);
        assert_eq!(statement.entries[0].balance.cents(), 14768);
        assert_eq!(statement.entries[1].balance.cents(), 9768);
        assert_eq!(statement.total_debits.cents(), 14768);
        assert_eq!(statement.total_credits.cents(), 5000);
        assert_eq!(statement.closing_balance.cents(), 9768);
    }

    #[test]
    fn test_draft_cancelled_and_voided_are_excluded() {
        let invoices = vec![
            invoice("INV-1", date(1, 10), 10000, InvoiceStatus::Draft),
            invoice("INV-2", date(1, 11), 20000, InvoiceStatus::Cancelled),
            invoice("INV-3", date(1, 12), 30000, InvoiceStatus::Overdue),
        ];
        let payments = vec![payment("INV-3", date(1, 13), 30000, true)];

        let statement = build_statement("c1", date(1, 1), date(1, 31), &invoices, &payments).unwrap();

        assert_eq!(statement.entries.len(), 1);
        assert_eq!(statement.closing_balance.cents(), 30000);
    }

    #[test]
    fn test_payments_on_draft_or_cancelled_invoices_excluded() {
        let invoices = vec![
            invoice("INV-1", date(1, 10), 10000, InvoiceStatus::Draft),
            invoice("INV-2", date(1, 11), 20000, InvoiceStatus::Cancelled),
        ];
        let payments = vec![
            StatementPayment {
                invoice_status: InvoiceStatus::Draft,
                ..payment("INV-1", date(1, 5), 4000, false)
            },
            StatementPayment {
                invoice_status: InvoiceStatus::Cancelled,
                ..payment("INV-2", date(1, 15), 20000, false)
            },
        ];

        let statement = build_statement("c1", date(1, 6), date(1, 31), &invoices, &payments).unwrap();

        assert_eq!(statement.opening_balance, Money::zero());
        assert!(statement.entries.is_empty());
        assert_eq!(statement.total_credits, Money::zero());
        assert_eq!(statement.closing_balance, Money::zero());
    }

    #[test]
    fn test_entries_after_period_ignored() {
        let invoices = vec![invoice("INV-1", date(3, 1), 10000, InvoiceStatus::Finalized)];
        let statement = build_statement("c1", date(1, 1), date(2, 28), &invoices, &[]).unwrap();
        assert!(statement.entries.is_empty());
        assert_eq!(statement.closing_balance, Money::zero());
    }

    #[test]
    fn test_inverted_period_rejected() {
        assert!(build_statement("c1", date(2, 1), date(1, 1), &[], &[]).is_err());
    }
}
