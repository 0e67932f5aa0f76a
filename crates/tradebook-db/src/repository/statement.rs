//! # Statement Repository
//!
//! Loads a customer's invoices and payments up to the end of a period and
//! hands them to [`build_statement`].

use chrono::NaiveDate;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use tradebook_core::statement::{build_statement, CustomerStatement, StatementInvoice, StatementPayment};
use tradebook_core::{InvoiceStatus, Money};

use crate::error::{DbError, DbResult};

#[derive(Debug, FromRow)]
struct StatementInvoiceRecord {
    id: String,
    invoice_number: String,
    issue_date: NaiveDate,
    total_net_amount_cents: i64,
    status: InvoiceStatus,
}

impl From<StatementInvoiceRecord> for StatementInvoice {
    fn from(r: StatementInvoiceRecord) -> Self {
        StatementInvoice {
            invoice_id: r.id,
            invoice_number: r.invoice_number,
            issue_date: r.issue_date,
            total_net_amount: Money::from_cents(r.total_net_amount_cents),
            status: r.status,
        }
    }
}

#[derive(Debug, FromRow)]
struct StatementPaymentRecord {
    id: String,
    invoice_number: String,
    payment_date: NaiveDate,
    amount_cents: i64,
    is_voided: bool,
    invoice_status: InvoiceStatus,
}

impl From<StatementPaymentRecord> for StatementPayment {
    fn from(r: StatementPaymentRecord) -> Self {
        StatementPayment {
            payment_id: r.id,
            invoice_number: r.invoice_number,
            payment_date: r.payment_date,
            amount: Money::from_cents(r.amount_cents),
            is_voided: r.is_voided,
            invoice_status: r.invoice_status,
        }
    }
}

/// Customer statements of account.
#[derive(Debug, Clone)]
pub struct StatementRepository {
    pool: SqlitePool,
}

impl StatementRepository {
    /// Creates a new StatementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StatementRepository { pool }
    }

    /// Statement for `customer_id` over `from..=to`.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown customer
    /// - `Validation` when `from` is after `to`
    pub async fn customer_statement(
        &self,
        customer_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> DbResult<CustomerStatement> {
        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM customers WHERE id = ?1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(DbError::not_found("Customer", customer_id));
        }

        let invoices: Vec<StatementInvoice> = sqlx::query_as::<_, StatementInvoiceRecord>(
            r#"
            SELECT id, invoice_number, issue_date, total_net_amount_cents, status
            FROM invoices
            WHERE customer_id = ?1 AND issue_date <= ?2
            ORDER BY issue_date, invoice_number
            "#,
        )
        .bind(customer_id)
        .bind(to)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(StatementInvoice::from)
        .collect();

        let payments: Vec<StatementPayment> = sqlx::query_as::<_, StatementPaymentRecord>(
            r#"
            SELECT p.id, i.invoice_number, p.payment_date, p.amount_cents, p.is_voided,
                   i.status AS invoice_status
            FROM payments p
            JOIN invoices i ON i.id = p.invoice_id
            WHERE i.customer_id = ?1 AND p.payment_date <= ?2
            ORDER BY p.payment_date, p.created_at
            "#,
        )
        .bind(customer_id)
        .bind(to)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(StatementPayment::from)
        .collect();

        debug!(
            customer_id = %customer_id,
            invoices = invoices.len(),
            payments = payments.len(),
            "Statement inputs loaded"
        );

        Ok(build_statement(customer_id, from, to, &invoices, &payments)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::fixture;
    use tradebook_core::statement::StatementEntryKind;
    use tradebook_core::validation::{RawInvoiceHeader, RawLineItem, RawPayment};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn header(shop: &str, customer: &str, issue: &str, status: &str) -> RawInvoiceHeader {
        RawInvoiceHeader {
            shop_id: shop.to_string(),
            customer_id: customer.to_string(),
            issue_date: issue.to_string(),
            due_date: Some("2099-12-31".to_string()),
            vat_pct: Some("0".to_string()),
            status: Some(status.to_string()),
            ..Default::default()
        }
    }

    fn rows(amount: &str) -> Vec<RawLineItem> {
        vec![RawLineItem {
            product_id: None,
            description: "Supplies".to_string(),
            quantity: "1".to_string(),
            unit: "lot".to_string(),
            rate_per_unit: amount.to_string(),
        }]
    }

    fn payment(date: &str, amount: &str) -> RawPayment {
        RawPayment {
            payment_date: date.to_string(),
            amount: amount.to_string(),
            method: "cash".to_string(),
            reference_number: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_customer_statement() {
        let fx = fixture().await;
        let (shop, cust) = (fx.shop.id.as_str(), fx.customer.id.as_str());
        let invoices = fx.db.invoices();
        let payments = fx.db.payments();

        // Before the period: 100 owed, 30 paid.
        let old = invoices
            .create_from_form(&header(shop, cust, "2026-01-10", "finalized"), &rows("100"), "u")
            .await
            .unwrap();
        payments
            .record_from_form(&old.invoice_id, &payment("2026-01-20", "30"), "u")
            .await
            .unwrap();

        // In the period.
        let current = invoices
            .create_from_form(&header(shop, cust, "2026-02-05", "finalized"), &rows("200"), "u")
            .await
            .unwrap();
        let voided = payments
            .record_from_form(&current.invoice_id, &payment("2026-02-10", "50"), "u")
            .await
            .unwrap();
        payments.void_payment(&voided.payment_id, "u").await.unwrap();
        payments
            .record_from_form(&current.invoice_id, &payment("2026-02-12", "80"), "u")
            .await
            .unwrap();
        invoices
            .create_from_form(&header(shop, cust, "2026-02-15", "draft"), &rows("999"), "u")
            .await
            .unwrap();

        // After the period.
        invoices
            .create_from_form(&header(shop, cust, "2026-03-01", "finalized"), &rows("500"), "u")
            .await
            .unwrap();

        // Another customer.
        let other = fx.db.lookups().insert_customer("0099", "Other").await.unwrap();
        invoices
            .create_from_form(&header(shop, &other.id, "2026-02-06", "finalized"), &rows("700"), "u")
            .await
            .unwrap();

        let statement = fx
            .db
            .statements()
            .customer_statement(cust, date(2026, 2, 1), date(2026, 2, 28))
            .await
            .unwrap();

        assert_eq!(statement.opening_balance.cents(), 7000);
        assert_eq!(statement.entries.len(), 2);
        assert_eq!(statement.entries[0].kind, StatementEntryKind::Invoice);
        assert_eq!(statement.entries[0].reference, current.invoice_number);
        assert_eq!(statement.entries[0].balance.cents(), 27000);
        assert_eq!(statement.entries[1].kind, StatementEntryKind::Payment);
        assert_eq!(statement.entries[1].credit.cents(), 8000);
        assert_eq!(statement.total_debits.cents(), 20000);
        assert_eq!(statement.total_credits.cents(), 8000);
        assert_eq!(statement.closing_balance.cents(), 19000);
    }

    #[tokio::test]
    async fn test_prepaid_draft_gives_no_credit_until_finalized() {
        let fx = fixture().await;
        let (shop, cust) = (fx.shop.id.as_str(), fx.customer.id.as_str());
        let invoices = fx.db.invoices();

        let draft = invoices
            .create_from_form(&header(shop, cust, "2026-02-05", "draft"), &rows("100"), "u")
            .await
            .unwrap();
        fx.db
            .payments()
            .record_from_form(&draft.invoice_id, &payment("2026-02-06", "100"), "u")
            .await
            .unwrap();

        let statements = fx.db.statements();
        let before = statements
            .customer_statement(cust, date(2026, 2, 1), date(2026, 2, 28))
            .await
            .unwrap();
        assert!(before.entries.is_empty());
        assert_eq!(before.total_credits, Money::zero());
        assert_eq!(before.closing_balance, Money::zero());

        invoices.finalize_invoice(&draft.invoice_id, "u").await.unwrap();
        let after = statements
            .customer_statement(cust, date(2026, 2, 1), date(2026, 2, 28))
            .await
            .unwrap();
        assert_eq!(after.entries.len(), 2);
        assert_eq!(after.total_debits.cents(), 10000);
        assert_eq!(after.total_credits.cents(), 10000);
        assert_eq!(after.closing_balance, Money::zero());
    }

    #[tokio::test]
    async fn test_unknown_customer_and_bad_period() {
        let fx = fixture().await;
        let statements = fx.db.statements();

        let missing = statements
            .customer_statement("ghost", date(2026, 1, 1), date(2026, 1, 31))
            .await;
        assert!(matches!(missing, Err(DbError::NotFound { .. })));

        let reversed = statements
            .customer_statement(&fx.customer.id, date(2026, 2, 1), date(2026, 1, 1))
            .await;
        assert!(matches!(reversed, Err(DbError::Validation(_))));
    }
}
