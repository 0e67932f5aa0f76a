//! # Payment Repository
//!
//! Payments against invoices, and the status changes they drive.
//!
//! ## Payment Flow
//! ```text
//! record_payment ──► BEGIN IMMEDIATE
//!                     ├── load invoice (NotFound / Cancelled → error)
//!                     ├── INSERT payments
//!                     ├── total_paid = SUM(non-voided amounts)
//!                     └── status = derive_status(...)
//!                    COMMIT
//! ```
//!
//! Voiding follows the same shape: the payment is flagged, never deleted,
//! and the invoice totals are re-summed. Both run under the same bounded
//! retry as invoice creation when the database is busy.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::info;

use tradebook_core::validation::{validate_actor, validate_payment, RawPayment};
use tradebook_core::{CoreError, InvoiceStatus, Money, NewPayment, Payment, PaymentMethod};

use crate::config::InvoicingSettings;
use crate::error::{DbError, DbResult};
use crate::repository::invoice::{fetch_invoice, sync_payment_totals};
use crate::repository::{begin_write, new_id, retry_contended, today};

/// Invoice state after a payment was recorded or voided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub payment_id: String,
    pub invoice_id: String,
    pub new_total_paid: Money,
    pub balance_due: Money,
    pub new_status: InvoiceStatus,
}

#[derive(Debug, FromRow)]
struct PaymentRecord {
    id: String,
    invoice_id: String,
    payment_date: NaiveDate,
    amount_cents: i64,
    method: PaymentMethod,
    reference_number: Option<String>,
    notes: Option<String>,
    recorded_by: String,
    is_voided: bool,
    voided_by: Option<String>,
    voided_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<PaymentRecord> for Payment {
    fn from(r: PaymentRecord) -> Self {
        Payment {
            id: r.id,
            invoice_id: r.invoice_id,
            payment_date: r.payment_date,
            amount: Money::from_cents(r.amount_cents),
            method: r.method,
            reference_number: r.reference_number,
            notes: r.notes,
            recorded_by: r.recorded_by,
            is_voided: r.is_voided,
            voided_by: r.voided_by,
            voided_at: r.voided_at,
            created_at: r.created_at,
        }
    }
}

const SELECT_PAYMENTS: &str = r#"
    SELECT id, invoice_id, payment_date, amount_cents, method,
           reference_number, notes, recorded_by,
           is_voided, voided_by, voided_at, created_at
    FROM payments
"#;

/// Repository for invoice payments.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
    settings: InvoicingSettings,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository. Only the retry settings are used.
    pub fn new(pool: SqlitePool, settings: InvoicingSettings) -> Self {
        PaymentRepository { pool, settings }
    }

    /// Validates a raw payment form and records it.
    pub async fn record_from_form(
        &self,
        invoice_id: &str,
        raw: &RawPayment,
        actor_id: &str,
    ) -> DbResult<PaymentOutcome> {
        let payment = validate_payment(raw)?;
        self.record_payment(invoice_id, &payment, actor_id).await
    }

    /// Records a payment and re-derives the invoice status.
    ///
    /// Overpayment is accepted; the invoice simply becomes Paid. Payments on
    /// a Draft are stored but leave the status at Draft.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown invoice
    /// - `Domain(InvalidInvoiceStatus)` for a cancelled invoice
    pub async fn record_payment(
        &self,
        invoice_id: &str,
        payment: &NewPayment,
        actor_id: &str,
    ) -> DbResult<PaymentOutcome> {
        let actor_id = validate_actor(actor_id)?;
        retry_contended(&self.settings, "record payment", || {
            self.try_record(invoice_id, payment, &actor_id)
        })
        .await
    }

    async fn try_record(&self, invoice_id: &str, payment: &NewPayment, actor_id: &str) -> DbResult<PaymentOutcome> {
        let mut tx = begin_write(&self.pool).await?;

        let invoice = fetch_invoice(&mut tx, invoice_id).await?;
        if invoice.status == InvoiceStatus::Cancelled {
            return Err(DbError::Domain(CoreError::InvalidInvoiceStatus {
                invoice_id: invoice.id.clone(),
                current_status: invoice.status.to_string(),
                operation: "record payment".to_string(),
            }));
        }

        let payment_id = new_id();
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, invoice_id, payment_date, amount_cents, method,
                reference_number, notes, recorded_by, is_voided, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)
            "#,
        )
        .bind(&payment_id)
        .bind(invoice_id)
        .bind(payment.payment_date)
        .bind(payment.amount.cents())
        .bind(payment.method)
        .bind(&payment.reference_number)
        .bind(&payment.notes)
        .bind(actor_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let (total_paid, status) = sync_payment_totals(&mut tx, &invoice, actor_id, today()).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            payment_id = %payment_id,
            invoice_number = %invoice.invoice_number,
            amount = %payment.amount,
            method = payment.method.as_str(),
            total_paid = %total_paid,
            status = %status,
            actor = %actor_id,
            "Payment recorded"
        );

        Ok(PaymentOutcome {
            payment_id,
            invoice_id: invoice.id,
            new_total_paid: total_paid,
            balance_due: invoice.total_net_amount - total_paid,
            new_status: status,
        })
    }

    /// Voids a payment and re-derives the invoice status.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown payment
    /// - `UniqueViolation` when the payment is already voided
    pub async fn void_payment(&self, payment_id: &str, actor_id: &str) -> DbResult<PaymentOutcome> {
        let actor_id = validate_actor(actor_id)?;
        retry_contended(&self.settings, "void payment", || self.try_void(payment_id, &actor_id)).await
    }

    async fn try_void(&self, payment_id: &str, actor_id: &str) -> DbResult<PaymentOutcome> {
        let mut tx = begin_write(&self.pool).await?;

        let sql = format!("{SELECT_PAYMENTS} WHERE id = ?1");
        let payment: Payment = sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(payment_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("Payment", payment_id))?
            .into();

        if payment.is_voided {
            return Err(DbError::duplicate("payment void", payment_id));
        }

        sqlx::query("UPDATE payments SET is_voided = 1, voided_by = ?1, voided_at = ?2 WHERE id = ?3")
            .bind(actor_id)
            .bind(Utc::now())
            .bind(payment_id)
            .execute(&mut *tx)
            .await?;

        let invoice = fetch_invoice(&mut tx, &payment.invoice_id).await?;
        let (total_paid, status) = sync_payment_totals(&mut tx, &invoice, actor_id, today()).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            payment_id = %payment_id,
            invoice_number = %invoice.invoice_number,
            amount = %payment.amount,
            total_paid = %total_paid,
            status = %status,
            actor = %actor_id,
            "Payment voided"
        );

        Ok(PaymentOutcome {
            payment_id: payment.id,
            invoice_id: invoice.id,
            new_total_paid: total_paid,
            balance_due: invoice.total_net_amount - total_paid,
            new_status: status,
        })
    }

    /// Gets a payment by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payment>> {
        let sql = format!("{SELECT_PAYMENTS} WHERE id = ?1");
        let record = sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(Payment::from))
    }

    /// All payments for an invoice, voided ones included, oldest first.
    pub async fn list_for_invoice(&self, invoice_id: &str) -> DbResult<Vec<Payment>> {
        let sql = format!("{SELECT_PAYMENTS} WHERE invoice_id = ?1 ORDER BY payment_date, created_at");
        let records = sqlx::query_as::<_, PaymentRecord>(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(records.into_iter().map(Payment::from).collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
