//! # Invoice Repository
//!
//! The invoice persistence and stock coordinator.
//!
//! ## Create Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ValidatedInvoice + actor                                               │
//! │       │  compute_totals, due date, initial status   (no I/O)           │
//! │       ▼                                                                 │
//! │  ┌───────────────── BEGIN IMMEDIATE ───────────────────────────────┐   │
//! │  │ 1. allocate invoice number          (sequence.rs)               │   │
//! │  │ 2. mark quotation invoiced          (if referenced)             │   │
//! │  │ 3. INSERT invoices                  (totals, status)            │   │
//! │  │ 4. INSERT invoice_items             (positions 1..n)            │   │
//! │  │ 5. stock out every product line     (dispatched statuses only)  │   │
//! │  └───────────────── COMMIT ────────────────────────────────────────┘   │
//! │       │  any error: transaction dropped → rolled back                  │
//! │       ▼                                                                 │
//! │  retryable? (sequence collision, busy) ──► backoff, rerun everything   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use tradebook_core::validation::{validate_actor, validate_invoice, RawInvoiceHeader, RawLineItem};
use tradebook_core::{
    compute_totals, derive_status, CoreError, Invoice, InvoiceItem, InvoiceStatus, InvoiceTotals,
    LineItem, Money, ValidatedInvoice,
};

use crate::config::InvoicingSettings;
use crate::error::{DbError, DbResult};
use crate::repository::lookup::{customer_code, mark_quotation_invoiced, shop_code};
use crate::repository::sequence::next_invoice_number;
use crate::repository::stock::{apply_stock_out, NegativeStock, StockReference};
use crate::repository::{
    begin_write, decimal_column, new_id, rate_column, rate_value, retry_contended, today,
};

// =============================================================================
// Results
// =============================================================================

/// Outcome of a committed invoice creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedInvoice {
    pub invoice_id: String,
    pub invoice_number: String,
    pub status: InvoiceStatus,
    pub totals: InvoiceTotals,
    /// Products whose stock went below zero.
    pub negative_stock: Vec<NegativeStock>,
}

/// Outcome of finalizing a draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizedInvoice {
    pub invoice_id: String,
    pub invoice_number: String,
    pub status: InvoiceStatus,
    pub negative_stock: Vec<NegativeStock>,
}

/// One row changed by [`InvoiceRepository::refresh_statuses`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub invoice_id: String,
    pub invoice_number: String,
    pub from: InvoiceStatus,
    pub to: InvoiceStatus,
}

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, FromRow)]
struct InvoiceRecord {
    id: String,
    invoice_number: String,
    shop_id: String,
    customer_id: String,
    quotation_id: Option<String>,
    issue_date: NaiveDate,
    due_date: Option<NaiveDate>,
    payment_terms: Option<String>,
    apply_levy: bool,
    levy_rate_bps: i64,
    vat_rate_bps: i64,
    gross_total_cents: i64,
    levy_amount_cents: i64,
    amount_before_vat_cents: i64,
    vat_amount_cents: i64,
    total_net_amount_cents: i64,
    total_paid_cents: i64,
    status: InvoiceStatus,
    notes: Option<String>,
    created_by: String,
    updated_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRecord> for Invoice {
    type Error = DbError;

    fn try_from(r: InvoiceRecord) -> DbResult<Self> {
        Ok(Invoice {
            levy_rate: rate_column("invoices.levy_rate_bps", r.levy_rate_bps)?,
            vat_rate: rate_column("invoices.vat_rate_bps", r.vat_rate_bps)?,
            id: r.id,
            invoice_number: r.invoice_number,
            shop_id: r.shop_id,
            customer_id: r.customer_id,
            quotation_id: r.quotation_id,
            issue_date: r.issue_date,
            due_date: r.due_date,
            payment_terms: r.payment_terms,
            apply_levy: r.apply_levy,
            gross_total: Money::from_cents(r.gross_total_cents),
            levy_amount: Money::from_cents(r.levy_amount_cents),
            amount_before_vat: Money::from_cents(r.amount_before_vat_cents),
            vat_amount: Money::from_cents(r.vat_amount_cents),
            total_net_amount: Money::from_cents(r.total_net_amount_cents),
            total_paid: Money::from_cents(r.total_paid_cents),
            status: r.status,
            notes: r.notes,
            created_by: r.created_by,
            updated_by: r.updated_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct InvoiceItemRecord {
    id: String,
    invoice_id: String,
    position: i64,
    product_id: Option<String>,
    description: String,
    quantity: String,
    unit: String,
    rate_per_unit: String,
    line_total_cents: i64,
}

impl TryFrom<InvoiceItemRecord> for InvoiceItem {
    type Error = DbError;

    fn try_from(r: InvoiceItemRecord) -> DbResult<Self> {
        Ok(InvoiceItem {
            quantity: decimal_column("invoice_items.quantity", &r.quantity)?,
            rate_per_unit: decimal_column("invoice_items.rate_per_unit", &r.rate_per_unit)?,
            id: r.id,
            invoice_id: r.invoice_id,
            position: r.position,
            product_id: r.product_id,
            description: r.description,
            unit: r.unit,
            line_total: Money::from_cents(r.line_total_cents),
        })
    }
}

const SELECT_INVOICES: &str = r#"
    SELECT id, invoice_number, shop_id, customer_id, quotation_id,
           issue_date, due_date, payment_terms,
           apply_levy, levy_rate_bps, vat_rate_bps,
           gross_total_cents, levy_amount_cents, amount_before_vat_cents,
           vat_amount_cents, total_net_amount_cents, total_paid_cents,
           status, notes, created_by, updated_by, created_at, updated_at
    FROM invoices
"#;

const SELECT_ITEMS: &str = r#"
    SELECT id, invoice_id, position, product_id, description,
           quantity, unit, rate_per_unit, line_total_cents
    FROM invoice_items
"#;

// =============================================================================
// Transaction helpers
// =============================================================================

/// Loads an invoice inside a transaction. `NotFound` when missing.
pub(crate) async fn fetch_invoice(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Invoice> {
    let sql = format!("{SELECT_INVOICES} WHERE id = ?1");
    sqlx::query_as::<_, InvoiceRecord>(&sql)
        .bind(invoice_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Invoice", invoice_id))?
        .try_into()
}

/// Re-sums non-voided payments and re-derives the status, writing both.
///
/// Reads the payments committed so far plus any written earlier in the
/// same transaction.
pub(crate) async fn sync_payment_totals(
    conn: &mut SqliteConnection,
    invoice: &Invoice,
    actor_id: &str,
    today: NaiveDate,
) -> DbResult<(Money, InvoiceStatus)> {
    let paid_cents: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM payments WHERE invoice_id = ?1 AND is_voided = 0",
    )
    .bind(&invoice.id)
    .fetch_one(&mut *conn)
    .await?;

    let total_paid = Money::from_cents(paid_cents);
    let status = derive_status(
        invoice.status,
        invoice.total_net_amount,
        total_paid,
        invoice.due_date,
        today,
    );

    sqlx::query(
        r#"
        UPDATE invoices
        SET total_paid_cents = ?1, status = ?2, updated_by = ?3, updated_at = ?4
        WHERE id = ?5
        "#,
    )
    .bind(total_paid.cents())
    .bind(status)
    .bind(actor_id)
    .bind(Utc::now())
    .bind(&invoice.id)
    .execute(&mut *conn)
    .await?;

    debug!(
        invoice_id = %invoice.id,
        total_paid = %total_paid,
        from = %invoice.status,
        to = %status,
        "Invoice payment totals updated"
    );
    Ok((total_paid, status))
}

async fn update_status(
    conn: &mut SqliteConnection,
    invoice_id: &str,
    status: InvoiceStatus,
    actor_id: &str,
) -> DbResult<()> {
    sqlx::query("UPDATE invoices SET status = ?1, updated_by = ?2, updated_at = ?3 WHERE id = ?4")
        .bind(status)
        .bind(actor_id)
        .bind(Utc::now())
        .bind(invoice_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Stocks out every product line, collecting the products that went negative.
async fn dispatch_lines(
    conn: &mut SqliteConnection,
    lines: &[(&str, Decimal)],
    reference: StockReference<'_>,
    allow_negative: bool,
) -> DbResult<Vec<NegativeStock>> {
    let mut negative_stock = Vec::new();

    for (product_id, quantity) in lines {
        if *quantity <= Decimal::ZERO {
            continue;
        }
        if let Some(negative) = apply_stock_out(conn, product_id, *quantity, reference, allow_negative).await? {
            negative_stock.push(negative);
        }
    }

    Ok(negative_stock)
}

fn invalid_status(invoice: &Invoice, operation: &str) -> DbError {
    DbError::Domain(CoreError::InvalidInvoiceStatus {
        invoice_id: invoice.id.clone(),
        current_status: invoice.status.to_string(),
        operation: operation.to_string(),
    })
}

// =============================================================================
// Repository
// =============================================================================

/// Everything computed before the create transaction opens.
struct CreatePlan<'a> {
    invoice: &'a ValidatedInvoice,
    totals: InvoiceTotals,
    due_date: Option<NaiveDate>,
    status: InvoiceStatus,
    actor_id: String,
}

/// Repository for invoices and their stock side effects.
///
/// ## Usage
/// ```rust,ignore
/// let created = db.invoices().create_from_form(&header, &rows, "user-7").await?;
/// println!("{} {}", created.invoice_number, created.totals.total_net_amount);
/// ```
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
    settings: InvoicingSettings,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool, settings: InvoicingSettings) -> Self {
        InvoiceRepository { pool, settings }
    }

    // -------------------------------------------------------------------------
    // Create
    // -------------------------------------------------------------------------

    /// Validates a raw form submission and creates the invoice.
    ///
    /// Blank levy/VAT fields take the deployment defaults.
    pub async fn create_from_form(
        &self,
        header: &RawInvoiceHeader,
        rows: &[RawLineItem],
        actor_id: &str,
    ) -> DbResult<CreatedInvoice> {
        let defaults = self.settings.levy_defaults()?;
        let validated = validate_invoice(header, rows, &defaults)?;
        self.create_invoice(&validated, actor_id).await
    }

    /// Persists a validated invoice, its items and (when dispatched) its
    /// stock-out side effects as one atomic unit.
    ///
    /// ## Errors
    /// - `Validation` for a blank actor or an empty/overflowing item list
    /// - `NotFound` for a missing shop, customer, quotation or product
    /// - `Domain(InsufficientStock)` when negative stock is disabled
    /// - `Sequence` after the retry budget is spent
    pub async fn create_invoice(&self, invoice: &ValidatedInvoice, actor_id: &str) -> DbResult<CreatedInvoice> {
        let actor_id = validate_actor(actor_id)?;
        let header = &invoice.header;
        let totals = compute_totals(&invoice.items, &header.levy)?;

        let due_date = header.due_date.or_else(|| {
            header
                .issue_date
                .checked_add_days(Days::new(u64::from(self.settings.payment_terms_days)))
        });
        let status = derive_status(
            header.initial_status,
            totals.total_net_amount,
            Money::zero(),
            due_date,
            today(),
        );

        let plan = CreatePlan {
            invoice,
            totals,
            due_date,
            status,
            actor_id,
        };

        retry_contended(&self.settings, "create invoice", || self.try_create(&plan)).await
    }

    async fn try_create(&self, plan: &CreatePlan<'_>) -> DbResult<CreatedInvoice> {
        let header = &plan.invoice.header;
        let items = &plan.invoice.items;
        let now = Utc::now();
        let invoice_id = new_id();

        let mut tx = begin_write(&self.pool).await?;

        shop_code(&mut tx, &header.shop_id).await?;
        customer_code(&mut tx, &header.customer_id).await?;

        let invoice_number = next_invoice_number(
            &mut tx,
            self.settings.numbering,
            &header.shop_id,
            &header.customer_id,
            header.issue_date,
        )
        .await?;

        if let Some(quotation_id) = &header.quotation_id {
            mark_quotation_invoiced(&mut tx, quotation_id).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number, shop_id, customer_id, quotation_id,
                issue_date, due_date, payment_terms,
                apply_levy, levy_rate_bps, vat_rate_bps,
                gross_total_cents, levy_amount_cents, amount_before_vat_cents,
                vat_amount_cents, total_net_amount_cents, total_paid_cents,
                status, notes, created_by, updated_by, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8,
                ?9, ?10, ?11,
                ?12, ?13, ?14,
                ?15, ?16, 0,
                ?17, ?18, ?19, ?19, ?20, ?20
            )
            "#,
        )
        .bind(&invoice_id)
        .bind(&invoice_number)
        .bind(&header.shop_id)
        .bind(&header.customer_id)
        .bind(&header.quotation_id)
        .bind(header.issue_date)
        .bind(plan.due_date)
        .bind(&header.payment_terms)
        .bind(header.levy.apply_levy)
        .bind(rate_value(header.levy.levy_rate))
        .bind(rate_value(header.levy.vat_rate))
        .bind(plan.totals.gross_total.cents())
        .bind(plan.totals.levy_amount.cents())
        .bind(plan.totals.amount_before_vat.cents())
        .bind(plan.totals.vat_amount.cents())
        .bind(plan.totals.total_net_amount.cents())
        .bind(plan.status)
        .bind(&header.notes)
        .bind(&plan.actor_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        insert_items(&mut tx, &invoice_id, items).await?;

        let negative_stock = if plan.status.implies_dispatch() {
            let lines: Vec<(&str, Decimal)> = items
                .iter()
                .filter(|item| item.moves_stock())
                .filter_map(|item| item.product_id().map(|id| (id, item.quantity())))
                .collect();
            let reference = StockReference {
                invoice_id: &invoice_id,
                invoice_number: &invoice_number,
                actor_id: &plan.actor_id,
            };
            dispatch_lines(&mut tx, &lines, reference, self.settings.allow_negative_stock).await?
        } else {
            Vec::new()
        };

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            invoice_id = %invoice_id,
            invoice_number = %invoice_number,
            status = %plan.status,
            items = items.len(),
            total_net = %plan.totals.total_net_amount,
            negative_stock = negative_stock.len(),
            actor = %plan.actor_id,
            "Invoice created"
        );

        Ok(CreatedInvoice {
            invoice_id,
            invoice_number,
            status: plan.status,
            totals: plan.totals,
            negative_stock,
        })
    }

    // -------------------------------------------------------------------------
    // Explicit transitions
    // -------------------------------------------------------------------------

    /// Moves a draft to Finalized, applying its stock-out in the same
    /// transaction. The stored status is then re-derived, so a fully paid or
    /// past-due draft lands directly on Paid or Overdue.
    pub async fn finalize_invoice(&self, invoice_id: &str, actor_id: &str) -> DbResult<FinalizedInvoice> {
        let actor_id = validate_actor(actor_id)?;
        retry_contended(&self.settings, "finalize invoice", || {
            self.try_finalize(invoice_id, &actor_id)
        })
        .await
    }

    async fn try_finalize(&self, invoice_id: &str, actor_id: &str) -> DbResult<FinalizedInvoice> {
        let mut tx = begin_write(&self.pool).await?;

        let invoice = fetch_invoice(&mut tx, invoice_id).await?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(invalid_status(&invoice, "finalize"));
        }

        let items = load_items(&mut tx, invoice_id).await?;
        let lines: Vec<(&str, Decimal)> = items
            .iter()
            .filter_map(|item| item.product_id.as_deref().map(|id| (id, item.quantity)))
            .collect();
        let reference = StockReference {
            invoice_id: &invoice.id,
            invoice_number: &invoice.invoice_number,
            actor_id,
        };
        let negative_stock =
            dispatch_lines(&mut tx, &lines, reference, self.settings.allow_negative_stock).await?;

        let status = derive_status(
            InvoiceStatus::Finalized,
            invoice.total_net_amount,
            invoice.total_paid,
            invoice.due_date,
            today(),
        );
        update_status(&mut tx, invoice_id, status, actor_id).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            invoice_id = %invoice_id,
            invoice_number = %invoice.invoice_number,
            status = %status,
            negative_stock = negative_stock.len(),
            actor = %actor_id,
            "Invoice finalized"
        );

        Ok(FinalizedInvoice {
            invoice_id: invoice.id,
            invoice_number: invoice.invoice_number,
            status,
            negative_stock,
        })
    }

    /// Cancels an invoice. Dispatched stock is not returned.
    ///
    /// ## Errors
    /// `Domain(InvalidInvoiceStatus)` when already cancelled or when
    /// non-voided payments exist.
    pub async fn cancel_invoice(&self, invoice_id: &str, actor_id: &str) -> DbResult<Invoice> {
        let actor_id = validate_actor(actor_id)?;
        retry_contended(&self.settings, "cancel invoice", || self.try_cancel(invoice_id, &actor_id)).await
    }

    async fn try_cancel(&self, invoice_id: &str, actor_id: &str) -> DbResult<Invoice> {
        let mut tx = begin_write(&self.pool).await?;

        let invoice = fetch_invoice(&mut tx, invoice_id).await?;
        if invoice.status == InvoiceStatus::Cancelled {
            return Err(invalid_status(&invoice, "cancel"));
        }
        if invoice.total_paid.is_positive() {
            return Err(invalid_status(&invoice, "cancel while payments are recorded"));
        }

        update_status(&mut tx, invoice_id, InvoiceStatus::Cancelled, actor_id).await?;
        let cancelled = fetch_invoice(&mut tx, invoice_id).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            invoice_id = %invoice_id,
            invoice_number = %invoice.invoice_number,
            from = %invoice.status,
            actor = %actor_id,
            "Invoice cancelled"
        );
        Ok(cancelled)
    }

    /// Re-derives the status of every open invoice for `today`.
    ///
    /// Draft and Cancelled invoices are never touched. Only rows whose status
    /// actually changes are written; running it twice for the same day
    /// changes nothing the second time.
    pub async fn refresh_statuses(&self, today: NaiveDate) -> DbResult<Vec<StatusChange>> {
        retry_contended(&self.settings, "refresh statuses", || self.try_refresh(today)).await
    }

    async fn try_refresh(&self, today: NaiveDate) -> DbResult<Vec<StatusChange>> {
        let mut tx = begin_write(&self.pool).await?;

        let sql = format!("{SELECT_INVOICES} WHERE status NOT IN (?1, ?2)");
        let open: Vec<InvoiceRecord> = sqlx::query_as(&sql)
            .bind(InvoiceStatus::Draft)
            .bind(InvoiceStatus::Cancelled)
            .fetch_all(&mut *tx)
            .await?;

        let mut changes = Vec::new();
        for record in open {
            let invoice = Invoice::try_from(record)?;
            let next = invoice.derive_status(today);
            if next == invoice.status {
                continue;
            }

            sqlx::query("UPDATE invoices SET status = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(next)
                .bind(Utc::now())
                .bind(&invoice.id)
                .execute(&mut *tx)
                .await?;

            debug!(
                invoice_number = %invoice.invoice_number,
                from = %invoice.status,
                to = %next,
                "Invoice status refreshed"
            );
            changes.push(StatusChange {
                invoice_id: invoice.id,
                invoice_number: invoice.invoice_number,
                from: invoice.status,
                to: next,
            });
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(%today, changed = changes.len(), "Invoice statuses refreshed");
        Ok(changes)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Gets an invoice by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Invoice>> {
        let sql = format!("{SELECT_INVOICES} WHERE id = ?1");
        let record = sqlx::query_as::<_, InvoiceRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        record.map(Invoice::try_from).transpose()
    }

    /// Gets an invoice by its invoice number.
    pub async fn get_by_number(&self, invoice_number: &str) -> DbResult<Option<Invoice>> {
        let sql = format!("{SELECT_INVOICES} WHERE invoice_number = ?1");
        let record = sqlx::query_as::<_, InvoiceRecord>(&sql)
            .bind(invoice_number)
            .fetch_optional(&self.pool)
            .await?;

        record.map(Invoice::try_from).transpose()
    }

    /// Items of an invoice in position order.
    pub async fn get_items(&self, invoice_id: &str) -> DbResult<Vec<InvoiceItem>> {
        let mut conn = self.pool.acquire().await?;
        load_items(&mut conn, invoice_id).await
    }

    /// A customer's invoices, newest first.
    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<Invoice>> {
        let sql = format!("{SELECT_INVOICES} WHERE customer_id = ?1 ORDER BY issue_date DESC, invoice_number DESC");
        let records = sqlx::query_as::<_, InvoiceRecord>(&sql)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;

        records.into_iter().map(Invoice::try_from).collect()
    }
}

async fn insert_items(conn: &mut SqliteConnection, invoice_id: &str, items: &[LineItem]) -> DbResult<()> {
    for (idx, item) in items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO invoice_items (
                id, invoice_id, position, product_id, description,
                quantity, unit, rate_per_unit, line_total_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(new_id())
        .bind(invoice_id)
        .bind(idx as i64 + 1)
        .bind(item.product_id())
        .bind(item.description())
        .bind(item.quantity().to_string())
        .bind(item.unit())
        .bind(item.rate_per_unit().to_string())
        .bind(item.line_total().cents())
        .execute(&mut *conn)
        .await?;
    }

    debug!(invoice_id = %invoice_id, count = items.len(), "Invoice items inserted");
    Ok(())
}

async fn load_items(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Vec<InvoiceItem>> {
    let sql = format!("{SELECT_ITEMS} WHERE invoice_id = ?1 ORDER BY position");
    let records = sqlx::query_as::<_, InvoiceItemRecord>(&sql)
        .bind(invoice_id)
        .fetch_all(&mut *conn)
        .await?;

    records.into_iter().map(InvoiceItem::try_from).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
