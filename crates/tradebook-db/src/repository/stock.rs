//! # Stock Ledger
//!
//! Stock-out side effects of dispatched invoices, and queries over the
//! append-only `stock_transactions` ledger.
//!
//! Each stock-out in one transaction:
//! 1. reads the product's stock on hand and units sold
//! 2. writes `stock - qty` and `sold + qty` back
//! 3. appends a `stock_out` entry carrying the post-decrement balance
//!
//! Quantities are exact decimals stored as TEXT, so the arithmetic happens
//! here rather than in SQL.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use tradebook_core::{CoreError, StockTransaction, StockTransactionType};

use crate::error::{DbError, DbResult};
use crate::repository::{decimal_column, new_id};

/// Reference type recorded on ledger entries created by invoices.
pub const INVOICE_REFERENCE: &str = "invoice";

/// A product whose stock went below zero during dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegativeStock {
    pub product_id: String,
    pub product_code: String,
    /// Stock on hand after the decrement.
    pub balance: Decimal,
}

/// What a stock-out is for.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StockReference<'a> {
    pub invoice_id: &'a str,
    pub invoice_number: &'a str,
    pub actor_id: &'a str,
}

#[derive(Debug, FromRow)]
struct StockLevelRecord {
    code: String,
    current_stock: String,
    units_sold: String,
}

/// Applies one stock-out inside the caller's transaction.
///
/// ## Returns
/// `Some(NegativeStock)` when the product's balance ended below zero.
///
/// ## Errors
/// - `NotFound` when the product does not exist
/// - `Domain(InsufficientStock)` when the balance would go negative and
///   `allow_negative` is false
pub(crate) async fn apply_stock_out(
    conn: &mut SqliteConnection,
    product_id: &str,
    quantity: Decimal,
    reference: StockReference<'_>,
    allow_negative: bool,
) -> DbResult<Option<NegativeStock>> {
    let level = sqlx::query_as::<_, StockLevelRecord>(
        "SELECT code, current_stock, units_sold FROM products WHERE id = ?1",
    )
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("Product", product_id))?;

    let on_hand = decimal_column("products.current_stock", &level.current_stock)?;
    let sold = decimal_column("products.units_sold", &level.units_sold)?;
    let balance = on_hand - quantity;

    if balance < Decimal::ZERO && !allow_negative {
        return Err(DbError::Domain(CoreError::InsufficientStock {
            product_code: level.code,
            available: on_hand.to_string(),
            requested: quantity.to_string(),
        }));
    }

    let now = Utc::now();

    sqlx::query(
        "UPDATE products SET current_stock = ?1, units_sold = ?2, updated_at = ?3 WHERE id = ?4",
    )
    .bind(balance.to_string())
    .bind((sold + quantity).to_string())
    .bind(now)
    .bind(product_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO stock_transactions (
            id, product_id, transaction_type, quantity, running_balance,
            reference_type, reference_id, reference_number, created_by, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(new_id())
    .bind(product_id)
    .bind(StockTransactionType::StockOut)
    .bind(quantity.to_string())
    .bind(balance.to_string())
    .bind(INVOICE_REFERENCE)
    .bind(reference.invoice_id)
    .bind(reference.invoice_number)
    .bind(reference.actor_id)
    .bind(format!("Dispatched on invoice {}", reference.invoice_number))
    .bind(now)
    .execute(&mut *conn)
    .await?;

    debug!(
        product_id = %product_id,
        quantity = %quantity,
        balance = %balance,
        invoice_number = %reference.invoice_number,
        "Stock out recorded"
    );

    if balance < Decimal::ZERO {
        warn!(
            product_id = %product_id,
            product_code = %level.code,
            balance = %balance,
            invoice_number = %reference.invoice_number,
            "Stock went negative"
        );
        return Ok(Some(NegativeStock {
            product_id: product_id.to_string(),
            product_code: level.code,
            balance,
        }));
    }

    Ok(None)
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, FromRow)]
struct StockTransactionRecord {
    id: String,
    product_id: String,
    transaction_type: StockTransactionType,
    quantity: String,
    running_balance: String,
    reference_type: String,
    reference_id: String,
    reference_number: String,
    created_by: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<StockTransactionRecord> for StockTransaction {
    type Error = DbError;

    fn try_from(r: StockTransactionRecord) -> DbResult<Self> {
        Ok(StockTransaction {
            quantity: decimal_column("stock_transactions.quantity", &r.quantity)?,
            running_balance: decimal_column("stock_transactions.running_balance", &r.running_balance)?,
            id: r.id,
            product_id: r.product_id,
            transaction_type: r.transaction_type,
            reference_type: r.reference_type,
            reference_id: r.reference_id,
            reference_number: r.reference_number,
            created_by: r.created_by,
            notes: r.notes,
            created_at: r.created_at,
        })
    }
}

const SELECT_TRANSACTIONS: &str = r#"
    SELECT id, product_id, transaction_type, quantity, running_balance,
           reference_type, reference_id, reference_number, created_by, notes, created_at
    FROM stock_transactions
"#;

/// Read access to the stock ledger.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Ledger entries for a product, oldest first.
    pub async fn list_for_product(&self, product_id: &str) -> DbResult<Vec<StockTransaction>> {
        let sql = format!("{SELECT_TRANSACTIONS} WHERE product_id = ?1 ORDER BY created_at, rowid");
        let records = sqlx::query_as::<_, StockTransactionRecord>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;

        records.into_iter().map(StockTransaction::try_from).collect()
    }

    /// Ledger entries created by one invoice.
    pub async fn list_for_invoice(&self, invoice_id: &str) -> DbResult<Vec<StockTransaction>> {
        let sql = format!(
            "{SELECT_TRANSACTIONS} WHERE reference_type = ?1 AND reference_id = ?2 ORDER BY rowid"
        );
        let records = sqlx::query_as::<_, StockTransactionRecord>(&sql)
            .bind(INVOICE_REFERENCE)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?;

        records.into_iter().map(StockTransaction::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::{fixture, product};
    use rust_decimal_macros::dec;

    fn reference() -> StockReference<'static> {
        StockReference {
            invoice_id: "inv-1",
            invoice_number: "INV-202601-0001",
            actor_id: "user-1",
        }
    }

    #[tokio::test]
    async fn test_stock_out_updates_product_and_ledger() {
        let fx = fixture().await;
        let cement = product(&fx.db, "CEM", dec!(10)).await;

        let mut conn = fx.db.pool().acquire().await.unwrap();
        let negative = apply_stock_out(&mut conn, &cement.id, dec!(2.5), reference(), true)
            .await
            .unwrap();
        drop(conn);
        assert_eq!(negative, None);

        let loaded = fx.db.lookups().get_product(&cement.id).await.unwrap().unwrap();
        assert_eq!(loaded.current_stock, dec!(7.5));
        assert_eq!(loaded.units_sold, dec!(2.5));

        let ledger = fx.db.stock().list_for_product(&cement.id).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].running_balance, dec!(7.5));
        assert_eq!(ledger[0].reference_type, INVOICE_REFERENCE);
    }

    #[tokio::test]
    async fn test_negative_stock_reported_or_refused() {
        let fx = fixture().await;
        let nails = product(&fx.db, "NAIL", dec!(1)).await;
        let mut conn = fx.db.pool().acquire().await.unwrap();

        let refused = apply_stock_out(&mut conn, &nails.id, dec!(3), reference(), false).await;
        assert!(matches!(
            refused,
            Err(DbError::Domain(CoreError::InsufficientStock { .. }))
        ));

        let negative = apply_stock_out(&mut conn, &nails.id, dec!(3), reference(), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(negative.product_code, "NAIL");
        assert_eq!(negative.balance, dec!(-2));
    }

    #[tokio::test]
    async fn test_missing_product() {
        let fx = fixture().await;
        let mut conn = fx.db.pool().acquire().await.unwrap();
        let err = apply_stock_out(&mut conn, "ghost", dec!(1), reference(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
