//! # Invoice Number Allocation
//!
//! Allocates the next invoice number inside the caller's transaction.
//!
//! ```text
//! Monthly            SELECT highest INV-YYYYMM-% ──► +1 ──► INV-YYYYMM-NNNN
//!                    (a concurrent writer taking the same number surfaces
//!                     as UNIQUE(invoice_number) → DbError::Sequence)
//!
//! PerShopCustomer    UPSERT invoice_sequences (+1) RETURNING last_sequence
//!                    SELECT last_sequence            ──► must match
//!                    ──► INV-<SHOP>/CUST<CUST>-NNN
//! ```
//!
//! Both failure modes are retryable; the coordinator reruns the whole
//! transaction.

use chrono::{NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use tradebook_core::numbering::{
    format_monthly, format_shop_customer, monthly_prefix, next_monthly_sequence, NumberingStrategy,
};

use crate::error::{DbError, DbResult};
use crate::repository::lookup::{customer_code, shop_code};

/// Allocates the next invoice number for the given strategy.
pub(crate) async fn next_invoice_number(
    conn: &mut SqliteConnection,
    strategy: NumberingStrategy,
    shop_id: &str,
    customer_id: &str,
    issue_date: NaiveDate,
) -> DbResult<String> {
    let number = match strategy {
        NumberingStrategy::Monthly => next_monthly_number(conn, issue_date).await?,
        NumberingStrategy::PerShopCustomer => next_shop_customer_number(conn, shop_id, customer_id).await?,
    };

    debug!(strategy = %strategy, invoice_number = %number, "Invoice number allocated");
    Ok(number)
}

async fn next_monthly_number(conn: &mut SqliteConnection, issue_date: NaiveDate) -> DbResult<String> {
    let prefix = monthly_prefix(issue_date);

    // Longest first so 10000 sorts after 9999.
    let highest: Option<String> = sqlx::query_scalar(
        r#"
        SELECT invoice_number
        FROM invoices
        WHERE invoice_number LIKE ?1 || '%'
        ORDER BY LENGTH(invoice_number) DESC, invoice_number DESC
        LIMIT 1
        "#,
    )
    .bind(&prefix)
    .fetch_optional(&mut *conn)
    .await?;

    let sequence = next_monthly_sequence(issue_date, highest.as_deref());
    Ok(format_monthly(issue_date, sequence))
}

async fn next_shop_customer_number(
    conn: &mut SqliteConnection,
    shop_id: &str,
    customer_id: &str,
) -> DbResult<String> {
    let shop = shop_code(conn, shop_id).await?;
    let customer = customer_code(conn, customer_id).await?;

    let bumped: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO invoice_sequences (shop_id, customer_id, last_sequence, updated_at)
        VALUES (?1, ?2, 1, ?3)
        ON CONFLICT (shop_id, customer_id)
        DO UPDATE SET last_sequence = last_sequence + 1, updated_at = excluded.updated_at
        RETURNING last_sequence
        "#,
    )
    .bind(shop_id)
    .bind(customer_id)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;

    let stored: Option<i64> = sqlx::query_scalar(
        "SELECT last_sequence FROM invoice_sequences WHERE shop_id = ?1 AND customer_id = ?2",
    )
    .bind(shop_id)
    .bind(customer_id)
    .fetch_optional(&mut *conn)
    .await?;

    if stored != Some(bumped) {
        return Err(DbError::Sequence(format!(
            "counter for shop {} / customer {} moved from {} to {:?}",
            shop_id, customer_id, bumped, stored
        )));
    }

    let sequence = u32::try_from(bumped)
        .map_err(|_| DbError::Sequence(format!("counter out of range: {}", bumped)))?;

    Ok(format_shop_customer(&shop, &customer, sequence))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::fixture;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_shop_customer_counter_increments() {
        let fx = fixture().await;
        let mut conn = fx.db.pool().acquire().await.unwrap();

        let first = next_invoice_number(
            &mut conn,
            NumberingStrategy::PerShopCustomer,
            &fx.shop.id,
            &fx.customer.id,
            date(2026, 1, 1),
        )
        .await
        .unwrap();
        let second = next_invoice_number(
            &mut conn,
            NumberingStrategy::PerShopCustomer,
            &fx.shop.id,
            &fx.customer.id,
            date(2026, 1, 1),
        )
        .await
        .unwrap();

        assert_eq!(first, "INV-LL01/CUST0042-001");
        assert_eq!(second, "INV-LL01/CUST0042-002");
    }

    #[tokio::test]
    async fn test_shop_customer_unknown_shop() {
        let fx = fixture().await;
        let mut conn = fx.db.pool().acquire().await.unwrap();

        let err = next_invoice_number(
            &mut conn,
            NumberingStrategy::PerShopCustomer,
            "missing",
            &fx.customer.id,
            date(2026, 1, 1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_monthly_starts_at_one() {
        let fx = fixture().await;
        let mut conn = fx.db.pool().acquire().await.unwrap();

        let number = next_invoice_number(
            &mut conn,
            NumberingStrategy::Monthly,
            &fx.shop.id,
            &fx.customer.id,
            date(2026, 2, 14),
        )
        .await
        .unwrap();
        assert_eq!(number, "INV-202602-0001");
    }
}
