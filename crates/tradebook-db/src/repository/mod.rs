//! # Repository Module
//!
//! Database repository implementations for Tradebook.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Caller                                                                │
//! │       │  db.invoices().create_invoice(&validated, "user-7")            │
//! │       ▼                                                                 │
//! │  InvoiceRepository  ── one transaction ──┐                             │
//! │  ├── sequence::next_invoice_number       │  &mut SqliteConnection      │
//! │  ├── INSERT invoices / invoice_items     │  helpers share the same     │
//! │  └── stock::apply_stock_out              │  transaction                │
//! │       │                                  ┘                             │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories own a pool handle and open their own transactions.
//! Module-level `pub(crate)` helpers take `&mut SqliteConnection` so the
//! coordinator can compose them inside one transaction.
//!
//! ## Available Repositories
//!
//! - [`InvoiceRepository`](invoice::InvoiceRepository) - Invoice persistence & stock coordinator
//! - [`PaymentRepository`](payment::PaymentRepository) - Payments and payment-driven status
//! - [`StockRepository`](stock::StockRepository) - Stock ledger queries
//! - [`LookupRepository`](lookup::LookupRepository) - Shops, customers, products, quotations
//! - [`StatementRepository`](statement::StatementRepository) - Customer statements

pub mod invoice;
pub mod lookup;
pub mod payment;
pub mod sequence;
pub mod statement;
pub mod stock;

use std::future::Future;
use std::str::FromStr;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::warn;
use tradebook_core::{CoreError, PercentRate};
use uuid::Uuid;

use crate::config::InvoicingSettings;
use crate::error::{DbError, DbResult};

/// Opens a write transaction holding the database write lock from its first
/// statement.
///
/// A deferred `BEGIN` takes the lock on the first write, after the reads;
/// two such transactions that both read can deadlock on the upgrade and one
/// fails with `SQLITE_BUSY` regardless of `busy_timeout`. `BEGIN IMMEDIATE`
/// waits on `busy_timeout` instead.
pub(crate) async fn begin_write(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or
/// `settings.max_retries` retries are spent.
///
/// Each attempt must open and commit its own transaction; a failed attempt
/// has already rolled back when it returns.
pub(crate) async fn retry_contended<T, F, Fut>(
    settings: &InvoicingSettings,
    operation: &str,
    mut attempt: F,
) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut backoff = ExponentialBackoff {
        initial_interval: settings.initial_backoff(),
        max_interval: settings.max_backoff(),
        multiplier: 2.0,
        max_elapsed_time: None,
        ..Default::default()
    };

    let mut tries: u32 = 0;
    loop {
        tries += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && tries <= settings.max_retries => {
                let delay = backoff.next_backoff().unwrap_or_else(|| settings.max_backoff());
                warn!(
                    operation = %operation,
                    attempt = tries,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Write contended, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Generates a new entity id.
pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Business date used for status derivation.
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Reads a decimal stored as TEXT.
pub(crate) fn decimal_column(field: &str, value: &str) -> DbResult<Decimal> {
    Decimal::from_str(value).map_err(|_| {
        DbError::Domain(CoreError::CorruptValue {
            field: field.to_string(),
            value: value.to_string(),
        })
    })
}

/// Reads a percentage stored as basis points.
pub(crate) fn rate_column(field: &str, bps: i64) -> DbResult<PercentRate> {
    u32::try_from(bps).map(PercentRate::from_bps).map_err(|_| {
        DbError::Domain(CoreError::CorruptValue {
            field: field.to_string(),
            value: bps.to_string(),
        })
    })
}

/// Integer encoding of a percentage for storage.
pub(crate) fn rate_value(rate: PercentRate) -> i64 {
    i64::from(rate.bps())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the repository tests.

    use std::path::PathBuf;
    use std::time::Duration;

    use rust_decimal::Decimal;
    use tradebook_core::{Customer, Money, Product, Shop};
    use uuid::Uuid;

    use crate::pool::{Database, DbConfig};
    use crate::repository::lookup::NewProduct;

    pub(crate) struct Fixture {
        pub db: Database,
        pub shop: Shop,
        pub customer: Customer,
    }

    pub(crate) async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let shop = db.lookups().insert_shop("LL01", "Lilongwe Main").await.unwrap();
        let customer = db.lookups().insert_customer("0042", "Banda Hardware").await.unwrap();
        Fixture { db, shop, customer }
    }

    /// Database file under the temp dir, removed with its WAL files on drop.
    pub(crate) struct TempDb {
        path: PathBuf,
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            for suffix in ["", "-wal", "-shm"] {
                let mut file = self.path.clone().into_os_string();
                file.push(suffix);
                let _ = std::fs::remove_file(file);
            }
        }
    }

    /// Like [`fixture`], but file-backed with a pool of several connections
    /// so writers really contend for the SQLite write lock.
    pub(crate) async fn file_fixture(max_connections: u32, busy_timeout: Duration) -> (Fixture, TempDb) {
        let temp = TempDb {
            path: std::env::temp_dir().join(format!("tradebook-test-{}.db", Uuid::new_v4())),
        };
        let config = DbConfig::new(temp.path.clone())
            .max_connections(max_connections)
            .busy_timeout(busy_timeout);
        let db = Database::new(config).await.unwrap();
        let shop = db.lookups().insert_shop("LL01", "Lilongwe Main").await.unwrap();
        let customer = db.lookups().insert_customer("0042", "Banda Hardware").await.unwrap();
        (Fixture { db, shop, customer }, temp)
    }

    pub(crate) async fn product(db: &Database, code: &str, stock: Decimal) -> Product {
        db.lookups()
            .insert_product(&NewProduct {
                code: code.to_string(),
                name: format!("Product {code}"),
                opening_stock: stock,
                price: Money::from_cents(5000),
            })
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_retries(max_retries: u32) -> InvoicingSettings {
        InvoicingSettings {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_retry_reruns_after_collision() {
        let mut calls = 0u32;
        let result = retry_contended(&fast_retries(3), "test", || {
            calls += 1;
            let call = calls;
            async move {
                if call == 1 {
                    Err(DbError::Sequence("number taken".into()))
                } else {
                    Ok(call)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_retry_stops_at_budget() {
        let mut calls = 0u32;
        let result: DbResult<()> = retry_contended(&fast_retries(2), "test", || {
            calls += 1;
            async { Err(DbError::QueryFailed("database is locked".into())) }
        })
        .await;

        assert!(matches!(result, Err(DbError::QueryFailed(_))));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_retry_passes_through_permanent_errors() {
        let mut calls = 0u32;
        let result: DbResult<()> = retry_contended(&fast_retries(5), "test", || {
            calls += 1;
            async { Err(DbError::not_found("Invoice", "inv-1")) }
        })
        .await;

        assert!(matches!(result, Err(DbError::NotFound { .. })));
        assert_eq!(calls, 1);
    }
}
