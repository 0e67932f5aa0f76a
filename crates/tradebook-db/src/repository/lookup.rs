//! # Lookup Repository
//!
//! Shops, customers, products and quotations. These are maintained by other
//! parts of the business; invoicing reads them, and the insert operations
//! exist for seeding and tests.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use tradebook_core::{
    Customer, InvoiceDraft, LineItem, Money, PercentRate, Product, Quotation, QuotationItem,
    QuotationStatus, Shop,
};

use crate::error::{DbError, DbResult};
use crate::repository::{begin_write, decimal_column, new_id, rate_column, rate_value};

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, FromRow)]
struct ShopRecord {
    id: String,
    code: String,
    name: String,
}

impl From<ShopRecord> for Shop {
    fn from(r: ShopRecord) -> Self {
        Shop {
            id: r.id,
            code: r.code,
            name: r.name,
        }
    }
}

#[derive(Debug, FromRow)]
struct CustomerRecord {
    id: String,
    code: String,
    name: String,
}

impl From<CustomerRecord> for Customer {
    fn from(r: CustomerRecord) -> Self {
        Customer {
            id: r.id,
            code: r.code,
            name: r.name,
        }
    }
}

#[derive(Debug, FromRow)]
struct ProductRecord {
    id: String,
    code: String,
    name: String,
    current_stock: String,
    units_sold: String,
    price_cents: i64,
    is_active: bool,
}

impl TryFrom<ProductRecord> for Product {
    type Error = DbError;

    fn try_from(r: ProductRecord) -> DbResult<Self> {
        Ok(Product {
            current_stock: decimal_column("products.current_stock", &r.current_stock)?,
            units_sold: decimal_column("products.units_sold", &r.units_sold)?,
            id: r.id,
            code: r.code,
            name: r.name,
            price: Money::from_cents(r.price_cents),
            is_active: r.is_active,
        })
    }
}

#[derive(Debug, FromRow)]
struct QuotationRecord {
    id: String,
    quotation_number: String,
    shop_id: String,
    customer_id: String,
    status: QuotationStatus,
    apply_levy: bool,
    levy_rate_bps: i64,
    vat_rate_bps: i64,
    notes: Option<String>,
    issue_date: NaiveDate,
}

impl TryFrom<QuotationRecord> for Quotation {
    type Error = DbError;

    fn try_from(r: QuotationRecord) -> DbResult<Self> {
        Ok(Quotation {
            levy_rate: rate_column("quotations.levy_rate_bps", r.levy_rate_bps)?,
            vat_rate: rate_column("quotations.vat_rate_bps", r.vat_rate_bps)?,
            id: r.id,
            quotation_number: r.quotation_number,
            shop_id: r.shop_id,
            customer_id: r.customer_id,
            status: r.status,
            apply_levy: r.apply_levy,
            notes: r.notes,
            issue_date: r.issue_date,
        })
    }
}

#[derive(Debug, FromRow)]
struct QuotationItemRecord {
    id: String,
    quotation_id: String,
    position: i64,
    product_id: Option<String>,
    description: String,
    quantity: String,
    unit: String,
    rate_per_unit: String,
}

impl TryFrom<QuotationItemRecord> for QuotationItem {
    type Error = DbError;

    fn try_from(r: QuotationItemRecord) -> DbResult<Self> {
        Ok(QuotationItem {
            quantity: decimal_column("quotation_items.quantity", &r.quantity)?,
            rate_per_unit: decimal_column("quotation_items.rate_per_unit", &r.rate_per_unit)?,
            id: r.id,
            quotation_id: r.quotation_id,
            position: r.position,
            product_id: r.product_id,
            description: r.description,
            unit: r.unit,
        })
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// A product to insert.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub code: String,
    pub name: String,
    pub opening_stock: Decimal,
    pub price: Money,
}

/// A quotation to insert. Lines reuse the validated invoice line type.
#[derive(Debug, Clone)]
pub struct NewQuotation {
    pub quotation_number: String,
    pub shop_id: String,
    pub customer_id: String,
    pub apply_levy: bool,
    pub levy_rate: PercentRate,
    pub vat_rate: PercentRate,
    pub notes: Option<String>,
    pub issue_date: NaiveDate,
    pub items: Vec<LineItem>,
}

// =============================================================================
// Transaction helpers
// =============================================================================

pub(crate) async fn shop_code(conn: &mut SqliteConnection, shop_id: &str) -> DbResult<String> {
    sqlx::query_scalar::<_, String>("SELECT code FROM shops WHERE id = ?1")
        .bind(shop_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Shop", shop_id))
}

pub(crate) async fn customer_code(conn: &mut SqliteConnection, customer_id: &str) -> DbResult<String> {
    sqlx::query_scalar::<_, String>("SELECT code FROM customers WHERE id = ?1")
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Customer", customer_id))
}

/// Marks a quotation as invoiced. `NotFound` when it does not exist.
pub(crate) async fn mark_quotation_invoiced(conn: &mut SqliteConnection, quotation_id: &str) -> DbResult<()> {
    let result = sqlx::query("UPDATE quotations SET status = ?1 WHERE id = ?2")
        .bind(QuotationStatus::Invoiced)
        .bind(quotation_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Quotation", quotation_id));
    }

    debug!(quotation_id = %quotation_id, "Quotation marked invoiced");
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for shops, customers, products and quotations.
#[derive(Debug, Clone)]
pub struct LookupRepository {
    pool: SqlitePool,
}

impl LookupRepository {
    /// Creates a new LookupRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LookupRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Shops & customers
    // -------------------------------------------------------------------------

    pub async fn insert_shop(&self, code: &str, name: &str) -> DbResult<Shop> {
        let shop = Shop {
            id: new_id(),
            code: code.trim().to_uppercase(),
            name: name.trim().to_string(),
        };

        sqlx::query("INSERT INTO shops (id, code, name, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&shop.id)
            .bind(&shop.code)
            .bind(&shop.name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        debug!(id = %shop.id, code = %shop.code, "Shop inserted");
        Ok(shop)
    }

    pub async fn get_shop(&self, id: &str) -> DbResult<Option<Shop>> {
        let record = sqlx::query_as::<_, ShopRecord>("SELECT id, code, name FROM shops WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(Shop::from))
    }

    pub async fn insert_customer(&self, code: &str, name: &str) -> DbResult<Customer> {
        let customer = Customer {
            id: new_id(),
            code: code.trim().to_uppercase(),
            name: name.trim().to_string(),
        };

        sqlx::query("INSERT INTO customers (id, code, name, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&customer.id)
            .bind(&customer.code)
            .bind(&customer.name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        debug!(id = %customer.id, code = %customer.code, "Customer inserted");
        Ok(customer)
    }

    pub async fn get_customer(&self, id: &str) -> DbResult<Option<Customer>> {
        let record =
            sqlx::query_as::<_, CustomerRecord>("SELECT id, code, name FROM customers WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record.map(Customer::from))
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    pub async fn insert_product(&self, new: &NewProduct) -> DbResult<Product> {
        let now = Utc::now();
        let product = Product {
            id: new_id(),
            code: new.code.trim().to_string(),
            name: new.name.trim().to_string(),
            current_stock: new.opening_stock,
            units_sold: Decimal::ZERO,
            price: new.price,
            is_active: true,
        };

        sqlx::query(
            r#"
            INSERT INTO products (
                id, code, name, current_stock, units_sold, price_cents, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.code)
        .bind(&product.name)
        .bind(product.current_stock.to_string())
        .bind(product.units_sold.to_string())
        .bind(product.price.cents())
        .bind(product.is_active)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(id = %product.id, code = %product.code, "Product inserted");
        Ok(product)
    }

    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let record = sqlx::query_as::<_, ProductRecord>(
            r#"
            SELECT id, code, name, current_stock, units_sold, price_cents, is_active
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(Product::try_from).transpose()
    }

    // -------------------------------------------------------------------------
    // Quotations
    // -------------------------------------------------------------------------

    /// Inserts a quotation and its lines in one transaction.
    pub async fn insert_quotation(&self, new: &NewQuotation) -> DbResult<Quotation> {
        let quotation = Quotation {
            id: new_id(),
            quotation_number: new.quotation_number.trim().to_string(),
            shop_id: new.shop_id.clone(),
            customer_id: new.customer_id.clone(),
            status: QuotationStatus::Open,
            apply_levy: new.apply_levy,
            levy_rate: new.levy_rate,
            vat_rate: new.vat_rate,
            notes: new.notes.clone(),
            issue_date: new.issue_date,
        };

        let mut tx = begin_write(&self.pool).await?;

        sqlx::query(
            r#"
            INSERT INTO quotations (
                id, quotation_number, shop_id, customer_id, status,
                apply_levy, levy_rate_bps, vat_rate_bps, notes, issue_date, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&quotation.id)
        .bind(&quotation.quotation_number)
        .bind(&quotation.shop_id)
        .bind(&quotation.customer_id)
        .bind(quotation.status)
        .bind(quotation.apply_levy)
        .bind(rate_value(quotation.levy_rate))
        .bind(rate_value(quotation.vat_rate))
        .bind(&quotation.notes)
        .bind(quotation.issue_date)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        for (idx, item) in new.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO quotation_items (
                    id, quotation_id, position, product_id, description,
                    quantity, unit, rate_per_unit
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(new_id())
            .bind(&quotation.id)
            .bind(idx as i64 + 1)
            .bind(item.product_id())
            .bind(item.description())
            .bind(item.quantity().to_string())
            .bind(item.unit())
            .bind(item.rate_per_unit().to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            id = %quotation.id,
            quotation_number = %quotation.quotation_number,
            items = new.items.len(),
            "Quotation created"
        );
        Ok(quotation)
    }

    pub async fn get_quotation(&self, id: &str) -> DbResult<Option<Quotation>> {
        let record = sqlx::query_as::<_, QuotationRecord>(
            r#"
            SELECT id, quotation_number, shop_id, customer_id, status,
                   apply_levy, levy_rate_bps, vat_rate_bps, notes, issue_date
            FROM quotations
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(Quotation::try_from).transpose()
    }

    pub async fn get_quotation_items(&self, quotation_id: &str) -> DbResult<Vec<QuotationItem>> {
        let records = sqlx::query_as::<_, QuotationItemRecord>(
            r#"
            SELECT id, quotation_id, position, product_id, description,
                   quantity, unit, rate_per_unit
            FROM quotation_items
            WHERE quotation_id = ?1
            ORDER BY position
            "#,
        )
        .bind(quotation_id)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(QuotationItem::try_from).collect()
    }

    /// Builds an editable invoice form from a quotation.
    ///
    /// ## Errors
    /// `NotFound` when the quotation does not exist.
    pub async fn prefill_from_quotation(&self, quotation_id: &str) -> DbResult<InvoiceDraft> {
        let quotation = self
            .get_quotation(quotation_id)
            .await?
            .ok_or_else(|| DbError::not_found("Quotation", quotation_id))?;
        let items = self.get_quotation_items(quotation_id).await?;

        debug!(
            quotation_id = %quotation_id,
            items = items.len(),
            "Prefilling invoice from quotation"
        );
        Ok(quotation.to_invoice_draft(&items))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::{fixture, product};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_shop_and_customer_round_trip() {
        let fx = fixture().await;
        let repo = fx.db.lookups();

        assert_eq!(repo.get_shop(&fx.shop.id).await.unwrap(), Some(fx.shop.clone()));
        assert_eq!(repo.get_customer(&fx.customer.id).await.unwrap(), Some(fx.customer.clone()));
        assert_eq!(repo.get_shop("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_shop_code_rejected() {
        let fx = fixture().await;
        let err = fx.db.lookups().insert_shop("ll01", "Again").await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_product_stock_is_exact() {
        let fx = fixture().await;
        let created = product(&fx.db, "CEM-50", dec!(12.125)).await;

        let loaded = fx.db.lookups().get_product(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded.current_stock, dec!(12.125));
        assert_eq!(loaded.units_sold, Decimal::ZERO);
        assert_eq!(loaded.price.cents(), 5000);
    }

    #[tokio::test]
    async fn test_prefill_from_quotation() {
        let fx = fixture().await;
        let cement = product(&fx.db, "CEM-50", dec!(10)).await;
        let repo = fx.db.lookups();

        let quotation = repo
            .insert_quotation(&NewQuotation {
                quotation_number: "QT-0001".to_string(),
                shop_id: fx.shop.id.clone(),
                customer_id: fx.customer.id.clone(),
                apply_levy: true,
                levy_rate: PercentRate::from_bps(100),
                vat_rate: PercentRate::from_bps(1650),
                notes: Some("Site delivery".to_string()),
                issue_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                items: vec![
                    LineItem::new(Some(cement.id.clone()), "Cement", dec!(2), "bag", dec!(50.00)).unwrap(),
                    LineItem::new(None, "Delivery", dec!(1), "trip", dec!(25.50)).unwrap(),
                ],
            })
            .await
            .unwrap();

        let draft = repo.prefill_from_quotation(&quotation.id).await.unwrap();
        assert_eq!(draft.quotation_id.as_deref(), Some(quotation.id.as_str()));
        assert_eq!(draft.customer_id, fx.customer.id);
        assert!(draft.apply_levy);
        assert_eq!(draft.vat_pct, "16.5");
        assert_eq!(draft.items.len(), 2);
        assert_eq!(draft.items[0].product_id.as_deref(), Some(cement.id.as_str()));
        assert_eq!(draft.items[1].rate_per_unit, "25.50");
    }

    #[tokio::test]
    async fn test_prefill_missing_quotation() {
        let fx = fixture().await;
        let err = fx.db.lookups().prefill_from_quotation("nope").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
