//! # Seed Data Generator
//!
//! Populates a database with shops, customers, products and a quotation for
//! development.
//!
//! ## Usage
//! ```bash
//! # Use the configured database (tradebook.toml / TRADEBOOK_DB_PATH)
//! cargo run -p tradebook-db --bin seed
//!
//! # Specify database path
//! cargo run -p tradebook-db --bin seed -- --db ./data/tradebook.db
//!
//! # Use a specific config file
//! cargo run -p tradebook-db --bin seed -- --config ./tradebook.toml
//! ```

use std::env;
use std::path::PathBuf;

use rust_decimal::Decimal;
use tracing::{info, warn};

use tradebook_core::{LineItem, Money, PercentRate};
use tradebook_db::{init_tracing, Database, NewProduct, NewQuotation, TradebookConfig};

const SHOPS: &[(&str, &str)] = &[("LL01", "Lilongwe Main"), ("BT01", "Blantyre Depot")];

const CUSTOMERS: &[(&str, &str)] = &[
    ("0001", "Banda Hardware"),
    ("0002", "Phiri Construction"),
    ("0003", "Mwale Farm Supplies"),
    ("0004", "Chirwa Builders"),
];

/// (code, name, opening stock, price in cents)
const PRODUCTS: &[(&str, &str, i64, i64)] = &[
    ("CEM-50", "Cement 50kg", 400, 1850000),
    ("IRS-12", "Iron sheet 12ft", 250, 2400000),
    ("NAIL-4", "Nails 4in (kg)", 900, 350000),
    ("PVC-110", "PVC pipe 110mm", 120, 1575000),
    ("PNT-20", "Paint 20L white", 60, 6500000),
    ("TIM-22", "Timber 2x2", 800, 420000),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tradebook Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: platform config dir)");
                println!("  -d, --db <PATH>      Database file path (overrides config)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => warn!(argument = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = TradebookConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = Some(path);
    }

    info!(path = %config.database.database_path().display(), "Seeding database");
    let db = Database::open(&config).await?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shops")
        .fetch_one(db.pool())
        .await?;
    if existing > 0 {
        warn!(shops = existing, "Database already seeded, skipping");
        return Ok(());
    }

    let lookups = db.lookups();

    let mut shops = Vec::new();
    for (code, name) in SHOPS {
        shops.push(lookups.insert_shop(code, name).await?);
    }

    let mut customers = Vec::new();
    for (code, name) in CUSTOMERS {
        customers.push(lookups.insert_customer(code, name).await?);
    }

    let mut products = Vec::new();
    for (code, name, stock, price) in PRODUCTS {
        products.push(
            lookups
                .insert_product(&NewProduct {
                    code: code.to_string(),
                    name: name.to_string(),
                    opening_stock: Decimal::from(*stock),
                    price: Money::from_cents(*price),
                })
                .await?,
        );
    }

    info!(
        shops = shops.len(),
        customers = customers.len(),
        products = products.len(),
        "Lookup data inserted"
    );

    let (Some(shop), Some(customer)) = (shops.first(), customers.first()) else {
        return Ok(());
    };

    let mut items = Vec::new();
    for product in products.iter().take(3) {
        items.push(LineItem::new(
            Some(product.id.clone()),
            product.name.clone(),
            Decimal::from(10),
            "each",
            product.price.to_decimal(),
        )?);
    }

    let quotation = lookups
        .insert_quotation(&NewQuotation {
            quotation_number: "QT-0001".to_string(),
            shop_id: shop.id.clone(),
            customer_id: customer.id.clone(),
            apply_levy: true,
            levy_rate: PercentRate::from_bps(100),
            vat_rate: PercentRate::from_bps(1650),
            notes: Some("Roofing materials".to_string()),
            issue_date: chrono::Utc::now().date_naive(),
            items,
        })
        .await?;

    info!(quotation = %quotation.quotation_number, "Sample quotation inserted");
    db.close().await;
    Ok(())
}
