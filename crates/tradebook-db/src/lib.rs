//! # tradebook-db: Persistence for Tradebook
//!
//! SQLite storage for invoices, payments, stock and the lookup tables they
//! reference, using sqlx for async access.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tradebook Data Flow                              │
//! │                                                                         │
//! │  Form submission (RawInvoiceHeader + RawLineItem rows)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tradebook-core: validation → totals → status       (pure, no I/O)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 tradebook-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │◄───│ InvoiceRepo    │    │ 001_init.sql │  │   │
//! │  │   │ SqlitePool    │    │ PaymentRepo    │    │              │  │   │
//! │  │   │ Settings      │    │ StockRepo ...  │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │          ▲                                                      │   │
//! │  │          │ TradebookConfig (config.rs: TOML + TRADEBOOK_* env)  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - File and environment configuration
//! - [`pool`] - Connection pool creation and repository accessors
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tradebook_db::{Database, TradebookConfig};
//!
//! let config = TradebookConfig::load(None)?;
//! let db = Database::open(&config).await?;
//!
//! let created = db.invoices().create_from_form(&header, &rows, "user-7").await?;
//! db.payments().record_from_form(&created.invoice_id, &payment, "user-7").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, ConfigResult, DatabaseSettings, InvoicingSettings, TradebookConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::invoice::{CreatedInvoice, FinalizedInvoice, InvoiceRepository, StatusChange};
pub use repository::lookup::{LookupRepository, NewProduct, NewQuotation};
pub use repository::payment::{PaymentOutcome, PaymentRepository};
pub use repository::statement::StatementRepository;
pub use repository::stock::{NegativeStock, StockRepository};

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Initializes the tracing subscriber for binaries built on this crate.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=tradebook_db=trace` - Trace this crate only
/// - Default: INFO, with debug for tradebook crates
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tradebook=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::TRACE)
        .init();
}
