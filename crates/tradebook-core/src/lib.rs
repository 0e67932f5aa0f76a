//! # tradebook-core: Pure Business Logic for Tradebook
//!
//! This crate holds the invoicing rules as pure functions with zero I/O
//! dependencies. Persistence lives in `tradebook-db`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tradebook Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              UI / API layer (forms, PDFs, sessions)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ raw rows + actor id                    │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ tradebook-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │  validation ──► totals ──► status        numbering  statement  │   │
//! │  │  (typed rows)   (levy/VAT)  (Paid, ...)  (INV-...)  (balances) │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                      tradebook-db                                │   │
//! │  │        one SQLite transaction per invoice / payment              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Invoice, InvoiceItem, Payment, StockTransaction, ...)
//! - [`money`] - Money in integer cents and percentage rates in basis points
//! - [`error`] - Domain error types
//! - [`validation`] - Raw input → typed, validated rows
//! - [`totals`] - The Totals Engine (gross, levy, VAT, net)
//! - [`status`] - Invoice status derivation
//! - [`numbering`] - Invoice number formats
//! - [`statement`] - Customer statement balances
//!
//! ## Example Usage
//!
//! ```rust
//! use rust_decimal::Decimal;
//! use tradebook_core::money::PercentRate;
//! use tradebook_core::totals::{compute_totals, LevyConfig};
//! use tradebook_core::types::LineItem;
//!
//! let items = vec![
//!     LineItem::new(None, "Cement bag", Decimal::from(2), "bag", Decimal::new(5000, 2)).unwrap(),
//!     LineItem::new(None, "Nails", Decimal::from(1), "kg", Decimal::new(2550, 2)).unwrap(),
//! ];
//! let config = LevyConfig {
//!     apply_levy: true,
//!     levy_rate: PercentRate::from_bps(100),
//!     vat_rate: PercentRate::from_bps(1650),
//! };
//!
//! let totals = compute_totals(&items, &config).unwrap();
//! assert_eq!(totals.total_net_amount.cents(), 14768); // 147.68
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod numbering;
pub mod statement;
pub mod status;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, PercentRate};
pub use status::derive_status;
pub use totals::{compute_totals, InvoiceTotals, LevyConfig};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Decimal places every stored money amount is rounded to.
pub const MONEY_DECIMAL_PLACES: u32 = 2;

/// Maximum line items on a single invoice.
///
/// ## Business Reason
/// Keeps a single save transaction bounded; a bigger order is split into
/// several invoices.
pub const MAX_INVOICE_ITEMS: usize = 500;

/// Maximum decimal places accepted for an item quantity (e.g. 1.125 kg).
pub const MAX_QUANTITY_SCALE: u32 = 3;

/// Maximum decimal places accepted for a rate per unit.
pub const MAX_RATE_SCALE: u32 = 4;
