//! # Domain Types
//!
//! Core domain types used throughout Tradebook.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Invoice      │ 1 │  InvoiceItem    │   │    Payment      │       │
//! │  │  ─────────────  │──►│  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │ * │  quantity (dec) │   │  invoice_id     │       │
//! │  │  invoice_number │   │  rate (dec)     │   │  amount (cents) │       │
//! │  │  five totals    │   │  line_total     │   │  is_voided      │       │
//! │  │  total_paid     │   └────────┬────────┘   └─────────────────┘       │
//! │  │  status         │            │ product_id (optional)                │
//! │  └─────────────────┘            ▼                                       │
//! │                        ┌─────────────────┐   ┌─────────────────┐       │
//! │                        │    Product      │ 1 │StockTransaction │       │
//! │                        │  current_stock  │──►│  stock_out      │       │
//! │                        │  units_sold     │ * │  running_balance│       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every persisted entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (invoice_number, product code, ...) - human-readable

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{Money, PercentRate};
use crate::status::derive_status;
use crate::totals::{InvoiceTotals, LevyConfig};
use crate::validation::{RawLineItem, ValidationResult};

// =============================================================================
// Invoice Status
// =============================================================================

/// The status of an invoice.
///
/// ## State Machine
/// ```text
///            explicit                 payments / clock
///   Draft ─────────────► Finalized ◄──────────────────► PartiallyPaid
///     │                     │  ▲                            │
///     │                     ▼  │                            ▼
///     │                  Overdue ─────────────────────────► Paid
///     │
///     └──(explicit)──► Cancelled      Draft and Cancelled are sticky
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Being prepared; no stock has moved.
    Draft,
    /// Issued to the customer, nothing paid yet.
    Finalized,
    /// Some, but not all, of the net total has been paid.
    PartiallyPaid,
    /// Fully paid (or nothing was owed).
    Paid,
    /// Unpaid after the due date.
    Overdue,
    /// Cancelled by a user. Never deleted.
    Cancelled,
}

impl InvoiceStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [InvoiceStatus; 6] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Finalized,
        InvoiceStatus::PartiallyPaid,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Cancelled,
    ];

    /// Storage and wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Finalized => "finalized",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    /// Draft and Cancelled are only ever changed by an explicit user action.
    #[inline]
    pub fn is_sticky(&self) -> bool {
        matches!(self, InvoiceStatus::Draft | InvoiceStatus::Cancelled)
    }

    /// Whether goods have left the shop for an invoice in this status,
    /// i.e. whether saving it must move stock.
    #[inline]
    pub fn implies_dispatch(&self) -> bool {
        !self.is_sticky()
    }
}

impl Default for InvoiceStatus {
    fn default() -> Self {
        InvoiceStatus::Draft
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "draft" => Ok(InvoiceStatus::Draft),
            "finalized" | "finalised" | "sent" => Ok(InvoiceStatus::Finalized),
            "partially_paid" => Ok(InvoiceStatus::PartiallyPaid),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "cancelled" | "canceled" => Ok(InvoiceStatus::Cancelled),
            _ => Err(ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: InvoiceStatus::ALL.iter().map(|s| s.as_str().to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Cheque,
    MobileMoney,
    Card,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cheque => "cheque",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::Card => "card",
            PaymentMethod::Other => "other",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "bank_transfer" | "bank" | "transfer" | "eft" => Ok(PaymentMethod::BankTransfer),
            "cheque" | "check" => Ok(PaymentMethod::Cheque),
            "mobile_money" | "mobile" => Ok(PaymentMethod::MobileMoney),
            "card" | "credit" | "debit" => Ok(PaymentMethod::Card),
            "other" => Ok(PaymentMethod::Other),
            _ => Err(ValidationError::NotAllowed {
                field: "payment method".to_string(),
                allowed: ["cash", "bank_transfer", "cheque", "mobile_money", "card", "other"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
        }
    }
}

// =============================================================================
// Stock Transaction Type
// =============================================================================

/// Kind of stock ledger entry. Invoices only ever move stock out.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockTransactionType {
    StockOut,
}

// =============================================================================
// Lookup Entities
// =============================================================================

/// A shop (branch) that issues invoices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Shop {
    pub id: String,
    /// Short code used in invoice numbers (e.g. "LL01").
    pub code: String,
    pub name: String,
}

/// A customer invoices are issued to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Customer {
    pub id: String,
    /// Short code used in invoice numbers (e.g. "0042").
    pub code: String,
    pub name: String,
}

/// A stocked product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub code: String,
    pub name: String,
    /// Stock on hand. May be negative: invoices are never blocked by stock.
    #[ts(as = "String")]
    pub current_stock: Decimal,
    /// Cumulative quantity dispatched on invoices.
    #[ts(as = "String")]
    pub units_sold: Decimal,
    /// Default selling price.
    pub price: Money,
    pub is_active: bool,
}

// =============================================================================
// Quotation
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Open,
    Invoiced,
}

/// A quotation that can be turned into an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Quotation {
    pub id: String,
    pub quotation_number: String,
    pub shop_id: String,
    pub customer_id: String,
    pub status: QuotationStatus,
    pub apply_levy: bool,
    pub levy_rate: PercentRate,
    pub vat_rate: PercentRate,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub issue_date: NaiveDate,
}

/// A quotation line, in the same shape as an invoice line.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QuotationItem {
    pub id: String,
    pub quotation_id: String,
    pub position: i64,
    pub product_id: Option<String>,
    pub description: String,
    #[ts(as = "String")]
    pub quantity: Decimal,
    pub unit: String,
    #[ts(as = "String")]
    pub rate_per_unit: Decimal,
}

/// Pre-populated invoice form derived from a quotation.
///
/// Items are raw rows so the caller can edit them before submitting
/// through the normal validation pass.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceDraft {
    pub shop_id: String,
    pub customer_id: String,
    pub quotation_id: Option<String>,
    pub apply_levy: bool,
    /// Levy percentage as typed in the form (e.g. "1").
    pub levy_pct: String,
    /// VAT percentage as typed in the form (e.g. "16.5").
    pub vat_pct: String,
    pub notes: Option<String>,
    pub items: Vec<RawLineItem>,
}

impl Quotation {
    /// Builds an invoice form pre-filled with this quotation's lines.
    pub fn to_invoice_draft(&self, items: &[QuotationItem]) -> InvoiceDraft {
        let mut items: Vec<&QuotationItem> = items.iter().collect();
        items.sort_by_key(|item| item.position);

        InvoiceDraft {
            shop_id: self.shop_id.clone(),
            customer_id: self.customer_id.clone(),
            quotation_id: Some(self.id.clone()),
            apply_levy: self.apply_levy,
            levy_pct: self.levy_rate.percentage().normalize().to_string(),
            vat_pct: self.vat_rate.percentage().normalize().to_string(),
            notes: self.notes.clone(),
            items: items
                .into_iter()
                .map(|item| RawLineItem {
                    product_id: item.product_id.clone(),
                    description: item.description.clone(),
                    quantity: item.quantity.normalize().to_string(),
                    unit: item.unit.clone(),
                    rate_per_unit: item.rate_per_unit.to_string(),
                })
                .collect(),
        }
    }
}

// =============================================================================
// Line Item (validated, not yet persisted)
// =============================================================================

/// A validated invoice line, ready for the Totals Engine.
///
/// Constructed only through [`LineItem::new`], so every instance satisfies
/// quantity > 0, rate ≥ 0 and a non-empty description.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    product_id: Option<String>,
    description: String,
    quantity: Decimal,
    unit: String,
    rate_per_unit: Decimal,
    /// quantity × rate, unrounded.
    extended: Decimal,
    /// `extended` rounded half-up to cents.
    line_total: Money,
}

impl LineItem {
    /// Creates a validated line item.
    ///
    /// ## Rules
    /// - description must not be blank
    /// - quantity must be > 0
    /// - rate per unit must be ≥ 0
    /// - quantity × rate must fit in the money range
    pub fn new(
        product_id: Option<String>,
        description: impl Into<String>,
        quantity: Decimal,
        unit: impl Into<String>,
        rate_per_unit: Decimal,
    ) -> ValidationResult<Self> {
        let description = description.into().trim().to_string();
        if description.is_empty() {
            return Err(ValidationError::Required {
                field: "description".to_string(),
            });
        }
        if quantity <= Decimal::ZERO {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            });
        }
        if rate_per_unit < Decimal::ZERO {
            return Err(ValidationError::MustNotBeNegative {
                field: "rate per unit".to_string(),
            });
        }

        let out_of_range = || ValidationError::OutOfRange {
            field: "line total".to_string(),
            min: "0".to_string(),
            max: i64::MAX.to_string(),
        };
        let extended = quantity.checked_mul(rate_per_unit).ok_or_else(out_of_range)?;
        let line_total = Money::try_from_decimal(extended).ok_or_else(out_of_range)?;

        let product_id = product_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        Ok(LineItem {
            product_id,
            description,
            quantity,
            unit: unit.into().trim().to_string(),
            rate_per_unit,
            extended,
            line_total,
        })
    }

    pub fn product_id(&self) -> Option<&str> {
        self.product_id.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn rate_per_unit(&self) -> Decimal {
        self.rate_per_unit
    }

    /// quantity × rate before any rounding.
    pub fn extended(&self) -> Decimal {
        self.extended
    }

    /// Line total rounded to cents (what is persisted and printed).
    pub fn line_total(&self) -> Money {
        self.line_total
    }

    /// Whether saving this line on a dispatched invoice moves stock.
    pub fn moves_stock(&self) -> bool {
        self.product_id.is_some() && self.quantity > Decimal::ZERO
    }
}

// =============================================================================
// Invoice Header (validated, not yet persisted)
// =============================================================================

/// Validated invoice header fields, produced by
/// [`crate::validation::validate_invoice`].
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceHeader {
    pub shop_id: String,
    pub customer_id: String,
    pub quotation_id: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub payment_terms: Option<String>,
    pub levy: LevyConfig,
    /// Draft or Finalized; anything else is rejected during validation.
    pub initial_status: InvoiceStatus,
    pub notes: Option<String>,
}

/// A fully validated invoice submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInvoice {
    pub header: InvoiceHeader,
    pub items: Vec<LineItem>,
}

// =============================================================================
// Invoice
// =============================================================================

/// A persisted invoice.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub shop_id: String,
    pub customer_id: String,
    pub quotation_id: Option<String>,
    #[ts(as = "String")]
    pub issue_date: NaiveDate,
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
    pub payment_terms: Option<String>,
    pub apply_levy: bool,
    pub levy_rate: PercentRate,
    pub vat_rate: PercentRate,
    pub gross_total: Money,
    pub levy_amount: Money,
    pub amount_before_vat: Money,
    pub vat_amount: Money,
    pub total_net_amount: Money,
    pub total_paid: Money,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
    pub created_by: String,
    pub updated_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// The five stored monetary fields.
    pub fn totals(&self) -> InvoiceTotals {
        InvoiceTotals {
            gross_total: self.gross_total,
            levy_amount: self.levy_amount,
            amount_before_vat: self.amount_before_vat,
            vat_amount: self.vat_amount,
            total_net_amount: self.total_net_amount,
        }
    }

    /// Net total minus total paid to date.
    #[inline]
    pub fn balance_due(&self) -> Money {
        self.total_net_amount - self.total_paid
    }

    /// Status this invoice should have on `today`.
    pub fn derive_status(&self, today: NaiveDate) -> InvoiceStatus {
        derive_status(
            self.status,
            self.total_net_amount,
            self.total_paid,
            self.due_date,
            today,
        )
    }
}

// =============================================================================
// Invoice Item
// =============================================================================

/// A persisted invoice line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceItem {
    pub id: String,
    pub invoice_id: String,
    /// 1-based order on the invoice.
    pub position: i64,
    pub product_id: Option<String>,
    pub description: String,
    #[ts(as = "String")]
    pub quantity: Decimal,
    pub unit: String,
    #[ts(as = "String")]
    pub rate_per_unit: Decimal,
    pub line_total: Money,
}

// =============================================================================
// Stock Transaction
// =============================================================================

/// An append-only stock ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockTransaction {
    pub id: String,
    pub product_id: String,
    pub transaction_type: StockTransactionType,
    #[ts(as = "String")]
    pub quantity: Decimal,
    /// Stock on hand immediately after this entry.
    #[ts(as = "String")]
    pub running_balance: Decimal,
    /// What caused the movement; always "invoice" today.
    pub reference_type: String,
    pub reference_id: String,
    pub reference_number: String,
    pub created_by: String,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Payment
// =============================================================================

/// A payment towards an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub invoice_id: String,
    #[ts(as = "String")]
    pub payment_date: NaiveDate,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: String,
    pub is_voided: bool,
    pub voided_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A validated payment, ready to record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub payment_date: NaiveDate,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================
