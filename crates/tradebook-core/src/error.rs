//! # Error Types
//!
//! Domain-specific error types for tradebook-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tradebook-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tradebook-db errors (separate crate)                                  │
//! │  └── DbError          - Persistence, numbering and lookup failures     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ValidationError is always raised before a transaction is opened; the
//! first invalid item rejects the whole invoice.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Stock would drop below zero while negative stock is disabled.
    ///
    /// ## When This Occurs
    /// Only when the deployment sets `allow_negative_stock = false`.
    /// By default stock is allowed to go negative and only logged.
    #[error("Insufficient stock for {product_code}: available {available}, requested {requested}")]
    InsufficientStock {
        product_code: String,
        available: String,
        requested: String,
    },

    /// Invoice is not in a state that allows the requested operation.
    ///
    /// ## When This Occurs
    /// - Recording a payment against a cancelled invoice
    /// - Finalizing an invoice that is not a draft
    /// - Cancelling an invoice twice
    #[error("Invoice {invoice_id} is {current_status}, cannot {operation}")]
    InvalidInvoiceStatus {
        invoice_id: String,
        current_status: String,
        operation: String,
    },

    /// A stored value could not be read back into a domain type.
    #[error("Corrupt {field} value: {value}")]
    CorruptValue { field: String, value: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: String, max: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Value is not a number.
    #[error("{field} is not a number: '{value}'")]
    NotNumeric { field: String, value: String },

    /// Invalid format (e.g., too many decimal places, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// An invoice needs at least one line item.
    #[error("Invoice must have at least one item")]
    NoItems,

    /// Error inside a specific line item (1-based position).
    #[error("Item {position}: {source}")]
    Item {
        position: usize,
        #[source]
        source: Box<ValidationError>,
    },
}

impl ValidationError {
    /// Wraps an error with the 1-based position of the offending item.
    pub fn at_item(self, position: usize) -> Self {
        ValidationError::Item {
            position,
            source: Box::new(self),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_code: "CEM-50".to_string(),
            available: "3".to_string(),
            requested: "5".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for CEM-50: available 3, requested 5"
        );
    }

    #[test]
    fn test_item_error_carries_position() {
        let err = ValidationError::NotNumeric {
            field: "quantity".to_string(),
            value: "two".to_string(),
        }
        .at_item(2);
        assert_eq!(err.to_string(), "Item 2: quantity is not a number: 'two'");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::NoItems.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
