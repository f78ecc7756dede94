//! Domain Error Types
//!
//! Business errors raised by the ledger engine and lifecycle handlers,
//! independent of the web/infrastructure layer.

use thiserror::Error;

/// Domain-specific errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Referenced loan does not exist
    #[error("Loan not found: {0}")]
    LoanNotFound(String),

    /// Referenced customer does not exist
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// Referenced order does not exist
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Referenced product does not exist
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Referenced transaction does not exist
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// No account could be resolved to debit: the request named no customer
    /// and no linked customer is flagged preferred-debit
    #[error("No debit account: transaction names no customer and the loan has no preferred-debit customer")]
    NoDebitAccount,

    /// Invalid amount (zero, negative, too many decimals)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Loan terms rejected at setup (non-positive amount, rate, or duration)
    #[error("Invalid loan terms: {0}")]
    InvalidLoanTerms(String),

    /// Posting would drive the loan balance below zero
    #[error("Transaction would drive loan balance negative: balance {balance}, principal portion {principal}")]
    BalanceBelowZero {
        balance: rust_decimal::Decimal,
        principal: rust_decimal::Decimal,
    },

    /// Order is already delivered; no further status update is accepted
    #[error("Order has already been delivered")]
    OrderAlreadyDelivered,

    /// Status transition not allowed by the lifecycle table
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// Catch-all business rule violation
    #[error("Business rule violation: {0}")]
    BusinessRuleViolation(String),
}

impl DomainError {
    /// Errors where the referenced record is absent (404)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::LoanNotFound(_)
                | Self::CustomerNotFound(_)
                | Self::OrderNotFound(_)
                | Self::ProductNotFound(_)
                | Self::TransactionNotFound(_)
        )
    }

    /// Errors that reject the request before any write happens (400)
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidAmount(_) | Self::InvalidLoanTerms(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_not_found_classification() {
        assert!(DomainError::LoanNotFound("x".into()).is_not_found());
        assert!(DomainError::CustomerNotFound("x".into()).is_not_found());
        assert!(!DomainError::NoDebitAccount.is_not_found());
    }

    #[test]
    fn test_validation_classification() {
        assert!(DomainError::InvalidLoanTerms("rate".into()).is_validation());
        assert!(!DomainError::OrderAlreadyDelivered.is_validation());
    }

    #[test]
    fn test_balance_below_zero_message() {
        let err = DomainError::BalanceBelowZero {
            balance: dec!(50),
            principal: dec!(80),
        };
        assert!(err.to_string().contains("50"));
        assert!(err.to_string().contains("80"));
    }
}
