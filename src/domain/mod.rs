//! Domain module
//!
//! Core domain types shared across the ledger engine and the API layer.

pub mod context;
pub mod error;
pub mod money;
pub mod status;

pub use context::OperationContext;
pub use error::DomainError;
pub use money::{round_money, Amount, AmountError};
pub use status::{LoanStatus, OrderStatus};
