//! lending_api Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod audit;
pub mod domain;
pub mod handlers;
pub mod ledger;

// Private modules (used only by main.rs binary)
pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use domain::{Amount, AmountError, DomainError, LoanStatus, OperationContext, OrderStatus};
