//! Command Handlers module
//!
//! Handlers orchestrate business operations: they load state, run the ledger
//! arithmetic, and persist the outcome atomically.

mod commands;
mod loan_handler;
mod order_handler;
mod transaction_handler;

pub use commands::*;
pub use loan_handler::CreateLoanHandler;
pub use order_handler::UpdateOrderStatusHandler;
pub use transaction_handler::PostTransactionHandler;
