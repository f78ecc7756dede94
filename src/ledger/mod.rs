//! Ledger engine
//!
//! Pure amortization and posting arithmetic. These functions know nothing
//! about the database; the handlers load state, call in here, and persist the
//! outcome atomically.

pub mod amortization;
pub mod calendar;
pub mod posting;

pub use amortization::{initial_setup, monthly_installment, LoanSetup, LoanTerms};
pub use calendar::{add_months, days_in_month};
pub use posting::{post_payment, LoanPosition, PostingOutcome};
