//! Command definitions
//!
//! Commands represent intentions to change the system state.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{LoanStatus, OrderStatus};

/// Command to originate a new loan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLoanCommand {
    pub loan_amount: Decimal,
    /// Annual interest rate in percent
    pub interest_rate: Decimal,
    /// Duration in years
    pub loan_duration: u32,
    pub payment_frequency: u32,
    pub loan_type: String,
    pub loan_status: LoanStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub offset_account: bool,
    /// Customer accounts linked to the loan
    pub customer_ids: Vec<Uuid>,
}

/// Result of a successful loan origination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLoanResult {
    pub loan_id: Uuid,
    pub loan_number: i64,
    pub loan_balance: Decimal,
    pub emi: Decimal,
    pub next_payment_date: NaiveDate,
    pub offset_amt: Decimal,
}

/// Command to post a payment transaction against a loan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostTransactionCommand {
    pub loan_id: Uuid,
    pub transaction_amount: Decimal,
    pub transaction_description: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub transaction_status: String,
    /// Explicit account to debit; falls back to the loan's preferred-debit
    /// customer when absent
    pub customer_id: Option<Uuid>,
}

impl PostTransactionCommand {
    pub fn new(loan_id: Uuid, transaction_amount: Decimal, transaction_status: String) -> Self {
        Self {
            loan_id,
            transaction_amount,
            transaction_description: None,
            transaction_date: None,
            transaction_status,
            customer_id: None,
        }
    }

    pub fn with_customer(mut self, customer_id: Uuid) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.transaction_description = Some(description);
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.transaction_date = Some(date);
        self
    }
}

/// Result of a posted transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostTransactionResult {
    pub transaction_id: Uuid,
    pub loan_id: Uuid,
    pub loan_number: i64,
    /// Account that was actually debited
    pub debited_customer_id: Uuid,
    pub transaction_amount: Decimal,
    pub transaction_date: DateTime<Utc>,
    pub transaction_status: String,
    pub interest_amt: Decimal,
    pub principal_amt: Decimal,
    pub loan_balance: Decimal,
    pub next_payment_date: NaiveDate,
}

/// Command to move an order through its lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderStatusCommand {
    pub order_id: Uuid,
    pub status: OrderStatus,
}

/// Result of an order status update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderStatusResult {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub delivered_at: Option<DateTime<Utc>>,
}
