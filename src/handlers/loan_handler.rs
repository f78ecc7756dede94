//! Loan origination handler
//!
//! Validates the proposed terms, computes the opening amortization state,
//! and creates the loan with its customer links in one transaction.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogService};
use crate::domain::{DomainError, OperationContext};
use crate::error::AppError;
use crate::ledger::{initial_setup, LoanTerms};

use super::{CreateLoanCommand, CreateLoanResult};

/// Handler for loan origination
pub struct CreateLoanHandler {
    audit: AuditLogService,
    pool: PgPool,
}

impl CreateLoanHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            audit: AuditLogService::new(pool.clone()),
            pool,
        }
    }

    /// Execute the loan origination command
    pub async fn execute(
        &self,
        command: CreateLoanCommand,
        context: &OperationContext,
    ) -> Result<CreateLoanResult, AppError> {
        let terms = LoanTerms {
            loan_amount: command.loan_amount,
            interest_rate: command.interest_rate,
            loan_duration: command.loan_duration,
            start_date: command.start_date,
        };

        let mut tx = self.pool.begin().await?;

        // Resolve linked customers and their offset-eligible balances
        let mut offset_balance = Decimal::ZERO;
        for customer_id in &command.customer_ids {
            let row: Option<(Decimal, bool)> = sqlx::query_as(
                "SELECT account_balance, offset_account FROM customers WHERE id = $1",
            )
            .bind(customer_id)
            .fetch_optional(&mut *tx)
            .await?;

            let (balance, offset_account) = row.ok_or_else(|| {
                AppError::Domain(DomainError::CustomerNotFound(customer_id.to_string()))
            })?;

            if offset_account {
                offset_balance += balance;
            }
        }

        let setup = initial_setup(&terms, command.offset_account, offset_balance)
            .map_err(AppError::Domain)?;

        let loan_id = Uuid::new_v4();
        let (loan_number,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO loans (
                id, loan_number, loan_amount, loan_balance, interest_rate,
                principal_amt, interest_amt, total_interest_paid, emi,
                loan_duration, payment_frequency, loan_type,
                start_date, end_date, next_payment_date,
                loan_status, offset_account, offset_amt
            )
            VALUES (
                $1, nextval('loan_number_seq'), $2, $3, $4,
                0, 0, 0, $5,
                $6, $7, $8,
                $9, $10, $11,
                $12, $13, $14
            )
            RETURNING loan_number
            "#,
        )
        .bind(loan_id)
        .bind(command.loan_amount)
        .bind(setup.loan_balance)
        .bind(command.interest_rate)
        .bind(setup.emi)
        .bind(command.loan_duration as i32)
        .bind(command.payment_frequency as i32)
        .bind(&command.loan_type)
        .bind(command.start_date)
        .bind(command.end_date)
        .bind(setup.next_payment_date)
        .bind(command.loan_status.as_str())
        .bind(command.offset_account)
        .bind(setup.offset_amt)
        .fetch_one(&mut *tx)
        .await?;

        for customer_id in &command.customer_ids {
            sqlx::query("INSERT INTO loan_customers (loan_id, customer_id) VALUES ($1, $2)")
                .bind(loan_id)
                .bind(customer_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.audit
            .log_best_effort(
                AuditAction::LoanCreated,
                "Loan",
                loan_id,
                Some(serde_json::json!({
                    "loan_number": loan_number,
                    "loan_amount": command.loan_amount,
                    "emi": setup.emi,
                })),
                context,
            )
            .await;

        tracing::info!(
            loan_id = %loan_id,
            loan_number = loan_number,
            emi = %setup.emi,
            "Loan created"
        );

        Ok(CreateLoanResult {
            loan_id,
            loan_number,
            loan_balance: setup.loan_balance,
            emi: setup.emi,
            next_payment_date: setup.next_payment_date,
            offset_amt: setup.offset_amt,
        })
    }
}
