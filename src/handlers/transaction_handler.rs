//! Transaction posting handler
//!
//! The stateful half of the ledger engine. One posting loads the loan and its
//! linked customer accounts, resolves the debited account, computes the
//! interest/principal split, and persists the loan update, the customer
//! debit, the interest-history entry, and the transaction record inside a
//! single database transaction. The loan row and the debited customer row
//! are locked so concurrent postings against the same loan serialize.
//!
//! Posting carries no dedup key: re-sending the same request creates a
//! second, distinct transaction and a further balance change.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogService};
use crate::domain::{Amount, DomainError, OperationContext};
use crate::error::AppError;
use crate::ledger::{post_payment, LoanPosition};

use super::{PostTransactionCommand, PostTransactionResult};

/// Handler for posting payment transactions
pub struct PostTransactionHandler {
    audit: AuditLogService,
    pool: PgPool,
}

/// Loan fields the posting reads, locked FOR UPDATE
struct LoanRow {
    loan_number: i64,
    loan_balance: Decimal,
    interest_rate: Decimal,
    total_interest_paid: Decimal,
    next_payment_date: NaiveDate,
    offset_account: bool,
}

/// Customer fields relevant to debit resolution and offset accrual
struct LinkedCustomer {
    id: Uuid,
    account_balance: Decimal,
    offset_account: bool,
    is_preferred_debit: bool,
}

impl PostTransactionHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            audit: AuditLogService::new(pool.clone()),
            pool,
        }
    }

    /// Execute the posting command
    pub async fn execute(
        &self,
        command: PostTransactionCommand,
        context: &OperationContext,
    ) -> Result<PostTransactionResult, AppError> {
        let amount = Amount::new(command.transaction_amount)?;

        let mut tx = self.pool.begin().await?;

        // Lock the loan for the duration of the posting
        let loan: Option<(i64, Decimal, Decimal, Decimal, NaiveDate, bool)> = sqlx::query_as(
            r#"
            SELECT loan_number, loan_balance, interest_rate,
                   total_interest_paid, next_payment_date, offset_account
            FROM loans
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(command.loan_id)
        .fetch_optional(&mut *tx)
        .await?;

        let loan = loan
            .map(
                |(
                    loan_number,
                    loan_balance,
                    interest_rate,
                    total_interest_paid,
                    next_payment_date,
                    offset_account,
                )| LoanRow {
                    loan_number,
                    loan_balance,
                    interest_rate,
                    total_interest_paid,
                    next_payment_date,
                    offset_account,
                },
            )
            .ok_or_else(|| {
                AppError::Domain(DomainError::LoanNotFound(command.loan_id.to_string()))
            })?;

        // Lock the loan's linked customers in link order
        let linked: Vec<(Uuid, Decimal, bool, bool)> = sqlx::query_as(
            r#"
            SELECT c.id, c.account_balance, c.offset_account, c.is_preferred_debit
            FROM customers c
            JOIN loan_customers lc ON lc.customer_id = c.id
            WHERE lc.loan_id = $1
            ORDER BY lc.linked_at, c.id
            FOR UPDATE OF c
            "#,
        )
        .bind(command.loan_id)
        .fetch_all(&mut *tx)
        .await?;

        let linked: Vec<LinkedCustomer> = linked
            .into_iter()
            .map(
                |(id, account_balance, offset_account, is_preferred_debit)| LinkedCustomer {
                    id,
                    account_balance,
                    offset_account,
                    is_preferred_debit,
                },
            )
            .collect();

        // Offset accrues only when the loan itself has the offset facility
        let offset_balance = if loan.offset_account {
            linked
                .iter()
                .filter(|c| c.offset_account)
                .map(|c| c.account_balance)
                .sum()
        } else {
            Decimal::ZERO
        };

        // Resolve the debited account: explicit customer wins, otherwise the
        // loan's preferred-debit customer (last in link order on a tie)
        let debited_customer_id = match command.customer_id {
            Some(customer_id) => {
                let exists: Option<(Uuid,)> =
                    sqlx::query_as("SELECT id FROM customers WHERE id = $1 FOR UPDATE")
                        .bind(customer_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                exists
                    .map(|(id,)| id)
                    .ok_or_else(|| {
                        AppError::Domain(DomainError::CustomerNotFound(customer_id.to_string()))
                    })?
            }
            None => linked
                .iter()
                .rev()
                .find(|c| c.is_preferred_debit)
                .map(|c| c.id)
                .ok_or(AppError::Domain(DomainError::NoDebitAccount))?,
        };

        let position = LoanPosition {
            loan_balance: loan.loan_balance,
            interest_rate: loan.interest_rate,
            total_interest_paid: loan.total_interest_paid,
            next_payment_date: loan.next_payment_date,
        };

        let outcome =
            post_payment(&position, offset_balance, amount.value()).map_err(AppError::Domain)?;

        let transaction_date = command.transaction_date.unwrap_or_else(Utc::now);

        // Persist the loan's new amortization position
        sqlx::query(
            r#"
            UPDATE loans
            SET loan_balance = $2,
                principal_amt = $3,
                interest_amt = $4,
                total_interest_paid = $5,
                next_payment_date = $6,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(command.loan_id)
        .bind(outcome.loan_balance)
        .bind(outcome.principal_amt)
        .bind(outcome.interest_amt)
        .bind(outcome.total_interest_paid)
        .bind(outcome.next_payment_date)
        .execute(&mut *tx)
        .await?;

        // Append the period's interest-history entry
        sqlx::query(
            r#"
            INSERT INTO loan_interest (id, loan_id, payment_date, interest_charged)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(command.loan_id)
        .bind(transaction_date)
        .bind(outcome.interest_amt)
        .execute(&mut *tx)
        .await?;

        // Debit the resolved account by the full payment amount
        sqlx::query(
            r#"
            UPDATE customers
            SET account_balance = account_balance - $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(debited_customer_id)
        .bind(amount.value())
        .execute(&mut *tx)
        .await?;

        // Record the transaction as a fact, with the original request fields
        let transaction_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, loan_id, loan_number, customer_id,
                transaction_amount, transaction_description,
                transaction_date, transaction_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(transaction_id)
        .bind(command.loan_id)
        .bind(loan.loan_number)
        .bind(command.customer_id)
        .bind(amount.value())
        .bind(&command.transaction_description)
        .bind(transaction_date)
        .bind(&command.transaction_status)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.audit
            .log_best_effort(
                AuditAction::TransactionPosted,
                "Transaction",
                transaction_id,
                Some(serde_json::json!({
                    "loan_id": command.loan_id,
                    "debited_customer_id": debited_customer_id,
                    "transaction_amount": amount.value(),
                    "interest_amt": outcome.interest_amt,
                    "principal_amt": outcome.principal_amt,
                })),
                context,
            )
            .await;

        tracing::info!(
            transaction_id = %transaction_id,
            loan_id = %command.loan_id,
            amount = %amount,
            interest = %outcome.interest_amt,
            "Transaction posted"
        );

        Ok(PostTransactionResult {
            transaction_id,
            loan_id: command.loan_id,
            loan_number: loan.loan_number,
            debited_customer_id,
            transaction_amount: amount.value(),
            transaction_date,
            transaction_status: command.transaction_status,
            interest_amt: outcome.interest_amt,
            principal_amt: outcome.principal_amt,
            loan_balance: outcome.loan_balance,
            next_payment_date: outcome.next_payment_date,
        })
    }
}
