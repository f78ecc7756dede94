//! Transaction posting arithmetic
//!
//! The pure half of the ledger engine: given a loan's current amortization
//! position, the summed offset balance, and a payment amount, compute the
//! interest/principal split and the loan's next position. Persistence and
//! account debiting live in the transaction handler.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use crate::domain::{round_money, DomainError};

use super::calendar::{add_months, days_in_month};

/// The slice of loan state the posting computation reads.
#[derive(Debug, Clone)]
pub struct LoanPosition {
    pub loan_balance: Decimal,
    /// Annual rate in percent
    pub interest_rate: Decimal,
    pub total_interest_paid: Decimal,
    pub next_payment_date: NaiveDate,
}

/// Loan state after one posting, plus the period's interest/principal split.
#[derive(Debug, Clone, PartialEq)]
pub struct PostingOutcome {
    /// Interest charged for the period (zero when the offset balance covers
    /// the whole loan balance)
    pub interest_amt: Decimal,
    /// Portion of the payment applied to principal; negative when the
    /// payment does not cover the interest due
    pub principal_amt: Decimal,
    pub loan_balance: Decimal,
    pub total_interest_paid: Decimal,
    pub next_payment_date: NaiveDate,
}

/// Apply one payment to a loan position.
///
/// Interest accrues on the offset-reduced balance at the annual rate over the
/// day count of the month the next payment falls in:
/// interest = balance * (rate/100) * days / 365, rounded to 2dp.
///
/// A posting that would drive the loan balance below zero is rejected; a
/// payment smaller than the interest due is not (the balance grows).
pub fn post_payment(
    position: &LoanPosition,
    offset_balance: Decimal,
    amount: Decimal,
) -> Result<PostingOutcome, DomainError> {
    let date = position.next_payment_date;
    let days = Decimal::from(days_in_month(date.year(), date.month()));

    let principal_balance = round_money(position.loan_balance - offset_balance);

    let interest_amt = if principal_balance > Decimal::ZERO {
        round_money(principal_balance * position.interest_rate * days / Decimal::from(36500))
    } else {
        Decimal::ZERO
    };

    let principal_amt = amount - interest_amt;
    let loan_balance = round_money(position.loan_balance - principal_amt);

    if loan_balance < Decimal::ZERO {
        return Err(DomainError::BalanceBelowZero {
            balance: position.loan_balance,
            principal: principal_amt,
        });
    }

    Ok(PostingOutcome {
        interest_amt,
        principal_amt,
        loan_balance,
        total_interest_paid: round_money(position.total_interest_paid + interest_amt),
        next_payment_date: add_months(date, 1),
    })
}
