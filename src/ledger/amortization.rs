//! Initial loan setup
//!
//! Computes the opening amortization state for a new loan: the equated
//! monthly installment, the first payment date, the opening balance, and the
//! offset amount drawn from linked customer accounts.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::{round_money, DomainError};

use super::calendar::add_months;

/// Proposed loan terms, validated before any state is computed.
#[derive(Debug, Clone)]
pub struct LoanTerms {
    /// Principal borrowed
    pub loan_amount: Decimal,
    /// Annual interest rate in percent
    pub interest_rate: Decimal,
    /// Duration in years
    pub loan_duration: u32,
    /// Date the loan starts
    pub start_date: NaiveDate,
}

/// Opening amortization state merged into the loan before creation.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanSetup {
    pub loan_balance: Decimal,
    pub next_payment_date: NaiveDate,
    pub offset_amt: Decimal,
    pub emi: Decimal,
}

/// Compute the opening state for a new loan.
///
/// `offset_balance` is the summed balance of the loan's linked offset
/// customer accounts; it is recorded only when the loan itself has the
/// offset facility enabled.
pub fn initial_setup(
    terms: &LoanTerms,
    offset_enabled: bool,
    offset_balance: Decimal,
) -> Result<LoanSetup, DomainError> {
    let emi = monthly_installment(terms.loan_amount, terms.interest_rate, terms.loan_duration)?;

    let offset_amt = if offset_enabled {
        offset_balance
    } else {
        Decimal::ZERO
    };

    Ok(LoanSetup {
        loan_balance: terms.loan_amount,
        next_payment_date: add_months(terms.start_date, 1),
        offset_amt,
        emi,
    })
}

/// EMI = P * r * (1+r)^n / ((1+r)^n - 1), with r the monthly rate
/// (annual% / 1200) and n the number of monthly periods.
///
/// A zero rate makes the denominator vanish; it is rejected up front rather
/// than special-cased.
pub fn monthly_installment(
    loan_amount: Decimal,
    annual_rate: Decimal,
    duration_years: u32,
) -> Result<Decimal, DomainError> {
    if loan_amount <= Decimal::ZERO {
        return Err(DomainError::InvalidLoanTerms(format!(
            "loan amount must be positive (got {loan_amount})"
        )));
    }
    if annual_rate <= Decimal::ZERO {
        return Err(DomainError::InvalidLoanTerms(format!(
            "interest rate must be positive (got {annual_rate})"
        )));
    }
    if duration_years == 0 {
        return Err(DomainError::InvalidLoanTerms(
            "loan duration must be at least one year".to_string(),
        ));
    }

    let monthly_rate = annual_rate / Decimal::from(1200);
    let periods = duration_years * 12;

    let base = Decimal::ONE + monthly_rate;
    let mut growth = Decimal::ONE;
    for _ in 0..periods {
        growth *= base;
    }

    let emi = loan_amount * (monthly_rate * growth) / (growth - Decimal::ONE);
    Ok(round_money(emi))
}
