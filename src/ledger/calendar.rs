//! Calendar arithmetic
//!
//! Interest accrues on the day count of the month the payment falls in, and
//! payment dates advance by whole calendar months.

use chrono::{Datelike, NaiveDate};

/// Number of days in a calendar month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .expect("month is validated by chrono date construction");
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("first of month always exists");

    next_first.signed_duration_since(first).num_days() as u32
}

/// Advance a date by whole calendar months, clamping the day to the target
/// month's length (Jan 31 + 1 month = Feb 29/28).
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    let zero_based = date.year() * 12 + date.month0() as i32 + months as i32;
    let year = zero_based.div_euclid(12);
    let month = zero_based.rem_euclid(12) as u32 + 1;
    let day = date.day().min(days_in_month(year, month));

    NaiveDate::from_ymd_opt(year, month, day).expect("day clamped to month length")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 1), 31);
        assert_eq!(days_in_month(2024, 2), 29); // leap year
        assert_eq!(days_in_month(2025, 2), 28);
        assert_eq!(days_in_month(2024, 4), 30);
        assert_eq!(days_in_month(2024, 12), 31);
    }

    #[test]
    fn test_add_one_month() {
        assert_eq!(add_months(date(2024, 2, 1), 1), date(2024, 3, 1));
        assert_eq!(add_months(date(2024, 12, 15), 1), date(2025, 1, 15));
    }

    #[test]
    fn test_add_months_clamps_day() {
        assert_eq!(add_months(date(2024, 1, 31), 1), date(2024, 2, 29));
        assert_eq!(add_months(date(2025, 1, 31), 1), date(2025, 2, 28));
        assert_eq!(add_months(date(2024, 3, 31), 1), date(2024, 4, 30));
    }

    #[test]
    fn test_add_many_months() {
        assert_eq!(add_months(date(2024, 1, 1), 12), date(2025, 1, 1));
        assert_eq!(add_months(date(2024, 11, 30), 3), date(2025, 2, 28));
    }
}
