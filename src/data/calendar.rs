//! Trading-day calendar (Monday to Friday, no holiday table)

use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The `n` trading days strictly after `last`
pub fn next_trading_days(last: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(n);
    let mut current = last;

    while dates.len() < n {
        current += Duration::days(1);
        if is_trading_day(current) {
            dates.push(current);
        }
    }

    dates
}

/// `n` consecutive trading days starting at `start` (or the next trading day)
pub fn business_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    if n == 0 {
        return Vec::new();
    }
    if is_trading_day(start) {
        let mut dates = vec![start];
        dates.extend(next_trading_days(start, n - 1));
        dates
    } else {
        next_trading_days(start, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_weekend() {
        // 2024-01-05 is a Friday
        let friday = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let next = next_trading_days(friday, 3);

        assert_eq!(
            next,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 9).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            ]
        );
    }

    #[test]
    fn test_business_days_from_weekend() {
        let saturday = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        let days = business_days(saturday, 2);
        assert_eq!(days[0], NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
        assert_eq!(days.len(), 2);
    }
}
