//! Rebalance-date calendar.
//!
//! Rebalance dates are calendar month ends (or quarter ends) aligned to
//! the prior trading day, where the trading calendar is the benchmark's
//! observed dates. Dates outside `[start, end]` are dropped, so the
//! first rebalance is never before the requested start.

use cadiz_traits::{Date, RebalanceFrequency};
use chrono::{Datelike, Days};

/// Last calendar day of a month.
fn month_end(year: i32, month: u32) -> Date {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    Date::from_ymd_opt(next_year, next_month, 1)
        .expect("first of month is always valid")
        .pred_opt()
        .expect("month end is always valid")
}

/// Compute the ordered rebalance dates between `start` and `end`.
///
/// `trading_days` must be sorted ascending (the benchmark series order).
/// Each month-end (quarter-end for quarterly) is aligned to the last
/// trading day at or before it; duplicates from sparse calendars are
/// collapsed.
#[must_use]
pub fn rebalance_dates(
    trading_days: &[Date],
    start: Date,
    end: Date,
    frequency: RebalanceFrequency,
) -> Vec<Date> {
    if trading_days.is_empty() || start > end {
        return Vec::new();
    }

    let mut dates = Vec::new();
    let mut cursor = Date::from_ymd_opt(start.year(), start.month(), 1)
        .expect("first of month is always valid");
    while cursor <= end {
        let (year, month) = (cursor.year(), cursor.month());
        let is_period_end = match frequency {
            RebalanceFrequency::Monthly => true,
            RebalanceFrequency::Quarterly => month % 3 == 0,
        };
        if is_period_end {
            let period_end = month_end(year, month);
            if let Some(aligned) = last_trading_day_at_or_before(trading_days, period_end) {
                if aligned >= start && aligned <= end && dates.last() != Some(&aligned) {
                    dates.push(aligned);
                }
            }
        }
        cursor = month_end(year, month) + Days::new(1);
    }
    dates
}

/// Last trading day at or before `date`, if any.
#[must_use]
pub fn last_trading_day_at_or_before(trading_days: &[Date], date: Date) -> Option<Date> {
    match trading_days.partition_point(|d| *d <= date) {
        0 => None,
        n => Some(trading_days[n - 1]),
    }
}
