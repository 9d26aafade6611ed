//! Date-window helpers for range-partitioned generation.

use anyhow::{Result, bail};
use chrono::{Duration, NaiveDate, Utc};

/// Inclusive generation window ending yesterday and spanning `days` days.
#[must_use]
pub fn historical_window(days: u32) -> (NaiveDate, NaiveDate) {
    let end = Utc::now().date_naive() - Duration::days(1);
    let start = end - Duration::days(i64::from(days) - 1);
    (start, end)
}

/// Split an inclusive date range into consecutive sub-ranges of at most
/// `days_per_batch` days each. The last sub-range is clipped to `end`.
pub fn split_date_range(
    start: NaiveDate,
    end: NaiveDate,
    days_per_batch: u32,
) -> Result<Vec<(NaiveDate, NaiveDate)>> {
    if start > end {
        bail!("start date {start} is after end date {end}");
    }
    if days_per_batch == 0 {
        bail!("days_per_batch must be positive");
    }

    let step = i64::from(days_per_batch);
    let mut ranges = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let batch_end = std::cmp::min(cursor + Duration::days(step - 1), end);
        ranges.push((cursor, batch_end));
        cursor = batch_end + Duration::days(1);
    }
    Ok(ranges)
}
