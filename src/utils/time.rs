use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, NaiveDate, TimeZone};

/// Local midnight to the last second of `date`, as Unix seconds.
pub fn local_day_bounds(date: NaiveDate) -> Result<(i64, i64)> {
    let start = date
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest());
    let end = date
        .and_hms_opt(23, 59, 59)
        .and_then(|naive| Local.from_local_datetime(&naive).latest());

    match (start, end) {
        (Some(start), Some(end)) => Ok((start.timestamp(), end.timestamp())),
        _ => Err(anyhow!("no local time range for {date}")),
    }
}

/// `HH:MM:SS` (UTC) for a Unix timestamp; empty when out of range.
pub fn clock_time(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_default()
}
