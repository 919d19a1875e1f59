use chrono::{DateTime, Local, NaiveDate, Utc};

/// `MM:SS` for a non-negative number of seconds. Minutes are not wrapped
/// into hours, so 3 hours reads `180:00`.
pub fn format_mmss(total_secs: u64) -> String {
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Whole seconds between `start` and `now`, rounded toward negative infinity.
///
/// Negative when the clock moved backwards past the start.
pub fn elapsed_secs(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - start).num_milliseconds().div_euclid(1000)
}

/// Calendar day of `now` in the local time zone.
pub fn local_day(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&Local).date_naive()
}

pub fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

pub fn parse_day_key(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}
