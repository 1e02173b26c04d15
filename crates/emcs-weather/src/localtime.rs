//! Location-local time arithmetic.
//!
//! Feeds report UTC epochs plus the location's UTC offset in seconds. Every
//! displayed date or clock value is formatted from `epoch + offset`, never from
//! the bare UTC instant, so entries land on the location's calendar day.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Epoch shifted into the location's wall clock.
pub fn shifted(epoch: i64, utc_offset_seconds: i64) -> Option<NaiveDateTime> {
    let local = epoch.checked_add(utc_offset_seconds)?;
    DateTime::from_timestamp(local, 0).map(|dt| dt.naive_utc())
}

/// Grouping key, e.g. "Nov 15".
pub fn date_key(local: &NaiveDateTime) -> String {
    local.format("%b %d").to_string()
}

/// Full weekday name, e.g. "Wednesday".
pub fn weekday(local: &NaiveDateTime) -> String {
    local.format("%A").to_string()
}

/// Zero-padded 24h clock, e.g. "03:43".
pub fn clock(local: &NaiveDateTime) -> String {
    local.format("%H:%M").to_string()
}

/// "GMT+5:30", "GMT-5", "GMT+0".
pub fn timezone_label(utc_offset_seconds: i64) -> String {
    let sign = if utc_offset_seconds >= 0 { '+' } else { '-' };
    let total_minutes = utc_offset_seconds.abs() / 60;
    let (hours, minutes) = (total_minutes / 60, total_minutes % 60);
    if minutes == 0 {
        format!("GMT{}{}", sign, hours)
    } else {
        format!("GMT{}{}:{:02}", sign, hours, minutes)
    }
}

/// Date key and clock for `now` at the location.
pub fn local_now(now: DateTime<Utc>, utc_offset_seconds: i64) -> Option<(String, String)> {
    let local = shifted(now.timestamp(), utc_offset_seconds)?;
    Some((date_key(&local), clock(&local)))
}
