//! "Next N hours" view over one day bucket.

use crate::error::WeatherError;
use crate::localtime;
use crate::types::{DailyBucket, ForecastModel, HourlyEntry};
use chrono::{DateTime, NaiveTime, Utc};

pub const DEFAULT_WINDOW_SIZE: usize = 6;

/// Up to `window_size` entries starting at the first one at or after
/// `reference` ("HH:MM", local). When every entry is earlier the window
/// wraps to the start of the day.
pub fn select_window(
    bucket: &DailyBucket,
    reference: &str,
    window_size: usize,
) -> Result<Vec<HourlyEntry>, WeatherError> {
    if window_size == 0 {
        return Err(WeatherError::invalid_argument("window size must be positive"));
    }
    if !is_clock(reference) {
        return Err(WeatherError::invalid_argument(format!(
            "reference time '{}' is not HH:MM",
            reference
        )));
    }

    // Zero-padded clocks order the same as strings
    let start = bucket
        .hourly
        .iter()
        .position(|entry| entry.local_time.as_str() >= reference)
        .unwrap_or(0);

    Ok(bucket
        .hourly
        .iter()
        .skip(start)
        .take(window_size)
        .cloned()
        .collect())
}

fn is_clock(value: &str) -> bool {
    value.len() == 5 && NaiveTime::parse_from_str(value, "%H:%M").is_ok()
}

impl ForecastModel {
    /// Window for `date_key` anchored at the location's current clock.
    pub fn upcoming(
        &self,
        date_key: &str,
        now: DateTime<Utc>,
        window_size: usize,
    ) -> Result<Vec<HourlyEntry>, WeatherError> {
        let bucket = self
            .get(date_key)
            .ok_or_else(|| WeatherError::NotFound(date_key.to_string()))?;
        let (_, clock) = localtime::local_now(now, self.utc_offset_seconds)
            .ok_or_else(|| WeatherError::invalid_argument("current time out of range"))?;
        select_window(bucket, &clock, window_size)
    }
}
