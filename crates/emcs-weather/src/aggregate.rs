//! Forecast aggregation: flat UTC feeds into location-local day buckets.

use crate::error::WeatherError;
use crate::localtime;
use crate::payload::{CurrentReading, DailyReading, HourlyReading, RawForecast};
use crate::types::{
    AggregationReport, CurrentSummary, DailyBucket, ForecastModel, HourlyEntry,
};
use indexmap::IndexMap;
use serde_json::Value;

const MS_TO_KMH: f64 = 3.6;

/// Build the day-bucketed model from one fetch cycle.
///
/// Daily entries define which days exist; hourly entries for other days are
/// dropped. Bad entries are skipped one by one and counted in the report.
pub fn aggregate(
    current: Option<&Value>,
    hourly: &[Value],
    daily: &[Value],
    utc_offset_seconds: i64,
) -> ForecastModel {
    let mut report = AggregationReport::default();
    let mut days: IndexMap<String, DailyBucket> = IndexMap::with_capacity(daily.len());

    for (index, entry) in daily.iter().enumerate() {
        match daily_bucket(entry, utc_offset_seconds) {
            Ok(bucket) => {
                let key = bucket.date_key.clone();
                // Last write wins, first position is kept
                if days.insert(key.clone(), bucket).is_some() {
                    report.collisions += 1;
                    tracing::warn!(index, date_key = %key, "Daily entry overwrote an earlier day");
                }
            }
            Err(e) => {
                report.skipped_daily += 1;
                tracing::warn!(index, "Skipping daily entry: {}", e);
            }
        }
    }

    for (index, entry) in hourly.iter().enumerate() {
        match hourly_entry(entry, utc_offset_seconds) {
            Ok((key, hour)) => match days.get_mut(&key) {
                Some(bucket) => bucket.hourly.push(hour),
                None => {
                    report.dropped_hourly += 1;
                    tracing::debug!(index, date_key = %key, "Hourly entry outside daily range");
                }
            },
            Err(e) => {
                report.skipped_hourly += 1;
                tracing::warn!(index, "Skipping hourly entry: {}", e);
            }
        }
    }

    for bucket in days.values_mut() {
        bucket.hourly.sort_by(|a, b| a.local_time.cmp(&b.local_time));
    }

    let summary = current.and_then(|value| match current_summary(value, utc_offset_seconds) {
        Ok(summary) => Some(summary),
        Err(e) => {
            tracing::warn!("Current conditions unavailable: {}", e);
            None
        }
    });

    tracing::debug!(
        days = days.len(),
        skipped_daily = report.skipped_daily,
        skipped_hourly = report.skipped_hourly,
        dropped_hourly = report.dropped_hourly,
        collisions = report.collisions,
        "Aggregated forecast"
    );

    ForecastModel {
        days,
        summary,
        utc_offset_seconds,
        report,
    }
}

/// [`aggregate`] over a fetched payload set, using its reported offset.
pub fn aggregate_raw(raw: &RawForecast) -> ForecastModel {
    let current = (!raw.current.is_null()).then_some(&raw.current);
    aggregate(
        current,
        raw.hourly_entries(),
        raw.daily_entries(),
        raw.utc_offset_seconds(),
    )
}

fn out_of_range(kind: &'static str, epoch: i64) -> WeatherError {
    WeatherError::malformed(kind, format!("timestamp {} out of range", epoch))
}

fn round(value: f64) -> i32 {
    value.round() as i32
}

fn daily_bucket(value: &Value, utc_offset_seconds: i64) -> Result<DailyBucket, WeatherError> {
    let reading = DailyReading::from_value(value)?;
    let local = localtime::shifted(reading.epoch, utc_offset_seconds)
        .ok_or_else(|| out_of_range("daily", reading.epoch))?;

    Ok(DailyBucket {
        date_key: localtime::date_key(&local),
        weekday: localtime::weekday(&local),
        mean_temp: round(reading.day_temp),
        condition_summary: reading.condition,
        hourly: Vec::new(),
    })
}

fn hourly_entry(
    value: &Value,
    utc_offset_seconds: i64,
) -> Result<(String, HourlyEntry), WeatherError> {
    let reading = HourlyReading::from_value(value)?;
    let local = localtime::shifted(reading.epoch, utc_offset_seconds)
        .ok_or_else(|| out_of_range("hourly", reading.epoch))?;

    let entry = HourlyEntry {
        local_time: localtime::clock(&local),
        temp: round(reading.temp),
        condition: reading.condition,
        humidity: round(reading.humidity),
        pressure_hpa: round(reading.pressure),
        wind_speed_kmh: reading.wind_speed * MS_TO_KMH,
        wind_degrees: round(reading.wind_deg),
        gust_kmh: reading.gust * MS_TO_KMH,
    };
    Ok((localtime::date_key(&local), entry))
}

fn current_summary(value: &Value, utc_offset_seconds: i64) -> Result<CurrentSummary, WeatherError> {
    let reading = CurrentReading::from_value(value)?;
    let sunrise = localtime::shifted(reading.sunrise_epoch, utc_offset_seconds)
        .ok_or_else(|| out_of_range("current", reading.sunrise_epoch))?;
    let sunset = localtime::shifted(reading.sunset_epoch, utc_offset_seconds)
        .ok_or_else(|| out_of_range("current", reading.sunset_epoch))?;

    Ok(CurrentSummary {
        location_name: reading.name,
        utc_offset_seconds,
        timezone_label: localtime::timezone_label(utc_offset_seconds),
        temp_min: round(reading.temp_min),
        temp_max: round(reading.temp_max),
        sunrise: localtime::clock(&sunrise),
        sunset: localtime::clock(&sunset),
    })
}
