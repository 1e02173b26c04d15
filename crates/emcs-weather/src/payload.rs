//! Forecast feed schema.
//!
//! Raw feed entries are validated one at a time against the fields the
//! aggregator needs. A missing or mistyped required field yields
//! [`WeatherError::MalformedEntry`] for that entry only.

use crate::error::WeatherError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// The three raw payloads of one fetch cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawForecast {
    pub current: Value,
    pub hourly: Value,
    pub daily: Value,
}

/// Real-world offsets stay within a day.
const MAX_OFFSET_SECONDS: i64 = 86_400;

impl RawForecast {
    /// Location UTC offset reported with current conditions (0 when absent).
    ///
    /// Whole-second floats such as `19800.0` are accepted.
    pub fn utc_offset_seconds(&self) -> i64 {
        let Some(value) = self.current.get("timezone") else {
            return 0;
        };
        let offset = value.as_i64().or_else(|| {
            value
                .as_f64()
                .filter(|secs| secs.is_finite() && secs.abs() <= MAX_OFFSET_SECONDS as f64)
                .map(|secs| secs.round() as i64)
        });
        match offset {
            Some(offset) => offset,
            None => {
                tracing::warn!("Unusable timezone offset {}, assuming UTC", value);
                0
            }
        }
    }

    pub fn hourly_entries(&self) -> &[Value] {
        list_entries(&self.hourly)
    }

    pub fn daily_entries(&self) -> &[Value] {
        list_entries(&self.daily)
    }
}

/// Entries of a `{ "list": [...] }` payload; empty when the list is missing.
pub fn list_entries(payload: &Value) -> &[Value] {
    payload
        .get("list")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[derive(Debug, Default, Deserialize)]
struct RawMain {
    temp: Option<f64>,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawWeather {
    main: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWind {
    speed: Option<f64>,
    deg: Option<f64>,
    gust: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDayTemp {
    day: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSys {
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawHourly {
    dt: Option<i64>,
    main: Option<RawMain>,
    weather: Option<Vec<RawWeather>>,
    wind: Option<RawWind>,
}

#[derive(Debug, Deserialize)]
struct RawDaily {
    dt: Option<i64>,
    temp: Option<RawDayTemp>,
    weather: Option<Vec<RawWeather>>,
}

#[derive(Debug, Deserialize)]
struct RawCurrent {
    name: Option<String>,
    timezone: Option<i64>,
    main: Option<RawMain>,
    sys: Option<RawSys>,
}

/// One validated hourly feed entry (metric units, wind in m/s)
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyReading {
    pub epoch: i64,
    pub temp: f64,
    pub condition: String,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_speed: f64,
    pub wind_deg: f64,
    pub gust: f64,
}

/// One validated daily feed entry
#[derive(Debug, Clone, PartialEq)]
pub struct DailyReading {
    pub epoch: i64,
    pub day_temp: f64,
    pub condition: String,
}

/// Validated current conditions
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentReading {
    pub name: String,
    pub timezone_offset_seconds: i64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub sunrise_epoch: i64,
    pub sunset_epoch: i64,
}

fn decode<T: DeserializeOwned>(kind: &'static str, value: &Value) -> Result<T, WeatherError> {
    T::deserialize(value).map_err(|e| WeatherError::malformed(kind, e.to_string()))
}

fn required<T>(kind: &'static str, field: &str, value: Option<T>) -> Result<T, WeatherError> {
    value.ok_or_else(|| WeatherError::malformed(kind, format!("missing {}", field)))
}

fn finite(kind: &'static str, field: &str, value: Option<f64>) -> Result<f64, WeatherError> {
    let value = required(kind, field, value)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(WeatherError::malformed(kind, format!("non-finite {}", field)))
    }
}

/// First `weather[].main`, which must be a non-empty string.
fn condition(kind: &'static str, weather: Option<Vec<RawWeather>>) -> Result<String, WeatherError> {
    weather
        .and_then(|w| w.into_iter().next())
        .and_then(|w| w.main)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| WeatherError::malformed(kind, "missing weather[0].main"))
}

impl HourlyReading {
    const KIND: &'static str = "hourly";

    pub fn from_value(value: &Value) -> Result<Self, WeatherError> {
        let raw: RawHourly = decode(Self::KIND, value)?;
        let main = required(Self::KIND, "main", raw.main)?;
        let wind = required(Self::KIND, "wind", raw.wind)?;

        Ok(Self {
            epoch: required(Self::KIND, "dt", raw.dt)?,
            temp: finite(Self::KIND, "main.temp", main.temp)?,
            condition: condition(Self::KIND, raw.weather)?,
            humidity: finite(Self::KIND, "main.humidity", main.humidity)?,
            pressure: finite(Self::KIND, "main.pressure", main.pressure)?,
            wind_speed: finite(Self::KIND, "wind.speed", wind.speed)?,
            wind_deg: finite(Self::KIND, "wind.deg", wind.deg)?,
            // Calm hours come without a gust value
            gust: wind.gust.filter(|g| g.is_finite()).unwrap_or(0.0),
        })
    }
}

impl DailyReading {
    const KIND: &'static str = "daily";

    pub fn from_value(value: &Value) -> Result<Self, WeatherError> {
        let raw: RawDaily = decode(Self::KIND, value)?;
        let temp = required(Self::KIND, "temp", raw.temp)?;

        Ok(Self {
            epoch: required(Self::KIND, "dt", raw.dt)?,
            day_temp: finite(Self::KIND, "temp.day", temp.day)?,
            condition: condition(Self::KIND, raw.weather)?,
        })
    }
}

impl CurrentReading {
    const KIND: &'static str = "current";

    pub fn from_value(value: &Value) -> Result<Self, WeatherError> {
        let raw: RawCurrent = decode(Self::KIND, value)?;
        let main = required(Self::KIND, "main", raw.main)?;
        let sys = required(Self::KIND, "sys", raw.sys)?;

        Ok(Self {
            name: raw.name.unwrap_or_else(|| "--".to_string()),
            timezone_offset_seconds: raw.timezone.unwrap_or(0),
            temp_min: finite(Self::KIND, "main.temp_min", main.temp_min)?,
            temp_max: finite(Self::KIND, "main.temp_max", main.temp_max)?,
            sunrise_epoch: required(Self::KIND, "sys.sunrise", sys.sunrise)?,
            sunset_epoch: required(Self::KIND, "sys.sunset", sys.sunset)?,
        })
    }
}
