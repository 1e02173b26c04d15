//! Forecast data source backed by the OpenWeather REST API.

use crate::error::WeatherError;
use crate::payload::RawForecast;
use crate::types::Coordinate;
use async_trait::async_trait;
use emcs_core::{NetworkError, WeatherConfig};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const USER_AGENT: &str = "EMCS/0.1.0";

/// Supplies the raw payloads for one refresh cycle.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch(&self, coordinate: &Coordinate) -> Result<RawForecast, WeatherError>;
}

/// OpenWeather client: current conditions, hourly and daily forecast.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    api_key: String,
    base_url: String,
    hourly_base_url: String,
    daily_count: u32,
}

impl OpenWeatherClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        hourly_base_url: impl Into<String>,
        daily_count: u32,
        timeout: Duration,
    ) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            hourly_base_url: hourly_base_url.into().trim_end_matches('/').to_string(),
            daily_count,
        })
    }

    pub fn from_config(config: &WeatherConfig) -> Result<Self, WeatherError> {
        Self::new(
            config.api_key.clone(),
            config.base_url.clone(),
            config.hourly_base_url.clone(),
            config.daily_count,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    async fn get_json(
        &self,
        url: String,
        coordinate: &Coordinate,
        extra: &[(&str, String)],
    ) -> Result<Value, WeatherError> {
        let mut query = vec![
            ("lat", coordinate.lat().to_string()),
            ("lon", coordinate.lon().to_string()),
            ("appid", self.api_key.clone()),
            ("units", "metric".to_string()),
        ];
        query.extend(extra.iter().map(|(k, v)| (*k, v.clone())));

        let response = self.client.get(&url).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::debug!("OpenWeather {} returned {}: {}", url, status, message);
            return Err(NetworkError::ServerError {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ForecastSource for OpenWeatherClient {
    async fn fetch(&self, coordinate: &Coordinate) -> Result<RawForecast, WeatherError> {
        tracing::debug!(
            "Fetching forecast for {} ({}, {})",
            coordinate.name(),
            coordinate.lat(),
            coordinate.lon()
        );

        let daily_params = [("cnt", self.daily_count.to_string())];
        let (current, hourly, daily) = tokio::try_join!(
            self.get_json(format!("{}/weather", self.base_url), coordinate, &[]),
            self.get_json(
                format!("{}/forecast/hourly", self.hourly_base_url),
                coordinate,
                &[]
            ),
            self.get_json(
                format!("{}/forecast/daily", self.base_url),
                coordinate,
                &daily_params
            ),
        )?;

        Ok(RawForecast {
            current,
            hourly,
            daily,
        })
    }
}
