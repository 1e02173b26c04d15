//! Network geolocation: find the caller's approximate position from its IP.
//! Uses an ipinfo-style endpoint, no API key required.

use crate::error::WeatherError;
use async_trait::async_trait;
use emcs_core::NetworkError;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = "EMCS/0.1.0";

/// A position reported by a geolocation collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct GeoFix {
    pub lat: f64,
    pub lon: f64,
    pub display_name: String,
}

/// Source of an automatic position fix.
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn locate(&self) -> Result<GeoFix, WeatherError>;
}

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    loc: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
}

impl IpInfoResponse {
    fn into_fix(self) -> Result<GeoFix, WeatherError> {
        let loc = self
            .loc
            .ok_or_else(|| invalid_response("missing loc field"))?;
        let (lat, lon) = parse_loc(&loc).ok_or_else(|| invalid_response(&loc))?;

        // Prefer "City, Region" then fall back to whatever is known
        let display_name = match (self.city, self.region, self.country) {
            (Some(city), Some(region), _) if !region.is_empty() && region != city => {
                format!("{}, {}", city, region)
            }
            (Some(city), _, Some(country)) if !country.is_empty() => {
                format!("{}, {}", city, country)
            }
            (Some(city), _, _) => city,
            _ => format!("{:.4}, {:.4}", lat, lon),
        };

        Ok(GeoFix {
            lat,
            lon,
            display_name,
        })
    }
}

fn invalid_response(detail: &str) -> WeatherError {
    NetworkError::InvalidResponse(format!("geolocation: {}", detail)).into()
}

/// Parse "lat,lon".
fn parse_loc(loc: &str) -> Option<(f64, f64)> {
    let (lat, lon) = loc.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    (lat.is_finite() && lon.is_finite()).then_some((lat, lon))
}

/// IP based geolocation over HTTP.
#[derive(Debug, Clone)]
pub struct IpGeolocator {
    client: Client,
    url: String,
}

impl IpGeolocator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Geolocator for IpGeolocator {
    async fn locate(&self) -> Result<GeoFix, WeatherError> {
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            tracing::debug!("Geolocation returned status {}", response.status());
            return Err(NetworkError::ServerError {
                status: response.status().as_u16(),
                message: "geolocation request failed".to_string(),
            }
            .into());
        }

        let body: IpInfoResponse = response.json().await?;
        let fix = body.into_fix()?;

        tracing::info!("IP geolocated to: {} ({}, {})", fix.display_name, fix.lat, fix.lon);
        Ok(fix)
    }
}
