//! Location resolution and forecast aggregation for the EMCS dashboard.
//!
//! Resolves which coordinate to show (stored selection, IP geolocation,
//! manual search, built-in default), fetches OpenWeather feeds for it and
//! regroups them into location-local day buckets.

pub mod aggregate;
pub mod error;
pub mod geolocate;
pub mod localtime;
pub mod payload;
pub mod provider;
pub mod refresh;
pub mod resolver;
pub mod service;
pub mod store;
pub mod types;
pub mod window;

pub use aggregate::{aggregate, aggregate_raw};
pub use error::WeatherError;
pub use geolocate::{GeoFix, Geolocator, IpGeolocator};
pub use payload::RawForecast;
pub use provider::{ForecastSource, OpenWeatherClient};
pub use refresh::{RefreshTask, RequestGate, Ticket};
pub use resolver::{LocationResolver, Resolution};
pub use service::{ModelReceiver, RefreshOutcome, ServiceOptions, WeatherService};
pub use store::LocationStore;
pub use types::*;
pub use window::{select_window, DEFAULT_WINDOW_SIZE};
