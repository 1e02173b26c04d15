//! Weather backend: location resolution plus forecast refresh.
//!
//! All network work is async; the UI observes results through a `watch`
//! channel carrying the latest [`ForecastModel`]. The model is replaced
//! wholesale on every successful refresh and kept on failure.

use crate::aggregate::aggregate_raw;
use crate::error::WeatherError;
use crate::geolocate::{GeoFix, Geolocator, IpGeolocator};
use crate::provider::{ForecastSource, OpenWeatherClient};
use crate::refresh::{RefreshTask, RequestGate, Ticket};
use crate::resolver::{LocationResolver, Resolution};
use crate::store::LocationStore;
use crate::types::{Coordinate, ForecastModel, HourlyEntry};
use crate::window::DEFAULT_WINDOW_SIZE;
use chrono::{DateTime, Utc};
use emcs_core::Config;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Published model; `None` until the first successful refresh
pub type ModelReceiver = watch::Receiver<Option<Arc<ForecastModel>>>;

/// Timing and sizing knobs for [`WeatherService`]
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceOptions {
    pub fetch_timeout: Duration,
    /// `None` disables periodic refresh
    pub refresh_period: Option<Duration>,
    pub window_size: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            refresh_period: Some(Duration::from_secs(600)),
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

impl ServiceOptions {
    pub fn from_config(config: &Config) -> Self {
        let weather = &config.weather;
        Self {
            fetch_timeout: Duration::from_secs(weather.request_timeout_secs),
            refresh_period: (weather.refresh_minutes > 0)
                .then(|| Duration::from_secs(u64::from(weather.refresh_minutes) * 60)),
            window_size: weather.window_size,
        }
    }
}

/// What happened to a refresh request
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Published(Arc<ForecastModel>),
    /// Not applied: a newer request was issued while this one was in
    /// flight, or a higher-priority location is already active
    Superseded,
}

pub struct WeatherService<G, F> {
    resolver: LocationResolver<G>,
    source: F,
    gate: RequestGate,
    options: ServiceOptions,
    location: RwLock<Option<Coordinate>>,
    model_tx: watch::Sender<Option<Arc<ForecastModel>>>,
}

impl WeatherService<IpGeolocator, OpenWeatherClient> {
    /// Wire the HTTP collaborators from configuration.
    pub fn from_config(config: &Config) -> Result<Self, WeatherError> {
        let store = Arc::new(LocationStore::new(config.location_store_path()));
        let geo_timeout = Duration::from_secs(config.location.geolocation_timeout_secs);
        let geolocator = IpGeolocator::new(config.location.geolocation_url.clone(), geo_timeout)?;
        let source = OpenWeatherClient::from_config(&config.weather)?;

        if !config.weather.is_configured() {
            tracing::warn!("OpenWeather API key not configured, forecasts will fail");
        }

        Ok(Self::new(
            LocationResolver::new(store, geolocator, geo_timeout),
            source,
            ServiceOptions::from_config(config),
        ))
    }
}

impl<G: Geolocator, F: ForecastSource> WeatherService<G, F> {
    pub fn new(resolver: LocationResolver<G>, source: F, options: ServiceOptions) -> Self {
        let (model_tx, _) = watch::channel(None);
        Self {
            resolver,
            source,
            gate: RequestGate::new(),
            options,
            location: RwLock::new(None),
            model_tx,
        }
    }

    pub fn subscribe(&self) -> ModelReceiver {
        self.model_tx.subscribe()
    }

    /// Last published model.
    pub fn model(&self) -> Option<Arc<ForecastModel>> {
        self.model_tx.borrow().clone()
    }

    /// Active coordinate, if one has been resolved.
    pub fn location(&self) -> Option<Coordinate> {
        self.location.read().clone()
    }

    pub fn source(&self) -> &F {
        &self.source
    }

    pub fn resolver(&self) -> &LocationResolver<G> {
        &self.resolver
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Automatic resolution followed by a refresh.
    pub async fn initialize(&self) -> Result<RefreshOutcome, WeatherError> {
        let (coordinate, ticket) = self.resolve_automatic().await;
        self.fetch_and_publish(coordinate, ticket).await
    }

    /// Manual city search. On a miss the active location is left alone.
    pub async fn search(&self, query: &str) -> Result<RefreshOutcome, WeatherError> {
        let coordinate = self.resolver.search(query)?;
        let ticket = self.replace_location(coordinate.clone());
        self.fetch_and_publish(coordinate, ticket).await
    }

    /// Switch to a position reported by the device, unless a
    /// higher-priority location is already active.
    pub async fn adopt(&self, fix: GeoFix) -> Result<RefreshOutcome, WeatherError> {
        let (coordinate, ticket) = {
            let mut current = self.location.write();
            let Resolution::Resolved(coordinate) = self.resolver.adopt(fix, current.as_ref())?
            else {
                return Ok(RefreshOutcome::Superseded);
            };
            *current = Some(coordinate.clone());
            (coordinate, self.gate.begin())
        };

        self.fetch_and_publish(coordinate, ticket).await
    }

    /// Fetch, aggregate and publish for the active location.
    ///
    /// Failures leave the previously published model in place.
    pub async fn refresh(&self) -> Result<RefreshOutcome, WeatherError> {
        let (coordinate, ticket) = match self.claim() {
            Some(claimed) => claimed,
            None => self.resolve_automatic().await,
        };
        self.fetch_and_publish(coordinate, ticket).await
    }

    /// Hourly window for `date_key` at the location's current time.
    pub fn upcoming(
        &self,
        date_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<HourlyEntry>, WeatherError> {
        let model = self.model().ok_or(WeatherError::NoForecast)?;
        model.upcoming(date_key, now, self.options.window_size)
    }

    /// Active coordinate plus a ticket issued while it was still active.
    fn claim(&self) -> Option<(Coordinate, Ticket)> {
        let current = self.location.read();
        let coordinate = current.clone()?;
        Some((coordinate, self.gate.begin()))
    }

    /// Set the active coordinate; the ticket outranks every earlier claim.
    fn replace_location(&self, coordinate: Coordinate) -> Ticket {
        let mut current = self.location.write();
        *current = Some(coordinate);
        self.gate.begin()
    }

    async fn fetch_and_publish(
        &self,
        coordinate: Coordinate,
        ticket: Ticket,
    ) -> Result<RefreshOutcome, WeatherError> {
        let result =
            tokio::time::timeout(self.options.fetch_timeout, self.source.fetch(&coordinate)).await;

        if !self.gate.is_current(ticket) {
            tracing::debug!("Discarding stale forecast for {}", coordinate.name());
            return Ok(RefreshOutcome::Superseded);
        }

        let raw = match result {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!("Forecast refresh failed for {}: {}", coordinate.name(), e);
                return Err(e);
            }
            Err(elapsed) => {
                tracing::warn!(
                    "Forecast refresh timed out after {:?} for {}",
                    self.options.fetch_timeout,
                    coordinate.name()
                );
                return Err(elapsed.into());
            }
        };

        let model = Arc::new(aggregate_raw(&raw));
        // Re-checked under the channel lock so a newer request that began
        // during aggregation cannot be overwritten
        let published = self.model_tx.send_if_modified(|slot| {
            if !self.gate.is_current(ticket) {
                return false;
            }
            *slot = Some(model.clone());
            true
        });
        if !published {
            tracing::debug!("Discarding stale forecast for {}", coordinate.name());
            return Ok(RefreshOutcome::Superseded);
        }

        tracing::info!(
            "Forecast updated for {}: {} days",
            coordinate.name(),
            model.len()
        );
        Ok(RefreshOutcome::Published(model))
    }

    /// Run the automatic chain and adopt its result unless a
    /// higher-priority coordinate was set while it ran.
    async fn resolve_automatic(&self) -> (Coordinate, Ticket) {
        let resolved = self.resolver.resolve().await;

        let (kept, ticket) = {
            let mut current = self.location.write();
            let existing = current
                .as_ref()
                .filter(|existing| !resolved.supersedes(existing))
                .cloned();
            match existing {
                Some(existing) => (existing, self.gate.begin()),
                None => {
                    *current = Some(resolved.clone());
                    return (resolved, self.gate.begin());
                }
            }
        };

        tracing::debug!(
            "Keeping {} ({:?}) over automatic {} ({:?})",
            kept.name(),
            kept.source(),
            resolved.name(),
            resolved.source()
        );
        // The automatic chain may have persisted its own result meanwhile
        let store = self.resolver.store();
        let record = LocationStore::set_selected(&store.load(), kept.clone());
        if let Err(e) = store.save(&record) {
            tracing::warn!("Failed to persist kept location: {}", e);
        }
        (kept, ticket)
    }
}

impl<G, F> WeatherService<G, F>
where
    G: Geolocator + 'static,
    F: ForecastSource + 'static,
{
    /// Start periodic refresh. `None` when disabled in configuration.
    pub fn spawn_periodic(self: &Arc<Self>) -> Option<RefreshTask> {
        let Some(period) = self.options.refresh_period.filter(|p| !p.is_zero()) else {
            tracing::info!("Periodic forecast refresh disabled");
            return None;
        };

        tracing::info!("Refreshing forecast every {:?}", period);
        let service = Arc::clone(self);
        Some(RefreshTask::spawn(period, move || {
            let service = Arc::clone(&service);
            async move {
                if let Err(e) = service.refresh().await {
                    tracing::debug!("Scheduled refresh failed: {}", e.user_message());
                }
            }
        }))
    }
}
