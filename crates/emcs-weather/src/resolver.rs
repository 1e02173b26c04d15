//! Location Resolution
//!
//! Produces the coordinate the dashboard should show, walking an ordered
//! fallback chain: stored selection, IP geolocation, and finally the static
//! default. Manual search is a separate, user-triggered path.

use crate::error::WeatherError;
use crate::geolocate::{GeoFix, Geolocator};
use crate::store::LocationStore;
use crate::types::{Coordinate, LocationSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Outcome of a resolution attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Coordinate),
    Unresolved,
}

impl Resolution {
    pub fn coordinate(&self) -> Option<&Coordinate> {
        match self {
            Self::Resolved(coordinate) => Some(coordinate),
            Self::Unresolved => None,
        }
    }
}

/// Service for resolving the active location
pub struct LocationResolver<G> {
    store: Arc<LocationStore>,
    geolocator: G,
    timeout: Duration,
}

impl<G: Geolocator> LocationResolver<G> {
    pub fn new(store: Arc<LocationStore>, geolocator: G, timeout: Duration) -> Self {
        Self {
            store,
            geolocator,
            timeout,
        }
    }

    pub fn store(&self) -> &LocationStore {
        &self.store
    }

    /// Run the automatic chain. Always yields a coordinate.
    pub async fn resolve(&self) -> Coordinate {
        if let Resolution::Resolved(coordinate) = self.stored_selection() {
            return coordinate;
        }

        if let Resolution::Resolved(coordinate) = self.ip_geolocation().await {
            return coordinate;
        }

        let fallback = Coordinate::default_location();
        tracing::info!("No location source available, using default {}", fallback.name());
        fallback
    }

    /// Step 1: a real selection persisted by an earlier session.
    fn stored_selection(&self) -> Resolution {
        let record = self.store.load();
        let selected = &record.selected;

        if selected.source() == LocationSource::Default || !selected.is_usable() {
            debug!("No stored selection");
            return Resolution::Unresolved;
        }

        tracing::info!(
            "Using stored location: {} ({}, {})",
            selected.name(),
            selected.lat(),
            selected.lon()
        );
        Resolution::Resolved(selected.with_source(LocationSource::Stored))
    }

    /// Step 2: IP geolocation, persisted on success.
    async fn ip_geolocation(&self) -> Resolution {
        let fix = match tokio::time::timeout(self.timeout, self.geolocator.locate()).await {
            Ok(Ok(fix)) => fix,
            Ok(Err(e)) => {
                debug!("IP geolocation inconclusive: {}", e);
                return Resolution::Unresolved;
            }
            Err(_) => {
                debug!("IP geolocation timed out after {:?}", self.timeout);
                return Resolution::Unresolved;
            }
        };

        let coordinate = Coordinate::new(
            fix.display_name,
            fix.lat,
            fix.lon,
            LocationSource::IpGeolocation,
        );
        if !coordinate.is_usable() {
            debug!("IP geolocation returned an unusable position");
            return Resolution::Unresolved;
        }

        self.persist(&coordinate);
        tracing::info!("Resolved location via IP: {}", coordinate.name());
        Resolution::Resolved(coordinate)
    }

    /// Step 3: explicit user search against the city table.
    pub fn search(&self, query: &str) -> Result<Coordinate, WeatherError> {
        let query = query.trim();
        let record = self.store.load();

        let Some(coordinate) = LocationStore::lookup_city(&record, query) else {
            debug!("City '{}' not found", query);
            return Err(WeatherError::NotFound(query.to_string()));
        };

        if let Err(e) = self
            .store
            .save(&LocationStore::set_selected(&record, coordinate.clone()))
        {
            tracing::warn!("Failed to persist searched location: {}", e);
        }

        tracing::info!(
            "Search resolved '{}' to {} ({}, {})",
            query,
            coordinate.name(),
            coordinate.lat(),
            coordinate.lon()
        );
        Ok(coordinate)
    }

    /// Adopt a position reported by the device itself.
    ///
    /// Unresolved when `active` or the persisted selection outranks it;
    /// otherwise the fix is persisted like an IP result.
    pub fn adopt(
        &self,
        fix: GeoFix,
        active: Option<&Coordinate>,
    ) -> Result<Resolution, WeatherError> {
        let coordinate = Coordinate::new(
            fix.display_name,
            fix.lat,
            fix.lon,
            LocationSource::BrowserGeolocation,
        );
        if !coordinate.is_usable() {
            return Err(WeatherError::malformed(
                "position",
                format!("({}, {}) is out of range", coordinate.lat(), coordinate.lon()),
            ));
        }

        let record = self.store.load();
        let outranked_by = active
            .into_iter()
            .chain(Some(&record.selected).filter(|selected| selected.is_usable()))
            .find(|current| !coordinate.supersedes(current));
        if let Some(current) = outranked_by {
            debug!(
                "Keeping {} ({:?}) over device position {}",
                current.name(),
                current.source(),
                coordinate.name()
            );
            return Ok(Resolution::Unresolved);
        }

        if let Err(e) = self
            .store
            .save(&LocationStore::set_selected(&record, coordinate.clone()))
        {
            tracing::warn!("Failed to persist device location: {}", e);
        }
        tracing::info!("Using device location: {}", coordinate.name());
        Ok(Resolution::Resolved(coordinate))
    }

    /// Merge into the current record; failure to save never fails resolution.
    fn persist(&self, coordinate: &Coordinate) {
        let record = LocationStore::set_selected(&self.store.load(), coordinate.clone());
        if let Err(e) = self.store.save(&record) {
            tracing::warn!("Failed to persist resolved location: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geolocate::GeoFix;
    use crate::types::LocationRecord;
    use async_trait::async_trait;
    use emcs_core::NetworkError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Succeed(GeoFix),
        Fail,
        Hang,
    }

    struct FakeGeolocator {
        behaviour: Behaviour,
        calls: Arc<AtomicUsize>,
    }

    impl FakeGeolocator {
        fn new(behaviour: Behaviour) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    behaviour,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl Geolocator for FakeGeolocator {
        async fn locate(&self) -> Result<GeoFix, WeatherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Succeed(fix) => Ok(fix.clone()),
                Behaviour::Fail => Err(NetworkError::ConnectionFailed("offline".into()).into()),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(WeatherError::Timeout)
                }
            }
        }
    }

    fn pune() -> GeoFix {
        GeoFix {
            lat: 18.5204,
            lon: 73.8567,
            display_name: "Pune, Maharashtra".into(),
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> Arc<LocationStore> {
        Arc::new(LocationStore::new(dir.path().join("location.json")))
    }

    #[tokio::test]
    async fn test_stored_coordinate_wins_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let record = LocationStore::set_selected(
            &LocationRecord::default(),
            Coordinate::new("Delhi", 28.6, 77.2, LocationSource::Search),
        );
        store.save(&record).unwrap();

        let (geo, calls) = FakeGeolocator::new(Behaviour::Succeed(pune()));
        let resolver = LocationResolver::new(store, geo, Duration::from_secs(5));

        let coordinate = resolver.resolve().await;
        assert_eq!(coordinate.lat(), 28.6);
        assert_eq!(coordinate.lon(), 77.2);
        assert_eq!(coordinate.source(), LocationSource::Stored);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ip_geolocation_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let (geo, calls) = FakeGeolocator::new(Behaviour::Succeed(pune()));
        let resolver = LocationResolver::new(store.clone(), geo, Duration::from_secs(5));

        let coordinate = resolver.resolve().await;
        assert_eq!(coordinate.source(), LocationSource::IpGeolocation);
        assert_eq!(coordinate.name(), "Pune, Maharashtra");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Merged into the existing record, presets untouched
        let record = store.load();
        assert_eq!(record.selected, coordinate);
        assert_eq!(record.presets, LocationRecord::default_presets());

        // Next session picks it up from storage
        let second = resolver.resolve().await;
        assert_eq!(second.source(), LocationSource::Stored);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_network_failure_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let (geo, _) = FakeGeolocator::new(Behaviour::Fail);
        let resolver = LocationResolver::new(store_in(&dir), geo, Duration::from_secs(5));

        assert_eq!(resolver.resolve().await, Coordinate::default_location());
    }

    #[tokio::test(start_paused = true)]
    async fn test_geolocation_timeout_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let (geo, calls) = FakeGeolocator::new(Behaviour::Hang);
        let resolver = LocationResolver::new(store_in(&dir), geo, Duration::from_secs(2));

        assert_eq!(resolver.resolve().await, Coordinate::default_location());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unusable_fix_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let (geo, _) = FakeGeolocator::new(Behaviour::Succeed(GeoFix {
            lat: 123.0,
            lon: 10.0,
            display_name: "Nowhere".into(),
        }));
        let store = store_in(&dir);
        let resolver = LocationResolver::new(store.clone(), geo, Duration::from_secs(5));

        assert_eq!(resolver.resolve().await, Coordinate::default_location());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_search_hit_persists_selection() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let (geo, calls) = FakeGeolocator::new(Behaviour::Fail);
        let resolver = LocationResolver::new(store.clone(), geo, Duration::from_secs(5));

        let coordinate = resolver.search("  mumbai ").unwrap();
        assert_eq!(coordinate.name(), "Mumbai");
        assert_eq!(coordinate.source(), LocationSource::Search);
        assert_eq!(store.load().selected, coordinate);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_miss_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let (geo, _) = FakeGeolocator::new(Behaviour::Fail);
        let resolver = LocationResolver::new(store.clone(), geo, Duration::from_secs(5));

        let err = resolver.search("Atlantis").unwrap_err();
        assert!(matches!(err, WeatherError::NotFound(q) if q == "Atlantis"));
        assert!(!store.path().exists());
    }

    fn resolver_with_selection(
        dir: &tempfile::TempDir,
        selected: Option<Coordinate>,
    ) -> LocationResolver<FakeGeolocator> {
        let store = store_in(dir);
        if let Some(selected) = selected {
            store
                .save(&LocationStore::set_selected(&LocationRecord::default(), selected))
                .unwrap();
        }
        let (geo, _) = FakeGeolocator::new(Behaviour::Fail);
        LocationResolver::new(store, geo, Duration::from_secs(5))
    }

    #[test]
    fn test_adopt_device_fix_persists_with_browser_source() {
        let dir = tempfile::tempdir().unwrap();
        let previous_ip = Coordinate::new("Kolkata", 22.57, 88.36, LocationSource::IpGeolocation);
        let resolver = resolver_with_selection(&dir, Some(previous_ip.clone()));

        let resolution = resolver.adopt(pune(), Some(&previous_ip)).unwrap();
        let coordinate = resolution.coordinate().unwrap();
        assert_eq!(coordinate.source(), LocationSource::BrowserGeolocation);
        assert_eq!(coordinate.name(), "Pune, Maharashtra");

        let record = resolver.store().load();
        assert_eq!(&record.selected, coordinate);
        assert_eq!(record.presets, LocationRecord::default_presets());
    }

    #[test]
    fn test_adopt_keeps_searched_selection() {
        let dir = tempfile::tempdir().unwrap();
        let delhi = Coordinate::new("Delhi", 28.6, 77.2, LocationSource::Search);
        let resolver = resolver_with_selection(&dir, Some(delhi.clone()));

        // Persisted search outranks the fix even with nothing active
        assert_eq!(resolver.adopt(pune(), None).unwrap(), Resolution::Unresolved);
        assert_eq!(resolver.store().load().selected, delhi);

        let stored = delhi.with_source(LocationSource::Stored);
        assert_eq!(
            resolver.adopt(pune(), Some(&stored)).unwrap(),
            Resolution::Unresolved
        );
    }

    #[test]
    fn test_adopt_replaces_default_selection() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_with_selection(&dir, None);

        let active = Coordinate::default_location();
        let resolution = resolver.adopt(pune(), Some(&active)).unwrap();
        assert!(matches!(resolution, Resolution::Resolved(ref c) if c.name() == "Pune, Maharashtra"));
        assert!(resolver.store().path().exists());
    }

    #[test]
    fn test_adopt_rejects_out_of_range_fix() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_with_selection(&dir, None);

        let err = resolver
            .adopt(
                GeoFix {
                    lat: 91.0,
                    lon: 10.0,
                    display_name: "Nowhere".into(),
                },
                None,
            )
            .unwrap_err();
        assert!(matches!(err, WeatherError::MalformedEntry { kind: "position", .. }));
        assert!(!resolver.store().path().exists());
    }

    #[test]
    fn test_resolution_coordinate_accessor() {
        let resolved = Resolution::Resolved(Coordinate::default_location());
        assert!(resolved.coordinate().is_some());
        assert!(Resolution::Unresolved.coordinate().is_none());
    }
}
