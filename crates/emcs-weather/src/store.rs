//! File-backed location record.
//!
//! The whole record is read and written as one JSON document. Saves go through
//! a temp file in the same directory followed by an atomic rename, so readers
//! only ever observe the last committed record.

use crate::error::WeatherError;
use crate::types::{CityTable, Coordinate, LatLon, LocationRecord, LocationSource};
use emcs_core::StorageError;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// On-disk shape, read leniently so that partial or older files still load.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    selected: Option<RawSelection>,
    #[serde(default)]
    presets: Option<Value>,
    #[serde(default)]
    cities: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawSelection {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    lat: Option<Value>,
    #[serde(default)]
    lon: Option<Value>,
    #[serde(default)]
    source: Option<String>,
}

impl RawSelection {
    /// A selection is only kept when both components parse to a valid position.
    fn into_coordinate(self) -> Option<Coordinate> {
        let position = LatLon::new(degrees(self.lat.as_ref())?, degrees(self.lon.as_ref())?);
        if !position.is_valid() {
            return None;
        }

        let name = self
            .name
            .or(self.city)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{:.4}, {:.4}", position.lat, position.lon));
        let source = self
            .source
            .as_deref()
            .and_then(LocationSource::from_tag)
            .unwrap_or(LocationSource::Stored);

        Some(Coordinate::new(name, position.lat, position.lon, source))
    }
}

/// Numbers or numeric strings ("22.57"); anything else is treated as absent.
fn degrees(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Name to position map; entries without a usable position are skipped.
///
/// `None` when the field is absent or not an object at all.
fn positions(field: &'static str, value: Option<Value>) -> Option<IndexMap<String, LatLon>> {
    let Value::Object(entries) = value? else {
        tracing::warn!("Stored {} is not a name map, using defaults", field);
        return None;
    };

    let mut map = IndexMap::with_capacity(entries.len());
    for (name, entry) in entries {
        let position = degrees(entry.get("lat"))
            .zip(degrees(entry.get("lon")))
            .map(|(lat, lon)| LatLon::new(lat, lon))
            .filter(LatLon::is_valid);
        match position {
            Some(position) => {
                map.insert(name, position);
            }
            None => tracing::warn!("Skipping stored {} entry '{}': {}", field, name, entry),
        }
    }
    Some(map)
}

impl From<RawRecord> for LocationRecord {
    fn from(raw: RawRecord) -> Self {
        let selected = match raw.selected.and_then(RawSelection::into_coordinate) {
            Some(coordinate) => coordinate,
            None => {
                tracing::debug!("Stored selection missing or incomplete, using default");
                Coordinate::default_location()
            }
        };

        Self {
            selected,
            presets: positions("preset", raw.presets)
                .unwrap_or_else(LocationRecord::default_presets),
            cities: positions("city", raw.cities)
                .map(CityTable::from)
                .unwrap_or_else(LocationRecord::default_cities),
        }
    }
}

/// Durable location record: selected coordinate, presets and the city table.
#[derive(Debug)]
pub struct LocationStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LocationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted record, falling back to the built-in default.
    pub fn load(&self) -> LocationRecord {
        match self.try_load() {
            Ok(record) => record,
            Err(e) => {
                tracing::info!("Using default location record: {}", e);
                LocationRecord::default()
            }
        }
    }

    /// Read the persisted record, reporting why it could not be used.
    pub fn try_load(&self) -> Result<LocationRecord, WeatherError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(self.path.display().to_string()).into());
            }
            Err(e) => return Err(StorageError::Corrupt(e.to_string()).into()),
        };

        let raw: RawRecord = serde_json::from_str(&contents).map_err(|e| {
            tracing::warn!("Location file {} is unreadable: {}", self.path.display(), e);
            StorageError::Corrupt(e.to_string())
        })?;

        Ok(raw.into())
    }

    /// Replace the persisted record.
    ///
    /// One writer at a time; a crash mid-write leaves the previous file intact.
    pub fn save(&self, record: &LocationRecord) -> Result<(), WeatherError> {
        let _guard = self.write_lock.lock();

        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(write_failed)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_failed)?;
        tmp.write_all(&json).map_err(write_failed)?;
        tmp.as_file().sync_all().map_err(write_failed)?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::WriteFailed(e.error.to_string()))?;

        tracing::debug!("Saved location record to {}", self.path.display());
        Ok(())
    }

    /// Case-insensitive exact match against the city table.
    pub fn lookup_city(record: &LocationRecord, query: &str) -> Option<Coordinate> {
        let city = record.cities.get(query)?;
        Some(Coordinate::new(
            city.name.clone(),
            city.position.lat,
            city.position.lon,
            LocationSource::Search,
        ))
    }

    /// New record with `selected` replaced.
    pub fn set_selected(record: &LocationRecord, coordinate: Coordinate) -> LocationRecord {
        LocationRecord {
            selected: coordinate,
            ..record.clone()
        }
    }
}

fn write_failed(e: std::io::Error) -> StorageError {
    StorageError::WriteFailed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> LocationStore {
        LocationStore::new(dir.path().join("location.json"))
    }

    #[test]
    fn test_missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        assert!(matches!(
            store.try_load(),
            Err(WeatherError::StorageUnavailable(StorageError::NotFound(_)))
        ));
        assert_eq!(store.load(), LocationRecord::default());
    }

    #[test]
    fn test_corrupt_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{ \"selected\": ").unwrap();

        assert!(matches!(
            store.try_load(),
            Err(WeatherError::StorageUnavailable(StorageError::Corrupt(_)))
        ));
        assert_eq!(store.load(), LocationRecord::default());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut record = LocationRecord::default();
        record.cities.insert("Pune", LatLon::new(18.5204, 73.8567));
        let record = LocationStore::set_selected(
            &record,
            Coordinate::new("Pune", 18.5204, 73.8567, LocationSource::Search),
        );

        store.save(&record).unwrap();
        assert_eq!(store.load(), record);
    }

    #[test]
    fn test_save_creates_parent_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocationStore::new(dir.path().join("nested").join("location.json"));

        store.save(&LocationRecord::default()).unwrap();
        store.save(&LocationRecord::default()).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("location.json")]);
    }

    #[test]
    fn test_legacy_file_with_string_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"{
                "selected": {"city": "Ranchi", "lat": "23.3441", "lon": "85.3096", "source": "system-ip"},
                "presets": {"Delhi": {"lat": 28.6139, "lon": 77.2090}}
            }"#,
        )
        .unwrap();

        let record = store.load();
        assert_eq!(record.selected.name(), "Ranchi");
        assert_eq!(record.selected.lat(), 23.3441);
        assert_eq!(record.selected.source(), LocationSource::IpGeolocation);
        assert_eq!(record.presets.len(), 1);
        // Missing city table falls back to the built-in one
        assert!(record.cities.get("kolkata").is_some());
    }

    #[test]
    fn test_null_coordinates_default_selection() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"{"selected": {"name": "Nowhere", "lat": null, "lon": 10.0}, "presets": {}, "cities": {}}"#,
        )
        .unwrap();

        let record = store.load();
        assert_eq!(record.selected, Coordinate::default_location());
        assert!(record.presets.is_empty());
        assert!(record.cities.is_empty());
    }

    #[test]
    fn test_bad_city_entry_does_not_discard_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"{
                "selected": {"name": "Delhi", "lat": 28.6139, "lon": 77.209, "source": "search"},
                "presets": {"Delhi": {"lat": 28.6139, "lon": 77.209}, "Broken": {"lat": true}},
                "cities": {
                    "Delhi": {"lat": 28.6139, "lon": 77.209},
                    "Pune": {"lat": "18.52", "lon": 73.8567},
                    "Atlantis": {"lat": "deep", "lon": 0},
                    "Nowhere": {"lat": 95.0, "lon": 10.0},
                    "Surat": {"lat": 21.1702, "lon": 72.8311}
                }
            }"#,
        )
        .unwrap();

        let record = store.try_load().unwrap();
        assert_eq!(record.selected.name(), "Delhi");
        assert_eq!(record.selected.source(), LocationSource::Search);

        assert_eq!(record.cities.len(), 3);
        assert_eq!(record.cities.get("pune").unwrap().position.lat, 18.52);
        assert!(record.cities.get("surat").is_some());
        assert!(record.cities.get("atlantis").is_none());
        assert!(record.cities.get("nowhere").is_none());

        assert_eq!(record.presets.len(), 1);
        assert!(record.presets.contains_key("Delhi"));
    }

    #[test]
    fn test_non_object_tables_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"{"selected": {"name": "Pune", "lat": 18.52, "lon": 73.85}, "presets": [], "cities": "none"}"#,
        )
        .unwrap();

        let record = store.try_load().unwrap();
        assert_eq!(record.selected.name(), "Pune");
        assert_eq!(record.presets, LocationRecord::default_presets());
        assert_eq!(record.cities, LocationRecord::default_cities());
    }

    #[test]
    fn test_concurrent_saves_leave_one_complete_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let records: Vec<LocationRecord> = (0..8)
            .map(|i| {
                let name = format!("City {}", i);
                let mut record = LocationRecord::default();
                record.cities.insert(name.clone(), LatLon::new(10.0 + i as f64, 70.0));
                LocationStore::set_selected(
                    &record,
                    Coordinate::new(name, 10.0 + i as f64, 70.0, LocationSource::Search),
                )
            })
            .collect();

        std::thread::scope(|scope| {
            for record in &records {
                let store = &store;
                scope.spawn(move || {
                    for _ in 0..10 {
                        store.save(record).unwrap();
                    }
                });
            }
        });

        let loaded = store.try_load().unwrap();
        assert!(records.contains(&loaded));

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("location.json")]);
    }

    #[test]
    fn test_lookup_city_is_case_insensitive() {
        let record = LocationRecord::default();

        let upper = LocationStore::lookup_city(&record, "Delhi").unwrap();
        let lower = LocationStore::lookup_city(&record, "delhi").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.source(), LocationSource::Search);
        assert_eq!(upper.name(), "Delhi");
    }

    #[test]
    fn test_lookup_city_is_exact() {
        let record = LocationRecord::default();
        assert!(LocationStore::lookup_city(&record, "Del").is_none());
        assert!(LocationStore::lookup_city(&record, "Delhi NCR").is_none());
        assert!(LocationStore::lookup_city(&record, "").is_none());
    }

    #[test]
    fn test_set_selected_does_not_mutate_input() {
        let record = LocationRecord::default();
        let updated = LocationStore::set_selected(
            &record,
            Coordinate::new("Delhi", 28.6, 77.2, LocationSource::Search),
        );

        assert_eq!(record.selected, Coordinate::default_location());
        assert_eq!(updated.selected.name(), "Delhi");
        assert_eq!(updated.presets, record.presets);
    }
}
