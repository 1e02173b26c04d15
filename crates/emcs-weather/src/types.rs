use crate::localtime;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Fallback city used before any location has been resolved.
pub const DEFAULT_CITY: &str = "Kolkata, India";
pub const DEFAULT_LAT: f64 = 22.5726;
pub const DEFAULT_LON: f64 = 88.3639;

/// Days, counted from the first bucket, that offer an hourly view.
pub const HOURLY_DAYS: usize = 4;

/// Preset cities shipped with the dashboard, in display order.
const DEFAULT_PRESETS: [(&str, f64, f64); 8] = [
    ("Delhi", 28.6139, 77.2090),
    ("Mumbai", 19.0760, 72.8777),
    ("Chennai", 13.0827, 80.2707),
    ("Ranchi", 23.3441, 85.3096),
    ("Bangalore", 12.9716, 77.5946),
    ("Hyderabad", 17.3850, 78.4867),
    ("Jaipur", 26.9124, 75.7873),
    ("Lucknow", 26.8467, 80.9462),
];

/// Where a coordinate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationSource {
    Stored,
    #[serde(alias = "system-ip")]
    IpGeolocation,
    BrowserGeolocation,
    Search,
    Default,
}

impl LocationSource {
    /// Rank used when two resolutions race; higher wins.
    pub fn priority(self) -> u8 {
        match self {
            Self::Search => 3,
            Self::Stored => 2,
            Self::IpGeolocation | Self::BrowserGeolocation => 1,
            Self::Default => 0,
        }
    }

    /// Parse a persisted source tag. Unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "stored" => Some(Self::Stored),
            "ip-geolocation" | "system-ip" => Some(Self::IpGeolocation),
            "browser-geolocation" => Some(Self::BrowserGeolocation),
            "search" => Some(Self::Search),
            "default" => Some(Self::Default),
            _ => None,
        }
    }
}

/// Latitude/longitude pair used by presets and the city table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Both components finite and inside the valid degree ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// A resolved location with provenance.
///
/// Coordinates are never mutated; derive a new one with [`Coordinate::with_source`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    name: String,
    lat: f64,
    lon: f64,
    source: LocationSource,
}

impl Coordinate {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64, source: LocationSource) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
            source,
        }
    }

    /// The static fallback coordinate.
    pub fn default_location() -> Self {
        Self::new(DEFAULT_CITY, DEFAULT_LAT, DEFAULT_LON, LocationSource::Default)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn source(&self) -> LocationSource {
        self.source
    }

    pub fn lat_lon(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }

    pub fn is_usable(&self) -> bool {
        self.lat_lon().is_valid()
    }

    /// Same place, different provenance.
    pub fn with_source(&self, source: LocationSource) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }

    /// Whether this coordinate may replace `current`.
    pub fn supersedes(&self, current: &Coordinate) -> bool {
        self.source.priority() >= current.source.priority()
    }
}

/// A searchable city with its original display name
#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub name: String,
    pub position: LatLon,
}

/// City table keyed by normalized name.
///
/// Persisted as `{ "<Display Name>": { "lat": .., "lon": .. } }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "IndexMap<String, LatLon>", into = "IndexMap<String, LatLon>")]
pub struct CityTable {
    entries: IndexMap<String, City>,
}

impl CityTable {
    /// Lookup key for a city name or search query.
    pub fn normalize(name: &str) -> String {
        name.trim().to_lowercase()
    }

    /// Insert or replace a city; names differing only in case collapse to one entry.
    pub fn insert(&mut self, name: impl Into<String>, position: LatLon) {
        let name = name.into();
        let key = Self::normalize(&name);
        self.entries.insert(key, City { name, position });
    }

    /// Exact match on the normalized name.
    pub fn get(&self, query: &str) -> Option<&City> {
        self.entries.get(&Self::normalize(query))
    }

    /// Display names in insertion order (for autocomplete).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<IndexMap<String, LatLon>> for CityTable {
    fn from(map: IndexMap<String, LatLon>) -> Self {
        let mut table = CityTable::default();
        for (name, position) in map {
            table.insert(name, position);
        }
        table
    }
}

impl From<CityTable> for IndexMap<String, LatLon> {
    fn from(table: CityTable) -> Self {
        table
            .entries
            .into_values()
            .map(|city| (city.name, city.position))
            .collect()
    }
}

/// Persisted location state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub selected: Coordinate,
    #[serde(default)]
    pub presets: IndexMap<String, LatLon>,
    #[serde(default)]
    pub cities: CityTable,
}

impl LocationRecord {
    pub fn default_presets() -> IndexMap<String, LatLon> {
        DEFAULT_PRESETS
            .iter()
            .map(|(name, lat, lon)| (name.to_string(), LatLon::new(*lat, *lon)))
            .collect()
    }

    /// Default city table: the fallback city plus every preset.
    pub fn default_cities() -> CityTable {
        let mut cities = CityTable::default();
        cities.insert("Kolkata", LatLon::new(DEFAULT_LAT, DEFAULT_LON));
        for (name, lat, lon) in DEFAULT_PRESETS {
            cities.insert(name, LatLon::new(lat, lon));
        }
        cities
    }
}

impl Default for LocationRecord {
    fn default() -> Self {
        Self {
            selected: Coordinate::default_location(),
            presets: Self::default_presets(),
            cities: Self::default_cities(),
        }
    }
}

/// One hour of forecast at the location's local time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyEntry {
    /// Zero-padded 24h "HH:MM"
    pub local_time: String,
    pub temp: i32,
    pub condition: String,
    pub humidity: i32,
    pub pressure_hpa: i32,
    pub wind_speed_kmh: f64,
    pub wind_degrees: i32,
    pub gust_kmh: f64,
}

/// One local calendar day of forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBucket {
    /// Short month and day, e.g. "Nov 15"
    pub date_key: String,
    pub weekday: String,
    pub mean_temp: i32,
    pub condition_summary: String,
    /// Ascending by `local_time`
    pub hourly: Vec<HourlyEntry>,
}

/// Current conditions banner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentSummary {
    pub location_name: String,
    pub utc_offset_seconds: i64,
    /// e.g. "GMT+5:30"
    pub timezone_label: String,
    pub temp_min: i32,
    pub temp_max: i32,
    pub sunrise: String,
    pub sunset: String,
}

/// Counters collected while building a [`ForecastModel`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub skipped_daily: usize,
    pub skipped_hourly: usize,
    /// Valid hourly entries whose day is not in the daily series
    pub dropped_hourly: usize,
    /// Daily entries that overwrote an earlier day with the same key
    pub collisions: usize,
}

/// Day-bucketed forecast, rebuilt on every refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastModel {
    pub(crate) days: IndexMap<String, DailyBucket>,
    pub(crate) summary: Option<CurrentSummary>,
    pub(crate) utc_offset_seconds: i64,
    pub(crate) report: AggregationReport,
}

impl ForecastModel {
    pub fn get(&self, date_key: &str) -> Option<&DailyBucket> {
        self.days.get(date_key)
    }

    /// Date keys in feed order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.days.keys().map(String::as_str)
    }

    pub fn buckets(&self) -> impl Iterator<Item = &DailyBucket> {
        self.days.values()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn summary(&self) -> Option<&CurrentSummary> {
        self.summary.as_ref()
    }

    pub fn utc_offset_seconds(&self) -> i64 {
        self.utc_offset_seconds
    }

    pub fn report(&self) -> AggregationReport {
        self.report
    }

    /// Only the first [`HOURLY_DAYS`] days offer an hourly view.
    pub fn hourly_enabled(&self, date_key: &str) -> bool {
        self.days
            .get_index_of(date_key)
            .is_some_and(|index| index < HOURLY_DAYS)
    }

    /// Date key of `now` at the location.
    pub fn today_key(&self, now: DateTime<Utc>) -> Option<String> {
        localtime::local_now(now, self.utc_offset_seconds).map(|(key, _)| key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_priority_order() {
        assert!(LocationSource::Search.priority() > LocationSource::Stored.priority());
        assert!(LocationSource::Stored.priority() > LocationSource::IpGeolocation.priority());
        assert_eq!(
            LocationSource::IpGeolocation.priority(),
            LocationSource::BrowserGeolocation.priority()
        );
        assert!(LocationSource::IpGeolocation.priority() > LocationSource::Default.priority());
    }

    #[test]
    fn test_source_serde_tags() {
        let json = serde_json::to_string(&LocationSource::IpGeolocation).unwrap();
        assert_eq!(json, "\"ip-geolocation\"");
        let legacy: LocationSource = serde_json::from_str("\"system-ip\"").unwrap();
        assert_eq!(legacy, LocationSource::IpGeolocation);
        assert_eq!(LocationSource::from_tag("bogus"), None);
    }

    #[test]
    fn test_with_source_leaves_original_untouched() {
        let original = Coordinate::new("Delhi", 28.6, 77.2, LocationSource::Search);
        let stored = original.with_source(LocationSource::Stored);
        assert_eq!(original.source(), LocationSource::Search);
        assert_eq!(stored.source(), LocationSource::Stored);
        assert_eq!(stored.name(), "Delhi");
    }

    #[test]
    fn test_supersedes() {
        let search = Coordinate::new("Delhi", 28.6, 77.2, LocationSource::Search);
        let ip = Coordinate::new("Pune", 18.5, 73.8, LocationSource::IpGeolocation);
        assert!(search.supersedes(&ip));
        assert!(!ip.supersedes(&search));
        assert!(ip.supersedes(&Coordinate::default_location()));
    }

    #[test]
    fn test_usable_rejects_out_of_range() {
        assert!(Coordinate::default_location().is_usable());
        assert!(!Coordinate::new("x", f64::NAN, 1.0, LocationSource::Stored).is_usable());
        assert!(!Coordinate::new("x", 91.0, 1.0, LocationSource::Stored).is_usable());
    }

    #[test]
    fn test_city_table_keeps_display_name() {
        let mut table = CityTable::default();
        table.insert("New Delhi", LatLon::new(28.61, 77.21));
        let city = table.get("  NEW delhi ").unwrap();
        assert_eq!(city.name, "New Delhi");

        let json = serde_json::to_value(&table).unwrap();
        assert!(json.get("New Delhi").is_some());
    }

    #[test]
    fn test_city_table_case_duplicates_collapse() {
        let map: IndexMap<String, LatLon> = [
            ("Delhi".to_string(), LatLon::new(1.0, 1.0)),
            ("DELHI".to_string(), LatLon::new(2.0, 2.0)),
        ]
        .into_iter()
        .collect();
        let table = CityTable::from(map);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("delhi").unwrap().position, LatLon::new(2.0, 2.0));
    }

    #[test]
    fn test_default_record() {
        let record = LocationRecord::default();
        assert_eq!(record.selected.source(), LocationSource::Default);
        assert_eq!(record.presets.len(), 8);
        assert_eq!(record.presets.keys().next().map(String::as_str), Some("Delhi"));
        assert!(record.cities.get("kolkata").is_some());
        assert!(record.cities.get("Lucknow").is_some());
    }

    fn bucket(date_key: &str) -> DailyBucket {
        DailyBucket {
            date_key: date_key.to_string(),
            weekday: String::new(),
            mean_temp: 20,
            condition_summary: "Clear".into(),
            hourly: Vec::new(),
        }
    }

    #[test]
    fn test_hourly_enabled_first_four_days() {
        let mut model = ForecastModel::default();
        for key in ["Nov 15", "Nov 16", "Nov 17", "Nov 18", "Nov 19"] {
            model.days.insert(key.to_string(), bucket(key));
        }
        assert!(model.hourly_enabled("Nov 15"));
        assert!(model.hourly_enabled("Nov 18"));
        assert!(!model.hourly_enabled("Nov 19"));
        assert!(!model.hourly_enabled("Dec 01"));
    }

    #[test]
    fn test_today_key_uses_model_offset() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut model = ForecastModel::default();
        assert_eq!(model.today_key(now).as_deref(), Some("Nov 14"));
        model.utc_offset_seconds = 19_800;
        assert_eq!(model.today_key(now).as_deref(), Some("Nov 15"));
    }
}
