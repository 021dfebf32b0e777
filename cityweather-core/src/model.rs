use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OpenWeatherMap city identifier.
pub type CityId = i64;

/// Weather for one city at one point in time.
///
/// Current-weather rows have no `date`; forecast rows carry the forecast slot time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WeatherData {
    pub city_id: CityId,
    pub city_name: Option<String>,
    pub country: Option<String>,
    pub temperature_c: Option<f64>,
    pub wind_speed_mps: Option<f64>,
    pub clouds_pct: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub icon_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

impl WeatherData {
    /// A placeholder row for a city that has not been fetched yet.
    pub fn placeholder(city_id: CityId, city_name: impl Into<String>) -> Self {
        Self {
            city_id,
            city_name: Some(city_name.into()),
            ..Self::default()
        }
    }
}

/// Refresh status of one stored data set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataStatus {
    pub last_update: Option<DateTime<Utc>>,
    pub refreshing: bool,
}

impl DataStatus {
    pub fn refreshing() -> Self {
        Self { last_update: None, refreshing: true }
    }

    /// Status after a finished refresh. `None` keeps the previously stored timestamp.
    pub fn finished(last_update: Option<DateTime<Utc>>) -> Self {
        Self { last_update, refreshing: false }
    }
}

/// Records read from the store together with their status.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoredWeather {
    pub records: Vec<WeatherData>,
    pub status: DataStatus,
}
