use std::{collections::BTreeMap, fmt::Debug};

use serde::{Deserialize, Serialize};

use crate::{
    error::StoreError,
    model::{CityId, DataStatus, StoredWeather, WeatherData},
};

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Cities every fresh store starts with.
pub const DEFAULT_CITIES: &[(CityId, &str)] = &[(5601538, "Moscow"), (498817, "Saint Petersburg")];

/// Which stored data set an operation reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Current weather of every city.
    Current,
    /// Forecast of a single city.
    Forecast(CityId),
}

/// Persistent storage for weather records and their refresh status.
pub trait LocalStore: Send + Sync + Debug {
    fn read_status(&self, scope: Scope) -> Result<DataStatus, StoreError>;

    /// Write `status`. A `None` timestamp keeps the stored one.
    fn write_status(&self, scope: Scope, status: DataStatus) -> Result<(), StoreError>;

    fn read_records(&self, scope: Scope) -> Result<Vec<WeatherData>, StoreError>;

    /// Current weather rows are updated by city id; a forecast is replaced wholesale.
    fn write_records(&self, scope: Scope, records: Vec<WeatherData>) -> Result<(), StoreError>;

    fn city_ids(&self) -> Result<Vec<CityId>, StoreError>;

    /// Add a city with its current weather. Returns `false` if it was already stored.
    fn add_city(&self, record: WeatherData) -> Result<bool, StoreError>;

    fn read(&self, scope: Scope) -> Result<StoredWeather, StoreError> {
        Ok(StoredWeather {
            records: self.read_records(scope)?,
            status: self.read_status(scope)?,
        })
    }
}

/// Contents shared by the store implementations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoreState {
    current: Vec<WeatherData>,
    current_status: DataStatus,
    forecasts: BTreeMap<CityId, Vec<WeatherData>>,
    forecast_status: BTreeMap<CityId, DataStatus>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            current: DEFAULT_CITIES
                .iter()
                .map(|(id, name)| WeatherData::placeholder(*id, *name))
                .collect(),
            current_status: DataStatus::default(),
            forecasts: BTreeMap::new(),
            forecast_status: DEFAULT_CITIES
                .iter()
                .map(|(id, _)| (*id, DataStatus::default()))
                .collect(),
        }
    }
}

impl StoreState {
    pub(crate) fn status(&self, scope: Scope) -> DataStatus {
        match scope {
            Scope::Current => self.current_status,
            Scope::Forecast(city_id) => {
                self.forecast_status.get(&city_id).copied().unwrap_or_default()
            }
        }
    }

    pub(crate) fn set_status(&mut self, scope: Scope, status: DataStatus) {
        let slot = match scope {
            Scope::Current => &mut self.current_status,
            Scope::Forecast(city_id) => self.forecast_status.entry(city_id).or_default(),
        };

        slot.refreshing = status.refreshing;
        if status.last_update.is_some() {
            slot.last_update = status.last_update;
        }
    }

    pub(crate) fn records(&self, scope: Scope) -> Vec<WeatherData> {
        match scope {
            Scope::Current => self.current.clone(),
            Scope::Forecast(city_id) => {
                let mut records = self.forecasts.get(&city_id).cloned().unwrap_or_default();
                records.sort_by_key(|r| r.date);
                records
            }
        }
    }

    pub(crate) fn set_records(&mut self, scope: Scope, records: Vec<WeatherData>) {
        match scope {
            Scope::Current => {
                for record in records {
                    if let Some(row) = self.current.iter_mut().find(|r| r.city_id == record.city_id) {
                        *row = WeatherData { date: None, ..record };
                    }
                }
            }
            Scope::Forecast(city_id) => {
                self.forecasts.insert(city_id, records);
            }
        }
    }

    pub(crate) fn city_ids(&self) -> Vec<CityId> {
        self.current.iter().map(|r| r.city_id).collect()
    }

    pub(crate) fn add_city(&mut self, record: WeatherData) -> bool {
        if self.current.iter().any(|r| r.city_id == record.city_id) {
            return false;
        }

        self.forecast_status.insert(record.city_id, DataStatus::default());
        self.current.push(WeatherData { date: None, ..record });
        true
    }
}
