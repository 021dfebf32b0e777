use parking_lot::RwLock;

use crate::{
    error::StoreError,
    model::{CityId, DataStatus, WeatherData},
    store::{LocalStore, Scope, StoreState},
};

/// Store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn read_status(&self, scope: Scope) -> Result<DataStatus, StoreError> {
        Ok(self.state.read().status(scope))
    }

    fn write_status(&self, scope: Scope, status: DataStatus) -> Result<(), StoreError> {
        self.state.write().set_status(scope, status);
        Ok(())
    }

    fn read_records(&self, scope: Scope) -> Result<Vec<WeatherData>, StoreError> {
        Ok(self.state.read().records(scope))
    }

    fn write_records(&self, scope: Scope, records: Vec<WeatherData>) -> Result<(), StoreError> {
        self.state.write().set_records(scope, records);
        Ok(())
    }

    fn city_ids(&self) -> Result<Vec<CityId>, StoreError> {
        Ok(self.state.read().city_ids())
    }

    fn add_city(&self, record: WeatherData) -> Result<bool, StoreError> {
        Ok(self.state.write().add_city(record))
    }
}
