use std::{
    fs,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    error::StoreError,
    model::{CityId, DataStatus, WeatherData},
    store::{LocalStore, Scope, StoreState},
};

/// Store persisted as a single JSON document.
///
/// Every write goes to disk before it becomes visible to readers.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl JsonFileStore {
    /// Open the store at `path`, creating it with the default cities if missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let state = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&contents).map_err(|source| StoreError::Serde {
                path: path.clone(),
                source,
            })?
        } else {
            info!(path = %path.display(), "creating local weather store");
            let state = StoreState::default();
            persist(&path, &state)?;
            state
        };

        Ok(Self { path, state: Mutex::new(state) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, f: impl FnOnce(&mut StoreState)) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let mut next = state.clone();
        f(&mut next);
        persist(&self.path, &next)?;
        *state = next;
        Ok(())
    }
}

fn persist(path: &Path, state: &StoreState) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let json = serde_json::to_string_pretty(state).map_err(|source| StoreError::Serde {
        path: path.to_path_buf(),
        source,
    })?;

    // Readers only ever see the old document or the new one.
    let staging = staging_path(path);
    fs::write(&staging, json).map_err(|source| StoreError::Io { path: staging.clone(), source })?;
    fs::rename(&staging, path)
        .map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
    debug!(path = %path.display(), "store written");
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl LocalStore for JsonFileStore {
    fn read_status(&self, scope: Scope) -> Result<DataStatus, StoreError> {
        Ok(self.state.lock().status(scope))
    }

    fn write_status(&self, scope: Scope, status: DataStatus) -> Result<(), StoreError> {
        self.update(|state| state.set_status(scope, status))
    }

    fn read_records(&self, scope: Scope) -> Result<Vec<WeatherData>, StoreError> {
        Ok(self.state.lock().records(scope))
    }

    fn write_records(&self, scope: Scope, records: Vec<WeatherData>) -> Result<(), StoreError> {
        self.update(|state| state.set_records(scope, records))
    }

    fn city_ids(&self) -> Result<Vec<CityId>, StoreError> {
        Ok(self.state.lock().city_ids())
    }

    fn add_city(&self, record: WeatherData) -> Result<bool, StoreError> {
        let mut added = false;
        self.update(|state| added = state.add_city(record))?;
        Ok(added)
    }
}
