//! Runs one operation against the fetcher and records the outcome in the store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::{
    coordinator::Execute,
    error::StoreError,
    fetcher::{CurrentLookup, FetchOutcome, WeatherFetcher},
    model::{CityId, DataStatus},
    operation::{AddCityOutcome, Method, Params, ResultCode},
    store::{LocalStore, Scope},
};

#[derive(Debug, Clone)]
pub struct OperationExecutor {
    store: Arc<dyn LocalStore>,
    fetcher: Arc<dyn WeatherFetcher>,
}

impl OperationExecutor {
    pub fn new(store: Arc<dyn LocalStore>, fetcher: Arc<dyn WeatherFetcher>) -> Self {
        Self { store, fetcher }
    }

    /// Refresh current weather of every stored city.
    ///
    /// All-or-nothing: unless every city was fetched, nothing is written and
    /// the previous timestamp is kept.
    pub async fn refresh_all(&self) -> bool {
        match self.try_refresh_all().await {
            Ok(success) => success,
            Err(err) => {
                warn!(error = %err, "refresh of current weather failed");
                self.clear_refreshing(Scope::Current);
                false
            }
        }
    }

    async fn try_refresh_all(&self) -> Result<bool, StoreError> {
        self.store.write_status(Scope::Current, DataStatus::refreshing())?;

        let ids = self.store.city_ids()?;
        let mut records = Vec::with_capacity(ids.len());

        for &city_id in &ids {
            match self.fetcher.fetch_current(&CurrentLookup::Id(city_id)).await {
                Ok(FetchOutcome::Found(data)) => records.push(data),
                Ok(FetchOutcome::NotFound) => warn!(city_id, "stored city no longer known to API"),
                Err(err) => warn!(city_id, error = %err, "failed to fetch current weather"),
            }
        }

        let success = records.len() == ids.len();
        let mut last_update = None;
        if success {
            self.store.write_records(Scope::Current, records)?;
            last_update = Some(Utc::now());
        } else {
            info!(fetched = records.len(), requested = ids.len(), "partial refresh discarded");
        }

        self.store.write_status(Scope::Current, DataStatus::finished(last_update))?;
        Ok(success)
    }

    /// Replace the stored forecast of `city_id`. An empty forecast counts as failure.
    pub async fn refresh_forecast(&self, city_id: CityId) -> bool {
        match self.try_refresh_forecast(city_id).await {
            Ok(success) => success,
            Err(err) => {
                warn!(city_id, error = %err, "refresh of forecast failed");
                self.clear_refreshing(Scope::Forecast(city_id));
                false
            }
        }
    }

    async fn try_refresh_forecast(&self, city_id: CityId) -> Result<bool, StoreError> {
        let scope = Scope::Forecast(city_id);
        self.store.write_status(scope, DataStatus::refreshing())?;

        let records = match self.fetcher.fetch_forecast(city_id).await {
            Ok(records) => records,
            Err(err) => {
                warn!(city_id, error = %err, "failed to fetch forecast");
                Vec::new()
            }
        };

        let success = !records.is_empty();
        let mut last_update = None;
        if success {
            info!(city_id, entries = records.len(), "updating forecast");
            self.store.write_records(scope, records)?;
            last_update = Some(Utc::now());
        }

        self.store.write_status(scope, DataStatus::finished(last_update))?;
        Ok(success)
    }

    /// Look a city up by name and store it with its current weather.
    pub async fn add_city(&self, city_name: &str) -> AddCityOutcome {
        let lookup = CurrentLookup::Name(city_name.to_owned());

        match self.fetcher.fetch_current(&lookup).await {
            Ok(FetchOutcome::Found(data)) => {
                let city_id = data.city_id;
                match self.store.add_city(data) {
                    Ok(added) => {
                        info!(city_id, city_name, added, "city lookup succeeded");
                        AddCityOutcome::Added
                    }
                    Err(err) => {
                        warn!(city_id, error = %err, "failed to store new city");
                        AddCityOutcome::Error
                    }
                }
            }
            Ok(FetchOutcome::NotFound) => AddCityOutcome::NotFound,
            Err(err) => {
                warn!(city_name, error = %err, "failed to look up city");
                AddCityOutcome::Error
            }
        }
    }

    fn clear_refreshing(&self, scope: Scope) {
        if let Err(err) = self.store.write_status(scope, DataStatus::finished(None)) {
            warn!(?scope, error = %err, "failed to clear refreshing flag");
        }
    }
}

#[async_trait]
impl Execute for OperationExecutor {
    async fn execute(&self, method: Method, params: &Params) -> ResultCode {
        match method {
            Method::RefreshAll => ResultCode::Refresh(self.refresh_all().await),
            Method::RefreshForecast => match params.city_id() {
                Some(city_id) => ResultCode::Refresh(self.refresh_forecast(city_id).await),
                None => {
                    warn!(%method, "missing city id parameter");
                    ResultCode::failure(method)
                }
            },
            Method::AddCity => match params.city_name() {
                Some(city_name) => ResultCode::AddCity(self.add_city(city_name).await),
                // Nothing to look up, so there is no such city.
                None => {
                    warn!(%method, "missing city name parameter");
                    ResultCode::AddCity(AddCityOutcome::NotFound)
                }
            },
        }
    }
}
