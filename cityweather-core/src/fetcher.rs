use std::fmt::{self, Debug};

use async_trait::async_trait;

use crate::{
    Config,
    error::FetchError,
    model::{CityId, WeatherData},
};

pub mod openweather;

pub use openweather::OpenWeatherFetcher;

/// How to look up a city's current weather.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentLookup {
    Id(CityId),
    Name(String),
}

impl fmt::Display for CurrentLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrentLookup::Id(id) => write!(f, "id {id}"),
            CurrentLookup::Name(name) => write!(f, "name '{name}'"),
        }
    }
}

/// A lookup that may legitimately find nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Found(T),
    NotFound,
}

/// Remote source of weather records.
#[async_trait]
pub trait WeatherFetcher: Send + Sync + Debug {
    async fn fetch_current(
        &self,
        lookup: &CurrentLookup,
    ) -> Result<FetchOutcome<WeatherData>, FetchError>;

    async fn fetch_forecast(&self, city_id: CityId) -> Result<Vec<WeatherData>, FetchError>;
}

/// Construct the OpenWeatherMap fetcher from config.
pub fn fetcher_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherFetcher>> {
    let api_key = config.api_key()?;
    Ok(Box::new(OpenWeatherFetcher::with_base_url(api_key.to_owned(), config.base_url())))
}
