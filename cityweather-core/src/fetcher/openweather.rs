use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    error::FetchError,
    fetcher::{CurrentLookup, FetchOutcome, WeatherFetcher},
    model::{CityId, WeatherData},
};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

const CITY_NOT_FOUND: &str = "city not found";
const FORECAST_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct OpenWeatherFetcher {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherFetcher {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    /// GET `endpoint` and return the status with the raw body.
    async fn get(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<(StatusCode, String), FetchError> {
        let url = format!("{}/{endpoint}", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(query)
            .query(&[("APPID", self.api_key.as_str()), ("units", "metric")])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        debug!(%url, status = status.as_u16(), "OpenWeather response received");

        Ok((status, body))
    }
}

#[derive(Debug, Deserialize)]
struct OwError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    pressure: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwClouds {
    all: f64,
}

#[derive(Debug, Deserialize)]
struct OwSys {
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    id: Option<CityId>,
    name: Option<String>,
    sys: Option<OwSys>,
    main: Option<OwMain>,
    weather: Option<Vec<OwWeather>>,
    wind: Option<OwWind>,
    clouds: Option<OwClouds>,
}

#[derive(Debug, Deserialize)]
struct OwCity {
    id: CityId,
    name: String,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
    clouds: OwClouds,
    dt_txt: String,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    city: OwCity,
    list: Vec<OwForecastEntry>,
}

#[async_trait]
impl WeatherFetcher for OpenWeatherFetcher {
    async fn fetch_current(
        &self,
        lookup: &CurrentLookup,
    ) -> Result<FetchOutcome<WeatherData>, FetchError> {
        let query = match lookup {
            CurrentLookup::Id(id) => [("id", id.to_string())],
            CurrentLookup::Name(name) => [("q", name.clone())],
        };

        let (status, body) = self.get("weather", &query).await?;

        if !status.is_success() {
            if is_city_not_found(&body) {
                debug!(%lookup, "OpenWeather reports city not found");
                return Ok(FetchOutcome::NotFound);
            }
            return Err(FetchError::Status { status: status.as_u16(), body: truncate_body(&body) });
        }

        let parsed: OwCurrentResponse = serde_json::from_str(&body)?;
        let Some(city_id) = parsed.id else {
            return Ok(FetchOutcome::NotFound);
        };

        let main = parsed.main;
        Ok(FetchOutcome::Found(WeatherData {
            city_id,
            city_name: parsed.name,
            country: parsed.sys.and_then(|s| s.country),
            temperature_c: main.as_ref().map(|m| m.temp),
            wind_speed_mps: parsed.wind.map(|w| w.speed),
            clouds_pct: parsed.clouds.map(|c| c.all),
            humidity_pct: main.as_ref().map(|m| m.humidity),
            pressure_hpa: main.as_ref().map(|m| m.pressure),
            icon_id: parsed.weather.and_then(|w| w.into_iter().next()).map(|w| w.icon),
            date: None,
        }))
    }

    async fn fetch_forecast(&self, city_id: CityId) -> Result<Vec<WeatherData>, FetchError> {
        let (status, body) = self.get("forecast", &[("id", city_id.to_string())]).await?;

        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16(), body: truncate_body(&body) });
        }

        let parsed: OwForecastResponse = serde_json::from_str(&body)?;
        let city = parsed.city;

        let records = parsed
            .list
            .into_iter()
            .map(|entry| WeatherData {
                city_id: city.id,
                city_name: Some(city.name.clone()),
                country: city.country.clone(),
                temperature_c: Some(entry.main.temp),
                wind_speed_mps: Some(entry.wind.speed),
                clouds_pct: Some(entry.clouds.all),
                humidity_pct: Some(entry.main.humidity),
                pressure_hpa: Some(entry.main.pressure),
                icon_id: entry.weather.into_iter().next().map(|w| w.icon),
                date: parse_forecast_date(&entry.dt_txt),
            })
            .collect();

        Ok(records)
    }
}

fn is_city_not_found(body: &str) -> bool {
    serde_json::from_str::<OwError>(body)
        .ok()
        .and_then(|e| e.message)
        .is_some_and(|m| m == CITY_NOT_FOUND)
}

fn parse_forecast_date(raw: &str) -> Option<DateTime<Utc>> {
    match NaiveDateTime::parse_from_str(raw, FORECAST_DATE_FORMAT) {
        Ok(naive) => Some(naive.and_utc()),
        Err(err) => {
            warn!(raw, error = %err, "unable to parse forecast date");
            None
        }
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
