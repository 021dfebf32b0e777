//! Human-readable output.

use std::fmt::Write;

use chrono::{DateTime, Local, Utc};
use cityweather_core::{
    AddCityOutcome, CityId, DataStatus, Method, OperationResult, ResultCode, StoredWeather,
    WeatherData,
};

pub fn result_message(result: &OperationResult) -> &'static str {
    match (result.method, result.code) {
        (Method::RefreshAll, ResultCode::Refresh(true)) => "Weather refreshed.",
        (Method::RefreshAll, _) => {
            "Could not refresh the weather. Check your connection and try again."
        }
        (Method::RefreshForecast, ResultCode::Refresh(true)) => "Forecast refreshed.",
        (Method::RefreshForecast, _) => {
            "Could not refresh the forecast. Check your connection and try again."
        }
        (Method::AddCity, ResultCode::AddCity(AddCityOutcome::Added)) => "City added.",
        (Method::AddCity, ResultCode::AddCity(AddCityOutcome::NotFound)) => {
            "No city with that name was found."
        }
        (Method::AddCity, _) => "Could not add the city. Check your connection and try again.",
    }
}

pub fn current(stored: &StoredWeather) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", status_line(&stored.status));

    if stored.records.is_empty() {
        out.push_str("No cities stored yet. Add one with `cityweather add <NAME>`.\n");
        return out;
    }

    for record in &stored.records {
        let _ = writeln!(out, "[{:>8}] {:<24} {}", record.city_id, place(record), readings(record));
    }
    out
}

pub fn forecast(city_id: CityId, stored: &StoredWeather) -> String {
    let mut out = String::new();
    let title = stored.records.first().map_or_else(|| city_id.to_string(), place);
    let _ = writeln!(out, "Forecast for {title}");
    let _ = writeln!(out, "{}", status_line(&stored.status));

    if stored.records.is_empty() {
        let _ = writeln!(out, "No forecast stored. Run `cityweather forecast {city_id} --refresh`.");
        return out;
    }

    for record in &stored.records {
        let when = record.date.map_or_else(|| "unknown time".to_string(), local_time);
        let _ = writeln!(out, "{when:<17} {}", readings(record));
    }
    out
}

fn status_line(status: &DataStatus) -> String {
    let updated = status.last_update.map_or_else(|| "never".to_string(), local_time);
    if status.refreshing {
        format!("Last updated: {updated} (refresh in progress)")
    } else {
        format!("Last updated: {updated}")
    }
}

fn place(record: &WeatherData) -> String {
    let name = record.city_name.as_deref().unwrap_or("Unknown");
    match record.country.as_deref() {
        Some(country) => format!("{name}, {country}"),
        None => name.to_string(),
    }
}

fn readings(record: &WeatherData) -> String {
    let Some(temp) = record.temperature_c else {
        return "no data yet".to_string();
    };

    let mut parts = vec![format!("{temp:+.1}°C")];
    if let Some(wind) = record.wind_speed_mps {
        parts.push(format!("wind {wind:.1} m/s"));
    }
    if let Some(humidity) = record.humidity_pct {
        parts.push(format!("humidity {humidity:.0}%"));
    }
    if let Some(pressure) = record.pressure_hpa {
        parts.push(format!("{pressure:.0} hPa"));
    }
    if let Some(clouds) = record.clouds_pct {
        parts.push(format!("clouds {clouds:.0}%"));
    }
    parts.join(", ")
}

fn local_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
