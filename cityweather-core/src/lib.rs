//! Core library for the `cityweather` client.
//!
//! This crate defines:
//! - The task coordinator that de-duplicates background operations
//! - The executor that runs refresh/add-city operations against the API and the store
//! - The OpenWeatherMap fetcher and the local weather stores
//! - Configuration & shared domain models
//!
//! It is used by `cityweather-cli`, but can also be reused by other front-ends.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod listener;
pub mod model;
pub mod operation;
pub mod store;

pub use client::OperationClient;
pub use config::Config;
pub use coordinator::{Execute, IdleSignal, Lifecycle, Submission, TaskCoordinator};
pub use error::{FetchError, StoreError};
pub use executor::OperationExecutor;
pub use fetcher::{CurrentLookup, FetchOutcome, OpenWeatherFetcher, WeatherFetcher};
pub use listener::{Listener, ListenerId, listener};
pub use model::{CityId, DataStatus, StoredWeather, WeatherData};
pub use operation::{
    AddCityOutcome, Method, OperationKey, OperationRequest, OperationResult, ParamValue, Params,
    ResultCode,
};
pub use store::{JsonFileStore, LocalStore, MemoryStore, Scope};
