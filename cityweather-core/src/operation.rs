//! Operation requests, their canonical keys and result codes.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{listener::Listener, model::CityId};

pub const CITY_ID_PARAM: &str = "city_id";
pub const CITY_NAME_PARAM: &str = "city_name";

/// Network operation that can be requested from the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Method {
    RefreshAll,
    RefreshForecast,
    AddCity,
}

impl Method {
    pub fn code(self) -> u8 {
        match self {
            Method::RefreshAll => 1,
            Method::RefreshForecast => 2,
            Method::AddCity => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::RefreshAll => "refresh-all",
            Method::RefreshForecast => "refresh-forecast",
            Method::AddCity => "add-city",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Text(String),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            ParamValue::Int(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

/// Operation parameters, ordered by name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) -> &mut Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn with_city_id(mut self, city_id: CityId) -> Self {
        self.insert(CITY_ID_PARAM, ParamValue::Int(city_id));
        self
    }

    pub fn with_city_name(mut self, city_name: impl Into<String>) -> Self {
        self.insert(CITY_NAME_PARAM, ParamValue::Text(city_name.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn city_id(&self) -> Option<CityId> {
        self.get(CITY_ID_PARAM).and_then(ParamValue::as_int)
    }

    pub fn city_name(&self) -> Option<&str> {
        self.get(CITY_NAME_PARAM).and_then(ParamValue::as_text)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Identity of an operation for de-duplication: method plus name-sorted parameters.
///
/// The listener of a request never takes part in the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    method: Method,
    params: Vec<(String, ParamValue)>,
}

impl OperationKey {
    pub fn new(method: Method, params: &Params) -> Self {
        // BTreeMap iteration is already sorted by name.
        let params = params
            .iter()
            .map(|(name, value)| (name.to_owned(), value.clone()))
            .collect();

        Self { method, params }
    }

    pub fn method(&self) -> Method {
        self.method
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{method:{}}}", self.method.code())?;
        for (name, value) in &self.params {
            write!(f, "{{{name}:{value}}}")?;
        }
        Ok(())
    }
}

/// A request to run `method` with `params`, reporting to `listener`.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub method: Method,
    pub params: Params,
    pub listener: Listener,
}

impl OperationRequest {
    pub fn new(method: Method, params: Params, listener: Listener) -> Self {
        Self { method, params, listener }
    }

    pub fn key(&self) -> OperationKey {
        OperationKey::new(self.method, &self.params)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddCityOutcome {
    Error,
    NotFound,
    Added,
}

/// Coarse outcome of an executed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCode {
    Refresh(bool),
    AddCity(AddCityOutcome),
}

impl ResultCode {
    /// The failure value for `method`.
    pub fn failure(method: Method) -> Self {
        match method {
            Method::RefreshAll | Method::RefreshForecast => ResultCode::Refresh(false),
            Method::AddCity => ResultCode::AddCity(AddCityOutcome::Error),
        }
    }

    /// Integer form: `1`/`0` for refreshes, `-1`/`0`/`1` for add-city.
    pub fn code(self) -> i32 {
        match self {
            ResultCode::Refresh(true) => 1,
            ResultCode::Refresh(false) => 0,
            ResultCode::AddCity(AddCityOutcome::Error) => -1,
            ResultCode::AddCity(AddCityOutcome::NotFound) => 0,
            ResultCode::AddCity(AddCityOutcome::Added) => 1,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(
            self,
            ResultCode::Refresh(true) | ResultCode::AddCity(AddCityOutcome::Added)
        )
    }
}

/// What every listener of a finished operation receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub method: Method,
    pub code: ResultCode,
}
