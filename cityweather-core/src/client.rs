use tokio::sync::mpsc;

use crate::{
    coordinator::{Submission, TaskCoordinator},
    listener::{Listener, ListenerId, listener},
    model::CityId,
    operation::{Method, OperationResult, Params},
};

/// Requests operations on behalf of one listener.
///
/// Each screen or command holds its own client; every result for the
/// operations it requested arrives on the receiver returned by [`OperationClient::new`].
#[derive(Debug, Clone)]
pub struct OperationClient {
    coordinator: TaskCoordinator,
    listener: Listener,
}

impl OperationClient {
    pub fn new(
        coordinator: TaskCoordinator,
        id: impl Into<ListenerId>,
    ) -> (Self, mpsc::UnboundedReceiver<OperationResult>) {
        let (listener, rx) = listener(id);
        (Self { coordinator, listener }, rx)
    }

    /// Refresh current weather of every stored city.
    pub fn refresh_all(&self) -> Submission {
        self.run(Method::RefreshAll, Params::new())
    }

    /// Refresh the forecast of one city.
    pub fn refresh_forecast(&self, city_id: CityId) -> Submission {
        self.run(Method::RefreshForecast, Params::new().with_city_id(city_id))
    }

    /// Add a city by name; on success its current weather is stored too.
    pub fn add_city(&self, city_name: impl Into<String>) -> Submission {
        self.run(Method::AddCity, Params::new().with_city_name(city_name))
    }

    pub fn run(&self, method: Method, params: Params) -> Submission {
        self.coordinator.request_operation(method, params, self.listener.clone())
    }
}
