pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;
pub mod store;

use std::sync::Arc;

use config::Config;
use coordinator::{ChatCoordinator, JoinCoordinator};
use gateway::hub::{Hub, HubHandle};
use store::{AccountStore, CapacityStore};

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountStore>,
    pub joins: JoinCoordinator,
    pub chat: ChatCoordinator,
    pub hub: HubHandle,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire coordinators over `store` and start the hub task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<S>(config: Config, store: Arc<S>) -> Self
    where
        S: CapacityStore + AccountStore + 'static,
    {
        let capacity: Arc<dyn CapacityStore> = store.clone();
        Self {
            accounts: store,
            joins: JoinCoordinator::new(capacity.clone()),
            chat: ChatCoordinator::new(capacity),
            hub: Hub::spawn(),
            config: Arc::new(config),
        }
    }
}
