pub mod bot;
pub mod clients;
pub mod config;
pub mod error;
pub mod helpers;
pub mod models;
pub mod monitor;
pub mod routes;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use clients::registry::ClusterRegistry;
use monitor::store::SnapshotStore;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ClusterRegistry>,
    pub store: Arc<SnapshotStore>,
    pub config: Arc<config::Config>,
}
