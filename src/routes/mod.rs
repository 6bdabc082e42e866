pub mod api;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(api::handle_healthz))
        // Clusters
        .route("/api/v1/clusters", get(api::handle_list_clusters))
        .route("/api/v1/clusters/{cluster}/report", get(api::handle_cluster_report))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
