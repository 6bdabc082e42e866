use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::error::FetchError;
use crate::models::views::ClusterOverview;
use crate::monitor::report::render;
use crate::AppState;

/// Configured clusters as last seen by their poll loops.
pub async fn handle_list_clusters(State(state): State<AppState>) -> Json<Vec<ClusterOverview>> {
    let items = state
        .registry
        .cluster_ids()
        .iter()
        .map(|id| match state.store.latest(id) {
            Some(snap) => ClusterOverview::from_snapshot(&snap),
            None => ClusterOverview::unobserved(id),
        })
        .collect();
    Json(items)
}

/// Renders a report from a fresh fetch.
pub async fn handle_cluster_report(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
) -> Response {
    match state.registry.fetch(&cluster).await {
        Ok(snap) => {
            let doc = render(&snap, &state.config.thresholds);
            (
                StatusCode::OK,
                [("content-type", "text/markdown; charset=utf-8")],
                doc.markdown,
            )
                .into_response()
        }
        Err(FetchError::UnknownCluster(_)) => {
            (StatusCode::NOT_FOUND, format!("cluster {:?} not found\n", cluster)).into_response()
        }
        Err(e) => {
            warn!(cluster = %cluster, kind = e.kind(), error = %e, "report fetch failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("cluster {} is unreachable right now\n", cluster),
            )
                .into_response()
        }
    }
}

pub async fn handle_healthz() -> &'static str {
    "ok\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::registry::ClusterRegistry;
    use crate::clients::HealthSource;
    use crate::config::Config;
    use crate::models::snapshot::Health;
    use crate::monitor::store::SnapshotStore;
    use crate::testing::{ScriptedSource, SnapshotBuilder};
    use std::sync::Arc;
    use std::time::Duration;

    fn state() -> AppState {
        let config = Config::parse(
            "clusters:\n  - {name: c1, api_url: \"https://c1\"}\n  - {name: c2, api_url: \"https://c2\"}\n",
        )
        .unwrap();
        let registry = ClusterRegistry::new(
            vec![
                (
                    "c1".to_string(),
                    Arc::new(ScriptedSource::new(vec![Ok(SnapshotBuilder::new("c1")
                        .node("n1", Health::Unavailable)
                        .build())])) as Arc<dyn HealthSource>,
                ),
                (
                    "c2".to_string(),
                    Arc::new(ScriptedSource::new(vec![Err(FetchError::Timeout(Duration::from_secs(30)))]))
                        as Arc<dyn HealthSource>,
                ),
            ],
            Duration::from_secs(5),
        );
        AppState {
            registry: Arc::new(registry),
            store: Arc::new(SnapshotStore::new()),
            config: Arc::new(config),
        }
    }

    #[tokio::test]
    async fn cluster_list_marks_unobserved() {
        let state = state();
        state.store.advance(SnapshotBuilder::new("c1").node("n1", Health::Degraded).build());
        let Json(items) = handle_list_clusters(State(state)).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].open_problems.len(), 1);
        assert!(items[0].last_captured_at.is_some());
        assert!(items[1].last_captured_at.is_none());
    }

    #[tokio::test]
    async fn report_status_codes() {
        let ok = handle_cluster_report(State(state()), Path("c1".into())).await;
        assert_eq!(ok.status(), StatusCode::OK);
        let down = handle_cluster_report(State(state()), Path("c2".into())).await;
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
        let missing = handle_cluster_report(State(state()), Path("nope".into())).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
