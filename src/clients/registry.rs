use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::HealthSource;
use crate::error::FetchError;
use crate::models::snapshot::ClusterSnapshot;

/// Configured clusters, in configuration order, with their health sources.
pub struct ClusterRegistry {
    order: Vec<String>,
    sources: HashMap<String, Arc<dyn HealthSource>>,
    fetch_timeout: Duration,
}

impl ClusterRegistry {
    pub fn new(sources: Vec<(String, Arc<dyn HealthSource>)>, fetch_timeout: Duration) -> Self {
        let mut order = Vec::with_capacity(sources.len());
        let mut map = HashMap::new();
        for (name, source) in sources {
            order.push(name.clone());
            map.insert(name, source);
        }
        Self {
            order,
            sources: map,
            fetch_timeout,
        }
    }

    pub fn cluster_ids(&self) -> &[String] {
        &self.order
    }

    /// The only configured cluster, when there is exactly one.
    pub fn sole_cluster(&self) -> Option<&str> {
        match self.order.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Fetches a fresh snapshot, bounded by the configured timeout. A
    /// snapshot labelled with another cluster's id is rejected as malformed.
    pub async fn fetch(&self, cluster: &str) -> Result<ClusterSnapshot, FetchError> {
        let source = self
            .sources
            .get(cluster)
            .ok_or_else(|| FetchError::UnknownCluster(cluster.to_string()))?;

        let snap = tokio::time::timeout(self.fetch_timeout, source.fetch_snapshot())
            .await
            .map_err(|_| FetchError::Timeout(self.fetch_timeout))??;

        if snap.cluster_id != cluster {
            return Err(FetchError::Malformed(format!(
                "snapshot for {:?} returned by source of {:?}",
                snap.cluster_id, cluster
            )));
        }
        debug!(
            cluster = %cluster,
            operators = snap.operators.len(),
            nodes = snap.nodes.len(),
            pods = snap.pods.len(),
            "fetched snapshot"
        );
        Ok(snap)
    }
}
