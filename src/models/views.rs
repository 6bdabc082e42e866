use chrono::{DateTime, Utc};
use serde::Serialize;

use super::snapshot::{ClusterSnapshot, EntityKind, Health};

/// JSON view of one configured cluster as last seen by its poll loop.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterOverview {
    pub name: String,
    pub last_captured_at: Option<DateTime<Utc>>,
    pub health: Option<Health>,
    pub operators: String,
    pub nodes: String,
    pub pods: usize,
    pub open_problems: Vec<ProblemView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProblemView {
    pub kind: EntityKind,
    pub identity: String,
    pub health: Health,
    pub reason: Option<String>,
}

impl ClusterOverview {
    pub fn unobserved(name: &str) -> Self {
        Self {
            name: name.to_string(),
            last_captured_at: None,
            health: None,
            operators: String::new(),
            nodes: String::new(),
            pods: 0,
            open_problems: Vec::new(),
        }
    }

    pub fn from_snapshot(snap: &ClusterSnapshot) -> Self {
        Self {
            name: snap.cluster_id.clone(),
            last_captured_at: Some(snap.captured_at),
            health: Some(snap.worst_health()),
            operators: format!("{}/{}", snap.operators_ok(), snap.operators.len()),
            nodes: format!("{}/{}", snap.nodes_ready(), snap.nodes.len()),
            pods: snap.pods.len(),
            open_problems: snap
                .problems()
                .into_iter()
                .map(|(key, detail)| ProblemView {
                    kind: key.kind,
                    identity: key.identity,
                    health: detail.health,
                    reason: detail.reason,
                })
                .collect(),
        }
    }
}
