use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub type ClusterId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Health {
    Healthy,
    Degraded,
    Unavailable,
    Unknown,
}

impl Health {
    pub fn is_problem(self) -> bool {
        self != Health::Healthy
    }

    /// Ordering used to pick the worst state of a cluster.
    pub fn severity(self) -> u8 {
        match self {
            Health::Healthy => 0,
            Health::Unknown => 1,
            Health::Degraded => 2,
            Health::Unavailable => 3,
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Health::Healthy => "🟢",
            Health::Degraded => "🟡",
            Health::Unavailable => "🔴",
            Health::Unknown => "❓",
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Health::Healthy => "Healthy",
            Health::Degraded => "Degraded",
            Health::Unavailable => "Unavailable",
            Health::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Kind of entity a problem is attached to. The declaration order is the
/// grouping order used in deltas, reports and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Operator,
    Node,
    Pod,
    Metric,
    Connectivity,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Operator => "operator",
            EntityKind::Node => "node",
            EntityKind::Pod => "pod",
            EntityKind::Metric => "metric",
            EntityKind::Connectivity => "connectivity",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable de-duplication key for a faulty entity. Derived only from the
/// cluster, the entity kind and the entity identity, never from time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ProblemKey {
    pub cluster: ClusterId,
    pub kind: EntityKind,
    pub identity: String,
}

impl ProblemKey {
    pub fn operator(cluster: &str, name: &str) -> Self {
        Self::new(cluster, EntityKind::Operator, name.to_string())
    }

    pub fn node(cluster: &str, name: &str) -> Self {
        Self::new(cluster, EntityKind::Node, name.to_string())
    }

    pub fn pod(cluster: &str, namespace: &str, name: &str) -> Self {
        Self::new(cluster, EntityKind::Pod, format!("{}/{}", namespace, name))
    }

    pub fn metric(cluster: &str, node: &str, resource: &str) -> Self {
        Self::new(cluster, EntityKind::Metric, format!("{}/{}", node, resource))
    }

    pub fn connectivity(cluster: &str) -> Self {
        Self::new(cluster, EntityKind::Connectivity, cluster.to_string())
    }

    fn new(cluster: &str, kind: EntityKind, identity: String) -> Self {
        Self {
            cluster: cluster.to_string(),
            kind,
            identity,
        }
    }
}

impl fmt::Display for ProblemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.identity)
    }
}

/// What is known about a problem when it is reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detail {
    pub health: Health,
    pub reason: Option<String>,
}

impl Detail {
    pub fn new(health: Health, reason: Option<String>) -> Self {
        Self { health, reason }
    }
}

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(r) if !r.is_empty() => write!(f, "{}: {}", self.health, r),
            _ => write!(f, "{}", self.health),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorStatus {
    pub name: String,
    pub health: Health,
    pub reason: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeStatus {
    pub name: String,
    pub health: Health,
    pub reason: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PodStatus {
    pub namespace: String,
    pub name: String,
    pub health: Health,
    pub reason: Option<String>,
    pub phase: String,
    pub restarts: u32,
    pub node: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceSummary {
    pub name: String,
    pub phase: String,
    pub pods_total: usize,
    pub pods_running: usize,
    pub pods_pending: usize,
    pub pods_failed: usize,
    pub pods_succeeded: usize,
    pub services: usize,
    pub deployments: usize,
}

impl NamespaceSummary {
    pub fn health(&self) -> Health {
        if self.pods_failed > 0 {
            Health::Unavailable
        } else if self.pods_pending > 0 {
            Health::Degraded
        } else {
            Health::Healthy
        }
    }
}

/// Share of each node's capacity that is not allocatable, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeUsage {
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceMetrics {
    pub nodes: BTreeMap<String, NodeUsage>,
}

impl ResourceMetrics {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn average_cpu(&self) -> Option<f64> {
        average(self.nodes.values().filter_map(|u| u.cpu_percent))
    }

    pub fn average_memory(&self) -> Option<f64> {
        average(self.nodes.values().filter_map(|u| u.memory_percent))
    }
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { None } else { Some(sum / n as f64) }
}

/// Point-in-time capture of one cluster. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSnapshot {
    pub cluster_id: ClusterId,
    pub captured_at: DateTime<Utc>,
    pub operators: BTreeMap<String, OperatorStatus>,
    pub nodes: BTreeMap<String, NodeStatus>,
    pub namespaces: BTreeMap<String, NamespaceSummary>,
    pub pods: BTreeMap<(String, String), PodStatus>,
    pub metrics: ResourceMetrics,
    /// Resource alarms open at this capture. Filled in by the snapshot store
    /// before the snapshot becomes a baseline.
    pub alarms: BTreeMap<ProblemKey, Detail>,
}

impl ClusterSnapshot {
    pub fn empty(cluster_id: impl Into<ClusterId>, captured_at: DateTime<Utc>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            captured_at,
            operators: BTreeMap::new(),
            nodes: BTreeMap::new(),
            namespaces: BTreeMap::new(),
            pods: BTreeMap::new(),
            metrics: ResourceMetrics::default(),
            alarms: BTreeMap::new(),
        }
    }

    /// Every unhealthy entity keyed by its problem key, ordered by kind and
    /// then identity.
    pub fn problems(&self) -> BTreeMap<ProblemKey, Detail> {
        let id = &self.cluster_id;
        let mut out = BTreeMap::new();
        for op in self.operators.values().filter(|o| o.health.is_problem()) {
            out.insert(
                ProblemKey::operator(id, &op.name),
                Detail::new(op.health, op.reason.clone()),
            );
        }
        for node in self.nodes.values().filter(|n| n.health.is_problem()) {
            out.insert(
                ProblemKey::node(id, &node.name),
                Detail::new(node.health, node.reason.clone()),
            );
        }
        for pod in self.pods.values().filter(|p| p.health.is_problem()) {
            out.insert(
                ProblemKey::pod(id, &pod.namespace, &pod.name),
                Detail::new(pod.health, pod.reason.clone()),
            );
        }
        out.extend(self.alarms.iter().map(|(k, d)| (k.clone(), d.clone())));
        out
    }

    pub fn worst_health(&self) -> Health {
        self.operators
            .values()
            .map(|o| o.health)
            .chain(self.nodes.values().map(|n| n.health))
            .chain(self.pods.values().map(|p| p.health))
            .chain(self.alarms.values().map(|d| d.health))
            .max_by_key(|h| h.severity())
            .unwrap_or(Health::Healthy)
    }

    pub fn pods_in<'a>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'a PodStatus> + 'a {
        self.pods.values().filter(move |p| p.namespace == namespace)
    }

    pub fn operators_ok(&self) -> usize {
        self.operators.values().filter(|o| !o.health.is_problem()).count()
    }

    pub fn nodes_ready(&self) -> usize {
        self.nodes.values().filter(|n| !n.health.is_problem()).count()
    }
}
