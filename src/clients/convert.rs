use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::helpers::{parse_cpu, parse_memory, reserved_percent};
use crate::models::k8s;
use crate::models::snapshot::{
    ClusterSnapshot, Health, NamespaceSummary, NodeStatus, NodeUsage, OperatorStatus, PodStatus,
};

/// Raw API lists gathered during one fetch.
#[derive(Debug, Default)]
pub struct RawCluster {
    pub operators: Vec<k8s::ClusterOperator>,
    pub nodes: Vec<k8s::Node>,
    pub namespaces: Vec<k8s::Namespace>,
    pub pods: Vec<k8s::Pod>,
    pub services: Vec<k8s::NamespacedObject>,
    pub deployments: Vec<k8s::NamespacedObject>,
}

pub fn build_snapshot(cluster: &str, captured_at: DateTime<Utc>, raw: RawCluster) -> ClusterSnapshot {
    let mut snap = ClusterSnapshot::empty(cluster, captured_at);

    for op in &raw.operators {
        let status = operator_status(op);
        snap.operators.insert(status.name.clone(), status);
    }

    for node in &raw.nodes {
        let status = node_status(node);
        if let Some(usage) = node_usage(node) {
            snap.metrics.nodes.insert(status.name.clone(), usage);
        }
        snap.nodes.insert(status.name.clone(), status);
    }

    for ns in &raw.namespaces {
        snap.namespaces.insert(
            ns.metadata.name.clone(),
            NamespaceSummary {
                name: ns.metadata.name.clone(),
                phase: ns.status.phase.clone(),
                ..Default::default()
            },
        );
    }

    for pod in &raw.pods {
        let status = pod_status(pod);
        let summary = namespace_entry(&mut snap.namespaces, &status.namespace);
        summary.pods_total += 1;
        match status.phase.as_str() {
            "Running" => summary.pods_running += 1,
            "Pending" => summary.pods_pending += 1,
            "Failed" => summary.pods_failed += 1,
            "Succeeded" => summary.pods_succeeded += 1,
            _ => {}
        }
        snap.pods
            .insert((status.namespace.clone(), status.name.clone()), status);
    }

    for svc in &raw.services {
        namespace_entry(&mut snap.namespaces, &svc.metadata.namespace).services += 1;
    }
    for dep in &raw.deployments {
        namespace_entry(&mut snap.namespaces, &dep.metadata.namespace).deployments += 1;
    }

    snap
}

fn namespace_entry<'a>(
    map: &'a mut BTreeMap<String, NamespaceSummary>,
    name: &str,
) -> &'a mut NamespaceSummary {
    map.entry(name.to_string()).or_insert_with(|| NamespaceSummary {
        name: name.to_string(),
        phase: "Active".to_string(),
        ..Default::default()
    })
}

fn condition<'a>(conditions: &'a [k8s::Condition], kind: &str) -> Option<&'a k8s::Condition> {
    conditions.iter().find(|c| c.condition_type == kind)
}

fn condition_text(c: &k8s::Condition) -> Option<String> {
    match (&c.reason, &c.message) {
        (Some(r), Some(m)) if !m.is_empty() => Some(format!("{}: {}", r, m)),
        (Some(r), _) => Some(r.clone()),
        (None, Some(m)) => Some(m.clone()),
        (None, None) => None,
    }
}

pub fn operator_status(op: &k8s::ClusterOperator) -> OperatorStatus {
    let conds = &op.status.conditions;
    let available = condition(conds, "Available");
    let degraded = condition(conds, "Degraded").filter(|c| c.status == "True");

    let (health, reason) = match (available, degraded) {
        (Some(a), _) if a.status == "False" => (Health::Unavailable, condition_text(a)),
        (_, Some(d)) => (Health::Degraded, condition_text(d)),
        (Some(a), None) if a.status == "True" => (Health::Healthy, None),
        (Some(a), None) => (Health::Unknown, condition_text(a)),
        (None, None) => (Health::Unknown, Some("no status conditions".to_string())),
    };

    let version = op
        .status
        .versions
        .iter()
        .find(|v| v.name == "operator")
        .map(|v| v.version.clone());

    OperatorStatus {
        name: op.metadata.name.clone(),
        health,
        reason,
        version,
    }
}

pub fn node_status(node: &k8s::Node) -> NodeStatus {
    let conds = &node.status.conditions;
    let pressure: Vec<&str> = conds
        .iter()
        .filter(|c| c.condition_type.ends_with("Pressure") && c.status == "True")
        .map(|c| c.condition_type.as_str())
        .collect();

    let (health, reason) = match condition(conds, "Ready") {
        Some(r) if r.status == "True" && pressure.is_empty() => (Health::Healthy, None),
        Some(r) if r.status == "True" => (Health::Degraded, Some(pressure.join(", "))),
        Some(r) if r.status == "False" => (Health::Unavailable, condition_text(r)),
        Some(r) => (Health::Unknown, condition_text(r)),
        None => (Health::Unknown, Some("no Ready condition".to_string())),
    };

    let roles = node
        .metadata
        .labels
        .as_ref()
        .map(|labels| {
            let mut roles: Vec<String> = labels
                .keys()
                .filter_map(|k| k.strip_prefix("node-role.kubernetes.io/"))
                .map(str::to_string)
                .collect();
            roles.sort();
            roles
        })
        .unwrap_or_default();

    NodeStatus {
        name: node.metadata.name.clone(),
        health,
        reason,
        roles,
    }
}

fn node_usage(node: &k8s::Node) -> Option<NodeUsage> {
    let pct = |key: &str, parse: fn(&str) -> Option<f64>| {
        let cap = parse(node.status.capacity.get(key)?.as_str())?;
        let alloc = parse(node.status.allocatable.get(key)?.as_str())?;
        reserved_percent(cap, alloc)
    };
    let usage = NodeUsage {
        cpu_percent: pct("cpu", parse_cpu),
        memory_percent: pct("memory", parse_memory),
    };
    if usage.cpu_percent.is_none() && usage.memory_percent.is_none() {
        None
    } else {
        Some(usage)
    }
}

pub fn pod_status(pod: &k8s::Pod) -> PodStatus {
    let st = &pod.status;
    let restarts = st
        .container_statuses
        .iter()
        .map(|c| c.restart_count)
        .max()
        .unwrap_or(0);
    let waiting = st
        .container_statuses
        .iter()
        .find_map(|c| c.state.waiting.as_ref())
        .map(|w| w.reason.clone())
        .filter(|r| !r.is_empty());
    let all_ready = st.container_statuses.iter().all(|c| c.ready);

    let health = match st.phase.as_str() {
        "Succeeded" => Health::Healthy,
        "Running" if all_ready && waiting.is_none() => Health::Healthy,
        "Running" | "Pending" => Health::Degraded,
        "Failed" => Health::Unavailable,
        _ => Health::Unknown,
    };

    let reason = if health.is_problem() {
        let base = waiting
            .or_else(|| st.reason.clone())
            .or_else(|| {
                st.container_statuses
                    .iter()
                    .find_map(|c| c.state.terminated.as_ref())
                    .map(|t| format!("{} (exit {})", t.reason, t.exit_code))
            })
            .unwrap_or_else(|| st.phase.clone());
        if restarts > 0 {
            Some(format!("{} ({} restarts)", base, restarts))
        } else {
            Some(base)
        }
    } else {
        None
    };

    PodStatus {
        namespace: pod.metadata.namespace.clone(),
        name: pod.metadata.name.clone(),
        health,
        reason,
        phase: st.phase.clone(),
        restarts,
        node: pod.spec.node_name.clone(),
    }
}
