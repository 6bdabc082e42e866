use std::collections::BTreeMap;

use crate::config::AlertLimits;
use crate::models::snapshot::{ClusterSnapshot, Detail, Health, ProblemKey};

/// Resource alarms open for `current`. An alarm opens when a figure rises
/// above its open level and stays open until the figure drops to its close
/// level or below, so a value between the two keeps whatever state the
/// previous snapshot had.
pub fn evaluate(
    previous: Option<&ClusterSnapshot>,
    current: &ClusterSnapshot,
    limits: &AlertLimits,
) -> BTreeMap<ProblemKey, Detail> {
    let previous = previous.filter(|p| p.cluster_id == current.cluster_id);
    let mut out = BTreeMap::new();
    for (node, usage) in &current.metrics.nodes {
        let figures = [
            ("cpu", usage.cpu_percent, limits.cpu_open, limits.cpu_close),
            ("memory", usage.memory_percent, limits.memory_open, limits.memory_close),
        ];
        for (resource, value, open, close) in figures {
            let Some(value) = value else { continue };
            let key = ProblemKey::metric(&current.cluster_id, node, resource);
            let was_open = previous.is_some_and(|p| p.alarms.contains_key(&key));
            if value > open || (was_open && value > close) {
                let reason = format!("{} at {:.1}%, opens above {}%, closes at {}%", resource, value, open, close);
                out.insert(key, Detail::new(Health::Degraded, Some(reason)));
            }
        }
    }
    out
}
