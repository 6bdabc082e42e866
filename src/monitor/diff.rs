use std::collections::{BTreeMap, BTreeSet};

use crate::models::snapshot::{ClusterId, ClusterSnapshot, Detail, Health, ProblemKey};

/// Classified difference between two consecutive snapshots of one cluster.
/// Every map and set iterates grouped by entity kind, then by identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub cluster_id: ClusterId,
    pub new_problems: BTreeMap<ProblemKey, Detail>,
    pub resolved_problems: BTreeMap<ProblemKey, Detail>,
    pub still_open: BTreeSet<ProblemKey>,
    /// Open problems whose health moved between two unhealthy states.
    /// Informational only; every key here is also in `still_open`.
    pub changed: BTreeMap<ProblemKey, Change>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub from: Health,
    pub to: Detail,
}

impl Delta {
    pub fn empty(cluster_id: impl Into<ClusterId>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            ..Default::default()
        }
    }

    /// True when the cycle warrants no message at all.
    pub fn is_quiet(&self) -> bool {
        self.new_problems.is_empty() && self.resolved_problems.is_empty() && self.changed.is_empty()
    }
}

/// Compares `current` against the previous snapshot of the same cluster.
///
/// Without a previous snapshot every problem in `current` is new and nothing
/// is resolved. A problem whose entity disappeared from `current` counts as
/// resolved, carrying its last known detail. Only the healthy/unhealthy
/// boundary decides new and resolved: a change of reason or of unhealthy
/// state keeps the problem in `still_open`, and a change of unhealthy state
/// is also recorded in `changed`. A previous snapshot of another cluster is
/// never compared and counts as absent.
pub fn diff(previous: Option<&ClusterSnapshot>, current: &ClusterSnapshot) -> Delta {
    let previous = previous.filter(|p| p.cluster_id == current.cluster_id);

    let mut delta = Delta::empty(current.cluster_id.clone());
    let current_problems = current.problems();
    let previous_problems = previous.map(ClusterSnapshot::problems).unwrap_or_default();

    for (key, detail) in current_problems.iter() {
        if let Some(before) = previous_problems.get(key) {
            delta.still_open.insert(key.clone());
            if before.health != detail.health {
                delta.changed.insert(
                    key.clone(),
                    Change {
                        from: before.health,
                        to: detail.clone(),
                    },
                );
            }
        } else {
            delta.new_problems.insert(key.clone(), detail.clone());
        }
    }
    for (key, detail) in previous_problems {
        if !current_problems.contains_key(&key) {
            delta.resolved_problems.insert(key, detail);
        }
    }
    delta
}
