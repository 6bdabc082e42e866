use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

use super::alarms;
use super::diff::{diff, Delta};
use crate::config::AlertLimits;
use crate::models::snapshot::{ClusterId, ClusterSnapshot};

type Slot = Arc<Mutex<Option<Arc<ClusterSnapshot>>>>;

/// Latest snapshot per cluster. Each cluster has its own lock; the outer map
/// lock is only held to find or create a slot.
#[derive(Default)]
pub struct SnapshotStore {
    slots: RwLock<HashMap<ClusterId, Slot>>,
    limits: AlertLimits,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: AlertLimits) -> Self {
        Self {
            slots: RwLock::default(),
            limits,
        }
    }

    fn slot(&self, cluster: &str) -> Slot {
        if let Some(slot) = self.slots.read().get(cluster) {
            return slot.clone();
        }
        self.slots
            .write()
            .entry(cluster.to_string())
            .or_default()
            .clone()
    }

    /// Raises resource alarms on `current`, diffs it against the stored
    /// snapshot of the same cluster and makes it the new baseline, as one
    /// step under that cluster's lock.
    pub fn advance(&self, mut current: ClusterSnapshot) -> Delta {
        let slot = self.slot(&current.cluster_id);
        let mut guard = slot.lock();
        current.alarms = alarms::evaluate(guard.as_deref(), &current, &self.limits);
        let delta = diff(guard.as_deref(), &current);
        *guard = Some(Arc::new(current));
        delta
    }

    pub fn latest(&self, cluster: &str) -> Option<Arc<ClusterSnapshot>> {
        let slot = self.slots.read().get(cluster)?.clone();
        let snap = slot.lock().clone();
        snap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::snapshot::{Health, NodeUsage, ProblemKey};
    use crate::testing::SnapshotBuilder;

    #[test]
    fn advance_replaces_baseline() {
        let store = SnapshotStore::new();
        let d1 = store.advance(SnapshotBuilder::new("c1").at_minute(0).pod("ns", "p1", Health::Unavailable).build());
        assert_eq!(d1.new_problems.len(), 1);

        let d2 = store.advance(SnapshotBuilder::new("c1").at_minute(5).pod("ns", "p1", Health::Unavailable).build());
        assert!(d2.is_quiet());
        assert!(d2.still_open.contains(&ProblemKey::pod("c1", "ns", "p1")));

        let latest = store.latest("c1").unwrap();
        assert_eq!(latest.captured_at, SnapshotBuilder::new("c1").at_minute(5).build().captured_at);
    }

    #[test]
    fn clusters_are_independent() {
        let store = SnapshotStore::new();
        store.advance(SnapshotBuilder::new("c1").pod("ns", "p", Health::Degraded).build());
        let d = store.advance(SnapshotBuilder::new("c2").pod("ns", "p", Health::Degraded).build());
        assert_eq!(d.new_problems.len(), 1);
        assert!(store.latest("c3").is_none());
    }

    #[test]
    fn resource_alarm_opens_once_and_resolves_below_close_level() {
        let store = SnapshotStore::with_limits(AlertLimits::default());
        let at = |minute: i64, cpu: f64| {
            let mut snap = SnapshotBuilder::new("c1").at_minute(minute).build();
            snap.metrics.nodes.insert(
                "worker-1".into(),
                NodeUsage {
                    cpu_percent: Some(cpu),
                    memory_percent: None,
                },
            );
            snap
        };
        let key = ProblemKey::metric("c1", "worker-1", "cpu");

        let d1 = store.advance(at(0, 88.0));
        assert!(d1.new_problems.contains_key(&key));
        let d2 = store.advance(at(5, 75.0));
        assert!(d2.is_quiet());
        assert!(d2.still_open.contains(&key));
        assert!(store.latest("c1").unwrap().alarms.contains_key(&key));
        let d3 = store.advance(at(10, 65.0));
        assert!(d3.resolved_problems.contains_key(&key));
    }
}
