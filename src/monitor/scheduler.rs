use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use super::diff::Delta;
use super::dispatch::Dispatcher;
use super::report::{render, ReportSink};
use super::store::SnapshotStore;
use crate::clients::registry::ClusterRegistry;
use crate::config::Thresholds;
use crate::error::FetchError;
use crate::models::snapshot::{ClusterId, Detail, Health, ProblemKey};

/// Counts consecutive failed fetches and decides when the connectivity
/// problem opens and closes. It opens at most once per outage.
#[derive(Debug)]
pub struct ConnectivityTracker {
    threshold: u32,
    consecutive_failures: u32,
    alerted: Option<Detail>,
}

impl ConnectivityTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
            alerted: None,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns the problem detail on the failure that reaches the threshold.
    pub fn record_failure(&mut self, err: &FetchError) -> Option<Detail> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.alerted.is_some() || self.consecutive_failures < self.threshold {
            return None;
        }
        let detail = Detail::new(
            Health::Unavailable,
            Some(format!(
                "{} consecutive failed fetches, last: {}",
                self.consecutive_failures, err
            )),
        );
        self.alerted = Some(detail.clone());
        Some(detail)
    }

    /// Returns the open problem's detail when a success ends an alerted outage.
    pub fn record_success(&mut self) -> Option<Detail> {
        self.consecutive_failures = 0;
        self.alerted.take()
    }
}

/// Strictly sequential fetch, diff, store and dispatch cycles for one cluster.
pub struct PollLoop {
    cluster: ClusterId,
    registry: Arc<ClusterRegistry>,
    store: Arc<SnapshotStore>,
    dispatcher: Arc<Dispatcher>,
    connectivity: ConnectivityTracker,
}

impl PollLoop {
    pub fn new(
        cluster: ClusterId,
        registry: Arc<ClusterRegistry>,
        store: Arc<SnapshotStore>,
        dispatcher: Arc<Dispatcher>,
        failure_threshold: u32,
    ) -> Self {
        Self {
            cluster,
            registry,
            store,
            dispatcher,
            connectivity: ConnectivityTracker::new(failure_threshold),
        }
    }

    /// Runs one cycle and returns the delta that was handed to the dispatcher.
    /// A failed fetch leaves the stored baseline untouched.
    pub async fn run_cycle(&mut self) -> Delta {
        let delta = match self.registry.fetch(&self.cluster).await {
            Ok(snap) => {
                let mut delta = self.store.advance(snap);
                if let Some(detail) = self.connectivity.record_success() {
                    info!(cluster = %self.cluster, "cluster reachable again");
                    delta
                        .resolved_problems
                        .insert(ProblemKey::connectivity(&self.cluster), detail);
                }
                delta
            }
            Err(e) => {
                warn!(
                    cluster = %self.cluster,
                    kind = e.kind(),
                    failures = self.connectivity.consecutive_failures() + 1,
                    error = %e,
                    "fetch failed, skipping cycle"
                );
                let mut delta = Delta::empty(self.cluster.clone());
                if let Some(detail) = self.connectivity.record_failure(&e) {
                    delta
                        .new_problems
                        .insert(ProblemKey::connectivity(&self.cluster), detail);
                }
                delta
            }
        };

        if !delta.is_quiet() {
            info!(
                cluster = %self.cluster,
                new = delta.new_problems.len(),
                resolved = delta.resolved_problems.len(),
                changed = delta.changed.len(),
                still_open = delta.still_open.len(),
                "health changed"
            );
        }
        let result = self.dispatcher.dispatch(&self.cluster, &delta).await;
        if result.messages_dropped > 0 {
            warn!(
                cluster = %self.cluster,
                dropped = result.messages_dropped,
                "some notifications were not delivered"
            );
        }
        delta
    }

    pub async fn run(mut self, every: Duration, mut shutdown: watch::Receiver<()>) {
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.changed() => {
                    info!(cluster = %self.cluster, "poll loop shutting down");
                    return;
                }
            }
        }
    }
}

/// Renders and persists a report from a fresh fetch on its own cadence.
pub struct ReportLoop {
    cluster: ClusterId,
    registry: Arc<ClusterRegistry>,
    sink: Arc<dyn ReportSink>,
    thresholds: Thresholds,
}

impl ReportLoop {
    pub fn new(
        cluster: ClusterId,
        registry: Arc<ClusterRegistry>,
        sink: Arc<dyn ReportSink>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            cluster,
            registry,
            sink,
            thresholds,
        }
    }

    /// Returns where the report was stored, or `None` if it could not be
    /// produced this time.
    pub async fn run_once(&self) -> Option<String> {
        let snap = match self.registry.fetch(&self.cluster).await {
            Ok(s) => s,
            Err(e) => {
                warn!(cluster = %self.cluster, kind = e.kind(), error = %e, "report skipped");
                return None;
            }
        };
        let doc = render(&snap, &self.thresholds);
        match self.sink.persist(&doc).await {
            Ok(location) => Some(location),
            Err(e) => {
                warn!(cluster = %self.cluster, error = %e, "report not saved");
                None
            }
        }
    }

    pub async fn run(self, every: Duration, mut shutdown: watch::Receiver<()>) {
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first report after one full interval; the poll loop covers startup
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.changed() => {
                    info!(cluster = %self.cluster, "report loop shutting down");
                    return;
                }
            }
        }
    }
}

/// Waits up to `grace` for background loops to return once shutdown has been
/// signalled, so cycles already under way finish their dispatch. Whatever is
/// still running afterwards is aborted; returns how many tasks that was.
pub async fn drain(mut tasks: JoinSet<()>, grace: Duration) -> usize {
    let waited = time::timeout(grace, async {
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    error!(error = %e, "background task panicked");
                }
            }
        }
    })
    .await;

    if waited.is_ok() {
        return 0;
    }
    let left = tasks.len();
    warn!(left, ?grace, "background tasks did not stop in time, aborting");
    tasks.abort_all();
    left
}
