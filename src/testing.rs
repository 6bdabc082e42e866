//! Fakes shared by unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use crate::clients::HealthSource;
use crate::error::{FetchError, ReportError, TransportError};
use crate::models::snapshot::{
    ClusterSnapshot, Health, NamespaceSummary, NodeStatus, OperatorStatus, PodStatus,
};
use crate::monitor::report::{Document, ReportSink};
use crate::transport::{Button, Inbound, Transport};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Builds snapshots tersely. Pod phases follow health (Healthy is Running,
/// Degraded is Pending, Unavailable is Failed) and namespace summaries are
/// derived from the pods.
pub struct SnapshotBuilder {
    snap: ClusterSnapshot,
}

impl SnapshotBuilder {
    pub fn new(cluster: &str) -> Self {
        Self {
            snap: ClusterSnapshot::empty(cluster, base_time()),
        }
    }

    pub fn at_minute(mut self, minute: i64) -> Self {
        self.snap.captured_at = base_time() + ChronoDuration::minutes(minute);
        self
    }

    pub fn operator(mut self, name: &str, health: Health) -> Self {
        self.snap.operators.insert(
            name.to_string(),
            OperatorStatus {
                name: name.to_string(),
                health,
                reason: None,
                version: Some("4.14.0".into()),
            },
        );
        self
    }

    pub fn node(mut self, name: &str, health: Health) -> Self {
        self.snap.nodes.insert(
            name.to_string(),
            NodeStatus {
                name: name.to_string(),
                health,
                reason: None,
                roles: vec!["worker".into()],
            },
        );
        self
    }

    pub fn pod(self, namespace: &str, name: &str, health: Health) -> Self {
        self.insert_pod(namespace, name, health, None)
    }

    pub fn pod_with_reason(self, namespace: &str, name: &str, health: Health, reason: &str) -> Self {
        self.insert_pod(namespace, name, health, Some(reason.to_string()))
    }

    fn insert_pod(mut self, namespace: &str, name: &str, health: Health, reason: Option<String>) -> Self {
        let phase = match health {
            Health::Healthy => "Running",
            Health::Degraded => "Pending",
            Health::Unavailable => "Failed",
            Health::Unknown => "Unknown",
        };
        self.snap.pods.insert(
            (namespace.to_string(), name.to_string()),
            PodStatus {
                namespace: namespace.to_string(),
                name: name.to_string(),
                health,
                reason,
                phase: phase.to_string(),
                restarts: 0,
                node: "worker-0".into(),
            },
        );
        self
    }

    pub fn build(mut self) -> ClusterSnapshot {
        for pod in self.snap.pods.values() {
            let ns = self
                .snap
                .namespaces
                .entry(pod.namespace.clone())
                .or_insert_with(|| NamespaceSummary {
                    name: pod.namespace.clone(),
                    phase: "Active".into(),
                    ..Default::default()
                });
            ns.pods_total += 1;
            match pod.phase.as_str() {
                "Running" => ns.pods_running += 1,
                "Pending" => ns.pods_pending += 1,
                "Failed" => ns.pods_failed += 1,
                "Succeeded" => ns.pods_succeeded += 1,
                _ => {}
            }
        }
        self.snap
    }
}

/// Returns scripted results in order, repeating the last one forever.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<ClusterSnapshot, FetchError>>>,
    delay: Option<Duration>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<ClusterSnapshot, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn next(&self) -> Result<ClusterSnapshot, FetchError> {
        let mut script = self.script.lock();
        match script.len() {
            0 => Err(FetchError::Unreachable("nothing scripted".into())),
            1 => script[0].clone(),
            _ => script.pop_front().unwrap(),
        }
    }
}

#[async_trait]
impl HealthSource for ScriptedSource {
    async fn fetch_snapshot(&self) -> Result<ClusterSnapshot, FetchError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.next()
    }
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat: String,
    pub text: String,
    pub buttons: Vec<Vec<Button>>,
}

/// Records delivered messages; failures can be queued up front.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    failures: Mutex<VecDeque<TransportError>>,
    rejected_chats: Mutex<HashSet<String>>,
    inbound: Mutex<VecDeque<Vec<Inbound>>>,
    delay: Option<Duration>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The next sends fail with these errors, in order.
    pub fn fail_next(&self, errors: Vec<TransportError>) {
        self.failures.lock().extend(errors);
    }

    pub fn reject_chat(&self, chat: &str) {
        self.rejected_chats.lock().insert(chat.to_string());
    }

    pub fn push_inbound(&self, batch: Vec<Inbound>) {
        self.inbound.lock().push_back(batch);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send_message(
        &self,
        chat: &str,
        text: &str,
        buttons: &[Vec<Button>],
    ) -> Result<(), TransportError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.rejected_chats.lock().contains(chat) {
            return Err(TransportError::Rejected("chat not found".into()));
        }
        if let Some(e) = self.failures.lock().pop_front() {
            return Err(e);
        }
        self.sent.lock().push(SentMessage {
            chat: chat.to_string(),
            text: text.to_string(),
            buttons: buttons.to_vec(),
        });
        Ok(())
    }

    async fn receive_actions(&self) -> Result<Vec<Inbound>, TransportError> {
        let next = self.inbound.lock().pop_front();
        match next {
            Some(batch) => Ok(batch),
            None => std::future::pending().await,
        }
    }
}

/// Keeps persisted reports in memory.
#[derive(Default)]
pub struct MemorySink {
    saved: Mutex<Vec<Document>>,
}

impl MemorySink {
    pub fn saved(&self) -> Vec<Document> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn persist(&self, doc: &Document) -> Result<String, ReportError> {
        self.saved.lock().push(doc.clone());
        Ok(format!("memory://{}", doc.file_name()))
    }
}
