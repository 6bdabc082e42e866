use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use super::diff::diff;
use crate::config::Thresholds;
use crate::error::ReportError;
use crate::helpers::level_marker;
use crate::models::snapshot::{ClusterId, ClusterSnapshot, Health};

/// Rendered report, identified by cluster and capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub cluster_id: ClusterId,
    pub timestamp: DateTime<Utc>,
    pub markdown: String,
}

impl Document {
    pub fn file_name(&self) -> String {
        format!("{}_{}.md", self.cluster_id, self.timestamp.format("%Y%m%d_%H%M%S"))
    }
}

/// Renders the full state of a snapshot. Output depends only on the arguments.
pub fn render(snap: &ClusterSnapshot, thresholds: &Thresholds) -> Document {
    let mut md = String::new();
    let overall = snap.worst_health();

    let _ = writeln!(md, "# Cluster Health Report\n");
    let _ = writeln!(md, "**Cluster:** {}  ", snap.cluster_id);
    let _ = writeln!(md, "**Captured:** {}  ", snap.captured_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(md, "**Overall:** {} {}  ", overall.marker(), overall);

    if !snap.operators.is_empty() {
        md.push_str("\n## Operators\n\n| Operator | Status | Version | Reason |\n|---|---|---|---|\n");
        for op in snap.operators.values() {
            let _ = writeln!(
                md,
                "| {} | {} {} | {} | {} |",
                op.name,
                op.health.marker(),
                op.health,
                op.version.as_deref().unwrap_or("-"),
                op.reason.as_deref().unwrap_or("")
            );
        }
    }

    md.push_str("\n## Nodes\n\n| Node | Status | Roles |\n|---|---|---|\n");
    for node in snap.nodes.values() {
        let _ = writeln!(
            md,
            "| {} | {} {} | {} |",
            node.name,
            node.health.marker(),
            node.health,
            node.roles.join(", ")
        );
    }

    if !snap.metrics.is_empty() {
        md.push_str("\n## Resource Metrics\n\n| Node | Reserved CPU | Reserved Memory |\n|---|---|---|\n");
        for (name, usage) in &snap.metrics.nodes {
            let cpu = percent_cell(usage.cpu_percent, thresholds.cpu_warning, thresholds.cpu_critical);
            let mem = percent_cell(
                usage.memory_percent,
                thresholds.memory_warning,
                thresholds.memory_critical,
            );
            let _ = writeln!(md, "| {} | {} | {} |", name, cpu, mem);
        }
    }

    let count = |phase: &str| snap.pods.values().filter(|p| p.phase == phase).count();
    md.push_str("\n## Pods\n\n| Phase | Count |\n|---|---|\n");
    let _ = writeln!(md, "| Total | {} |", snap.pods.len());
    for phase in ["Running", "Pending", "Failed", "Succeeded"] {
        let _ = writeln!(md, "| {} | {} |", phase, count(phase));
    }

    let populated: Vec<_> = snap.namespaces.values().filter(|ns| ns.pods_total > 0).collect();
    if !populated.is_empty() {
        md.push_str(
            "\n## Namespaces\n\n| Namespace | Pods | Running | Pending | Failed | Services | Deployments |\n|---|---|---|---|---|---|---|\n",
        );
        for ns in populated {
            let _ = writeln!(
                md,
                "| {} | {} {} | {} | {} | {} | {} | {} |",
                ns.name,
                ns.health().marker(),
                ns.pods_total,
                ns.pods_running,
                ns.pods_pending,
                ns.pods_failed,
                ns.services,
                ns.deployments
            );
        }
    }

    let problems = diff(None, snap).new_problems;
    if problems.is_empty() {
        md.push_str("\n## Open Problems\n\nNo problems detected.\n");
    } else {
        let _ = writeln!(md, "\n## Open Problems ({})\n", problems.len());
        for (key, detail) in &problems {
            let _ = writeln!(md, "- {} {}: {}", detail.health.marker(), key, detail);
        }
    }

    md.push_str("\n---\n*Generated by cluster-sentinel*\n");

    Document {
        cluster_id: snap.cluster_id.clone(),
        timestamp: snap.captured_at,
        markdown: md,
    }
}

fn percent_cell(value: Option<f64>, warning: f64, critical: f64) -> String {
    match value {
        Some(v) => format!("{} {:.1}%", level_marker(v, warning, critical), v),
        None => "n/a".to_string(),
    }
}

/// Short status line used by the bot when a report is saved.
pub fn headline(doc: &Document, health: Health) -> String {
    format!(
        "{} Report for {} captured {}",
        health.marker(),
        doc.cluster_id,
        doc.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Stores rendered reports somewhere operators can read them.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persists the document and returns where it went.
    async fn persist(&self, doc: &Document) -> Result<String, ReportError>;
}

/// Writes one Markdown file per report and prunes old ones.
pub struct FileReportSink {
    dir: PathBuf,
    max_age: Duration,
}

impl FileReportSink {
    pub fn new(dir: impl Into<PathBuf>, max_age_days: u64) -> Self {
        Self {
            dir: dir.into(),
            max_age: Duration::from_secs(max_age_days * 24 * 3600),
        }
    }

    /// Removes `.md` files last modified before `now - max_age`. Returns how
    /// many this call removed. Sinks for several clusters share a directory,
    /// so a file that vanishes mid-scan is skipped.
    pub async fn prune(&self, now: SystemTime) -> Result<usize, ReportError> {
        let cutoff = match now.checked_sub(self.max_age) {
            Some(c) => c,
            None => return Ok(0),
        };
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(m) => m,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if modified >= cutoff {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "removed old report");
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl ReportSink for FileReportSink {
    async fn persist(&self, doc: &Document) -> Result<String, ReportError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(doc.file_name());
        tokio::fs::write(&path, doc.markdown.as_bytes()).await?;
        info!(cluster = %doc.cluster_id, path = %path.display(), "report saved");

        // the report is written at this point; prune failures are only logged
        match self.prune(SystemTime::now()).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "pruned old reports"),
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "pruning old reports failed"),
        }
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::snapshot::NodeUsage;
    use crate::testing::SnapshotBuilder;

    fn sample() -> ClusterSnapshot {
        let mut snap = SnapshotBuilder::new("prod")
            .at_minute(7)
            .operator("dns", Health::Healthy)
            .operator("ingress", Health::Degraded)
            .node("master-0", Health::Healthy)
            .pod("app", "web-1", Health::Healthy)
            .pod_with_reason("app", "web-2", Health::Degraded, "CrashLoopBackOff")
            .build();
        snap.metrics.nodes.insert(
            "master-0".into(),
            NodeUsage {
                cpu_percent: Some(85.0),
                memory_percent: Some(10.0),
            },
        );
        snap
    }

    #[test]
    fn render_is_deterministic() {
        let t = Thresholds::default();
        assert_eq!(render(&sample(), &t), render(&sample(), &t));
    }

    #[test]
    fn render_lists_open_problems_in_order() {
        let doc = render(&sample(), &Thresholds::default());
        assert_eq!(doc.cluster_id, "prod");
        let md = &doc.markdown;
        assert!(md.contains("**Cluster:** prod"));
        assert!(md.contains("## Open Problems (2)"));
        let op = md.find("operator ingress").unwrap();
        let pod = md.find("pod app/web-2: Degraded: CrashLoopBackOff").unwrap();
        assert!(op < pod);
        assert!(md.contains("| master-0 | 🔴 85.0% | 🟢 10.0% |"));
        assert!(md.contains("| app | 🟡 2 |"));
    }

    #[test]
    fn healthy_cluster_reports_no_problems() {
        let snap = SnapshotBuilder::new("c1").node("n1", Health::Healthy).build();
        let doc = render(&snap, &Thresholds::default());
        assert!(doc.markdown.contains("No problems detected."));
        assert!(!doc.markdown.contains("## Namespaces"));
    }

    #[test]
    fn file_name_uses_capture_time() {
        let doc = render(&SnapshotBuilder::new("c1").at_minute(3).build(), &Thresholds::default());
        assert_eq!(doc.file_name(), "c1_20240501_120300.md");
    }

    #[tokio::test]
    async fn sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileReportSink::new(dir.path().join("reports"), 3);
        let doc = render(&sample(), &Thresholds::default());
        let location = sink.persist(&doc).await.unwrap();
        let written = std::fs::read_to_string(&location).unwrap();
        assert_eq!(written, doc.markdown);
    }

    #[tokio::test]
    async fn prune_removes_only_old_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("c1_old.md");
        let fresh = dir.path().join("c1_new.md");
        let other = dir.path().join("notes.txt");
        for p in [&old, &fresh, &other] {
            std::fs::write(p, "x").unwrap();
        }
        let week_ago = SystemTime::now() - Duration::from_secs(7 * 24 * 3600);
        for p in [&old, &other] {
            std::fs::File::options()
                .write(true)
                .open(p)
                .unwrap()
                .set_modified(week_ago)
                .unwrap();
        }

        let sink = FileReportSink::new(dir.path(), 3);
        assert_eq!(sink.prune(SystemTime::now()).await.unwrap(), 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(other.exists());
    }

    fn stale_reports(dir: &std::path::Path, count: usize) {
        let long_ago = SystemTime::now() - Duration::from_secs(30 * 24 * 3600);
        for i in 0..count {
            let p = dir.join(format!("old_{:04}.md", i));
            std::fs::write(&p, "x").unwrap();
            std::fs::File::options()
                .write(true)
                .open(&p)
                .unwrap()
                .set_modified(long_ago)
                .unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_prunes_share_the_work() {
        let dir = tempfile::tempdir().unwrap();
        stale_reports(dir.path(), 1000);
        let a = FileReportSink::new(dir.path(), 3);
        let b = FileReportSink::new(dir.path(), 3);
        let now = SystemTime::now();
        let (ra, rb) = tokio::join!(a.prune(now), b.prune(now));
        assert_eq!(ra.unwrap() + rb.unwrap(), 1000);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_both_succeed() {
        let dir = tempfile::tempdir().unwrap();
        stale_reports(dir.path(), 1000);
        let a = FileReportSink::new(dir.path(), 3);
        let b = FileReportSink::new(dir.path(), 3);
        let doc_a = render(&SnapshotBuilder::new("c1").build(), &Thresholds::default());
        let doc_b = render(&SnapshotBuilder::new("c2").build(), &Thresholds::default());
        let (ra, rb) = tokio::join!(a.persist(&doc_a), b.persist(&doc_b));
        assert!(std::path::Path::new(&ra.unwrap()).exists());
        assert!(std::path::Path::new(&rb.unwrap()).exists());
    }
}
