use chrono::{DateTime, Utc};
use std::fmt::Write;

use super::action::{data, View};
use crate::config::Thresholds;
use crate::error::FetchError;
use crate::helpers::{capped_lines, human_time, level_marker};
use crate::models::snapshot::{ClusterId, ClusterSnapshot, Health, PodStatus};
use crate::monitor::report::{headline, Document};
use crate::transport::{Button, Keyboard, MAX_BUTTON_DATA};

const RUNNING_SHOWN: usize = 10;
const TROUBLED_SHOWN: usize = 5;
const OTHER_SHOWN: usize = 3;
const PROBLEMS_SHOWN: usize = 5;
const NAMESPACE_BUTTONS: usize = 30;
const LIST_SHOWN: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub buttons: Keyboard,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_buttons(mut self, buttons: Keyboard) -> Self {
        self.buttons = buttons;
        self
    }
}

fn nav_row() -> Vec<Button> {
    vec![
        Button::new("🔙 Back", data::BACK),
        Button::new("🏠 Menu", data::MENU),
    ]
}

pub fn main_menu() -> Reply {
    let mut rows: Keyboard = View::MENU
        .chunks(2)
        .map(|pair| pair.iter().map(|v| Button::new(v.label(), data::open(*v))).collect())
        .collect();
    rows.push(vec![Button::new("❓ Help", data::HELP)]);
    Reply::text("🤖 Cluster monitor\n\nChoose what to look at:").with_buttons(rows)
}

pub fn help() -> Reply {
    Reply::text(
        "Commands:\n\
         /status [cluster] - health of every cluster, or one\n\
         /report [cluster] - generate and save a full report\n\
         /operators [cluster] - cluster operators\n\
         /nodes [cluster] - node readiness\n\
         /namespaces [cluster] - namespaces with pods\n\
         /namespace [cluster] [name] - one namespace\n\
         /pods [cluster] [namespace] - pods in a namespace\n\
         /metrics [cluster] - reserved CPU and memory per node\n\
         /menu - interactive menu\n\
         /ping - check the bot is alive\n\n\
         Leave out the cluster to pick it from a list.",
    )
    .with_buttons(vec![vec![Button::new("🏠 Menu", data::MENU)]])
}

pub fn pong(now: DateTime<Utc>) -> Reply {
    Reply::text(format!("🏓 Pong! {}", now.format("%H:%M:%S UTC")))
}

pub fn hint(text: &str) -> Reply {
    Reply::text(format!("🤔 {}", text)).with_buttons(vec![vec![Button::new("🏠 Menu", data::MENU)]])
}

pub fn cluster_prompt(view: View, clusters: &[ClusterId]) -> Reply {
    let mut rows: Keyboard = clusters
        .iter()
        .map(|c| vec![Button::new(format!("🏠 {}", c), data::cluster(c))])
        .collect();
    rows.push(nav_row());
    Reply::text(format!("{}\n\nWhich cluster?", view.label())).with_buttons(rows)
}

/// Namespaces whose button payload would exceed the provider limit get no
/// button; the user types those names instead.
pub fn namespace_prompt(cluster: &str, view: View, snap: &ClusterSnapshot) -> Reply {
    let names: Vec<&str> = snap
        .namespaces
        .values()
        .filter(|ns| ns.pods_total > 0)
        .map(|ns| ns.name.as_str())
        .collect();
    let buttons: Vec<Button> = names
        .iter()
        .map(|n| Button::new(format!("📁 {}", n), data::namespace(n)))
        .filter(|b| b.data.len() <= MAX_BUTTON_DATA)
        .take(NAMESPACE_BUTTONS)
        .collect();
    let shown = buttons.len();
    let mut rows: Keyboard = buttons.chunks(2).map(<[Button]>::to_vec).collect();
    rows.push(nav_row());

    let mut text = format!("{} on {}\n\nChoose a namespace", view.label(), cluster);
    if names.len() > shown {
        let _ = write!(text, " ({} shown of {})", shown, names.len());
    }
    text.push_str(" or type its name.");
    Reply::text(text).with_buttons(rows)
}

pub fn detail(cluster: &str, view: View) -> Reply {
    Reply::text(format!("🏠 {} · {}", cluster, view.label())).with_buttons(detail_keyboard(cluster, view))
}

/// Buttons shown under a cluster view: sibling views of the same cluster,
/// the namespace picker when it applies, and navigation.
pub fn detail_keyboard(cluster: &str, view: View) -> Keyboard {
    let siblings: Vec<Button> = [View::Status, View::Operators, View::Nodes, View::Metrics]
        .into_iter()
        .filter(|v| *v != view)
        .map(|v| Button::new(v.label(), data::open_for(v, cluster)))
        .collect();
    let mut rows = vec![siblings];
    if view.needs_namespace() {
        rows.push(vec![Button::new("📁 Another namespace", data::PICK_NAMESPACE)]);
    }
    rows.push(nav_row());
    rows
}

pub fn unreachable(cluster: &str) -> Reply {
    Reply::text(format!(
        "⚠️ Could not reach cluster {} right now. Try again in a moment.",
        cluster
    ))
}

/// One block per cluster; failed fetches show up as unreachable.
pub fn status(entries: &[(ClusterId, Result<ClusterSnapshot, FetchError>)], now: DateTime<Utc>) -> Reply {
    let mut out = String::from("📊 Cluster status\n");
    for (cluster, result) in entries {
        out.push('\n');
        match result {
            Ok(snap) => out.push_str(&status_block(snap, now)),
            Err(_) => {
                let _ = writeln!(out, "❓ {}: unreachable", cluster);
            }
        }
    }
    Reply::text(out.trim_end().to_string())
}

fn status_block(snap: &ClusterSnapshot, now: DateTime<Utc>) -> String {
    let health = snap.worst_health();
    let count = |phase: &str| snap.pods.values().filter(|p| p.phase == phase).count();
    let mut out = format!("{} {}: {}\n", health.marker(), snap.cluster_id, health);
    let _ = writeln!(out, "⚙️ Operators OK: {}/{}", snap.operators_ok(), snap.operators.len());
    let _ = writeln!(out, "🖥️ Nodes ready: {}/{}", snap.nodes_ready(), snap.nodes.len());
    let _ = writeln!(
        out,
        "🐳 Pods: {} ({} running, {} pending, {} failed)",
        snap.pods.len(),
        count("Running"),
        count("Pending"),
        count("Failed")
    );
    let problems = snap.problems();
    if !problems.is_empty() {
        let _ = writeln!(out, "🚨 Problems: {}", problems.len());
        out.push_str(&capped_lines(
            problems.iter().map(|(k, d)| format!("{}: {}", k, d)),
            PROBLEMS_SHOWN,
            "  • ",
        ));
    }
    let _ = writeln!(out, "🕐 {}", human_time(Some(snap.captured_at), now));
    out
}

pub fn operators(snap: &ClusterSnapshot) -> Reply {
    let mut out = format!(
        "⚙️ Operators on {} ({}/{} OK)\n\n",
        snap.cluster_id,
        snap.operators_ok(),
        snap.operators.len()
    );
    if snap.operators.is_empty() {
        out.push_str("No cluster operators reported.");
    }
    let lines = snap.operators.values().map(|op| {
        let mut line = format!("{} {}", op.health.marker(), op.name);
        if let Some(v) = &op.version {
            let _ = write!(line, " {}", v);
        }
        if let Some(r) = op.reason.as_deref().filter(|_| op.health.is_problem()) {
            let _ = write!(line, " ({})", r);
        }
        line
    });
    out.push_str(&capped_lines(lines, LIST_SHOWN, ""));
    Reply::text(out.trim_end().to_string())
}

pub fn nodes(snap: &ClusterSnapshot) -> Reply {
    let mut out = format!(
        "🖥️ Nodes on {} ({}/{} ready)\n\n",
        snap.cluster_id,
        snap.nodes_ready(),
        snap.nodes.len()
    );
    let lines = snap.nodes.values().map(|node| {
        let mut line = format!("{} {}", node.health.marker(), node.name);
        if !node.roles.is_empty() {
            let _ = write!(line, " [{}]", node.roles.join(", "));
        }
        if let Some(r) = node.reason.as_deref().filter(|_| node.health.is_problem()) {
            let _ = write!(line, " ({})", r);
        }
        line
    });
    out.push_str(&capped_lines(lines, LIST_SHOWN, ""));
    Reply::text(out.trim_end().to_string())
}

pub fn namespaces(snap: &ClusterSnapshot) -> Reply {
    let populated: Vec<_> = snap.namespaces.values().filter(|ns| ns.pods_total > 0).collect();
    let mut out = format!(
        "📁 Namespaces on {} ({} with pods, {} total)\n\n",
        snap.cluster_id,
        populated.len(),
        snap.namespaces.len()
    );
    let lines = populated.iter().map(|ns| {
        format!(
            "{} {}: {} pods ({} running, {} pending, {} failed)",
            ns.health().marker(),
            ns.name,
            ns.pods_total,
            ns.pods_running,
            ns.pods_pending,
            ns.pods_failed
        )
    });
    out.push_str(&capped_lines(lines, LIST_SHOWN, ""));
    Reply::text(out.trim_end().to_string())
}

pub fn namespace(snap: &ClusterSnapshot, name: &str) -> Reply {
    let Some(ns) = snap.namespaces.get(name) else {
        return Reply::text(format!("❌ Namespace {:?} not found on {}", name, snap.cluster_id));
    };
    let mut out = format!("📁 {} on {}\n\n", ns.name, snap.cluster_id);
    let _ = writeln!(out, "{} Phase: {}", ns.health().marker(), ns.phase);
    let _ = writeln!(
        out,
        "🐳 Pods: {} ({} running, {} pending, {} failed, {} succeeded)",
        ns.pods_total, ns.pods_running, ns.pods_pending, ns.pods_failed, ns.pods_succeeded
    );
    let _ = writeln!(out, "🔌 Services: {}", ns.services);
    let _ = writeln!(out, "🚀 Deployments: {}", ns.deployments);

    let troubled: Vec<String> = snap
        .pods_in(name)
        .filter(|p| p.health.is_problem())
        .map(pod_line)
        .collect();
    if !troubled.is_empty() {
        out.push_str("\n🚨 Pods with problems:\n");
        out.push_str(&capped_lines(troubled, TROUBLED_SHOWN, "  "));
    }
    Reply::text(out.trim_end().to_string())
}

pub fn pods(snap: &ClusterSnapshot, namespace: &str) -> Reply {
    let pods: Vec<&PodStatus> = snap.pods_in(namespace).collect();
    if pods.is_empty() {
        let text = if snap.namespaces.contains_key(namespace) {
            format!("📁 Namespace {:?} on {} has no pods", namespace, snap.cluster_id)
        } else {
            format!("❌ Namespace {:?} not found on {}", namespace, snap.cluster_id)
        };
        return Reply::text(text);
    }

    let mut out = format!("🐳 Pods in {} on {} ({})\n", namespace, snap.cluster_id, pods.len());
    let groups = [
        ("✅ Running", RUNNING_SHOWN),
        ("❌ Failed", TROUBLED_SHOWN),
        ("⏳ Pending", TROUBLED_SHOWN),
        ("❔ Other", OTHER_SHOWN),
    ];
    for (idx, (title, cap)) in groups.into_iter().enumerate() {
        let lines: Vec<String> = pods
            .iter()
            .copied()
            .filter(|p| phase_group(p) == idx)
            .map(pod_line)
            .collect();
        if lines.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{} ({})", title, lines.len());
        out.push_str(&capped_lines(lines, cap, "  "));
    }
    Reply::text(out.trim_end().to_string())
}

fn phase_group(p: &PodStatus) -> usize {
    match p.phase.as_str() {
        "Running" => 0,
        "Failed" => 1,
        "Pending" => 2,
        _ => 3,
    }
}

fn pod_line(p: &PodStatus) -> String {
    let mut line = format!("{} {}", p.health.marker(), p.name);
    if p.restarts > 0 {
        let _ = write!(line, " ↻{}", p.restarts);
    }
    if p.health.is_problem() {
        if let Some(r) = &p.reason {
            let _ = write!(line, " ({})", r);
        }
    }
    line
}

pub fn metrics(snap: &ClusterSnapshot, t: &Thresholds) -> Reply {
    if snap.metrics.is_empty() {
        return Reply::text(format!("📈 No resource figures available for {}", snap.cluster_id));
    }
    let mut out = format!("📈 Reserved resources on {}\n\n", snap.cluster_id);
    let pct = |v: Option<f64>, w: f64, c: f64| match v {
        Some(v) => format!("{} {:.1}%", level_marker(v, w, c), v),
        None => "n/a".to_string(),
    };
    for (node, usage) in &snap.metrics.nodes {
        let _ = writeln!(
            out,
            "{}: CPU {}, memory {}",
            node,
            pct(usage.cpu_percent, t.cpu_warning, t.cpu_critical),
            pct(usage.memory_percent, t.memory_warning, t.memory_critical)
        );
    }
    let _ = write!(
        out,
        "\nAverage: CPU {}, memory {}",
        pct(snap.metrics.average_cpu(), t.cpu_warning, t.cpu_critical),
        pct(snap.metrics.average_memory(), t.memory_warning, t.memory_critical)
    );
    Reply::text(out)
}

pub fn report_saved(doc: &Document, location: Option<&str>, health: Health, problems: usize) -> Reply {
    let mut out = headline(doc, health);
    let _ = write!(out, "\nOpen problems: {}", problems);
    match location {
        Some(l) => {
            let _ = write!(out, "\nSaved to {}", l);
        }
        None => out.push_str("\n⚠️ The report could not be saved."),
    }
    Reply::text(out)
}
