use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::action::{data, Request, Router, View};
use super::navigation::{step, MenuId, Outcome};
use super::replies::{self, Reply};
use super::sessions::{SessionKey, SessionStore};
use crate::clients::registry::ClusterRegistry;
use crate::config::{user_allowed, Thresholds};
use crate::error::TransportError;
use crate::monitor::diff::diff;
use crate::monitor::dispatch::{deliver, RetryPolicy};
use crate::monitor::report::{render, ReportSink};
use crate::transport::{Button, Inbound, Transport};

const REPLY_KIND: &str = "reply";

/// Answers inbound chat actions: route, step the session, fetch fresh data,
/// reply.
pub struct BotHandler {
    registry: Arc<ClusterRegistry>,
    sink: Arc<dyn ReportSink>,
    sessions: Arc<SessionStore>,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    thresholds: Thresholds,
    authorized_users: Vec<i64>,
}

impl BotHandler {
    pub fn new(
        registry: Arc<ClusterRegistry>,
        sink: Arc<dyn ReportSink>,
        sessions: Arc<SessionStore>,
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        thresholds: Thresholds,
        authorized_users: Vec<i64>,
    ) -> Self {
        Self {
            registry,
            sink,
            sessions,
            transport,
            policy,
            thresholds,
            authorized_users,
        }
    }

    /// Handles one inbound action and returns the reply that was sent.
    pub async fn handle(&self, inbound: Inbound) -> Option<Reply> {
        if !user_allowed(&self.authorized_users, inbound.user) {
            warn!(chat = %inbound.chat, user = ?inbound.user, "ignoring unauthorized user");
            return None;
        }

        let reply = self.respond(&inbound).await;
        if let Err(e) = deliver(
            &*self.transport,
            &inbound.chat,
            &reply.text,
            &reply.buttons,
            &self.policy,
            REPLY_KIND,
        )
        .await
        {
            error!(chat = %inbound.chat, error = %e, "reply dropped");
        }
        Some(reply)
    }

    async fn respond(&self, inbound: &Inbound) -> Reply {
        let action = match Router::route(&inbound.input) {
            Ok(a) => a,
            Err(e) => {
                debug!(chat = %inbound.chat, error = %e, "unrecognized input");
                return replies::hint("I don't know that command. Send /help for the list.");
            }
        };

        let key = SessionKey {
            chat: inbound.chat.clone(),
            user: inbound.user,
        };
        let clusters = self.registry.cluster_ids();
        let (outcome, menu) = self.sessions.with_session(&key, Instant::now(), |state| {
            let outcome = step(state, action, clusters, Instant::now());
            (outcome, state.current().clone())
        });
        debug!(chat = %inbound.chat, ?outcome, "session stepped");

        match outcome {
            Outcome::Menu => replies::main_menu(),
            Outcome::Help => replies::help(),
            Outcome::Pong => replies::pong(Utc::now()),
            Outcome::Hint(text) => replies::hint(&text),
            Outcome::PromptCluster(view) => replies::cluster_prompt(view, clusters),
            Outcome::Detail { cluster, view } => replies::detail(&cluster, view),
            Outcome::PromptNamespace { cluster, view } => match self.registry.fetch(&cluster).await {
                Ok(snap) => replies::namespace_prompt(&cluster, view, &snap),
                Err(e) => {
                    warn!(cluster = %cluster, kind = e.kind(), error = %e, "namespace prompt fetch failed");
                    replies::unreachable(&cluster)
                        .with_buttons(vec![vec![Button::new("🏠 Menu", data::MENU)]])
                }
            },
            Outcome::Execute(req) => {
                let reply = self.execute(&req).await;
                let buttons = match &menu {
                    MenuId::ClusterDetail { cluster, view } => replies::detail_keyboard(cluster, *view),
                    _ => vec![vec![Button::new("🏠 Menu", data::MENU)]],
                };
                reply.with_buttons(buttons)
            }
        }
    }

    /// Runs a fully specified request against freshly fetched data.
    async fn execute(&self, req: &Request) -> Reply {
        let cluster = match (&req.cluster, self.registry.sole_cluster()) {
            (Some(c), _) => c.clone(),
            (None, Some(only)) if req.view != View::Status => only.to_string(),
            (None, _) if req.view == View::Status => return self.status_all().await,
            (None, _) => return replies::hint("Which cluster? Add its name to the command."),
        };

        let snap = match self.registry.fetch(&cluster).await {
            Ok(s) => s,
            Err(e) => {
                warn!(cluster = %cluster, kind = e.kind(), error = %e, "fetch for reply failed");
                return replies::unreachable(&cluster);
            }
        };

        match (req.view, req.namespace.as_deref()) {
            (View::Status, _) => replies::status(&[(cluster, Ok(snap))], Utc::now()),
            (View::Operators, _) => replies::operators(&snap),
            (View::Nodes, _) => replies::nodes(&snap),
            (View::Namespaces, _) => replies::namespaces(&snap),
            (View::Metrics, _) => replies::metrics(&snap, &self.thresholds),
            (View::Namespace, Some(ns)) => replies::namespace(&snap, ns),
            (View::Pods, Some(ns)) => replies::pods(&snap, ns),
            (View::Namespace | View::Pods, None) => {
                replies::hint(&format!("Which namespace? Try: {} {} <namespace>", req.view, cluster))
            }
            (View::Report, _) => {
                let doc = render(&snap, &self.thresholds);
                let location = match self.sink.persist(&doc).await {
                    Ok(l) => Some(l),
                    Err(e) => {
                        error!(cluster = %cluster, error = %e, "saving requested report failed");
                        None
                    }
                };
                let problems = diff(None, &snap).new_problems.len();
                replies::report_saved(&doc, location.as_deref(), snap.worst_health(), problems)
            }
        }
    }

    async fn status_all(&self) -> Reply {
        let mut entries = Vec::new();
        for cluster in self.registry.cluster_ids() {
            let result = self.registry.fetch(cluster).await;
            if let Err(e) = &result {
                warn!(cluster = %cluster, kind = e.kind(), error = %e, "fetch for status failed");
            }
            entries.push((cluster.clone(), result));
        }
        replies::status(&entries, Utc::now())
    }

    /// Receives until shutdown, handling each action on its own task. On
    /// shutdown, replies already being worked on are awaited.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<()>) {
        info!(transport = self.transport.name(), "bot listening");
        let mut in_flight = JoinSet::new();
        loop {
            while in_flight.try_join_next().is_some() {}

            let batch = tokio::select! {
                r = self.transport.receive_actions() => r,
                _ = shutdown.changed() => break,
            };

            match batch {
                Ok(actions) => {
                    for inbound in actions {
                        let handler = self.clone();
                        in_flight.spawn(async move {
                            handler.handle(inbound).await;
                        });
                    }
                }
                Err(e) => {
                    let delay = match &e {
                        TransportError::Throttled { retry_after: Some(d) } => *d,
                        _ => Duration::from_secs(5),
                    };
                    warn!(error = %e, ?delay, "receiving updates failed");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        info!(in_flight = in_flight.len(), "bot shutting down");
        while in_flight.join_next().await.is_some() {}
    }
}

/// Periodically evicts idle sessions.
pub async fn sweep_sessions(sessions: Arc<SessionStore>, every: Duration, mut shutdown: watch::Receiver<()>) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let evicted = sessions.sweep(Instant::now());
                if evicted > 0 {
                    debug!(evicted, remaining = sessions.len(), "swept idle sessions");
                }
            }
            _ = shutdown.changed() => return,
        }
    }
}
