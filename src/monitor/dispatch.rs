use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::diff::{Change, Delta};
use crate::config::NotificationConfig;
use crate::error::{DispatchError, TransportError};
use crate::models::snapshot::{Detail, ProblemKey};
use crate::helpers::capped_lines;
use crate::transport::{fit_text, Button, ChatId, Transport};

pub const KIND_NEW: &str = "new problems";
pub const KIND_RESOLVED: &str = "resolved";
pub const KIND_CHANGED: &str = "status changes";

/// Problems listed per message; the rest are summarized as a count.
const LISTED: usize = 25;

/// Bounded retry budget for one outbound message.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub send_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &NotificationConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_backoff: Duration::from_millis(cfg.base_backoff_ms),
            max_backoff: Duration::from_millis(cfg.max_backoff_ms),
            send_timeout: Duration::from_secs(cfg.send_timeout_secs),
        }
    }

    /// Delay before attempt `attempt + 1`. A provider-supplied retry hint
    /// wins over the exponential schedule; both are capped.
    pub fn backoff(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let exp = self
            .base_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        hint.unwrap_or(exp).min(self.max_backoff)
    }
}

/// Sends one message, retrying transient failures with backoff. Text past
/// the provider's length limit is truncated. Returns the number of attempts
/// used.
pub async fn deliver(
    transport: &dyn Transport,
    chat: &str,
    text: &str,
    buttons: &[Vec<Button>],
    policy: &RetryPolicy,
    kind: &'static str,
) -> Result<u32, DispatchError> {
    let text = fit_text(text);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = tokio::time::timeout(policy.send_timeout, transport.send_message(chat, &text, buttons))
            .await
            .unwrap_or_else(|_| {
                Err(TransportError::Unreachable(format!(
                    "no answer within {:?}",
                    policy.send_timeout
                )))
            });

        let err = match result {
            Ok(()) => return Ok(attempt),
            Err(e) => e,
        };
        if !err.is_transient() || attempt >= policy.max_attempts {
            return Err(DispatchError::Exhausted {
                kind,
                chat: chat.to_string(),
                attempts: attempt,
                last: err,
            });
        }

        let hint = match &err {
            TransportError::Throttled { retry_after } => *retry_after,
            _ => None,
        };
        let delay = policy.backoff(attempt, hint);
        warn!(chat = %chat, kind, attempt, error = %err, ?delay, "send failed, retrying");
        tokio::time::sleep(delay).await;
    }
}

#[derive(Debug, Default)]
pub struct DispatchResult {
    pub messages_sent: usize,
    pub messages_dropped: usize,
    pub failures: Vec<DispatchError>,
}

/// Turns deltas into at most one "new problems", one "resolved" and one
/// "status changes" message per target chat.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    targets: Vec<ChatId>,
    policy: RetryPolicy,
    notify_resolved: bool,
    notify_changes: bool,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        targets: Vec<ChatId>,
        policy: RetryPolicy,
        notify_resolved: bool,
    ) -> Self {
        Self {
            transport,
            targets,
            policy,
            notify_resolved,
            notify_changes: true,
        }
    }

    pub fn with_changes(mut self, enabled: bool) -> Self {
        self.notify_changes = enabled;
        self
    }

    pub async fn dispatch(&self, cluster: &str, delta: &Delta) -> DispatchResult {
        let mut messages = Vec::new();
        if !delta.new_problems.is_empty() {
            messages.push((KIND_NEW, format_new(cluster, delta)));
        }
        if self.notify_resolved && !delta.resolved_problems.is_empty() {
            messages.push((KIND_RESOLVED, format_resolved(cluster, &delta.resolved_problems)));
        }
        if self.notify_changes && !delta.changed.is_empty() {
            messages.push((KIND_CHANGED, format_changed(cluster, &delta.changed)));
        }

        let mut result = DispatchResult::default();
        if messages.is_empty() {
            debug!(cluster = %cluster, still_open = delta.still_open.len(), "nothing to notify");
            return result;
        }

        for (kind, text) in messages {
            for chat in &self.targets {
                match deliver(&*self.transport, chat, &text, &[], &self.policy, kind).await {
                    Ok(attempts) => {
                        debug!(cluster = %cluster, chat = %chat, kind, attempts, "notification sent");
                        result.messages_sent += 1;
                    }
                    Err(e) => {
                        let DispatchError::Exhausted { attempts, .. } = &e;
                        error!(cluster = %cluster, kind, attempts, error = %e, "notification dropped");
                        result.messages_dropped += 1;
                        result.failures.push(e);
                    }
                }
            }
        }
        result
    }
}

fn format_new(cluster: &str, delta: &Delta) -> String {
    let mut out = format!("🚨 {}: {} new problem(s)\n\n", cluster, delta.new_problems.len());
    out.push_str(&capped_lines(
        delta
            .new_problems
            .iter()
            .map(|(key, detail)| format!("{} {}: {}", detail.health.marker(), key, detail)),
        LISTED,
        "",
    ));
    if !delta.still_open.is_empty() {
        let _ = write!(out, "\n{} problem(s) still open", delta.still_open.len());
    }
    out.trim_end().to_string()
}

fn format_resolved(cluster: &str, resolved: &BTreeMap<ProblemKey, Detail>) -> String {
    let mut out = format!("✅ {}: {} problem(s) resolved\n\n", cluster, resolved.len());
    out.push_str(&capped_lines(
        resolved.iter().map(|(key, detail)| format!("{} (was {})", key, detail.health)),
        LISTED,
        "• ",
    ));
    out.trim_end().to_string()
}

fn format_changed(cluster: &str, changed: &BTreeMap<ProblemKey, Change>) -> String {
    let mut out = format!("🔄 {}: {} problem(s) changed state\n\n", cluster, changed.len());
    out.push_str(&capped_lines(
        changed
            .iter()
            .map(|(key, c)| format!("{} {}: {} → {}", c.to.health.marker(), key, c.from, c.to)),
        LISTED,
        "",
    ));
    out.trim_end().to_string()
}
