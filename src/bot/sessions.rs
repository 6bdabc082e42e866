use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::navigation::SessionState;
use crate::config::SessionConfig;
use crate::transport::ChatId;

/// Sessions are per chat and user, so two people in one group chat navigate
/// independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub chat: ChatId,
    pub user: Option<i64>,
}

/// In-memory sessions, one lock per session.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionKey, Arc<Mutex<SessionState>>>>,
    idle_timeout: Duration,
    max_depth: usize,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration, max_depth: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
            max_depth,
        }
    }

    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self::new(Duration::from_secs(cfg.idle_timeout_secs), cfg.max_menu_depth)
    }

    /// Runs `f` on the session for `key`, creating it if needed. A session
    /// idle past the timeout starts over at the main menu.
    pub fn with_session<R>(
        &self,
        key: &SessionKey,
        now: Instant,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> R {
        let entry = self.entry(key, now);
        let mut state = entry.lock();
        if now.saturating_duration_since(state.last_interaction_at) > self.idle_timeout {
            debug!(chat = %key.chat, "session expired, starting over");
            *state = SessionState::new(self.max_depth, now);
        }
        f(&mut state)
    }

    fn entry(&self, key: &SessionKey, now: Instant) -> Arc<Mutex<SessionState>> {
        if let Some(s) = self.sessions.read().get(key) {
            return s.clone();
        }
        self.sessions
            .write()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SessionState::new(self.max_depth, now))))
            .clone()
    }

    /// Drops sessions idle past the timeout and returns how many went.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|key, state| {
            let keep = now.saturating_duration_since(state.lock().last_interaction_at) <= self.idle_timeout;
            if !keep {
                debug!(chat = %key.chat, user = ?key.user, "evicting idle session");
            }
            keep
        });
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
