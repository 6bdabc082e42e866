use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default)]
    pub clusters: Vec<ClusterDef>,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub reports: ReportConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub alerts: AlertLimits,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

/// Longest accepted cluster name. Cluster names travel inside button
/// payloads, which providers cap in size.
pub const MAX_CLUSTER_NAME: usize = 40;

/// Smallest menu depth that keeps a cluster view under its namespace prompt.
pub const MIN_MENU_DEPTH: usize = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterDef {
    pub name: String,
    pub api_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub bot_token_env: Option<String>,
    #[serde(default)]
    pub chat_ids: Vec<String>,
    #[serde(default)]
    pub authorized_users: Vec<i64>,
    #[serde(default = "default_telegram_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub notify_resolved: bool,
    #[serde(default = "default_true")]
    pub notify_changes: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_max_menu_depth")]
    pub max_menu_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_reports_directory")]
    pub directory: String,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
}

/// Percent levels used to mark CPU and memory figures in replies and reports.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_cpu_warning")]
    pub cpu_warning: f64,
    #[serde(default = "default_cpu_critical")]
    pub cpu_critical: f64,
    #[serde(default = "default_memory_warning")]
    pub memory_warning: f64,
    #[serde(default = "default_memory_critical")]
    pub memory_critical: f64,
}

/// Reserved CPU and memory levels at which a resource alarm opens, and the
/// lower levels at or below which it closes again.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AlertLimits {
    #[serde(default = "default_cpu_open")]
    pub cpu_open: f64,
    #[serde(default = "default_cpu_close")]
    pub cpu_close: f64,
    #[serde(default = "default_memory_open")]
    pub memory_open: f64,
    #[serde(default = "default_memory_close")]
    pub memory_close: f64,
}

fn default_listen_port() -> u16 {
    9090
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_report_interval_secs() -> u64 {
    3600
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_telegram_poll_timeout_secs() -> u64 {
    25
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_send_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_idle_timeout_secs() -> u64 {
    1800
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_menu_depth() -> usize {
    8
}

fn default_reports_directory() -> String {
    "./reports".to_string()
}

fn default_max_age_days() -> u64 {
    3
}

fn default_cpu_warning() -> f64 {
    50.0
}

fn default_cpu_critical() -> f64 {
    80.0
}

fn default_memory_warning() -> f64 {
    70.0
}

fn default_memory_critical() -> f64 {
    90.0
}

fn default_cpu_open() -> f64 {
    85.0
}

fn default_cpu_close() -> f64 {
    70.0
}

fn default_memory_open() -> f64 {
    90.0
}

fn default_memory_close() -> f64 {
    80.0
}

fn default_shutdown_grace_secs() -> u64 {
    20
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            send_timeout_secs: default_send_timeout_secs(),
            notify_resolved: true,
            notify_changes: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_menu_depth: default_max_menu_depth(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            directory: default_reports_directory(),
            max_age_days: default_max_age_days(),
        }
    }
}

impl Default for AlertLimits {
    fn default() -> Self {
        Self {
            cpu_open: default_cpu_open(),
            cpu_close: default_cpu_close(),
            memory_open: default_memory_open(),
            memory_close: default_memory_close(),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_warning: default_cpu_warning(),
            cpu_critical: default_cpu_critical(),
            memory_warning: default_memory_warning(),
            memory_critical: default_memory_critical(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.clusters.is_empty() {
            return Err(ConfigError::Invalid("at least one cluster must be configured".into()));
        }
        let mut seen = HashSet::new();
        for c in &self.clusters {
            if c.name.trim().is_empty() {
                return Err(ConfigError::Invalid("cluster name cannot be empty".into()));
            }
            if c.name.contains(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!(
                    "cluster name {:?} cannot contain whitespace",
                    c.name
                )));
            }
            if c.name.len() > MAX_CLUSTER_NAME {
                return Err(ConfigError::Invalid(format!(
                    "cluster name {:?} is longer than {} bytes",
                    c.name, MAX_CLUSTER_NAME
                )));
            }
            if !seen.insert(c.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate cluster {:?}", c.name)));
            }
            if c.poll_interval_secs == 0 || c.report_interval_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "cluster {:?}: intervals must be positive",
                    c.name
                )));
            }
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid("failure_threshold must be at least 1".into()));
        }
        if self.sessions.max_menu_depth < MIN_MENU_DEPTH {
            return Err(ConfigError::Invalid(format!(
                "sessions.max_menu_depth must be at least {}",
                MIN_MENU_DEPTH
            )));
        }
        let a = &self.alerts;
        if a.cpu_close > a.cpu_open || a.memory_close > a.memory_open {
            return Err(ConfigError::Invalid(
                "alerts: close levels cannot be above open levels".into(),
            ));
        }
        if self.notifications.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "notifications.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.listen_port)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl ClusterDef {
    /// Inline token first, then the named environment variable.
    pub fn resolve_token(&self) -> Option<String> {
        resolve_secret(self.token.as_deref(), self.token_env.as_deref())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

impl TelegramConfig {
    pub fn resolve_token(&self) -> Option<String> {
        resolve_secret(self.bot_token.as_deref(), self.bot_token_env.as_deref())
    }

    pub fn is_authorized(&self, user: Option<i64>) -> bool {
        user_allowed(&self.authorized_users, user)
    }
}

/// An empty allow-list admits everyone.
pub fn user_allowed(allowed: &[i64], user: Option<i64>) -> bool {
    allowed.is_empty() || user.is_some_and(|u| allowed.contains(&u))
}

fn resolve_secret(inline: Option<&str>, env: Option<&str>) -> Option<String> {
    inline
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| env.and_then(|name| std::env::var(name).ok()))
        .filter(|t| !t.is_empty())
}
