//! Error types shared across the monitor, the bot and the external clients.

use std::time::Duration;

use thiserror::Error;

/// Failure to obtain a snapshot from a cluster.
///
/// Every variant is transient from the scheduler's point of view: the cycle
/// is skipped and the previous snapshot is kept as the baseline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("unknown cluster {0:?}")]
    UnknownCluster(String),
}

impl FetchError {
    /// Short label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::Unreachable(_) => "unreachable",
            Self::Timeout(_) => "timeout",
            Self::Malformed(_) => "malformed",
            Self::UnknownCluster(_) => "unknown_cluster",
        }
    }
}

/// Failure reported by the messaging transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("throttled by provider")]
    Throttled { retry_after: Option<Duration> },
    #[error("transport unreachable: {0}")]
    Unreachable(String),
    #[error("rejected by provider: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Throttling and connectivity failures are worth another attempt; a
    /// rejected payload will be rejected again.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// A notification that could not be delivered within the retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("{kind} message to chat {chat} dropped after {attempts} attempts: {last}")]
    Exhausted {
        kind: &'static str,
        chat: String,
        attempts: u32,
        last: TransportError,
    },
}

/// Inbound text or button payload the command router cannot interpret.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action: {0:?}")]
pub struct UnknownAction(pub String);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report io: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_kind_labels() {
        assert_eq!(FetchError::Unauthorized("x".into()).kind(), "unauthorized");
        assert_eq!(FetchError::Timeout(Duration::from_secs(1)).kind(), "timeout");
        assert_eq!(FetchError::Malformed("x".into()).kind(), "malformed");
    }

    #[test]
    fn dispatch_error_display_carries_context() {
        let err = DispatchError::Exhausted {
            kind: "new_problems",
            chat: "42".to_string(),
            attempts: 4,
            last: TransportError::Throttled { retry_after: None },
        };
        assert_eq!(
            err.to_string(),
            "new_problems message to chat 42 dropped after 4 attempts: throttled by provider"
        );
    }

    #[test]
    fn rejected_is_not_transient() {
        assert!(TransportError::Unreachable("down".into()).is_transient());
        assert!(TransportError::Throttled { retry_after: None }.is_transient());
        assert!(!TransportError::Rejected("bad request".into()).is_transient());
    }

    #[test]
    fn config_error_from_yaml() {
        let yaml_err = serde_yaml::from_str::<u32>("not: [a number").unwrap_err();
        let err: ConfigError = yaml_err.into();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
