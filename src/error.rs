use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Setup error: {0}")]
    Setup(String),

    #[error("{kind} {selector} not found")]
    NotFound { kind: String, selector: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Metrics query error: {0}")]
    Query(String),

    #[error("{what}: expected {expected}, got {actual}")]
    Assertion {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("timed out after {elapsed:?} waiting for {what} (last state: {last})")]
    Timeout {
        what: String,
        elapsed: Duration,
        last: String,
    },

    #[error("operator upgrade failed for {namespace}/{operator}: {reason}")]
    Upgrade {
        operator: String,
        namespace: String,
        reason: String,
    },

    #[error("cannot {action} sample workload while {state}")]
    InvalidTransition { state: String, action: String },
}

/// Short alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    pub fn not_found(kind: impl std::fmt::Display, selector: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            selector: selector.into(),
        }
    }

    pub fn assertion(
        what: impl Into<String>,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        Self::Assertion {
            what: what.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Errors a polling loop may retry: the API or the network hiccupped,
    /// the answer itself is unknown. Decode, auth and config failures are
    /// not retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Kube(kube::Error::Api(e)) => e.code >= 500 || e.code == 429,
            Self::Kube(kube::Error::HyperError(_) | kube::Error::Service(_)) => true,
            Self::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Transport(_) => true,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube(kube::Error::Api(e)) => e.code == 404,
            _ => false,
        }
    }
}
