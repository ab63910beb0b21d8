// src/error.rs
//! Poll failure taxonomy.
//!
//! Transport and upstream failures are handled identically by the store:
//! they bump `consecutive_failures` and `last_error_at`, nothing more.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    /// Connection refused, DNS failure, timeout, reset.
    #[error("transport error: {0}")]
    Transport(String),
    /// Upstream answered with a non-success status.
    #[error("upstream returned status {status}")]
    Upstream { status: u16 },
    /// Upstream answered 2xx but the body was empty, `null` or not JSON.
    #[error("malformed upstream body: {0}")]
    Malformed(String),
}

/// Coarse classification used for logs and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollErrorKind {
    TransportError,
    UpstreamError,
}

impl PollErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PollErrorKind::TransportError => "transport",
            PollErrorKind::UpstreamError => "upstream",
        }
    }
}

impl PollError {
    pub fn kind(&self) -> PollErrorKind {
        match self {
            PollError::Transport(_) => PollErrorKind::TransportError,
            PollError::Upstream { .. } | PollError::Malformed(_) => PollErrorKind::UpstreamError,
        }
    }
}

impl From<reqwest::Error> for PollError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return PollError::Upstream {
                status: status.as_u16(),
            };
        }
        if e.is_decode() {
            return PollError::Malformed(e.to_string());
        }
        PollError::Transport(e.to_string())
    }
}
