use std::fmt;

use harvester_core::{DiagnosticContext, FailureKind, UnitOfWork};

/// Progress and completion notifications emitted by the harvest engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    UnitStarted {
        unit: UnitOfWork,
    },
    /// Record count on success, failure kind otherwise.
    UnitCompleted {
        unit: UnitOfWork,
        outcome: Result<usize, FailureKind>,
    },
    /// Monotonic completed/total counter.
    Progress { completed: usize, total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub text: String,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    pub requested_url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub encoding_label: String,
    pub byte_len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchFailure,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            FetchFailure::Timeout | FetchFailure::Network => true,
            FetchFailure::HttpStatus(code) => code == 429 || (500..=599).contains(&code),
            _ => false,
        }
    }

    /// Maps the fetch failure onto the per-unit failure taxonomy.
    pub fn failure_kind(&self) -> FailureKind {
        if self.is_transient() {
            return FailureKind::TransientNetwork;
        }
        match self.kind {
            FetchFailure::HttpStatus(code) => FailureKind::HttpStatus(code),
            FetchFailure::Decode => FailureKind::Decode,
            _ => FailureKind::InvalidResponse,
        }
    }

    pub fn diagnostic(&self) -> DiagnosticContext {
        DiagnosticContext::new(self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    InvalidRequest,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    Decode,
    Network,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::InvalidRequest => write!(f, "invalid request"),
            FetchFailure::HttpStatus(code) => write!(f, "http status {code}"),
            FetchFailure::Timeout => write!(f, "timeout"),
            FetchFailure::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FetchFailure::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FetchFailure::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FetchFailure::Decode => write!(f, "decode error"),
            FetchFailure::Network => write!(f, "network error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        for code in [429, 500, 503] {
            let err = FetchError::new(FetchFailure::HttpStatus(code), "x");
            assert_eq!(err.failure_kind(), FailureKind::TransientNetwork);
        }
        let err = FetchError::new(FetchFailure::HttpStatus(404), "x");
        assert!(!err.is_transient());
        assert_eq!(err.failure_kind(), FailureKind::HttpStatus(404));
    }

    #[test]
    fn refused_responses_are_not_retried() {
        let err = FetchError::new(
            FetchFailure::TooLarge {
                max_bytes: 1,
                actual: Some(2),
            },
            "x",
        );
        assert!(!err.is_transient());
        assert_eq!(err.failure_kind(), FailureKind::InvalidResponse);
    }
}
