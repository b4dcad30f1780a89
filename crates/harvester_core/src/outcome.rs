use std::fmt;

use crate::{RawRecord, UnitOfWork};

/// Why a single unit of work failed. Never fatal for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The response lacked a field the extraction expects.
    SchemaMismatch,
    /// Embedded script data could not be parsed after repair.
    JsonRepairFailure,
    /// A browser element wait expired before any data was read.
    ElementNotFound,
    /// Timeouts, connection errors, 429 and 5xx responses.
    TransientNetwork,
    HttpStatus(u16),
    /// Response refused before parsing: size limit, content type, redirects.
    InvalidResponse,
    Decode,
    Browser,
    /// The run deadline expired before the unit finished.
    Cancelled,
    /// The task running the unit panicked.
    Panicked,
}

impl FailureKind {
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureKind::TransientNetwork)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::SchemaMismatch => write!(f, "schema mismatch"),
            FailureKind::JsonRepairFailure => write!(f, "json repair failure"),
            FailureKind::ElementNotFound => write!(f, "element not found"),
            FailureKind::TransientNetwork => write!(f, "transient network error"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::InvalidResponse => write!(f, "invalid response"),
            FailureKind::Decode => write!(f, "decode error"),
            FailureKind::Browser => write!(f, "browser error"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::Panicked => write!(f, "task panicked"),
        }
    }
}

/// What is kept about a failure for post-mortem debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticContext {
    pub message: String,
    /// Bounded slice of the offending payload, if any.
    pub excerpt: Option<String>,
}

impl DiagnosticContext {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            excerpt: None,
        }
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    pub unit: UnitOfWork,
    pub kind: FailureKind,
    pub context: DiagnosticContext,
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.unit, self.kind, self.context.message)
    }
}

/// Outcome of one unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum HarvestResult {
    Success(Vec<RawRecord>),
    Failure(UnitFailure),
}

impl HarvestResult {
    pub fn failure(unit: &UnitOfWork, kind: FailureKind, context: DiagnosticContext) -> Self {
        HarvestResult::Failure(UnitFailure {
            unit: unit.clone(),
            kind,
            context,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, HarvestResult::Success(_))
    }
}
