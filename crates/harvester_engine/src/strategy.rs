use engine_logging::Excerpt;
use harvester_core::{DiagnosticContext, FailureKind, HarvestResult, UnitOfWork};

use crate::FetchError;

/// Raw body characters kept in a schema-mismatch diagnostic.
pub const BODY_EXCERPT_CHARS: usize = 2_000;

/// Turns one unit of work into records or a typed failure.
///
/// Implementations never panic on bad input and never return early with an
/// error: every outcome is a [`HarvestResult`].
#[async_trait::async_trait]
pub trait ExtractionStrategy: Send + Sync {
    async fn extract(&self, unit: &UnitOfWork) -> HarvestResult;
}

pub(crate) fn fetch_failure(unit: &UnitOfWork, err: &FetchError) -> HarvestResult {
    HarvestResult::failure(unit, err.failure_kind(), err.diagnostic())
}

pub(crate) fn schema_mismatch(unit: &UnitOfWork, message: impl Into<String>, body: &str) -> HarvestResult {
    HarvestResult::failure(
        unit,
        FailureKind::SchemaMismatch,
        DiagnosticContext::new(message).with_excerpt(Excerpt::new(body, BODY_EXCERPT_CHARS).to_string()),
    )
}

pub(crate) fn wrong_unit(unit: &UnitOfWork, expected: &str) -> HarvestResult {
    HarvestResult::failure(
        unit,
        FailureKind::InvalidResponse,
        DiagnosticContext::new(format!("strategy expects a {expected} unit")),
    )
}
