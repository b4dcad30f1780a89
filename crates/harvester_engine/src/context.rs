use std::sync::Arc;

use crate::{FetchError, FetchOutput, Fetcher, PageRequest, RequestProfile, RetryPolicy};

/// Per-run collaborators passed down to every strategy and discovery.
///
/// Built once per retailer run. Everything in here is read-only and cheap to
/// clone into tasks.
#[derive(Clone)]
pub struct HarvestContext {
    label: String,
    fetcher: Arc<dyn Fetcher>,
    profile: Arc<RequestProfile>,
    retry: RetryPolicy,
}

impl HarvestContext {
    pub fn new(
        label: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
        profile: RequestProfile,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            label: label.into(),
            fetcher,
            profile: Arc::new(profile),
            retry,
        }
    }

    /// Retailer name used as the prefix of log lines and artifact names.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn profile(&self) -> &Arc<RequestProfile> {
        &self.profile
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Builds a task-owned request from the shared profile.
    pub fn request(
        &self,
        base_url: &str,
        overrides: &[(&str, String)],
    ) -> Result<PageRequest, FetchError> {
        PageRequest::new(&self.profile, base_url, overrides)
    }

    /// Fetches `request` under the run's retry policy.
    pub async fn get(&self, request: &PageRequest) -> Result<FetchOutput, FetchError> {
        self.retry.fetch(self.fetcher.as_ref(), request).await
    }
}

impl std::fmt::Debug for HarvestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarvestContext")
            .field("label", &self.label)
            .field("profile", &self.profile)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
