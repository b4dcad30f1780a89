//! Browser-driven "load more" harvesting, one browser session per category.

use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn, Excerpt};
use harvester_core::{records_from_array, DiagnosticContext, FailureKind, HarvestResult, RawRecord, UnitOfWork};
use scraper::Html;
use serde_json::Value;
use thiserror::Error;

use crate::embedded::value_at;
use crate::grid::parse_selector;
use crate::strategy::wrong_unit;
use crate::ExtractionStrategy;

#[cfg(feature = "browser")]
mod chromium;
#[cfg(feature = "browser")]
pub use chromium::{ChromiumConfig, ChromiumLauncher};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("browser protocol error: {0}")]
    Protocol(String),
}

/// One live browser page. Owned by exactly one task.
#[async_trait::async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    async fn page_source(&mut self) -> Result<String, BrowserError>;

    /// Waits up to `timeout` for `selector` to be clickable; `false` on expiry.
    async fn wait_for_clickable(&mut self, selector: &str, timeout: Duration) -> Result<bool, BrowserError>;

    /// Immediate presence check, no waiting.
    async fn is_present(&mut self, selector: &str) -> Result<bool, BrowserError>;

    async fn scroll_and_click(&mut self, selector: &str) -> Result<(), BrowserError>;

    /// Body of the newest network response whose URL contains `url_fragment`,
    /// among responses received since the previous call.
    async fn latest_response_body(&mut self, url_fragment: &str) -> Result<Option<String>, BrowserError>;

    async fn close(&mut self) -> Result<(), BrowserError>;
}

#[async_trait::async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProfile {
    /// Category page URL with a `{category}` placeholder.
    pub page_url: String,
    /// Path identifying the XHR that carries each further batch.
    pub api_path: String,
    pub consent_selector: Option<String>,
    pub load_more_selector: String,
    /// Element rendered once the listing is exhausted, if the site has one.
    pub exhausted_selector: Option<String>,
    /// Script holding the server-rendered state.
    pub initial_state_selector: String,
    pub initial_state_path: Vec<String>,
    /// Key of the record array in each batch response.
    pub batch_records_key: String,
    /// Bound on every element wait.
    pub wait: Duration,
    /// Pause after clicks for page scripts to settle.
    pub settle: Duration,
    pub max_batches: u32,
}

impl BrowserProfile {
    pub fn page_url_for(&self, category: &str) -> String {
        self.page_url.replace("{category}", category)
    }

    pub fn api_path_for(&self, category: &str) -> String {
        self.api_path.replace("{category}", category)
    }
}

/// Result of probing for the "load more" control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMore {
    /// The control is clickable.
    More,
    /// The page shows its exhausted marker.
    End,
    /// Neither appeared within the wait; may be the end or a changed page.
    TimedOut,
}

/// Per-session flags. Set once, never reset within a session.
#[derive(Debug, Default)]
struct SessionFlags {
    consent_dismissed: bool,
}

pub struct BrowserStrategy {
    label: String,
    launcher: Arc<dyn BrowserLauncher>,
    profile: BrowserProfile,
}

impl BrowserStrategy {
    pub fn new(label: &str, launcher: Arc<dyn BrowserLauncher>, profile: BrowserProfile) -> Self {
        Self {
            label: label.to_string(),
            launcher,
            profile,
        }
    }

    async fn dismiss_consent(&self, session: &mut dyn BrowserSession, flags: &mut SessionFlags) {
        let Some(selector) = &self.profile.consent_selector else {
            return;
        };
        if flags.consent_dismissed {
            return;
        }
        match session.wait_for_clickable(selector, self.profile.wait).await {
            Ok(true) => {
                tokio::time::sleep(self.profile.settle).await;
                match session.scroll_and_click(selector).await {
                    Ok(()) => {
                        engine_info!("[{}] cookie consent accepted", self.label);
                        flags.consent_dismissed = true;
                    }
                    Err(err) => engine_warn!("[{}] consent click failed: {}", self.label, err),
                }
            }
            Ok(false) => engine_warn!("[{}] no cookie consent button found", self.label),
            Err(err) => engine_warn!("[{}] consent probe failed: {}", self.label, err),
        }
    }

    async fn first_load(&self, session: &mut dyn BrowserSession) -> Result<Option<Vec<RawRecord>>, BrowserError> {
        let source = session.page_source().await?;
        Ok(initial_records(
            &source,
            &self.profile.initial_state_selector,
            &self.profile.initial_state_path,
        ))
    }

    async fn probe_load_more(&self, session: &mut dyn BrowserSession) -> Result<LoadMore, BrowserError> {
        if self.exhausted(session).await? {
            return Ok(LoadMore::End);
        }
        if session
            .wait_for_clickable(&self.profile.load_more_selector, self.profile.wait)
            .await?
        {
            return Ok(LoadMore::More);
        }
        if self.exhausted(session).await? {
            return Ok(LoadMore::End);
        }
        Ok(LoadMore::TimedOut)
    }

    async fn exhausted(&self, session: &mut dyn BrowserSession) -> Result<bool, BrowserError> {
        match &self.profile.exhausted_selector {
            Some(selector) => session.is_present(selector).await,
            None => Ok(false),
        }
    }

    async fn next_batch(
        &self,
        session: &mut dyn BrowserSession,
        unit: &UnitOfWork,
        api_path: &str,
    ) -> Result<Vec<RawRecord>, BrowserError> {
        session.scroll_and_click(&self.profile.load_more_selector).await?;
        tokio::time::sleep(self.profile.settle).await;

        let Some(body) = session.latest_response_body(api_path).await? else {
            engine_debug!("[{}] {}: no new response for {}", self.label, unit, api_path);
            return Ok(Vec::new());
        };
        let batch = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| value.get(&self.profile.batch_records_key).and_then(records_from_array));
        match batch {
            Some(records) => Ok(records),
            None => {
                engine_warn!(
                    "[{}] {}: unreadable batch response: {}",
                    self.label,
                    unit,
                    Excerpt::new(&body, 200)
                );
                Ok(Vec::new())
            }
        }
    }

    /// A step that fails after something was collected ends the stream;
    /// the page most likely re-rendered under the control.
    fn step_failed(
        &self,
        unit: &UnitOfWork,
        err: BrowserError,
        collected: bool,
        batches: u32,
    ) -> Result<(), BrowserError> {
        if !collected {
            return Err(err);
        }
        engine_warn!(
            "[{}] {}: ending stream after {} batches, step failed: {}",
            self.label,
            unit,
            batches,
            err
        );
        Ok(())
    }

    async fn harvest_category(
        &self,
        session: &mut dyn BrowserSession,
        unit: &UnitOfWork,
        category: &str,
    ) -> Result<HarvestResult, BrowserError> {
        let mut flags = SessionFlags::default();
        let url = self.profile.page_url_for(category);
        session.navigate(&url).await?;

        self.dismiss_consent(session, &mut flags).await;
        let initial = self.first_load(session).await?;
        let found_initial = initial.is_some();
        let mut records = initial.unwrap_or_default();
        engine_debug!("[{}] {}: {} records in initial state", self.label, unit, records.len());

        let api_path = self.profile.api_path_for(category);
        let mut timed_out = false;
        let mut batches = 0;
        loop {
            if batches >= self.profile.max_batches {
                engine_warn!(
                    "[{}] {}: stopping after {} batches",
                    self.label,
                    unit,
                    self.profile.max_batches
                );
                break;
            }
            let probe = match self.probe_load_more(session).await {
                Ok(probe) => probe,
                Err(err) => {
                    self.step_failed(unit, err, !records.is_empty(), batches)?;
                    break;
                }
            };
            match probe {
                LoadMore::More => match self.next_batch(session, unit, &api_path).await {
                    Ok(batch) => {
                        records.extend(batch);
                        batches += 1;
                    }
                    Err(err) => {
                        self.step_failed(unit, err, !records.is_empty(), batches)?;
                        break;
                    }
                },
                LoadMore::End => {
                    engine_info!("[{}] {}: listing exhausted after {} batches", self.label, unit, batches);
                    break;
                }
                LoadMore::TimedOut => {
                    engine_warn!(
                        "[{}] {}: load-more control not found within {:?}; ending stream after {} batches",
                        self.label,
                        unit,
                        self.profile.wait,
                        batches
                    );
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out && !found_initial && records.is_empty() {
            return Ok(HarvestResult::failure(
                unit,
                FailureKind::ElementNotFound,
                DiagnosticContext::new(format!(
                    "neither initial state nor {:?} found on {url}",
                    self.profile.load_more_selector
                )),
            ));
        }
        Ok(HarvestResult::Success(records))
    }
}

#[async_trait::async_trait]
impl ExtractionStrategy for BrowserStrategy {
    async fn extract(&self, unit: &UnitOfWork) -> HarvestResult {
        let Some(category) = unit.as_category() else {
            return wrong_unit(unit, "category");
        };
        let mut session = match self.launcher.launch().await {
            Ok(session) => session,
            Err(err) => return browser_failure(unit, &err),
        };

        let outcome = self.harvest_category(session.as_mut(), unit, category).await;
        if let Err(err) = session.close().await {
            engine_warn!("[{}] {}: closing browser failed: {}", self.label, unit, err);
        }
        outcome.unwrap_or_else(|err| browser_failure(unit, &err))
    }
}

fn browser_failure(unit: &UnitOfWork, err: &BrowserError) -> HarvestResult {
    HarvestResult::failure(unit, FailureKind::Browser, DiagnosticContext::new(err.to_string()))
}

/// Records from the server-rendered state script, `None` when the script
/// or the path is missing.
pub fn initial_records(html: &str, selector: &str, path: &[String]) -> Option<Vec<RawRecord>> {
    let selector = parse_selector(selector).ok()?;
    let doc = Html::parse_document(html);
    let text = doc.select(&selector).next()?.text().collect::<String>();
    let state: Value = serde_json::from_str(&text).ok()?;
    value_at(&state, path).and_then(records_from_array)
}
