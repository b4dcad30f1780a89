//! Listing pages whose product data sits in a script tag as a JS literal.

use engine_logging::{engine_error, engine_warn};
use harvester_core::{records_from_array, DiagnosticContext, FailureKind, HarvestResult, UnitOfWork};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::grid::{correlate, extract_rows, parse_selector, GridProfile, SelectorError};
use crate::repair::{locate_fragment, parse_embedded};
use crate::strategy::{fetch_failure, schema_mismatch, wrong_unit};
use crate::{ExtractionStrategy, HarvestContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedJsonProfile {
    pub listing_url: String,
    /// Query parameter carrying the page number.
    pub page_param: String,
    /// Substring identifying the script tag that holds the data.
    pub marker: String,
    /// Regex whose first match precedes the object to extract.
    pub anchor: String,
    /// Path from the extracted object to the item array.
    pub items_path: Vec<String>,
    /// Product grid to merge into the script items.
    pub grid: Option<GridProfile>,
    /// Script item field matching the grid's key attribute.
    pub script_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("invalid anchor pattern: {0}")]
    Anchor(#[from] regex::Error),
    #[error(transparent)]
    Selector(#[from] SelectorError),
}

#[derive(Debug, Clone)]
pub struct EmbeddedJsonStrategy {
    ctx: HarvestContext,
    profile: EmbeddedJsonProfile,
    anchor: Regex,
    scripts: Selector,
}

impl EmbeddedJsonStrategy {
    pub fn new(ctx: HarvestContext, profile: EmbeddedJsonProfile) -> Result<Self, ProfileError> {
        let anchor = Regex::new(&profile.anchor)?;
        let scripts = parse_selector("script")?;
        if let Some(grid) = &profile.grid {
            for selector in [&grid.item, &grid.name_link, &grid.price, &grid.quantity] {
                parse_selector(selector)?;
            }
        }
        Ok(Self {
            ctx,
            profile,
            anchor,
            scripts,
        })
    }

    /// Extracts records from one listing page's HTML.
    pub fn parse_listing(&self, unit: &UnitOfWork, html: &str) -> HarvestResult {
        let label = self.ctx.label();
        let doc = Html::parse_document(html);

        let Some(script) = doc
            .select(&self.scripts)
            .map(|node| node.text().collect::<String>())
            .find(|text| text.contains(&self.profile.marker))
        else {
            return schema_mismatch(
                unit,
                format!("no script containing {:?}", self.profile.marker),
                html,
            );
        };

        let Some(fragment) = locate_fragment(&script, &self.anchor) else {
            return schema_mismatch(
                unit,
                format!("no object after {:?}", self.profile.anchor),
                &script,
            );
        };

        let data = match parse_embedded(fragment) {
            Ok(data) => data,
            Err(err) => {
                engine_error!("[{}] {}: {}", label, unit, err);
                engine_error!("[{}] {}: near error: {}", label, unit, err.snippet);
                return HarvestResult::failure(
                    unit,
                    FailureKind::JsonRepairFailure,
                    DiagnosticContext::new(err.to_string()).with_excerpt(err.snippet),
                );
            }
        };

        let items = value_at(&data, &self.profile.items_path).and_then(records_from_array);
        let Some(items) = items else {
            return schema_mismatch(
                unit,
                format!("no item array at {}", self.profile.items_path.join(".")),
                fragment,
            );
        };

        let Some(grid) = &self.profile.grid else {
            return HarvestResult::Success(items);
        };
        let rows = match extract_rows(&doc, grid) {
            Ok(rows) => rows,
            Err(err) => {
                return HarvestResult::failure(
                    unit,
                    FailureKind::InvalidResponse,
                    DiagnosticContext::new(err.to_string()),
                )
            }
        };
        if rows.is_empty() {
            engine_warn!("[{}] {}: product grid not found; keeping script items only", label, unit);
            return HarvestResult::Success(items);
        }
        HarvestResult::Success(correlate(label, items, rows, self.profile.script_key.as_deref()))
    }
}

#[async_trait::async_trait]
impl ExtractionStrategy for EmbeddedJsonStrategy {
    async fn extract(&self, unit: &UnitOfWork) -> HarvestResult {
        let Some(page) = unit.as_page() else {
            return wrong_unit(unit, "page");
        };
        let request = match self
            .ctx
            .request(&self.profile.listing_url, &[(self.profile.page_param.as_str(), page.to_string())])
        {
            Ok(request) => request,
            Err(err) => return fetch_failure(unit, &err),
        };
        match self.ctx.get(&request).await {
            Ok(output) => self.parse_listing(unit, &output.text),
            Err(err) => fetch_failure(unit, &err),
        }
    }
}

pub(crate) fn value_at<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |value, key| value.get(key))
}
