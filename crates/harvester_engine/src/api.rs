//! Paginated JSON API, one category per unit.

use engine_logging::{engine_debug, engine_warn};
use harvester_core::{records_from_array, HarvestResult, RawRecord, UnitOfWork};
use serde_json::Value;

use crate::strategy::{fetch_failure, schema_mismatch, wrong_unit};
use crate::{ExtractionStrategy, HarvestContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiProfile {
    /// Endpoint with a `{category}` placeholder.
    pub endpoint: String,
    /// Query parameter carrying the page index.
    pub page_param: String,
    /// Index of the first page as the API counts them.
    pub first_page: u32,
    /// Top-level key holding the record array.
    pub records_key: String,
    /// Top-level key holding the page count; absent means one page.
    pub page_count_key: String,
    /// Upper bound on pages fetched per category.
    pub max_pages: u32,
}

impl ApiProfile {
    pub fn endpoint_for(&self, category: &str) -> String {
        self.endpoint.replace("{category}", category)
    }
}

/// Fetches every page of a category sequentially inside one task.
///
/// The first response declares the page count; page `n + 1` is requested
/// only after page `n` has been parsed. A page without the records key fails
/// the whole unit.
#[derive(Debug, Clone)]
pub struct ApiPaginatedStrategy {
    ctx: HarvestContext,
    profile: ApiProfile,
}

impl ApiPaginatedStrategy {
    pub fn new(ctx: HarvestContext, profile: ApiProfile) -> Self {
        Self { ctx, profile }
    }

    async fn fetch_page(
        &self,
        unit: &UnitOfWork,
        url: &str,
        page: u32,
    ) -> Result<(Vec<RawRecord>, Value), HarvestResult> {
        let request = self
            .ctx
            .request(url, &[(self.profile.page_param.as_str(), page.to_string())])
            .map_err(|err| fetch_failure(unit, &err))?;
        let output = self
            .ctx
            .get(&request)
            .await
            .map_err(|err| fetch_failure(unit, &err))?;

        let body: Value = serde_json::from_str(&output.text).map_err(|err| {
            schema_mismatch(unit, format!("page {page} is not JSON: {err}"), &output.text)
        })?;
        let records = body
            .get(&self.profile.records_key)
            .and_then(records_from_array)
            .ok_or_else(|| {
                schema_mismatch(
                    unit,
                    format!("page {page} has no {:?} array", self.profile.records_key),
                    &output.text,
                )
            })?;
        Ok((records, body))
    }

    fn page_count(&self, unit: &UnitOfWork, body: &Value) -> u32 {
        let declared = match body.get(&self.profile.page_count_key) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
        .unwrap_or(1)
        .max(1);

        if declared > u64::from(self.profile.max_pages) {
            engine_warn!(
                "[{}] {} declares {} pages; capping at {}",
                self.ctx.label(),
                unit,
                declared,
                self.profile.max_pages
            );
            return self.profile.max_pages;
        }
        declared as u32
    }
}

#[async_trait::async_trait]
impl ExtractionStrategy for ApiPaginatedStrategy {
    async fn extract(&self, unit: &UnitOfWork) -> HarvestResult {
        let Some(category) = unit.as_category() else {
            return wrong_unit(unit, "category");
        };
        let url = self.profile.endpoint_for(category);

        let (mut records, first) = match self.fetch_page(unit, &url, self.profile.first_page).await {
            Ok(page) => page,
            Err(failure) => return failure,
        };
        let pages = self.page_count(unit, &first);
        engine_debug!("[{}] {} has {} pages", self.ctx.label(), unit, pages);

        for offset in 1..pages {
            let page = self.profile.first_page + offset;
            match self.fetch_page(unit, &url, page).await {
                Ok((more, _)) => records.extend(more),
                Err(failure) => return failure,
            }
        }
        HarvestResult::Success(records)
    }
}
