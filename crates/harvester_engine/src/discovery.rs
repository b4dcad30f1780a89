//! Work discovery: the full unit-of-work set, computed before dispatch.

use engine_logging::engine_info;
use harvester_core::UnitOfWork;
use regex::Regex;
use scraper::Html;
use thiserror::Error;

use crate::grid::{parse_selector, SelectorError};
use crate::{CategoryDepth, CategoryTree, CategoryTreeError, FetchError, HarvestContext};

/// Run-fatal: no work is dispatched when discovery fails.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("listing request failed: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Selector(#[from] SelectorError),
    #[error("no page number found under {selector:?}")]
    MissingPagination { selector: String },
    #[error(transparent)]
    Categories(#[from] CategoryTreeError),
    #[error("[{label}] discovery produced no units of work")]
    Empty { label: String },
}

#[async_trait::async_trait]
pub trait WorkDiscovery: Send + Sync {
    async fn discover(&self) -> Result<Vec<UnitOfWork>, DiscoveryError>;
}

/// Units are the subcategories of a set of top-level categories.
#[derive(Debug, Clone)]
pub struct CategoryDiscovery {
    label: String,
    categories: Vec<String>,
}

impl CategoryDiscovery {
    pub fn new(label: &str, tree: &CategoryTree, top_level: &[String], depth: CategoryDepth) -> Self {
        Self {
            label: label.to_string(),
            categories: tree.subcategories(top_level, depth),
        }
    }
}

#[async_trait::async_trait]
impl WorkDiscovery for CategoryDiscovery {
    async fn discover(&self) -> Result<Vec<UnitOfWork>, DiscoveryError> {
        if self.categories.is_empty() {
            return Err(DiscoveryError::Empty {
                label: self.label.clone(),
            });
        }
        engine_info!("[{}] {} categories to harvest", self.label, self.categories.len());
        Ok(self
            .categories
            .iter()
            .cloned()
            .map(UnitOfWork::Category)
            .collect())
    }
}

/// Units are listing pages `first_page..=last`, where `last` is the highest
/// number shown in the listing's pagination control.
#[derive(Debug, Clone)]
pub struct PaginationDiscovery {
    ctx: HarvestContext,
    listing_url: String,
    selector: String,
    first_page: u32,
}

impl PaginationDiscovery {
    pub fn new(ctx: HarvestContext, listing_url: &str, selector: &str) -> Self {
        Self {
            ctx,
            listing_url: listing_url.to_string(),
            selector: selector.to_string(),
            first_page: 1,
        }
    }
}

#[async_trait::async_trait]
impl WorkDiscovery for PaginationDiscovery {
    async fn discover(&self) -> Result<Vec<UnitOfWork>, DiscoveryError> {
        let request = self.ctx.request(&self.listing_url, &[])?;
        let output = self.ctx.get(&request).await?;
        let last = max_page_number(&output.text, &self.selector)?.ok_or_else(|| {
            DiscoveryError::MissingPagination {
                selector: self.selector.clone(),
            }
        })?;
        if last < self.first_page {
            return Err(DiscoveryError::Empty {
                label: self.ctx.label().to_string(),
            });
        }
        engine_info!("[{}] {} listing pages to harvest", self.ctx.label(), last - self.first_page + 1);
        Ok((self.first_page..=last).map(UnitOfWork::Page).collect())
    }
}

/// Highest integer appearing in the text of any element matching `selector`.
///
/// Pagination controls mix numbers with "next"/"previous" links, so every
/// number is considered rather than a fixed position.
pub fn max_page_number(html: &str, selector: &str) -> Result<Option<u32>, SelectorError> {
    let selector = parse_selector(selector)?;
    let digits = Regex::new(r"\d+").map_err(|err| SelectorError {
        selector: r"\d+".to_string(),
        message: err.to_string(),
    })?;
    let doc = Html::parse_document(html);
    Ok(doc
        .select(&selector)
        .flat_map(|element| {
            let text = element.text().collect::<String>();
            digits
                .find_iter(&text)
                .filter_map(|m| m.as_str().parse::<u32>().ok())
                .collect::<Vec<_>>()
        })
        .max())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_page_ignores_next_link() {
        let html = r#"<div class="page-numbers">
            <a href="?page=1"><div class="page-no-bx">1</div></a>
            <a href="?page=2"><div class="page-no-bx">2</div></a>
            <a href="?page=84"><div class="page-no-bx">84</div></a>
            <a href="?page=2">Next</a>
        </div>"#;
        assert_eq!(max_page_number(html, "div.page-numbers a").unwrap(), Some(84));
    }

    #[test]
    fn missing_control_yields_none() {
        assert_eq!(max_page_number("<p>empty</p>", "div.page-buttons a").unwrap(), None);
    }

    #[tokio::test]
    async fn empty_category_set_fails_discovery() {
        let discovery = CategoryDiscovery::new("shop", &CategoryTree::default(), &[], CategoryDepth::L3);
        let err = discovery.discover().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Empty { .. }));
    }
}
