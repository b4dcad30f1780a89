//! Retailer category tree, flattened to `(L1, L2, L3)` rows.

use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use crate::{FetchError, HarvestContext};

#[derive(Debug, Error)]
pub enum CategoryTreeError {
    #[error("reading menu file: {0}")]
    Io(#[from] std::io::Error),
    #[error("menu is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("menu has unexpected shape: {0}")]
    Shape(String),
    #[error("fetching menu: {0}")]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryNode {
    pub id: String,
    pub name: String,
}

/// One leaf path through the menu. Lower levels are absent when the menu
/// stops early under a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRow {
    pub l1: CategoryNode,
    pub l2: Option<CategoryNode>,
    pub l3: Option<CategoryNode>,
}

/// Which level of the tree becomes a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryDepth {
    L2,
    L3,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryTree {
    rows: Vec<CategoryRow>,
}

impl CategoryTree {
    /// Flattens the menu endpoint payload: `[ { children: [L1, ...] } ]`.
    pub fn from_menu_json(menu: &Value) -> Result<Self, CategoryTreeError> {
        let roots = menu
            .as_array()
            .and_then(|roots| roots.first())
            .and_then(|root| root.get("children"))
            .and_then(Value::as_array)
            .ok_or_else(|| CategoryTreeError::Shape("expected [ { children: [...] } ]".into()))?;

        let mut rows = Vec::new();
        for l1 in roots {
            let l1_node = node(l1)?;
            let l2_children = children(l1);
            if l2_children.is_empty() {
                rows.push(CategoryRow {
                    l1: l1_node,
                    l2: None,
                    l3: None,
                });
                continue;
            }
            for l2 in l2_children {
                let l2_node = node(l2)?;
                let l3_children = children(l2);
                if l3_children.is_empty() {
                    rows.push(CategoryRow {
                        l1: l1_node.clone(),
                        l2: Some(l2_node),
                        l3: None,
                    });
                    continue;
                }
                for l3 in l3_children {
                    rows.push(CategoryRow {
                        l1: l1_node.clone(),
                        l2: Some(l2_node.clone()),
                        l3: Some(node(l3)?),
                    });
                }
            }
        }
        Ok(Self { rows })
    }

    /// Loads a stored menu payload.
    pub fn load(path: &Path) -> Result<Self, CategoryTreeError> {
        let text = std::fs::read_to_string(path)?;
        let menu: Value = serde_json::from_str(&text)?;
        Self::from_menu_json(&menu)
    }

    /// Fetches the live menu; returns the raw payload alongside the tree so
    /// callers can store it for later [`CategoryTree::load`] calls.
    pub async fn fetch(ctx: &HarvestContext, menu_url: &str) -> Result<(Self, Value), CategoryTreeError> {
        let request = ctx.request(menu_url, &[])?;
        let output = ctx.get(&request).await?;
        let menu: Value = serde_json::from_str(&output.text)?;
        let tree = Self::from_menu_json(&menu)?;
        Ok((tree, menu))
    }

    pub fn rows(&self) -> &[CategoryRow] {
        &self.rows
    }

    /// Distinct category ids at `depth` under the given L1 ids, first-seen
    /// order. A branch that stops above `depth` contributes its deepest node.
    pub fn subcategories(&self, top_level: &[String], depth: CategoryDepth) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.rows
            .iter()
            .filter(|row| top_level.iter().any(|id| *id == row.l1.id))
            .map(|row| {
                let deepest = match depth {
                    CategoryDepth::L3 => row.l3.as_ref().or(row.l2.as_ref()),
                    CategoryDepth::L2 => row.l2.as_ref(),
                };
                deepest.unwrap_or(&row.l1).id.clone()
            })
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }
}

fn node(value: &Value) -> Result<CategoryNode, CategoryTreeError> {
    let id = match value.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(CategoryTreeError::Shape(format!("category without id: {value}"))),
    };
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(CategoryNode { id, name })
}

fn children(value: &Value) -> &[Value] {
    value
        .get("children")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
