//! Product rows read from the rendered listing grid.

use engine_logging::engine_warn;
use harvester_core::{merge_records, RawRecord};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

/// CSS selectors for one retailer's product grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridProfile {
    /// Matches one element per product tile.
    pub item: String,
    /// Anchor holding the product name and link, relative to the tile.
    pub name_link: String,
    pub price: String,
    pub quantity: String,
    /// Tile attribute carrying the product id, when the markup exposes one.
    pub key_attribute: Option<String>,
}

impl GridProfile {
    pub fn new(item: &str, name_link: &str, price: &str, quantity: &str) -> Self {
        Self {
            item: item.to_string(),
            name_link: name_link.to_string(),
            price: price.to_string(),
            quantity: quantity.to_string(),
            key_attribute: None,
        }
    }

    pub fn with_key_attribute(mut self, attribute: &str) -> Self {
        self.key_attribute = Some(attribute.to_string());
        self
    }
}

/// One grid tile. Missing fields are left out of [`GridRow::into_record`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridRow {
    pub key: Option<String>,
    pub name: Option<String>,
    pub link: Option<String>,
    pub price: Option<String>,
    pub quantity: Option<String>,
}

impl GridRow {
    pub fn into_record(self) -> RawRecord {
        let mut record = RawRecord::new();
        let fields = [
            ("item_name", self.name),
            ("item_link", self.link),
            ("item_price", self.price),
            ("item_quantity", self.quantity),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                record.insert(key.to_string(), Value::String(value));
            }
        }
        record
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid grid selector {selector:?}: {message}")]
pub struct SelectorError {
    pub selector: String,
    pub message: String,
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector, SelectorError> {
    Selector::parse(selector).map_err(|err| SelectorError {
        selector: selector.to_string(),
        message: err.to_string(),
    })
}

/// Reads every product tile from `doc`, in document order.
pub fn extract_rows(doc: &Html, profile: &GridProfile) -> Result<Vec<GridRow>, SelectorError> {
    let item = parse_selector(&profile.item)?;
    let name_link = parse_selector(&profile.name_link)?;
    let price = parse_selector(&profile.price)?;
    let quantity = parse_selector(&profile.quantity)?;

    Ok(doc
        .select(&item)
        .map(|tile| {
            let anchor = tile.select(&name_link).next();
            GridRow {
                key: profile
                    .key_attribute
                    .as_deref()
                    .and_then(|attr| tile.value().attr(attr))
                    .map(|value| value.trim().to_string()),
                name: anchor.map(element_text),
                link: anchor
                    .and_then(|a| a.value().attr("href"))
                    .map(str::to_string),
                price: tile.select(&price).next().map(element_text),
                quantity: tile.select(&quantity).next().map(element_text),
            }
        })
        .collect())
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Joins script records with grid rows.
///
/// With `script_key` set and grid keys present, rows are matched by key and
/// script records without a matching tile are kept as they are. Otherwise the
/// two lists are zipped by position; surplus entries on either side are
/// dropped with a warning.
pub fn correlate(
    label: &str,
    script: Vec<RawRecord>,
    rows: Vec<GridRow>,
    script_key: Option<&str>,
) -> Vec<RawRecord> {
    let keyed = script_key.filter(|_| !rows.is_empty() && rows.iter().all(|row| row.key.is_some()));
    if let Some(field) = keyed {
        let mut rows = rows;
        return script
            .into_iter()
            .map(|record| {
                let id = record.get(field).and_then(key_text);
                let position = id.and_then(|id| {
                    rows.iter()
                        .position(|row| row.key.as_deref() == Some(id.as_str()))
                });
                match position {
                    Some(idx) => merge_records(record, rows.swap_remove(idx).into_record()),
                    None => record,
                }
            })
            .collect();
    }

    if script.len() != rows.len() {
        engine_warn!(
            "[{}] script lists {} items but grid shows {} tiles; zipping the first {}",
            label,
            script.len(),
            rows.len(),
            script.len().min(rows.len())
        );
    }
    script
        .into_iter()
        .zip(rows)
        .map(|(record, row)| merge_records(record, row.into_record()))
        .collect()
}

fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const GRID: &str = r#"
        <div class="arc-grid">
          <div class="js-product-wrapper product-bx" data-id="11">
            <div class="product-info">
              <p class="product-name"><a href="/p/milk">Milk</a></p>
              <p class="product-price"><span class="price">AED 7.50</span><span class="quantity"> 1L </span></p>
            </div>
          </div>
          <div class="js-product-wrapper product-bx" data-id="22">
            <div class="product-info">
              <p class="product-name"><a href="/p/tea">Tea</a></p>
              <p class="product-price"><span class="price">AED 12.00</span></p>
            </div>
          </div>
        </div>"#;

    fn profile() -> GridProfile {
        GridProfile::new(
            "div.arc-grid div.js-product-wrapper.product-bx",
            "div.product-info p.product-name a",
            "p.product-price span.price",
            "p.product-price span.quantity",
        )
    }

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn rows_follow_document_order() {
        let doc = Html::parse_document(GRID);
        let rows = extract_rows(&doc, &profile()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name.as_deref(), Some("Milk"));
        assert_eq!(rows[0].link.as_deref(), Some("/p/milk"));
        assert_eq!(rows[0].quantity.as_deref(), Some("1L"));
        assert_eq!(rows[1].quantity, None);
    }

    #[test]
    fn positional_zip_merges_grid_over_script() {
        let doc = Html::parse_document(GRID);
        let rows = extract_rows(&doc, &profile()).unwrap();
        let script = vec![record(json!({"id": "11"})), record(json!({"id": "22"}))];
        let merged = correlate("test", script, rows, None);
        assert_eq!(merged[1]["item_name"], "Tea");
        assert_eq!(merged[1]["id"], "22");
    }

    #[test]
    fn keyed_join_ignores_order() {
        let doc = Html::parse_document(GRID);
        let rows = extract_rows(&doc, &profile().with_key_attribute("data-id")).unwrap();
        let script = vec![
            record(json!({"id": 22})),
            record(json!({"id": "11"})),
            record(json!({"id": "33"})),
        ];
        let merged = correlate("test", script, rows, Some("id"));
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0]["item_name"], "Tea");
        assert_eq!(merged[1]["item_name"], "Milk");
        assert!(!merged[2].contains_key("item_name"));
    }

    #[test]
    fn length_mismatch_keeps_shorter_side() {
        let script = vec![record(json!({"id": "1"}))];
        let rows = vec![GridRow::default(), GridRow::default()];
        assert_eq!(correlate("test", script, rows, None).len(), 1);
    }
}
