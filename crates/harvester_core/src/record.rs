use serde_json::{Map, Value};

/// A product row exactly as extracted, keys in source order.
pub type RawRecord = Map<String, Value>;

/// Converts a JSON array of objects into records, skipping non-object entries.
///
/// Returns `None` when `value` is not an array.
pub fn records_from_array(value: &Value) -> Option<Vec<RawRecord>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| item.as_object().cloned())
            .collect(),
    )
}

/// Merges `overlay` into `base`; keys present in both take the overlay value.
pub fn merge_records(mut base: RawRecord, overlay: RawRecord) -> RawRecord {
    for (key, value) in overlay {
        base.insert(key, value);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn array_entries_that_are_not_objects_are_dropped() {
        let records = records_from_array(&json!([{"a": 1}, 3, "x", {"b": 2}])).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records_from_array(&json!({"a": 1})).is_none());
    }

    #[test]
    fn overlay_wins_and_key_order_is_kept() {
        let base = json!({"id": "1", "price": "2.00"}).as_object().cloned().unwrap();
        let overlay = json!({"price": "3.00", "name": "Milk"})
            .as_object()
            .cloned()
            .unwrap();
        let merged = merge_records(base, overlay);
        let keys: Vec<_> = merged.keys().cloned().collect();
        assert_eq!(keys, vec!["id", "price", "name"]);
        assert_eq!(merged["price"], "3.00");
    }
}
