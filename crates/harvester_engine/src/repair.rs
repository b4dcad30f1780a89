//! Locating and repairing JSON-like objects embedded in page scripts.
//!
//! Analytics snippets are written as script literals rather than JSON: keys
//! are bare identifiers, strings may use single quotes, lists may end with a
//! trailing comma, text is HTML-escaped and values may be host-language
//! literals such as `None`. [`repair`] rewrites such a fragment into JSON
//! without touching the content of string literals.

use regex::Regex;
use serde_json::Value;

/// Characters kept on each side of a parse error offset.
pub const SNIPPET_WINDOW: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct RepairError {
    pub message: String,
    /// Byte offset into the repaired text.
    pub offset: usize,
    /// Up to [`SNIPPET_WINDOW`] characters either side of `offset`.
    pub snippet: String,
}

/// Returns the balanced `{...}` object that starts at the first `{` after
/// the first match of `anchor`.
///
/// Braces inside string literals (either quote style) are ignored.
pub fn locate_fragment<'a>(text: &'a str, anchor: &Regex) -> Option<&'a str> {
    let found = anchor.find(text)?;
    let start = found.end() + text[found.end()..].find('{')?;

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, ch) in text[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + idx + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decodes the HTML entities analytics templates emit. `&amp;` goes last so
/// `&amp;gt;` stays a literal `&gt;`.
pub fn decode_entities(text: &str) -> String {
    text.replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

/// Rewrites a script-literal object into JSON text.
pub fn repair(fragment: &str) -> String {
    let decoded = decode_entities(fragment);
    let chars: Vec<char> = decoded.chars().collect();
    let mut out = String::with_capacity(decoded.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '"' => i = copy_double_quoted(&chars, i, &mut out),
            '\'' => i = convert_single_quoted(&chars, i, &mut out),
            ',' => {
                if !matches!(next_significant(&chars, i + 1), Some('}') | Some(']')) {
                    out.push(',');
                }
                i += 1;
            }
            c if c.is_ascii_digit() || c == '-' => {
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || matches!(chars[i], '-' | '+' | '.' | 'e' | 'E'))
                {
                    out.push(chars[i]);
                    i += 1;
                }
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_part(chars[i]) {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                if next_significant(&chars, i) == Some(':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(literal_for(&ident));
                }
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }
    out
}

/// Repairs `fragment` and parses it.
pub fn parse_embedded(fragment: &str) -> Result<Value, RepairError> {
    let repaired = repair(fragment);
    serde_json::from_str(&repaired).map_err(|err| {
        let offset = offset_of(&repaired, err.line(), err.column());
        RepairError {
            message: err.to_string(),
            offset,
            snippet: snippet_around(&repaired, offset, SNIPPET_WINDOW).to_string(),
        }
    })
}

/// Slice of `text` covering up to `window` characters before and after `offset`.
pub fn snippet_around(text: &str, offset: usize, window: usize) -> &str {
    let offset = floor_char_boundary(text, offset.min(text.len()));
    let start = text[..offset]
        .char_indices()
        .rev()
        .nth(window.saturating_sub(1))
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    let end = text[offset..]
        .char_indices()
        .nth(window)
        .map(|(idx, _)| offset + idx)
        .unwrap_or(text.len());
    &text[start..end]
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Converts serde_json's 1-based line/column into a byte offset.
fn offset_of(text: &str, line: usize, column: usize) -> usize {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (line_start + column.saturating_sub(1)).min(text.len())
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from.min(chars.len())..]
        .iter()
        .copied()
        .find(|c| !c.is_whitespace())
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn literal_for(ident: &str) -> &str {
    match ident {
        "None" | "undefined" | "NaN" => "null",
        "True" => "true",
        "False" => "false",
        other => other,
    }
}

fn copy_double_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        i += 1;
        match c {
            '\\' if i < chars.len() => {
                out.push(chars[i]);
                i += 1;
            }
            '"' => return i,
            _ => {}
        }
    }
    i
}

fn convert_single_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '\\' if i < chars.len() => {
                let next = chars[i];
                i += 1;
                if next == '\'' {
                    out.push('\'');
                } else {
                    out.push('\\');
                    out.push(next);
                }
            }
            '"' => out.push_str("\\\""),
            '\'' => {
                out.push('"');
                return i;
            }
            other => out.push(other),
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn bare_keys_entities_and_native_null() {
        let value = parse_embedded(r#"{name: "A &amp; B", price: None}"#).unwrap();
        assert_eq!(value, json!({"name": "A & B", "price": null}));
    }

    #[test]
    fn indented_analytics_block() {
        let fragment = r#"{
            currency: "AED",
            items: [
                {
                    item_id: "6291",
                    item_name: "Milk &gt; Fresh",
                    price: 7.5,
                    discount: None,
                    in_stock: True,
                },
            ],
        }"#;
        let value = parse_embedded(fragment).unwrap();
        assert_eq!(value["items"][0]["item_name"], "Milk > Fresh");
        assert_eq!(value["items"][0]["in_stock"], true);
        assert_eq!(value["items"][0]["discount"], Value::Null);
        assert_eq!(value["items"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn single_quoted_strings_become_json_strings() {
        let value = parse_embedded(r#"{'name': 'Tea "Gold"', 'brand': 'O\'Neil'}"#).unwrap();
        assert_eq!(value, json!({"name": "Tea \"Gold\"", "brand": "O'Neil"}));
    }

    #[test]
    fn string_content_is_not_rewritten() {
        let value = parse_embedded(r#"{url: "https://x.example/a, b: None", n: -1.5e2}"#).unwrap();
        assert_eq!(value, json!({"url": "https://x.example/a, b: None", "n": -150.0}));
    }

    #[test]
    fn fragment_is_located_by_balanced_braces() {
        let script = r#"window.dataLayer = []; dataLayer.push({event: "x", ecommerce: {impressions: [{id: "}"}]}}); other({});"#;
        let anchor = Regex::new(r"dataLayer\.push\(").unwrap();
        let fragment = locate_fragment(script, &anchor).unwrap();
        assert_eq!(
            fragment,
            r#"{event: "x", ecommerce: {impressions: [{id: "}"}]}}"#
        );
    }

    #[test]
    fn unterminated_fragment_is_not_located() {
        let anchor = Regex::new("\"ecommerce\":").unwrap();
        assert!(locate_fragment(r#""ecommerce": {items: ["#, &anchor).is_none());
        assert!(locate_fragment("no anchor here", &anchor).is_none());
    }

    #[test]
    fn parse_error_carries_bounded_snippet() {
        let padding = "x".repeat(300);
        let fragment = format!(r#"{{a: "{padding}", b: @@@, c: "{padding}"}}"#);
        let err = parse_embedded(&fragment).unwrap_err();
        assert!(err.snippet.contains("@@@"));
        assert!(err.snippet.chars().count() <= 2 * SNIPPET_WINDOW);
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let text = "ééééé";
        assert_eq!(snippet_around(text, 3, 1), "éé");
        assert_eq!(snippet_around(text, 100, 2), "éé");
    }
}
