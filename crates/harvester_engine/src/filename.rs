/// Portable artifact name: `{retailer}.json` or `{retailer}_{unit}.json`.
pub fn artifact_filename(retailer: &str, unit: Option<&str>) -> String {
    match unit {
        Some(unit) => format!("{}_{}.json", sanitize(retailer), sanitize(unit)),
        None => format!("{}.json", sanitize(retailer)),
    }
}

fn sanitize(input: &str) -> String {
    let mut cleaned = String::with_capacity(input.len());
    let mut prev_underscore = false;
    for c in input.chars() {
        let c = if is_forbidden(c) || c.is_whitespace() { '_' } else { c };
        if c == '_' && prev_underscore {
            continue;
        }
        prev_underscore = c == '_';
        cleaned.push(c);
    }
    let mut cleaned = cleaned.trim_matches(&['_', '.'][..]).to_string();
    if cleaned.is_empty() {
        cleaned = "unnamed".to_string();
    }
    if cleaned.len() > 80 {
        let cut = (0..=80).rev().find(|&i| cleaned.is_char_boundary(i)).unwrap_or(0);
        cleaned.truncate(cut);
    }
    if is_reserved_windows_name(&cleaned) {
        cleaned.push('_');
    }
    cleaned
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}
