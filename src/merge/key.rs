//! Composite keys shared by the portal export and the order sheet.

/// Trim, drop ASCII/ideographic spaces and newlines, and expand scientific
/// notation (`"1.23E+5"` → `"123000"`). Applying it twice changes nothing.
pub fn normalize_key_part(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{3000}' | '\n' | '\r'))
        .collect();

    if cleaned.contains(|c: char| c == 'e' || c == 'E') {
        if let Ok(value) = cleaned.parse::<f64>() {
            if value.is_finite() {
                return format!("{:.0}", value);
            }
        }
    }

    cleaned
}

/// Concatenate the normalized parts
pub fn build_key<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    parts.into_iter().map(normalize_key_part).collect()
}
