//! Tolerant parsing of JSON replies from the model.

use serde::de::DeserializeOwned;

/// Drop markdown code fence lines (```json ... ```).
pub fn strip_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    trimmed
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Parse a model reply as `T`.
///
/// Tries the fence-stripped text first, then the outermost `{...}` span, so
/// a reply with a sentence before or after the object still parses.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    let text = strip_fences(raw);
    match serde_json::from_str(&text) {
        Ok(value) => Ok(value),
        Err(first) => match (text.find('{'), text.rfind('}')) {
            (Some(start), Some(end)) if start < end => serde_json::from_str(&text[start..=end]),
            _ => Err(first),
        },
    }
}
