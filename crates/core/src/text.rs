//! Small text helpers shared by identity normalization and draft staging.

use serde_json::Value;

pub fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Strings (non-blank, trimmed) and numbers rendered as text; everything else is absent.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => non_blank(raw),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

pub fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(scalar_text)
}

pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Collapsed, capitalized text without a trailing period. `None` when blank.
pub fn headline(value: &str) -> Option<String> {
    let collapsed = collapse_whitespace(value);
    (!collapsed.is_empty()).then(|| capitalize_first(&collapsed))
}

/// Collapsed, capitalized text ending in terminal punctuation. `None` when blank.
pub fn sentence(value: &str) -> Option<String> {
    let mut text = headline(value)?;
    if !text.ends_with(['.', '!', '?']) {
        text.push('.');
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{headline, scalar_text, sentence};

    #[test]
    fn headline_collapses_and_capitalizes() {
        assert_eq!(headline("  replace   pump seals  ").as_deref(), Some("Replace pump seals"));
        assert_eq!(headline("   "), None);
    }

    #[test]
    fn sentence_adds_period_once() {
        assert_eq!(
            sentence("inspect and replace seals as needed").as_deref(),
            Some("Inspect and replace seals as needed.")
        );
        assert_eq!(sentence("Done already.").as_deref(), Some("Done already."));
        assert_eq!(sentence("is it leaking?").as_deref(), Some("Is it leaking?"));
    }

    #[test]
    fn scalar_text_accepts_strings_and_numbers_only() {
        assert_eq!(scalar_text(&json!(12)).as_deref(), Some("12"));
        assert_eq!(scalar_text(&json!(" WO-1 ")).as_deref(), Some("WO-1"));
        assert_eq!(scalar_text(&json!(null)), None);
        assert_eq!(scalar_text(&json!({"id": 1})), None);
    }
}
