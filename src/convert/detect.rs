use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::Format;
use crate::core::Confidence;

/// Markup signatures, checked in order; every match is reported.
static MARKUP_SIGNATURES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("heading", r"(?m)^h[1-6]\.\s"),
        ("bold", r"\*\S[^*\n]*\*"),
        ("italic", r"(?:^|[\s(])_\S[^_\n]*_"),
        ("inline_code", r"\{\{[^}]+\}\}"),
        ("code_block", r"\{code(:[^}]*)?\}"),
        ("quote", r"\{quote\}"),
        ("bullet_list", r"(?m)^\*+\s"),
        ("numbered_list", r"(?m)^#+\s"),
        ("mention", r"\[~[^\]]+\]"),
        ("link", r"\[[^\]]+\|[^\]]+\]"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).unwrap()))
    .collect()
});

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[a-zA-Z][^>]*>").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatDetection {
    pub format: Format,
    pub confidence: Confidence,
    /// Names of the signatures that matched
    pub indicators: Vec<String>,
}

/// True when `value` has the shape of a document root.
pub fn is_document_value(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    let kind = object
        .get("kind")
        .or_else(|| object.get("type"))
        .and_then(Value::as_str);
    let has_children = object
        .get("children")
        .or_else(|| object.get("content"))
        .is_some_and(Value::is_array);

    matches!(kind, Some("doc" | "document")) && has_children
}

/// Guess the format of `input`.
pub fn detect_format(input: &str) -> FormatDetection {
    let trimmed = input.trim();

    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            if is_document_value(&value) {
                return FormatDetection {
                    format: Format::Document,
                    confidence: Confidence::High,
                    indicators: vec!["document_root".to_string()],
                };
            }
        }
    }

    let indicators: Vec<String> = MARKUP_SIGNATURES
        .iter()
        .filter(|(_, pattern)| pattern.is_match(input))
        .map(|(name, _)| name.to_string())
        .collect();

    if !indicators.is_empty() {
        let confidence = match indicators.len() {
            1 => Confidence::Low,
            2 => Confidence::Medium,
            _ => Confidence::High,
        };
        return FormatDetection {
            format: Format::Markup,
            confidence,
            indicators,
        };
    }

    if HTML_TAG.is_match(input) {
        return FormatDetection {
            format: Format::Html,
            confidence: Confidence::Medium,
            indicators: vec!["html_tag".to_string()],
        };
    }

    FormatDetection {
        format: Format::Plain,
        confidence: Confidence::Low,
        indicators: Vec::new(),
    }
}
