//! Response extraction: turns raw model output into JSON objects or clean markup.
//!
//! Models often wrap answers in markdown fences or return a full HTML page when only
//! the body fragment is wanted. Both modes strip the fences first.

use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// Max characters of raw model output carried in a `ParseError`.
pub const RAW_PREVIEW_CHARS: usize = 500;

/// The model answered, but the answer could not be interpreted.
#[derive(Debug, Clone, Error)]
#[error("failed to process {stage}: {reason}. Raw response: {raw_preview}...")]
pub struct ParseError {
    pub stage: String,
    pub reason: String,
    pub raw_preview: String,
}

impl ParseError {
    pub fn new(stage: &str, reason: impl Into<String>, raw: &str) -> Self {
        Self {
            stage: stage.to_string(),
            reason: reason.into(),
            raw_preview: char_prefix(raw, RAW_PREVIEW_CHARS).to_string(),
        }
    }
}

/// Returns at most `max_chars` characters of `text`, cut on a char boundary.
pub fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Removes every ``` fence marker from model output, together with a `json`/`html`
/// (or other single-word) info string on the opening line.
///
/// Markers anywhere in the text are dropped, not only a leading and a trailing one, so
/// prose the model adds around a fenced block never leaves stray backticks behind.
pub fn strip_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find("```") {
        out.push_str(&rest[..idx]);
        rest = skip_fence_tail(&rest[idx + 3..]);
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Skips the info string and the line break that follow a fence marker.
fn skip_fence_tail(after: &str) -> &str {
    let word_len = after
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(after.len());
    let (word, tail) = after.split_at(word_len);
    let tail_line = tail.trim_start_matches([' ', '\t', '\r']);

    let is_info_string = word.eq_ignore_ascii_case("json")
        || word.eq_ignore_ascii_case("html")
        || (!word.is_empty() && (tail_line.is_empty() || tail_line.starts_with('\n')));

    if !word.is_empty() && !is_info_string {
        // Text glued to a closing fence is kept.
        return after;
    }
    tail_line.strip_prefix('\n').unwrap_or(tail_line)
}

/// Structured-data mode: fence-stripped text parsed as a JSON object.
pub fn parse_object(text: &str, stage: &str) -> Result<Map<String, Value>, ParseError> {
    let cleaned = strip_fences(text);
    if cleaned.is_empty() {
        return Err(ParseError::new(stage, "empty response", text));
    }

    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| ParseError::new(stage, format!("invalid JSON: {e}"), text))?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(ParseError::new(
            stage,
            format!("expected a JSON object, got {}", json_kind(&other)),
            text,
        )),
    }
}

/// Structured-data mode followed by typed deserialization.
pub fn parse_typed<T: DeserializeOwned>(text: &str, stage: &str) -> Result<T, ParseError> {
    let map = parse_object(text, stage)?;
    serde_json::from_value(Value::Object(map))
        .map_err(|e| ParseError::new(stage, format!("unexpected response shape: {e}"), text))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Markup-cleaning mode.
///
/// If the answer is a full page with a `<body>`, only the body's inner HTML is kept.
/// Fragments without a body are returned as-is (after fence stripping), so callers
/// must accept both shapes.
pub fn clean_markup(text: &str) -> String {
    let cleaned = strip_fences(text);
    if !has_body_element(&cleaned) {
        return cleaned;
    }

    let document = Html::parse_document(&cleaned);
    let Ok(selector) = Selector::parse("body") else {
        return cleaned;
    };

    let body = document
        .select(&selector)
        .next()
        .map(|body| body.inner_html().trim().to_string());
    body.unwrap_or(cleaned)
}

/// The parser always synthesizes a body, so presence is checked on the raw text.
fn has_body_element(markup: &str) -> bool {
    let lower = markup.to_ascii_lowercase();
    lower.match_indices("<body").any(|(idx, tag)| {
        matches!(
            lower[idx + tag.len()..].chars().next(),
            Some('>') | Some('/') | Some(' ') | Some('\t') | Some('\n') | Some('\r')
        )
    })
}

/// Renders markup as plain text: tags dropped, blank lines collapsed.
pub fn markup_to_text(text: &str) -> String {
    let fragment = Html::parse_fragment(&strip_fences(text));
    let raw: String = fragment.root_element().text().collect();

    let mut lines: Vec<&str> = Vec::new();
    for line in raw.lines().map(str::trim) {
        if line.is_empty() && lines.last().map_or(true, |last| last.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|last| last.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_fences_single_line() {
        assert_eq!(strip_fences("```json{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn test_strip_fences_no_fences() {
        let input = "  {\"key\": \"value\"}\n";
        assert_eq!(strip_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_fences_inside_prose_are_all_removed() {
        let input = "Here is the article:\n```html\n<h1>Titlu</h1>\n```\nHope this helps!";
        let cleaned = clean_markup(input);
        assert!(!cleaned.contains("```"));
        assert!(cleaned.contains("<h1>Titlu</h1>"));

        let trailing = "```html\n<p>Text</p>\n```\n\nNote: edit as needed.";
        assert_eq!(strip_fences(trailing), "<p>Text</p>\n\nNote: edit as needed.");
    }

    #[test]
    fn test_fenced_and_plain_objects_parse_identically() {
        let plain = r#"{"finalSubject": "Stresul", "keywords": ["a", "b"], "n": 3}"#;
        let fenced = format!("```json\n{plain}\n```");
        assert_eq!(
            parse_object(plain, "Stage 1").unwrap(),
            parse_object(&fenced, "Stage 1").unwrap()
        );
    }

    #[test]
    fn test_empty_after_stripping_is_an_error() {
        let err = parse_object("```json\n```", "Stage 2").unwrap_err();
        assert_eq!(err.stage, "Stage 2");
        assert!(err.to_string().contains("Stage 2"));
        assert!(err.reason.contains("empty"));
    }

    #[test]
    fn test_non_object_json_is_rejected() {
        let err = parse_object("[1, 2, 3]", "Stage 3").unwrap_err();
        assert!(err.reason.contains("array"));
        assert_eq!(err.raw_preview, "[1, 2, 3]");
    }

    #[test]
    fn test_invalid_json_error_carries_bounded_preview() {
        let raw = format!("{{ broken {}", "x".repeat(2000));
        let err = parse_object(&raw, "Stage 5").unwrap_err();
        assert_eq!(err.raw_preview.chars().count(), RAW_PREVIEW_CHARS);
        assert!(err.to_string().starts_with("failed to process Stage 5"));
    }

    #[test]
    fn test_preview_cuts_on_char_boundary() {
        let raw = "ă".repeat(600);
        let err = ParseError::new("Stage 1", "bad", &raw);
        assert_eq!(err.raw_preview.chars().count(), RAW_PREVIEW_CHARS);
    }

    #[test]
    fn test_parse_typed_reports_shape_mismatch() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Needs {
            required: String,
        }
        let err = parse_typed::<Needs>(r#"{"other": 1}"#, "Stage 1").unwrap_err();
        assert!(err.reason.contains("required"));
    }

    #[test]
    fn test_fragment_without_body_is_returned_unchanged() {
        let fragment = "<h2 id=\"section-1\">Intro</h2><p>Text &amp; more</p>";
        assert_eq!(clean_markup(fragment), fragment);
        assert_eq!(clean_markup(&format!("```html\n{fragment}\n```")), fragment);
    }

    #[test]
    fn test_full_document_is_reduced_to_body_contents() {
        let page = "<!DOCTYPE html><html><head><title>T</title><style>p{}</style></head>\
                    <body><h1>Titlu</h1><p>Paragraf</p></body></html>";
        let cleaned = clean_markup(&format!("```html\n{page}\n```"));
        assert_eq!(cleaned, "<h1>Titlu</h1><p>Paragraf</p>");
    }

    #[test]
    fn test_body_detection_ignores_lookalike_tags() {
        assert!(has_body_element("<BODY class=\"x\">"));
        assert!(!has_body_element("<bodytext>nope</bodytext>"));
    }

    #[test]
    fn test_markup_to_text_drops_tags() {
        let text = markup_to_text("```html\n<p>Rezumat <strong>scurt</strong></p>\n\n\n<p>Final</p>\n```");
        assert!(!text.contains('<'));
        assert!(text.contains("Rezumat scurt"));
        assert!(text.contains("Final"));
    }

    #[test]
    fn test_markup_to_text_keeps_plain_text() {
        assert_eq!(markup_to_text("Doar text simplu."), "Doar text simplu.");
    }
}
