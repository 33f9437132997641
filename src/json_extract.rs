//! Best-effort recovery of a JSON object from free-form model output.
//!
//! Models are asked for bare JSON but routinely wrap it in prose or markdown
//! fences. Each [`Strategy`] is tried in [`STRATEGIES`] order until one yields
//! a JSON object.

use serde_json::{Map, Value};

pub type JsonObject = Map<String, Value>;

const BOILERPLATE_PREFIXES: [&str; 7] = [
    "Here is the analysis:",
    "Analysis:",
    "JSON:",
    "```json",
    "```",
    "Response:",
    "Result:",
];

const BOILERPLATE_SUFFIXES: [&str; 5] = ["```", "End of analysis", "Analysis complete", "End", "Complete"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Span from the first `{` to the last `}`.
    BraceSpan,
    /// Contents of a ```` ``` ```` / ```` ```json ```` fenced block.
    FencedBlock,
    /// Whole text after stripping known prefixes and suffixes.
    StripBoilerplate,
}

pub const STRATEGIES: [Strategy; 3] = [
    Strategy::BraceSpan,
    Strategy::FencedBlock,
    Strategy::StripBoilerplate,
];

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::BraceSpan => "brace span",
            Strategy::FencedBlock => "fenced block",
            Strategy::StripBoilerplate => "boilerplate strip",
        }
    }

    pub fn extract(self, text: &str) -> Option<JsonObject> {
        match self {
            Strategy::BraceSpan => brace_span(text),
            Strategy::FencedBlock => fenced_block(text),
            Strategy::StripBoilerplate => strip_boilerplate(text),
        }
    }
}

/// First strategy that recovers a JSON object, along with which one it was.
pub fn extract_object(text: &str) -> Option<(Strategy, JsonObject)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    STRATEGIES.into_iter().find_map(|strategy| {
        let object = strategy.extract(text)?;
        tracing::debug!("Parsed model JSON using {} extraction", strategy.name());
        Some((strategy, object))
    })
}

/// Numeric field, or `None` when absent or not a number.
pub fn number(object: &JsonObject, key: &str) -> Option<f64> {
    object.get(key).and_then(Value::as_f64)
}

/// Non-empty string field.
pub fn text(object: &JsonObject, key: &str) -> Option<String> {
    match object.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Array field with its string elements; non-string elements are dropped.
pub fn string_list(object: &JsonObject, key: &str) -> Option<Vec<String>> {
    let items = object.get(key)?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
    )
}

fn parse_object(candidate: &str) -> Option<JsonObject> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            tracing::trace!("JSON candidate rejected: {}", e);
            None
        }
    }
}

fn brace_span(text: &str) -> Option<JsonObject> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_object(&text[start..=end])
}

fn fenced_block(text: &str) -> Option<JsonObject> {
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        let body_start = after_open
            .strip_prefix("json")
            .or_else(|| after_open.strip_prefix("JSON"))
            .unwrap_or(after_open);
        let close = body_start.find("```")?;
        let body = body_start[..close].trim();
        if body.starts_with('{') && body.ends_with('}') {
            if let Some(object) = parse_object(body) {
                return Some(object);
            }
        }
        rest = &body_start[close + 3..];
    }
    None
}

fn strip_boilerplate(text: &str) -> Option<JsonObject> {
    let mut cleaned = text.trim();
    for prefix in BOILERPLATE_PREFIXES {
        if let Some(stripped) = cleaned.strip_prefix(prefix) {
            cleaned = stripped.trim();
        }
    }
    for suffix in BOILERPLATE_SUFFIXES {
        if let Some(stripped) = cleaned.strip_suffix(suffix) {
            cleaned = stripped.trim();
        }
    }
    parse_object(cleaned)
}
