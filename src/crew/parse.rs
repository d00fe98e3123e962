//! Result parsing
//!
//! Agent output is free text that is often JSON. Parsing never fails: text
//! that is not JSON is represented by the canonical fallback shape.

use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

/// Outcome of parsing raw agent output
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    Structured(Value),
    Fallback(Value),
}

impl ParsedOutput {
    pub fn into_value(self) -> Value {
        match self {
            ParsedOutput::Structured(v) | ParsedOutput::Fallback(v) => v,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ParsedOutput::Structured(_))
    }
}

fn fenced_json() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n?```").expect("static regex"))
}

/// Parse `raw` as JSON: the whole text first, then each fenced code block
/// in order, keeping the first one that is valid JSON. Returns `None` when
/// nothing parses.
pub fn parse_structured(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    fenced_json()
        .captures_iter(trimmed)
        .filter_map(|caps| caps.get(1))
        .find_map(|body| serde_json::from_str::<Value>(body.as_str().trim()).ok())
}

/// Canonical shape for output that did not parse
pub fn canonical_fallback(raw: &str) -> Value {
    json!({
        "filesToModify": [],
        "frameworkConsiderations": [],
        "dependencies": [],
        "rawAnalysis": raw,
    })
}

/// Total parse: structured when possible, fallback otherwise
pub fn parse_output(raw: &str) -> ParsedOutput {
    match parse_structured(raw) {
        Some(value) => ParsedOutput::Structured(value),
        None => ParsedOutput::Fallback(canonical_fallback(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json() {
        let parsed = parse_output(r#"  {"filesToModify": ["server.py"], "dependencies": ["authlib"]} "#);
        assert!(parsed.is_structured());
        assert_eq!(parsed.into_value()["dependencies"][0], "authlib");
    }

    #[test]
    fn test_fenced_json_inside_prose() {
        let raw = "Here is the report:\n```json\n{\"status\": \"pass\"}\n```\nLet me know.";
        assert_eq!(parse_structured(raw), Some(json!({"status": "pass"})));

        let second_block = "```\nnot json\n```\nthen\n```json\n{\"status\": \"fail\"}\n```";
        assert_eq!(parse_structured(second_block), Some(json!({"status": "fail"})));

        let unlabeled = "```\n[1, 2]\n```";
        assert_eq!(parse_structured(unlabeled), Some(json!([1, 2])));
    }

    #[test]
    fn test_idempotent_on_structured_values() {
        let value = json!({"filesToModify": ["app/views.py"], "frameworkConsiderations": ["flask"]});
        let once = parse_output(&value.to_string()).into_value();
        let twice = parse_output(&once.to_string()).into_value();
        assert_eq!(once, value);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_fallback_is_total() {
        for raw in ["", "   ", "not json", "{broken", "```json\n{nope\n```", "\u{0}\u{1}"] {
            let value = parse_output(raw).into_value();
            assert_eq!(value["rawAnalysis"], raw);
            assert_eq!(value["filesToModify"], json!([]));
            assert_eq!(value["frameworkConsiderations"], json!([]));
            assert_eq!(value["dependencies"], json!([]));
        }
    }

    #[test]
    fn test_fallback_is_stable_when_reparsed() {
        let fallback = parse_output("free text").into_value();
        assert_eq!(parse_output(&fallback.to_string()).into_value(), fallback);
    }
}
