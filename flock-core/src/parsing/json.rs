//! Lenient JSON extraction for model output

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use super::parser::{Leniency, OutputParser, ParseError, ParseResult};

static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json|JSON)?\s*\n?([\s\S]*?)\n?```").unwrap());
static TRAILING_COMMA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",(\s*[}\]])").unwrap());
static UNQUOTED_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([{,])\s*([A-Za-z_][A-Za-z0-9_.]*)\s*:").unwrap());
static LINE_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(^|[^:])//[^\n]*").unwrap());
static BLOCK_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/\*[\s\S]*?\*/").unwrap());

/// JSON parser that tolerates the usual model formatting mistakes:
/// code fences, prose around the payload, trailing commas, single quotes,
/// unquoted keys, comments and missing closing braces.
pub struct JsonParser {
    leniency: Leniency,
}

impl JsonParser {
    pub fn new() -> Self {
        Self::with_leniency(Leniency::Repair)
    }

    pub fn with_leniency(leniency: Leniency) -> Self {
        Self { leniency }
    }

    /// A parser that never rewrites the payload
    pub fn strict() -> Self {
        Self::with_leniency(Leniency::Strict)
    }

    /// Parse and require a JSON object at the top level
    pub fn parse_object(&self, raw: &str) -> ParseResult<Map<String, Value>> {
        match self.parse(raw)? {
            Value::Object(map) => Ok(map),
            other => Err(ParseError::NotAnObject(type_name(&other))),
        }
    }

    fn strip_code_fences(&self, input: &str) -> String {
        CODE_FENCE_RE
            .captures(input)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| input.to_string())
    }

    /// Slice out the first balanced object or array, ignoring brackets inside strings
    fn extract_balanced(&self, input: &str) -> Option<String> {
        let start = input.find(['{', '['])?;
        let substring = &input[start..];
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escape_next = false;

        for (i, c) in substring.char_indices() {
            if escape_next {
                escape_next = false;
                continue;
            }
            match c {
                '\\' if in_string => escape_next = true,
                '"' => in_string = !in_string,
                '{' | '[' if !in_string => depth += 1,
                '}' | ']' if !in_string => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(substring[..=i].to_string());
                    }
                }
                _ => {}
            }
        }

        // Unterminated; hand the tail to repair
        Some(substring.to_string())
    }

    fn repair(&self, input: &str) -> String {
        let mut result = BLOCK_COMMENT_RE.replace_all(input, "").to_string();
        result = LINE_COMMENT_RE.replace_all(&result, "$1").to_string();
        result = normalize_quotes(&result);
        result = UNQUOTED_KEY_RE.replace_all(&result, r#"$1"$2":"#).to_string();
        result = TRAILING_COMMA_RE.replace_all(&result, "$1").to_string();
        close_open_brackets(&result)
    }
}

impl Default for JsonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputParser for JsonParser {
    type Output = Value;

    fn parse(&self, raw: &str) -> ParseResult<Value> {
        if raw.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let input = self.strip_code_fences(raw.trim());

        if let Ok(value) = serde_json::from_str::<Value>(&input) {
            return Ok(value);
        }

        let candidate = self.extract_balanced(&input).unwrap_or(input);
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            return Ok(value);
        }

        if self.leniency == Leniency::Repair {
            let repaired = self.repair(&candidate);
            if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
                tracing::debug!("Recovered malformed JSON output");
                return Ok(value);
            }
        }

        Err(ParseError::NoJson)
    }
}

/// Convert single-quoted strings to double-quoted ones, escaping embedded double quotes
fn normalize_quotes(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut in_double = false;
    let mut in_single = false;
    let mut escape_next = false;

    for c in input.chars() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }
        match c {
            '\\' => {
                result.push(c);
                escape_next = true;
            }
            '"' if in_single => result.push_str("\\\""),
            '"' => {
                in_double = !in_double;
                result.push(c);
            }
            '\'' if !in_double => {
                in_single = !in_single;
                result.push('"');
            }
            _ => result.push(c),
        }
    }

    result
}

/// Append the closers for any brackets left open, innermost first
fn close_open_brackets(input: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for c in input.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => stack.push('}'),
            '[' if !in_string => stack.push(']'),
            '}' | ']' if !in_string => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut result = input.trim_end().trim_end_matches(',').to_string();
    if in_string {
        result.push('"');
    }
    while let Some(closer) = stack.pop() {
        result.push(closer);
    }
    result
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_json() {
        let result = JsonParser::new().parse(r#"{"key": "value"}"#).unwrap();
        assert_eq!(result["key"], "value");
    }

    #[test]
    fn test_parse_with_code_fence() {
        let input = "Here is the decision:\n```json\n{\"next_agent\": \"critic\"}\n```";
        let result = JsonParser::new().parse(input).unwrap();
        assert_eq!(result["next_agent"], "critic");
    }

    #[test]
    fn test_parse_trailing_comma() {
        let result = JsonParser::new().parse(r#"{"key": "value",}"#).unwrap();
        assert_eq!(result["key"], "value");
    }

    #[test]
    fn test_parse_single_quotes_with_embedded_double() {
        let result = JsonParser::new()
            .parse(r#"{'quote': 'she said "hi"'}"#)
            .unwrap();
        assert_eq!(result["quote"], r#"she said "hi""#);
    }

    #[test]
    fn test_parse_unquoted_keys() {
        let result = JsonParser::new().parse(r#"{score: 0.9, next_agent: "b"}"#).unwrap();
        assert_eq!(result["score"], 0.9);
    }

    #[test]
    fn test_comments_removed_but_urls_kept() {
        let input = r#"{
            // source of the answer
            "url": "https://example.org/a",
        }"#;
        let result = JsonParser::new().parse(input).unwrap();
        assert_eq!(result["url"], "https://example.org/a");
    }

    #[test]
    fn test_missing_closers_in_nested_order() {
        let result = JsonParser::new()
            .parse(r#"{"outer": {"items": [1, 2"#)
            .unwrap();
        assert_eq!(result["outer"]["items"][1], 2);
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_extraction() {
        let input = r#"Result: {"text": "use {curly} and [square]"} done"#;
        let result = JsonParser::new().parse(input).unwrap();
        assert_eq!(result["text"], "use {curly} and [square]");
    }

    #[test]
    fn test_parse_object_rejects_arrays() {
        assert!(JsonParser::new().parse_object("[1, 2]").is_err());
        assert!(JsonParser::new().parse_object(r#"{"a": 1}"#).is_ok());
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(matches!(
            JsonParser::new().parse("   "),
            Err(ParseError::Empty)
        ));
    }

    #[test]
    fn test_strict_parser_no_repair() {
        assert!(JsonParser::strict().parse(r#"{"key": "value",}"#).is_err());
    }

    #[test]
    fn test_plain_text_fails() {
        assert!(JsonParser::new().parse("I think the writer should go next").is_err());
    }
}
