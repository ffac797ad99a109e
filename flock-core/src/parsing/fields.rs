//! Signature-driven parsing of model output
//!
//! [`FieldParser`] reads `field: value` blocks from free text, and
//! [`coerce_outputs`] checks a parsed mapping against an output signature,
//! converting loosely typed values to the declared base types.

use serde_json::{Map, Number, Value};

use super::json::JsonParser;
use super::parser::{OutputParser, ParseError, ParseResult};
use crate::signature::Signature;

/// Parses `name: value` sections for the fields of a signature.
///
/// A line starting with a declared field name followed by `:` opens that
/// field; following lines are appended to it until the next field opens.
/// Markdown emphasis and list markers around the name are ignored.
pub struct FieldParser {
    signature: Signature,
}

impl FieldParser {
    pub fn new(signature: Signature) -> Self {
        Self { signature }
    }

    fn match_field<'a>(&self, line: &'a str) -> Option<(String, &'a str)> {
        let stripped = line.trim_start().trim_start_matches(['-', '*', '#', ' ']);
        let (head, rest) = stripped.split_once(':')?;
        let head = head.trim().trim_matches('*').trim().to_lowercase();

        self.signature
            .fields()
            .iter()
            .find(|f| f.name.to_lowercase() == head)
            .map(|f| (f.name.clone(), rest))
    }
}

impl OutputParser for FieldParser {
    type Output = Map<String, Value>;

    fn parse(&self, raw: &str) -> ParseResult<Self::Output> {
        if raw.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let mut sections: Vec<(String, String)> = Vec::new();
        for line in raw.lines() {
            match self.match_field(line) {
                Some((name, rest)) => sections.push((name, rest.trim().to_string())),
                None => {
                    if let Some((_, text)) = sections.last_mut() {
                        if !text.is_empty() {
                            text.push('\n');
                        }
                        text.push_str(line.trim());
                    }
                }
            }
        }

        if sections.is_empty() && self.signature.len() == 1 {
            // A lone field may be answered without its label
            let name = self.signature.fields()[0].name.clone();
            sections.push((name, raw.trim().to_string()));
        }

        let mut result = Map::new();
        for (name, text) in sections {
            result
                .entry(name)
                .or_insert_with(|| Value::String(text.trim().to_string()));
        }
        Ok(result)
    }
}

/// Validate `output` against `signature` and coerce values to declared types.
///
/// Only declared fields are kept. A missing field is an error. Values that
/// cannot be converted are kept as-is and logged.
pub fn coerce_outputs(
    output: &Map<String, Value>,
    signature: &Signature,
) -> ParseResult<Map<String, Value>> {
    let mut result = Map::new();

    for field in signature.fields() {
        let value = output
            .get(&field.name)
            .ok_or_else(|| ParseError::MissingField(field.name.clone()))?;

        let coerced = match field.base_type().as_deref() {
            Some(base) => coerce_value(value, base).unwrap_or_else(|| {
                tracing::warn!(
                    field = %field.name,
                    expected = %base,
                    "Output value does not match declared type, keeping raw value"
                );
                value.clone()
            }),
            None => value.clone(),
        };
        result.insert(field.name.clone(), coerced);
    }

    Ok(result)
}

fn coerce_value(value: &Value, base: &str) -> Option<Value> {
    match (base, value) {
        ("str" | "string", Value::String(_)) => Some(value.clone()),
        ("str" | "string", other) => Some(Value::String(other.to_string())),

        ("int" | "integer", Value::Number(n)) if n.is_i64() || n.is_u64() => Some(value.clone()),
        ("int" | "integer", Value::Number(n)) => n.as_f64().map(|f| Value::from(f.round() as i64)),
        ("int" | "integer", Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),

        ("float" | "number", Value::Number(_)) => Some(value.clone()),
        ("float" | "number", Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),

        ("bool" | "boolean", Value::Bool(_)) => Some(value.clone()),
        ("bool" | "boolean", Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "0" => Some(Value::Bool(false)),
            _ => None,
        },

        ("list" | "tuple" | "set", Value::Array(_)) => Some(value.clone()),
        ("dict" | "object", Value::Object(_)) => Some(value.clone()),
        ("list" | "tuple" | "set" | "dict" | "object", Value::String(s)) => {
            let parsed = JsonParser::new().parse(s).ok()?;
            let matches = match base {
                "dict" | "object" => parsed.is_object(),
                _ => parsed.is_array(),
            };
            matches.then_some(parsed)
        }

        ("list" | "tuple" | "set" | "dict" | "object" | "int" | "integer" | "float" | "number"
        | "bool" | "boolean", _) => None,

        // Literal, custom and unknown types pass through
        _ => Some(value.clone()),
    }
}
