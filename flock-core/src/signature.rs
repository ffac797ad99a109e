//! Signature mini-language for declaring agent inputs and outputs
//!
//! A signature is a comma-separated list of field declarations:
//!
//! ```text
//! name[: type][| description]
//! ```
//!
//! Type segments may contain commas inside brackets (`dict[str, int]`), so
//! fields are only split on top-level commas. Parsing is lenient: fragments
//! that do not start with a valid field name are skipped with a warning.
//!
//! # Example
//!
//! ```rust
//! use flock_core::signature::Signature;
//!
//! let sig = Signature::parse("query: str | What to search for, limits: dict[str, int]");
//! assert_eq!(sig.names(), vec!["query", "limits"]);
//! assert_eq!(sig.fields()[1].type_str.as_deref(), Some("dict[str, int]"));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single declared field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureField {
    /// Field name (may be dotted, e.g. `agent.field`)
    pub name: String,
    /// Declared type, verbatim (e.g. `list[str]`)
    pub type_str: Option<String>,
    /// Free-text description
    pub description: Option<String>,
}

impl SignatureField {
    /// Create a bare field with no type or description
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_str: None,
            description: None,
        }
    }

    /// Base type name without generic arguments, lowercased (`list[str]` -> `list`)
    pub fn base_type(&self) -> Option<String> {
        self.type_str.as_ref().map(|t| {
            t.split(['[', '('])
                .next()
                .unwrap_or_default()
                .trim()
                .to_lowercase()
        })
    }
}

impl fmt::Display for SignatureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(type_str) = &self.type_str {
            write!(f, ": {}", type_str)?;
        }
        if let Some(description) = &self.description {
            write!(f, " | {}", description)?;
        }
        Ok(())
    }
}

/// Parsed, ordered list of signature fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    fields: Vec<SignatureField>,
}

impl Signature {
    /// Parse a signature string. Empty or whitespace-only input yields no fields.
    pub fn parse(signature: &str) -> Self {
        let fields = split_top_level(signature)
            .into_iter()
            .filter_map(parse_field)
            .collect();
        Self { fields }
    }

    /// Build a signature from already-parsed fields
    pub fn from_fields(fields: Vec<SignatureField>) -> Self {
        Self { fields }
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[SignatureField] {
        &self.fields
    }

    /// Field names in declaration order
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&SignatureField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Append bare fields for every name not already declared, keeping order.
    pub fn extend_names<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            if !self.contains(name) {
                self.fields.push(SignatureField::bare(name));
            }
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.fields.iter().map(|field| field.to_string()).collect();
        write!(f, "{}", rendered.join(", "))
    }
}

/// Split on commas that are not nested inside brackets.
///
/// Brackets are only tracked in the name and type. Once a top-level `|`
/// opens a description, the field ends at the next comma.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut in_description = false;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match c {
            ',' if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
                in_description = false;
            }
            _ if in_description => {}
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth = (depth - 1).max(0),
            '|' if depth == 0 => in_description = true,
            _ => {}
        }
    }
    parts.push(&input[start..]);

    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn parse_field(fragment: &str) -> Option<SignatureField> {
    // The description starts at the first top-level '|'; anything after it is free text.
    let (head, description) = match split_description(fragment) {
        Some((head, desc)) => (head, Some(desc.trim().to_string()).filter(|d| !d.is_empty())),
        None => (fragment, None),
    };

    let (name, type_str) = match head.split_once(':') {
        Some((name, type_str)) => (
            name.trim(),
            Some(type_str.trim().to_string()).filter(|t| !t.is_empty()),
        ),
        None => (head.trim(), None),
    };

    if !is_valid_name(name) {
        tracing::warn!(fragment = %fragment, "Skipping unparseable signature fragment");
        return None;
    }

    Some(SignatureField {
        name: name.to_string(),
        type_str,
        description,
    })
}

fn split_description(fragment: &str) -> Option<(&str, &str)> {
    let mut depth: i32 = 0;
    for (i, c) in fragment.char_indices() {
        match c {
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth = (depth - 1).max(0),
            '|' if depth == 0 => return Some((&fragment[..i], &fragment[i + 1..])),
            _ => {}
        }
    }
    None
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}
