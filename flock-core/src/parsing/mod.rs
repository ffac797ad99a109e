//! Structured output parsing
//!
//! Model output is rarely clean. [`JsonParser`] recovers JSON from fenced,
//! chatty or slightly malformed responses; [`FieldParser`] reads labelled
//! `field: value` text; [`coerce_outputs`] fits either result to an agent's
//! output signature.
//!
//! # Example
//!
//! ```rust
//! use flock_core::parsing::{JsonParser, OutputParser};
//!
//! let parser = JsonParser::new();
//! let result = parser.parse("```json\n{\"key\": \"value\",}\n```").unwrap();
//! assert_eq!(result["key"], "value");
//! ```

mod fields;
mod json;
mod parser;

pub use fields::{FieldParser, coerce_outputs};
pub use json::JsonParser;
pub use parser::{Leniency, OutputParser, ParseError, ParseResult};
