//! Shared parser contract

use thiserror::Error;

use crate::error::FlockError;

/// Why model output could not be read
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("model returned no output")]
    Empty,

    #[error("no parseable JSON found in output")]
    NoJson,

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("output is missing declared field '{0}'")]
    MissingField(String),
}

impl ParseError {
    /// Declared field the error is about, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            ParseError::MissingField(field) => Some(field),
            _ => None,
        }
    }
}

impl From<ParseError> for FlockError {
    fn from(err: ParseError) -> Self {
        FlockError::Serialization(err.to_string())
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Reads one kind of model reply
pub trait OutputParser: Send + Sync {
    type Output;

    fn parse(&self, raw: &str) -> ParseResult<Self::Output>;
}

/// How far a parser may rewrite a reply before giving up.
///
/// Both levels trim whitespace, strip code fences and cut the payload out of
/// surrounding prose. Only `Repair` rewrites the payload itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Leniency {
    Strict,
    #[default]
    Repair,
}
