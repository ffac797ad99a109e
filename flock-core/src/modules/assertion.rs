//! Rule checks on agent outputs that produce retry feedback

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Module;
use crate::agent::FlockAgent;
use crate::context::{FEEDBACK_KEY, FlockContext};
use crate::error::{FlockError, Result};
use crate::evaluators::config_map;

/// A single check against one output field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum AssertionRule {
    /// Field is present and not null
    Required { field: String },
    /// Field is present and not an empty string, list or object
    NonEmpty { field: String },
    /// String or list length is at least `min`
    MinLength { field: String, min: usize },
    /// String or list length is at most `max`
    MaxLength { field: String, max: usize },
    /// String value matches a regular expression
    Matches { field: String, pattern: String },
    /// Value is one of the listed values
    OneOf { field: String, values: Vec<Value> },
    /// Numeric value lies within the inclusive bounds
    Range {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

impl AssertionRule {
    pub fn field(&self) -> &str {
        match self {
            AssertionRule::Required { field }
            | AssertionRule::NonEmpty { field }
            | AssertionRule::MinLength { field, .. }
            | AssertionRule::MaxLength { field, .. }
            | AssertionRule::Matches { field, .. }
            | AssertionRule::OneOf { field, .. }
            | AssertionRule::Range { field, .. } => field,
        }
    }

    /// Check `output`, returning a feedback message on failure
    pub fn check(&self, output: &Map<String, Value>) -> Result<Option<String>> {
        let field = self.field();
        let Some(value) = output.get(field).filter(|v| !v.is_null()) else {
            return Ok(Some(format!("'{}' is missing", field)));
        };

        let failure = match self {
            AssertionRule::Required { .. } => None,
            AssertionRule::NonEmpty { .. } => {
                (length(value) == Some(0)).then(|| format!("'{}' must not be empty", field))
            }
            AssertionRule::MinLength { min, .. } => match length(value) {
                Some(len) if len >= *min => None,
                Some(len) => Some(format!(
                    "'{}' is too short ({} < {})",
                    field, len, min
                )),
                None => Some(format!("'{}' has no length", field)),
            },
            AssertionRule::MaxLength { max, .. } => match length(value) {
                Some(len) if len <= *max => None,
                Some(len) => Some(format!("'{}' is too long ({} > {})", field, len, max)),
                None => Some(format!("'{}' has no length", field)),
            },
            AssertionRule::Matches { pattern, .. } => {
                let re = Regex::new(pattern).map_err(|e| {
                    FlockError::Configuration(format!("invalid assertion pattern '{}': {}", pattern, e))
                })?;
                match value.as_str() {
                    Some(s) if re.is_match(s) => None,
                    _ => Some(format!("'{}' does not match /{}/", field, pattern)),
                }
            }
            AssertionRule::OneOf { values, .. } => (!values.contains(value))
                .then(|| format!("'{}' must be one of {}", field, Value::from(values.clone()))),
            AssertionRule::Range { min, max, .. } => match value.as_f64() {
                Some(n) if min.is_some_and(|m| n < m) => {
                    Some(format!("'{}' is below {}", field, min.unwrap_or_default()))
                }
                Some(n) if max.is_some_and(|m| n > m) => {
                    Some(format!("'{}' is above {}", field, max.unwrap_or_default()))
                }
                Some(_) => None,
                None => Some(format!("'{}' is not a number", field)),
            },
        };
        Ok(failure)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssertionModuleConfig {
    pub enabled: bool,
    pub rules: Vec<AssertionRule>,
    /// Context key the feedback is written to
    pub feedback_key: String,
}

impl Default for AssertionModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: Vec::new(),
            feedback_key: FEEDBACK_KEY.to_string(),
        }
    }
}

/// Validates outputs after evaluation.
///
/// Failed checks are written to the feedback key as a list of messages,
/// where the feedback router picks them up. A clean result removes the key.
/// The result itself is passed through unchanged.
#[derive(Debug, Clone)]
pub struct AssertionModule {
    name: String,
    config: AssertionModuleConfig,
}

impl AssertionModule {
    pub fn new(name: impl Into<String>, config: AssertionModuleConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    pub fn with_rules(name: impl Into<String>, rules: Vec<AssertionRule>) -> Self {
        Self::new(
            name,
            AssertionModuleConfig {
                rules,
                ..Default::default()
            },
        )
    }

    /// Run every rule, collecting failure messages
    pub fn check(&self, output: &Map<String, Value>) -> Result<Vec<String>> {
        let mut failures = Vec::new();
        for rule in &self.config.rules {
            if let Some(message) = rule.check(output)? {
                failures.push(message);
            }
        }
        Ok(failures)
    }
}

#[async_trait]
impl Module for AssertionModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        "assertion"
    }

    fn config(&self) -> Map<String, Value> {
        config_map(&self.config)
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn post_evaluate(
        &self,
        agent: &FlockAgent,
        _inputs: &Map<String, Value>,
        result: Map<String, Value>,
        context: &mut FlockContext,
    ) -> Result<Map<String, Value>> {
        let failures = self.check(&result)?;

        if failures.is_empty() {
            context.remove_variable(&self.config.feedback_key);
        } else {
            tracing::warn!(
                agent = %agent.name(),
                failures = ?failures,
                "Output assertions failed"
            );
            context.set_variable(self.config.feedback_key.clone(), Value::from(failures));
        }
        Ok(result)
    }
}
