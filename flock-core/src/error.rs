//! Error types for Flock operations

use std::time::Duration;

/// Result type for Flock operations
pub type Result<T> = std::result::Result<T, FlockError>;

/// Error types for the Flock framework
#[derive(Debug, Clone, thiserror::Error)]
pub enum FlockError {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Agent has no evaluator attached
    #[error("Agent '{0}' has no evaluator configured")]
    MissingEvaluator(String),

    /// The context could not satisfy a declared input
    #[error("Failed to resolve input '{field}' for agent '{agent}': {message}")]
    Resolution {
        agent: String,
        field: String,
        message: String,
    },

    /// Evaluator failed
    #[error("Evaluation failed for agent '{agent}': {message}")]
    Evaluation { agent: String, message: String },

    /// A module hook failed
    #[error("Module '{module}' failed in {hook}: {message}")]
    Module {
        module: String,
        hook: String,
        message: String,
    },

    /// Router raised while deciding the next agent
    #[error("Routing failed after agent '{agent}': {message}")]
    Routing { agent: String, message: String },

    /// Router named an agent that is not in the registry
    #[error("Next agent not found: {0}")]
    NextAgentNotFound(String),

    /// Agent lookup failed
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Tool resolution or invocation failed
    #[error("Tool error: {0}")]
    Tool(String),

    /// Durable activity exceeded its timeout
    #[error("Activity '{activity}' timed out after {timeout:?}")]
    Timeout { activity: String, timeout: Duration },

    /// Workflow engine failure
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl FlockError {
    /// Stable type name, matched against a retry policy's non-retryable list.
    pub fn kind(&self) -> &'static str {
        match self {
            FlockError::Configuration(_) => "ConfigurationError",
            FlockError::MissingEvaluator(_) => "MissingEvaluatorError",
            FlockError::Resolution { .. } => "ResolutionError",
            FlockError::Evaluation { .. } => "EvaluationError",
            FlockError::Module { .. } => "ModuleError",
            FlockError::Routing { .. } => "RoutingError",
            FlockError::NextAgentNotFound(_) => "NextAgentNotFoundError",
            FlockError::AgentNotFound(_) => "AgentNotFoundError",
            FlockError::Llm(_) => "LlmError",
            FlockError::Tool(_) => "ToolError",
            FlockError::Timeout { .. } => "TimeoutError",
            FlockError::Workflow(_) => "WorkflowError",
            FlockError::Serialization(_) => "SerializationError",
            FlockError::Io(_) => "IoError",
            FlockError::Other(_) => "Error",
        }
    }

    pub(crate) fn evaluation(agent: impl Into<String>, message: impl Into<String>) -> Self {
        FlockError::Evaluation {
            agent: agent.into(),
            message: message.into(),
        }
    }

    pub(crate) fn routing(agent: impl Into<String>, message: impl Into<String>) -> Self {
        FlockError::Routing {
            agent: agent.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for FlockError {
    fn from(err: serde_json::Error) -> Self {
        FlockError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for FlockError {
    fn from(err: serde_yaml::Error) -> Self {
        FlockError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for FlockError {
    fn from(err: std::io::Error) -> Self {
        FlockError::Io(err.to_string())
    }
}

impl From<String> for FlockError {
    fn from(s: String) -> Self {
        FlockError::Other(s)
    }
}

impl From<&str> for FlockError {
    fn from(s: &str) -> Self {
        FlockError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for FlockError {
    fn from(err: anyhow::Error) -> Self {
        FlockError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_names() {
        let err = FlockError::Resolution {
            agent: "a".to_string(),
            field: "x".to_string(),
            message: "missing".to_string(),
        };
        assert_eq!(err.kind(), "ResolutionError");
        assert_eq!(FlockError::NextAgentNotFound("b".into()).kind(), "NextAgentNotFoundError");
    }

    #[test]
    fn test_error_display() {
        let err = FlockError::evaluation("writer", "provider timeout");
        assert_eq!(
            err.to_string(),
            "Evaluation failed for agent 'writer': provider timeout"
        );
    }
}
