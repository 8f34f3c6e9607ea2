//! Error Handling
//!
//! Unified error types for the agent core.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Agent-wide error type
#[derive(Error, Debug)]
pub enum AgentError {
    /// Planner/replanner backend errors
    #[error("Planner error: {0}")]
    Planner(String),

    /// Tool execution errors
    #[error("Tool error: {0}")]
    Tool(String),

    /// Host document access errors
    #[error("Document error: {0}")]
    Document(String),

    /// Checkpoint/rollback errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Safety rejection (blocked before execution)
    #[error("Safety rejection: {0}")]
    Safety(String),

    /// Pre-execution validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another task is already running on this orchestrator
    #[error("Busy: {0}")]
    Busy(String),

    /// Cooperative cancellation (distinct from failure)
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for agent errors
pub type AgentResult<T> = Result<T, AgentError>;

impl AgentError {
    /// Create a planner error
    pub fn planner(msg: impl Into<String>) -> Self {
        Self::Planner(msg.into())
    }

    /// Create a tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }

    /// Create a document error
    pub fn document(msg: impl Into<String>) -> Self {
        Self::Document(msg.into())
    }

    /// Create a checkpoint error
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    /// Create a safety error
    pub fn safety(msg: impl Into<String>) -> Self {
        Self::Safety(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::planner("provider unavailable");
        assert_eq!(err.to_string(), "Planner error: provider unavailable");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let agent_err: AgentError = io_err.into();
        assert!(matches!(agent_err, AgentError::Io(_)));
    }

    #[test]
    fn test_busy_is_distinct_from_cancelled() {
        let busy = AgentError::Busy("task in progress".into());
        let cancelled = AgentError::Cancelled("user abort".into());
        assert!(busy.to_string().starts_with("Busy"));
        assert!(cancelled.to_string().starts_with("Cancelled"));
    }
}
