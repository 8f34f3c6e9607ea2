//! Data Models
//!
//! Serde-derived data structures shared across the agent core.

pub mod checkpoint;
pub mod context;
pub mod plan;
pub mod result;
pub mod tool;
pub mod verification;

pub use checkpoint::{CellSnapshot, Checkpoint, RollbackError, RollbackReport};
pub use context::{CellInfo, CellPriority, NotebookContext, PrunedContext, TokenUsage};
pub use plan::{CellOperation, Plan, PlanStep, ToolCall};
pub use result::{StepResult, TaskExecutionResult, TaskStatus, ToolResult};
pub use tool::{
    ApprovalRequest, ApprovalResult, RiskLevel, ToolCategory, ToolDefinition,
};
pub use verification::{
    ConfidenceDetails, Mismatch, MismatchKind, MismatchSeverity, Recommendation,
    VerificationResult, VerificationTrend,
};
