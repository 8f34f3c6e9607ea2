//! notepilot
//!
//! Plan-and-execute agent core for notebook-like cell documents. The
//! orchestrator turns a natural-language request into an ordered plan,
//! executes it through a capability-gated tool registry, verifies state
//! after each step, and routes failures to an adaptive replanner instead
//! of retrying in place. Checkpoints make every step undoable.
//!
//! The embedding host supplies the two external boundaries: a
//! [`planner::Planner`] (the LLM surface) and a
//! [`document::DocumentAdapter`] (the document/kernel surface). Everything
//! between them lives in this crate.

pub mod config;
pub mod document;
pub mod error;
pub mod models;
pub mod planner;
pub mod services;

pub use config::{AgentConfig, ContextBudget, ExecutionSpeed, SafetyConfig};
pub use document::{CellOutput, DocumentAdapter, DocumentCell, MemoryDocument};
pub use error::{AgentError, AgentResult};
pub use models::checkpoint::{CellSnapshot, CellType, Checkpoint, RollbackError, RollbackReport};
pub use models::context::{CellInfo, CellPriority, NotebookContext, PrunedContext, TokenUsage};
pub use models::plan::{CellOperation, Plan, PlanStep, ToolCall};
pub use models::result::{StepResult, TaskExecutionResult, TaskStatus, ToolResult};
pub use models::tool::{ApprovalRequest, ApprovalResult, RiskLevel, ToolCategory, ToolDefinition};
pub use models::verification::{Recommendation, VerificationResult, VerificationTrend};
pub use planner::{
    LlmUsage, Planner, PlanResponse, ReflectionResponse, ReflectionVerdict, ReplanContext,
    ReplanDecision, ReplanResponse, StructuredError, ValidationIssue, ValidationReport,
    ValidationSeverity,
};
pub use services::checkpoint::CheckpointManager;
pub use services::context::{estimate_tokens, ContextManager};
pub use services::orchestrator::{
    progress_channel, DefaultFailureClassifier, ExecutionPhase, FailureClassifier, Orchestrator,
    ProgressEvent, ProgressSender,
};
pub use services::safety::{SafetyChecker, SafetyReport};
pub use services::tools::{
    default_registry, ApprovalCallback, Tool, ToolExecutionContext, ToolExecutor, ToolRegistry,
};
pub use services::verifier::StateVerifier;
