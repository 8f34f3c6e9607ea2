//! Execution Result Models
//!
//! Normalized results for tool calls, steps, and whole tasks.

use serde::{Deserialize, Serialize};

use super::plan::Plan;

/// Result of a single tool execution.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolResult {
    /// Whether the execution was successful
    pub success: bool,
    /// Name of the tool that produced this result
    pub tool: String,
    /// Output from the tool (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured exception name (e.g. "ModuleNotFoundError")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_name: Option<String>,
    /// Raw traceback text, when the kernel provided one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    /// Index of the cell this call touched, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_index: Option<usize>,
    /// True when an existing cell was modified rather than created
    #[serde(default)]
    pub was_modified: bool,
    /// Prior cell source for undo, when `was_modified` is true
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_content: Option<String>,
}

impl ToolResult {
    /// Create a successful result
    pub fn ok(tool: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: true,
            tool: tool.into(),
            output: Some(output.into()),
            ..Default::default()
        }
    }

    /// Create an error result
    pub fn err(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            tool: tool.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Attach a structured exception name
    pub fn with_error_name(mut self, name: impl Into<String>) -> Self {
        self.error_name = Some(name.into());
        self
    }

    /// Attach a traceback
    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }

    /// Attach the touched cell index
    pub fn with_cell_index(mut self, index: usize) -> Self {
        self.cell_index = Some(index);
        self
    }

    /// Mark as an in-place modification, retaining prior content for undo
    pub fn with_modified(mut self, previous: impl Into<String>) -> Self {
        self.was_modified = true;
        self.previous_content = Some(previous.into());
        self
    }
}

/// Result of executing one plan step (all of its tool calls).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Step number at the time of execution
    pub step_number: u32,
    /// Results of each tool call, in order
    pub tool_results: Vec<ToolResult>,
    /// Attempts consumed (1 on the fast-fail path; never retried in place)
    pub attempts: u32,
    /// Whether every tool call succeeded
    pub success: bool,
    /// First error encountered, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True when this step carried the terminal final-answer call
    #[serde(default)]
    pub is_final_answer: bool,
    /// The final answer text, when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
}

impl StepResult {
    /// Build a step result from individual tool results.
    pub fn from_tool_results(step_number: u32, tool_results: Vec<ToolResult>) -> Self {
        let success = tool_results.iter().all(|r| r.success);
        let error = tool_results
            .iter()
            .find(|r| !r.success)
            .and_then(|r| r.error.clone());
        let final_answer = tool_results
            .iter()
            .find(|r| r.tool == "final_answer" && r.success)
            .and_then(|r| r.output.clone());
        Self {
            step_number,
            attempts: 1,
            success,
            error,
            is_final_answer: final_answer.is_some(),
            final_answer,
            tool_results,
        }
    }

    /// The primary tool result for verification purposes: the first failure,
    /// or else the last result.
    pub fn primary_result(&self) -> Option<&ToolResult> {
        self.tool_results
            .iter()
            .find(|r| !r.success)
            .or_else(|| self.tool_results.last())
    }
}

/// Terminal status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task completed (final answer or all steps done)
    Completed,
    /// Task failed after exhausting replanning
    Failed,
    /// Task was cancelled cooperatively
    Cancelled,
    /// Another task was already running on this orchestrator
    Busy,
}

/// Terminal record for one task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionResult {
    /// Whether the task completed successfully
    pub success: bool,
    /// Terminal status classification
    pub status: TaskStatus,
    /// Final (possibly mutated) plan
    pub plan: Plan,
    /// Results of every executed step, in order
    pub executed_steps: Vec<StepResult>,
    /// Indices of cells created during the task
    pub created_cells: Vec<usize>,
    /// Indices of cells modified during the task
    pub modified_cells: Vec<usize>,
    /// Final answer, when a terminal call was reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    /// Error classification, on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Total step attempts including replanned steps
    pub total_attempts: u32,
    /// Wall-clock execution time in milliseconds
    pub execution_time_ms: u64,
}

impl TaskExecutionResult {
    /// A "busy" rejection that leaves the running task unaffected.
    pub fn busy() -> Self {
        Self {
            success: false,
            status: TaskStatus::Busy,
            plan: Plan::default(),
            executed_steps: Vec::new(),
            created_cells: Vec::new(),
            modified_cells: Vec::new(),
            final_answer: None,
            error: Some("Another task is already running".to_string()),
            total_attempts: 0,
            execution_time_ms: 0,
        }
    }
}
