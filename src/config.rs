//! Agent Configuration
//!
//! Plain config structs assembled by the embedding host. The core never
//! reads config files or environment variables itself.

use serde::{Deserialize, Serialize};

/// Pacing between successful steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionSpeed {
    /// No delay between steps
    Fast,
    /// 500ms between steps (default)
    Normal,
    /// 1500ms between steps
    Slow,
    /// Wait for an external "proceed" signal before each step
    StepByStep,
}

impl Default for ExecutionSpeed {
    fn default() -> Self {
        Self::Normal
    }
}

impl ExecutionSpeed {
    /// Fixed inter-step delay in milliseconds. `None` means the
    /// orchestrator must wait for the manual step signal instead.
    pub fn delay_ms(&self) -> Option<u64> {
        match self {
            ExecutionSpeed::Fast => Some(0),
            ExecutionSpeed::Normal => Some(500),
            ExecutionSpeed::Slow => Some(1500),
            ExecutionSpeed::StepByStep => None,
        }
    }
}

/// Safety checker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// When true, critical-severity pattern matches block execution.
    /// When false, they degrade to advisory warnings.
    pub block_dangerous: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            block_dangerous: true,
        }
    }
}

/// Token budget for context handed to the LLM on each call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBudget {
    /// Hard token ceiling
    pub max_tokens: usize,
    /// Fraction of the effective budget at which a warning is logged
    pub warning_threshold: f64,
    /// Tokens reserved for the model's response
    pub reserved_for_response: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_tokens: 8000,
            warning_threshold: 0.8,
            reserved_for_response: 2000,
        }
    }
}

impl ContextBudget {
    /// Effective budget available for context (ceiling minus response reserve).
    pub fn effective_budget(&self) -> usize {
        self.max_tokens.saturating_sub(self.reserved_for_response)
    }
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Pacing between successful steps
    pub execution_speed: ExecutionSpeed,
    /// Maximum replanning attempts before the task fails
    pub max_replan_attempts: u32,
    /// Maximum checkpoints retained (FIFO eviction beyond this)
    pub max_checkpoints: usize,
    /// Task-level LLM token budget across planner/replanner calls.
    /// Zero disables the budget check.
    pub max_total_tokens: u64,
    /// Per-tool-call timeout in milliseconds
    pub tool_timeout_ms: u64,
    /// Bounded wait for the kernel to report idle after running a cell
    pub kernel_idle_timeout_ms: u64,
    /// Settle delay after kernel idle, for output-model synchronization
    pub output_settle_ms: u64,
    /// When true, tools flagged `requires_approval` go through the
    /// approval callback before executing
    pub approval_required: bool,
    /// Safety checker configuration
    pub safety: SafetyConfig,
    /// Context token budget
    pub context_budget: ContextBudget,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            execution_speed: ExecutionSpeed::default(),
            max_replan_attempts: 3,
            max_checkpoints: 10,
            max_total_tokens: 0,
            tool_timeout_ms: 120_000,
            kernel_idle_timeout_ms: 30_000,
            output_settle_ms: 150,
            approval_required: false,
            safety: SafetyConfig::default(),
            context_budget: ContextBudget::default(),
        }
    }
}
