//! Planner Boundary
//!
//! The external LLM surface consumed by the orchestrator: plan generation,
//! adaptive replanning, reflection, and pre-execution validation. The wire
//! format used to reach the provider is the implementation's business; the
//! core sees only these request/response contracts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentResult;
use crate::models::context::NotebookContext;
use crate::models::plan::{Plan, PlanStep};
use crate::models::result::StepResult;
use crate::models::tool::ToolDefinition;

/// Token usage reported by one LLM call, accounted against the
/// task-level token budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct LlmUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl LlmUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Structured error handed to the replanner for a failing step.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StructuredError {
    /// Short classification ("tool_failure", "validation", "negative_output")
    pub error_type: String,
    /// Error message text
    pub message: String,
    /// Exception name, when derivable (e.g. "ModuleNotFoundError")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_name: Option<String>,
    /// Raw traceback, when the kernel provided one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

/// Everything the replanner needs to repair the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplanContext {
    /// The user's original request
    pub original_request: String,
    /// Descriptions of steps already executed successfully
    pub executed_steps: Vec<String>,
    /// The step that failed
    pub failed_step: PlanStep,
    /// Structured failure information
    pub error: StructuredError,
    /// Last observed output, when any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_output: Option<String>,
}

/// Plan mutation chosen by the replanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum ReplanDecision {
    /// Replace the failing step's code in place, preserving cell identity
    Refine { code: String },
    /// Splice new steps before the failing step
    InsertSteps { steps: Vec<PlanStep> },
    /// Swap the failing step for a new one (fresh cell, reuse hints stripped)
    ReplaceStep { step: PlanStep },
    /// Discard the failing step and everything after it, substitute a new tail
    ReplanRemaining { steps: Vec<PlanStep> },
}

/// Response to a plan-generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponse {
    pub plan: Plan,
    #[serde(default)]
    pub usage: LlmUsage,
}

/// Response to a replanning request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplanResponse {
    pub decision: ReplanDecision,
    /// Why the replanner chose this mutation
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub usage: LlmUsage,
}

/// Reflector verdict on a completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionVerdict {
    /// Observable outcome matches the declared expectation
    Pass,
    /// Outcome questionable; advisory only
    Retry,
    /// Outcome wrong; advisory only (only fast-fail and escalate abort)
    Replan,
}

/// Response to a reflection request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionResponse {
    pub verdict: ReflectionVerdict,
    /// Reflector's confidence in its verdict, in [0,1]
    pub confidence: f64,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub usage: LlmUsage,
}

/// Severity of a pre-execution validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSeverity {
    /// Blocks the call and triggers replanning
    Error,
    /// Logged only
    Warning,
}

/// One pre-execution validation issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// Response to a pre-execution validation request.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub usage: LlmUsage,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == ValidationSeverity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == ValidationSeverity::Warning)
    }
}

/// The planner/repair oracle consumed by the orchestrator.
///
/// `reflect` and `validate` have permissive defaults so that minimal
/// implementations only need `generate_plan` and `replan`. Backend
/// failures in any method degrade gracefully at the call site: the step
/// proceeds as if unchecked rather than aborting the task.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Decompose a request into an ordered plan.
    async fn generate_plan(
        &self,
        request: &str,
        context: &NotebookContext,
        available_tools: &[ToolDefinition],
    ) -> AgentResult<PlanResponse>;

    /// Repair the plan after a step failure.
    async fn replan(&self, context: &ReplanContext) -> AgentResult<ReplanResponse>;

    /// Judge whether a step's observable outcome matches its declared
    /// expectation. Advisory only.
    async fn reflect(
        &self,
        _step: &PlanStep,
        _result: &StepResult,
    ) -> AgentResult<ReflectionResponse> {
        Ok(ReflectionResponse {
            verdict: ReflectionVerdict::Pass,
            confidence: 1.0,
            recommendations: Vec::new(),
            usage: LlmUsage::default(),
        })
    }

    /// Statically validate code before execution, given the notebook
    /// context (including names defined by earlier steps).
    async fn validate(
        &self,
        _code: &str,
        _context: &NotebookContext,
    ) -> AgentResult<ValidationReport> {
        Ok(ValidationReport::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_total() {
        let usage = LlmUsage {
            prompt_tokens: 120,
            completion_tokens: 30,
        };
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_validation_report_classification() {
        let report = ValidationReport {
            issues: vec![
                ValidationIssue {
                    severity: ValidationSeverity::Warning,
                    message: "unused import".into(),
                    line: Some(1),
                },
                ValidationIssue {
                    severity: ValidationSeverity::Error,
                    message: "undefined name 'df'".into(),
                    line: Some(3),
                },
            ],
            ..Default::default()
        };
        assert!(report.has_errors());
        assert!(report.has_warnings());
        assert!(!ValidationReport::default().has_errors());
    }

    #[test]
    fn test_replan_decision_serializes_with_tag() {
        let decision = ReplanDecision::Refine {
            code: "x = 2".into(),
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["decision"], "refine");
        assert_eq!(json["code"], "x = 2");
    }
}
