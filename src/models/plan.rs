//! Plan Models
//!
//! A plan is an ordered decomposition of the user's request produced by the
//! external planner. Plans are mutated during replanning (splice, replace,
//! truncate) and renumbered back to consecutive 1..N step numbers afterward,
//! so fractional step identifiers never persist or leak into checkpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a step interacts with document cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellOperation {
    /// Append a new cell at the end of the document
    Create,
    /// Update an existing cell in place, retaining prior content for undo
    Modify,
    /// Insert a new cell after a given index
    InsertAfter,
    /// Insert a new cell before a given index
    InsertBefore,
}

impl Default for CellOperation {
    fn default() -> Self {
        Self::Create
    }
}

/// One declarative request to perform a side effect via the tool registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Registered tool name (e.g. "jupyter_cell", "final_answer")
    pub tool: String,
    /// Tool-specific parameters (code, cell_index, operation, ...)
    #[serde(default)]
    pub parameters: Value,
}

impl ToolCall {
    /// Create a tool call with the given name and parameters.
    pub fn new(tool: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool: tool.into(),
            parameters,
        }
    }

    /// The cell operation requested by this call, if any.
    pub fn cell_operation(&self) -> Option<CellOperation> {
        self.parameters
            .get("operation")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// The code payload of this call, if any.
    pub fn code(&self) -> Option<&str> {
        self.parameters.get("code").and_then(|v| v.as_str())
    }

    /// The target cell index of this call, if any.
    pub fn cell_index(&self) -> Option<usize> {
        self.parameters
            .get("cell_index")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
    }
}

/// One step of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// 1-based position in the plan; always a consecutive integer after
    /// renumbering
    pub step_number: u32,
    /// Human-readable description of the step's intent
    pub description: String,
    /// Ordered tool calls executed for this step
    pub tool_calls: Vec<ToolCall>,
    /// Declared expectation checked by the verifier/reflector
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_outcome: Option<String>,
    /// Criteria the reflector scores the observed outcome against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_criteria: Option<String>,
    /// Set when the step was added by replanning
    #[serde(default)]
    pub is_new: bool,
    /// Set when the step was mutated by replanning
    #[serde(default)]
    pub was_replanned: bool,
    /// Cell operation declared at the step level (overridden per call)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_operation: Option<CellOperation>,
}

impl PlanStep {
    /// Create a step with a single description and no calls yet.
    pub fn new(step_number: u32, description: impl Into<String>) -> Self {
        Self {
            step_number,
            description: description.into(),
            tool_calls: Vec::new(),
            expected_outcome: None,
            validation_criteria: None,
            is_new: false,
            was_replanned: false,
            cell_operation: None,
        }
    }

    /// Add a tool call.
    pub fn with_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    /// Set the expected outcome.
    pub fn with_expected_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.expected_outcome = Some(outcome.into());
        self
    }

    /// Whether any call in this step is the terminal final-answer tool.
    pub fn has_final_answer(&self) -> bool {
        self.tool_calls.iter().any(|c| c.tool == "final_answer")
    }

    /// Strip cell-reuse hints so the step always creates a fresh cell.
    /// Used when a step is wholesale replaced during replanning.
    pub fn strip_cell_reuse(&mut self) {
        self.cell_operation = Some(CellOperation::Create);
        for call in &mut self.tool_calls {
            if let Value::Object(map) = &mut call.parameters {
                map.remove("cell_index");
                map.insert(
                    "operation".to_string(),
                    serde_json::json!("CREATE"),
                );
            }
        }
    }
}

/// Ordered task decomposition produced by the external planner.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Plan {
    /// Steps in execution order
    pub steps: Vec<PlanStep>,
    /// Total step count (kept consistent with `steps.len()` by `renumber`)
    pub total_steps: u32,
}

impl Plan {
    /// Create a plan from steps, renumbering them consecutively.
    pub fn new(steps: Vec<PlanStep>) -> Self {
        let mut plan = Self {
            steps,
            total_steps: 0,
        };
        plan.renumber();
        plan
    }

    /// Renumber steps to consecutive 1..N and refresh `total_steps`.
    /// Called after every plan mutation.
    pub fn renumber(&mut self) {
        for (idx, step) in self.steps.iter_mut().enumerate() {
            step.step_number = (idx + 1) as u32;
        }
        self.total_steps = self.steps.len() as u32;
    }

    /// Splice new steps before `index`, then renumber.
    pub fn insert_steps(&mut self, index: usize, mut new_steps: Vec<PlanStep>) {
        for step in &mut new_steps {
            step.is_new = true;
        }
        let at = index.min(self.steps.len());
        self.steps.splice(at..at, new_steps);
        self.renumber();
    }

    /// Replace the step at `index`, then renumber.
    pub fn replace_step(&mut self, index: usize, mut new_step: PlanStep) {
        if index < self.steps.len() {
            new_step.was_replanned = true;
            new_step.strip_cell_reuse();
            self.steps[index] = new_step;
            self.renumber();
        }
    }

    /// Discard all steps from `index` onward and substitute a new tail,
    /// then renumber.
    pub fn replace_remaining(&mut self, index: usize, mut tail: Vec<PlanStep>) {
        for step in &mut tail {
            step.is_new = true;
        }
        self.steps.truncate(index.min(self.steps.len()));
        self.steps.extend(tail);
        self.renumber();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(n: u32) -> PlanStep {
        PlanStep::new(n, format!("step {}", n))
    }

    #[test]
    fn test_renumber_consecutive() {
        let mut plan = Plan::new(vec![step(3), step(9), step(1)]);
        plan.renumber();
        let numbers: Vec<u32> = plan.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(plan.total_steps, 3);
    }

    #[test]
    fn test_insert_steps_renumbers() {
        let mut plan = Plan::new(vec![step(1), step(2), step(3)]);
        plan.insert_steps(1, vec![PlanStep::new(0, "install plotly")]);
        assert_eq!(plan.steps.len(), 4);
        assert_eq!(plan.steps[1].description, "install plotly");
        assert!(plan.steps[1].is_new);
        let numbers: Vec<u32> = plan.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_replace_step_strips_cell_reuse() {
        let call = ToolCall::new(
            "jupyter_cell",
            json!({"code": "x = 1", "cell_index": 4, "operation": "MODIFY"}),
        );
        let mut plan = Plan::new(vec![step(1).with_call(call)]);
        let replacement = PlanStep::new(0, "retry").with_call(ToolCall::new(
            "jupyter_cell",
            json!({"code": "x = 2", "cell_index": 4, "operation": "MODIFY"}),
        ));
        plan.replace_step(0, replacement);

        let call = &plan.steps[0].tool_calls[0];
        assert!(call.cell_index().is_none());
        assert_eq!(call.cell_operation(), Some(CellOperation::Create));
        assert!(plan.steps[0].was_replanned);
    }

    #[test]
    fn test_replace_remaining_truncates() {
        let mut plan = Plan::new(vec![step(1), step(2), step(3), step(4)]);
        plan.replace_remaining(2, vec![PlanStep::new(0, "new tail")]);
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[2].description, "new tail");
        assert_eq!(plan.total_steps, 3);
    }

    #[test]
    fn test_final_answer_detection() {
        let s = step(1).with_call(ToolCall::new("final_answer", json!({"answer": "done"})));
        assert!(s.has_final_answer());
        assert!(!step(2).has_final_answer());
    }
}
