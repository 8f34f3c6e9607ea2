//! Failure Classification and Plan Repair
//!
//! Turns step failures into structured errors for the replanner, detects
//! failures hiding inside "successful" output text, and applies the
//! replanner's decision to the plan.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

use crate::models::plan::{CellOperation, Plan};
use crate::models::result::StepResult;
use crate::planner::{ReplanDecision, StructuredError};

/// Decides whether an output text that the tool reported as successful is
/// actually a failure. Pluggable so hosts can tune it per kernel/language.
pub trait FailureClassifier: Send + Sync {
    /// Returns a structured error when the output reads as a failure.
    fn classify_output(&self, output: &str) -> Option<StructuredError>;
}

struct NegativePattern {
    regex: Regex,
    error_name: Option<&'static str>,
}

fn negative_patterns() -> &'static Vec<NegativePattern> {
    static PATTERNS: OnceLock<Vec<NegativePattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let specs: &[(&str, Option<&'static str>)] = &[
            (r"No module named", Some("ModuleNotFoundError")),
            (r"\bNameError\b", Some("NameError")),
            (r"\bTypeError\b", Some("TypeError")),
            (r"\bKeyError\b", Some("KeyError")),
            (r"\bIndexError\b", Some("IndexError")),
            (r"Traceback \(most recent call last\)", None),
            (r"(?i)\berror:", None),
            (r"(?i)\bfailed\b", None),
            (r"(?i)\bnot found\b", None),
        ];
        specs
            .iter()
            .filter_map(|(pattern, name)| {
                Regex::new(pattern).ok().map(|regex| NegativePattern {
                    regex,
                    error_name: *name,
                })
            })
            .collect()
    })
}

/// Default classifier over a fixed negative-pattern table.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFailureClassifier;

impl FailureClassifier for DefaultFailureClassifier {
    fn classify_output(&self, output: &str) -> Option<StructuredError> {
        let trimmed = output.trim();
        if trimmed.is_empty() {
            return None;
        }
        for pattern in negative_patterns() {
            if pattern.regex.is_match(trimmed) {
                return Some(StructuredError {
                    error_type: "negative_output".to_string(),
                    message: trimmed.chars().take(500).collect(),
                    error_name: pattern.error_name.map(str::to_string),
                    traceback: None,
                });
            }
        }
        None
    }
}

/// Build the structured error for a failed step from its primary result.
pub fn structured_error_for(step_result: &StepResult) -> StructuredError {
    let primary = step_result.primary_result();
    let message = primary
        .and_then(|r| r.error.clone())
        .or_else(|| step_result.error.clone())
        .unwrap_or_else(|| "step failed".to_string());
    let error_name = primary.and_then(|r| r.error_name.clone()).or_else(|| {
        if message.contains("No module named") {
            Some("ModuleNotFoundError".to_string())
        } else {
            None
        }
    });
    StructuredError {
        error_type: "tool_failure".to_string(),
        message,
        error_name,
        traceback: primary.and_then(|r| r.traceback.clone()),
    }
}

/// Apply a replan decision to the plan at the failing step's position.
///
/// `failed_cell_index` is the cell the failing step touched, when known;
/// a refinement targets that same cell so the document does not grow a
/// trail of broken duplicates.
pub fn apply_decision(
    plan: &mut Plan,
    failing_index: usize,
    decision: ReplanDecision,
    failed_cell_index: Option<usize>,
) {
    match decision {
        ReplanDecision::Refine { code } => {
            if let Some(step) = plan.steps.get_mut(failing_index) {
                step.was_replanned = true;
                let has_code = step
                    .tool_calls
                    .iter()
                    .any(|c| c.parameters.get("code").is_some());
                let target = if has_code {
                    step.tool_calls
                        .iter_mut()
                        .find(|c| c.parameters.get("code").is_some())
                } else {
                    step.tool_calls.first_mut()
                };
                if let Some(call) = target {
                    if let Value::Object(map) = &mut call.parameters {
                        map.insert("code".to_string(), Value::String(code));
                        if let Some(index) = failed_cell_index {
                            map.insert("cell_index".to_string(), Value::from(index as u64));
                            map.insert("operation".to_string(), Value::from("MODIFY"));
                        }
                    }
                }
                if failed_cell_index.is_some() {
                    step.cell_operation = Some(CellOperation::Modify);
                }
            }
        }
        ReplanDecision::InsertSteps { steps } => {
            plan.insert_steps(failing_index, steps);
        }
        ReplanDecision::ReplaceStep { step } => {
            plan.replace_step(failing_index, step);
        }
        ReplanDecision::ReplanRemaining { steps } => {
            if !steps.iter().any(|s| s.has_final_answer()) {
                warn!("replanned tail has no terminal final_answer call");
            }
            plan.replace_remaining(failing_index, steps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plan::{PlanStep, ToolCall};
    use crate::models::result::ToolResult;
    use crate::services::verifier::extract_missing_module;
    use serde_json::json;

    fn classifier() -> DefaultFailureClassifier {
        DefaultFailureClassifier
    }

    #[test]
    fn test_clean_output_passes() {
        assert!(classifier().classify_output("mean = 4.2").is_none());
        assert!(classifier().classify_output("").is_none());
    }

    #[test]
    fn test_missing_module_detected_in_successful_output() {
        let error = classifier()
            .classify_output("ModuleNotFoundError: No module named 'plotly'")
            .expect("negative output");
        assert_eq!(error.error_type, "negative_output");
        assert_eq!(error.error_name.as_deref(), Some("ModuleNotFoundError"));
        assert_eq!(
            extract_missing_module(&error.message).as_deref(),
            Some("plotly")
        );
    }

    #[test]
    fn test_generic_failure_text_detected() {
        assert!(classifier().classify_output("command failed with exit 1").is_some());
        assert!(classifier().classify_output("file not found").is_some());
        assert!(classifier()
            .classify_output("Traceback (most recent call last):\n  ...")
            .is_some());
    }

    #[test]
    fn test_structured_error_prefers_primary_failure() {
        let step = StepResult::from_tool_results(
            1,
            vec![
                ToolResult::ok("jupyter_cell", "fine"),
                ToolResult::err("jupyter_cell", "No module named 'plotly'")
                    .with_error_name("ModuleNotFoundError")
                    .with_traceback("Traceback..."),
            ],
        );
        let error = structured_error_for(&step);
        assert_eq!(error.error_type, "tool_failure");
        assert_eq!(error.error_name.as_deref(), Some("ModuleNotFoundError"));
        assert_eq!(error.traceback.as_deref(), Some("Traceback..."));
    }

    fn plan_of(n: usize) -> Plan {
        Plan::new(
            (1..=n)
                .map(|i| {
                    PlanStep::new(i as u32, format!("step {}", i)).with_call(ToolCall::new(
                        "jupyter_cell",
                        json!({"operation": "CREATE", "code": format!("x{} = {}", i, i)}),
                    ))
                })
                .collect(),
        )
    }

    #[test]
    fn test_refine_targets_same_cell() {
        let mut plan = plan_of(2);
        apply_decision(
            &mut plan,
            1,
            ReplanDecision::Refine {
                code: "y = 2".to_string(),
            },
            Some(5),
        );
        let step = &plan.steps[1];
        assert!(step.was_replanned);
        let call = &step.tool_calls[0];
        assert_eq!(call.code(), Some("y = 2"));
        assert_eq!(call.cell_index(), Some(5));
        assert_eq!(call.cell_operation(), Some(CellOperation::Modify));
    }

    #[test]
    fn test_insert_steps_renumbers_consecutively() {
        let mut plan = plan_of(3);
        apply_decision(
            &mut plan,
            1,
            ReplanDecision::InsertSteps {
                steps: vec![PlanStep::new(0, "install plotly")],
            },
            None,
        );
        assert_eq!(plan.steps.len(), 4);
        assert_eq!(plan.steps[1].description, "install plotly");
        let numbers: Vec<u32> = plan.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_replan_remaining_swaps_tail() {
        let mut plan = plan_of(4);
        apply_decision(
            &mut plan,
            2,
            ReplanDecision::ReplanRemaining {
                steps: vec![PlanStep::new(0, "different approach")],
            },
            None,
        );
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[2].description, "different approach");
        assert_eq!(plan.total_steps, 3);
    }
}
