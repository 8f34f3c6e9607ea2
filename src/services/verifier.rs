//! State Verifier
//!
//! Post-execution auditor. Compares expected vs. observed effects of a
//! step's primary tool result, combines four independent factors into a
//! confidence score, and maps confidence to a recommendation. Verification
//! never blocks forward progress by itself except at the Escalate tier.

use std::collections::HashSet;

use tracing::debug;

use crate::models::plan::PlanStep;
use crate::models::result::ToolResult;
use crate::models::verification::{
    ConfidenceDetails, Mismatch, MismatchKind, MismatchSeverity, VerificationResult,
    VerificationTrend,
};

/// Minimum rolling-average delta to classify a trend as improving/declining.
const TREND_EPSILON: f64 = 0.05;

/// Post-execution auditor with an append-only history for trend analysis.
#[derive(Debug, Default)]
pub struct StateVerifier {
    history: Vec<VerificationResult>,
}

impl StateVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the history at the start of a new task.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Audit a step's primary tool result.
    ///
    /// `expected_variables` are names the step was expected to define;
    /// `defined_variables` is the cumulative set observed after execution.
    pub fn verify_step_state(
        &mut self,
        step: &PlanStep,
        result: &ToolResult,
        expected_variables: &[String],
        defined_variables: &HashSet<String>,
    ) -> VerificationResult {
        let mut mismatches = Vec::new();

        let output_match = self.score_output_match(step, result, &mut mismatches);
        let variables_created =
            self.score_variables(expected_variables, defined_variables, &mut mismatches);
        let no_exception = self.score_exception(result, &mut mismatches);
        let completeness = self.score_completeness(result, &mut mismatches);

        let details = ConfidenceDetails {
            output_match,
            variables_created,
            no_exception,
            completeness,
        };
        let confidence = details.overall();
        let recommendation = VerificationResult::recommendation_for(confidence);
        let is_valid = !mismatches
            .iter()
            .any(|m| m.severity == MismatchSeverity::Critical);

        debug!(
            step = step.step_number,
            confidence = format!("{:.2}", confidence),
            ?recommendation,
            mismatches = mismatches.len(),
            "state verification"
        );

        let verification = VerificationResult {
            is_valid,
            confidence,
            confidence_details: details,
            mismatches,
            recommendation,
        };
        self.history.push(verification.clone());
        verification
    }

    /// Factor 1: does the observed output satisfy the declared expectation?
    /// No expectation means nothing to mismatch (factor 1.0).
    fn score_output_match(
        &self,
        step: &PlanStep,
        result: &ToolResult,
        mismatches: &mut Vec<Mismatch>,
    ) -> f64 {
        let expected = match step.expected_outcome.as_deref() {
            Some(e) if !e.trim().is_empty() => e,
            _ => return 1.0,
        };
        let output = result.output.as_deref().unwrap_or("");

        let keywords: Vec<&str> = expected
            .split_whitespace()
            .filter(|w| w.len() >= 4)
            .collect();
        if keywords.is_empty() {
            return 1.0;
        }
        let output_lower = output.to_lowercase();
        let hits = keywords
            .iter()
            .filter(|k| output_lower.contains(&k.to_lowercase()))
            .count();
        let score = hits as f64 / keywords.len() as f64;

        if score < 0.5 {
            mismatches.push(Mismatch {
                kind: MismatchKind::OutputMismatch,
                severity: MismatchSeverity::Warning,
                expected: expected.to_string(),
                actual: truncate(output, 200),
                suggestion: Some(
                    "Re-examine the step's code against its expected outcome".to_string(),
                ),
            });
        }
        score
    }

    /// Factor 2: were the expected variables created?
    fn score_variables(
        &self,
        expected: &[String],
        defined: &HashSet<String>,
        mismatches: &mut Vec<Mismatch>,
    ) -> f64 {
        if expected.is_empty() {
            return 1.0;
        }
        let mut present = 0usize;
        for name in expected {
            if defined.contains(name) {
                present += 1;
            } else {
                mismatches.push(Mismatch {
                    kind: MismatchKind::MissingVariable,
                    severity: MismatchSeverity::Warning,
                    expected: format!("variable '{}' defined", name),
                    actual: format!("'{}' not present after execution", name),
                    suggestion: Some(format!("Ensure the step assigns '{}'", name)),
                });
            }
        }
        present as f64 / expected.len() as f64
    }

    /// Factor 3: absence of exception. Structured import errors get an
    /// install suggestion derived from the error text.
    fn score_exception(&self, result: &ToolResult, mismatches: &mut Vec<Mismatch>) -> f64 {
        let error_name = match result.error_name.as_deref() {
            Some(name) => name,
            None if result.success => return 1.0,
            None => {
                if let Some(error) = result.error.as_deref() {
                    mismatches.push(Mismatch {
                        kind: MismatchKind::ExceptionRaised,
                        severity: MismatchSeverity::Critical,
                        expected: "clean execution".to_string(),
                        actual: truncate(error, 200),
                        suggestion: None,
                    });
                    return 0.0;
                }
                return 0.5;
            }
        };

        if error_name == "ModuleNotFoundError" || error_name == "ImportError" {
            let message = result.error.as_deref().unwrap_or("");
            let suggestion = extract_missing_module(message)
                .map(|m| format!("Install the missing package: pip install {} (or conda install {})", m, m))
                .unwrap_or_else(|| "Install the missing package before this step".to_string());
            mismatches.push(Mismatch {
                kind: MismatchKind::ImportFailed,
                severity: MismatchSeverity::Critical,
                expected: "module importable".to_string(),
                actual: truncate(message, 200),
                suggestion: Some(suggestion),
            });
        } else {
            mismatches.push(Mismatch {
                kind: MismatchKind::ExceptionRaised,
                severity: MismatchSeverity::Critical,
                expected: "clean execution".to_string(),
                actual: format!(
                    "{}: {}",
                    error_name,
                    truncate(result.error.as_deref().unwrap_or(""), 160)
                ),
                suggestion: None,
            });
        }
        0.0
    }

    /// Factor 4: did execution run to completion?
    fn score_completeness(&self, result: &ToolResult, mismatches: &mut Vec<Mismatch>) -> f64 {
        if result.success {
            1.0
        } else {
            mismatches.push(Mismatch {
                kind: MismatchKind::Incomplete,
                severity: MismatchSeverity::Warning,
                expected: "step ran to completion".to_string(),
                actual: "tool reported failure".to_string(),
                suggestion: None,
            });
            0.0
        }
    }

    /// Verification history recorded so far, oldest first.
    pub fn history(&self) -> &[VerificationResult] {
        &self.history
    }

    /// Rolling average of all recorded confidences.
    pub fn rolling_average(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let sum: f64 = self.history.iter().map(|v| v.confidence).sum();
        Some(sum / self.history.len() as f64)
    }

    /// Classify the trend: the average of the last 3 results vs. the
    /// average of everything before them.
    pub fn trend(&self) -> VerificationTrend {
        if self.history.len() < 4 {
            return VerificationTrend::Stable;
        }
        let split = self.history.len() - 3;
        let older: f64 = self.history[..split]
            .iter()
            .map(|v| v.confidence)
            .sum::<f64>()
            / split as f64;
        let recent: f64 = self.history[split..]
            .iter()
            .map(|v| v.confidence)
            .sum::<f64>()
            / 3.0;

        if recent > older + TREND_EPSILON {
            VerificationTrend::Improving
        } else if recent < older - TREND_EPSILON {
            VerificationTrend::Declining
        } else {
            VerificationTrend::Stable
        }
    }
}

/// Extract the missing module name from a ModuleNotFoundError message.
pub fn extract_missing_module(message: &str) -> Option<String> {
    let marker = "No module named ";
    let start = message.find(marker)? + marker.len();
    let rest = &message[start..];
    let name: String = rest
        .trim_start_matches(['\'', '"'])
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::result::ToolResult;
    use crate::models::verification::Recommendation;

    fn step_with_expectation(expected: &str) -> PlanStep {
        PlanStep::new(1, "test step").with_expected_outcome(expected)
    }

    #[test]
    fn test_clean_success_proceeds() {
        let mut verifier = StateVerifier::new();
        let step = PlanStep::new(1, "compute");
        let result = ToolResult::ok("jupyter_cell", "42");
        let v = verifier.verify_step_state(&step, &result, &[], &HashSet::new());
        assert!(v.is_valid);
        assert!((v.confidence - 1.0).abs() < 1e-9);
        assert_eq!(v.recommendation, Recommendation::Proceed);
    }

    #[test]
    fn test_confidence_always_in_bounds() {
        let mut verifier = StateVerifier::new();
        let step = step_with_expectation("dataframe loaded with rows");
        let result = ToolResult::err("jupyter_cell", "TypeError: bad operand")
            .with_error_name("TypeError");
        let v = verifier.verify_step_state(
            &step,
            &result,
            &["df".to_string()],
            &HashSet::new(),
        );
        assert!(v.confidence >= 0.0 && v.confidence <= 1.0);
        assert!(!v.is_valid);
    }

    #[test]
    fn test_module_not_found_yields_import_mismatch() {
        let mut verifier = StateVerifier::new();
        let step = PlanStep::new(1, "import plotly");
        let result = ToolResult::err("jupyter_cell", "No module named 'plotly'")
            .with_error_name("ModuleNotFoundError");
        let v = verifier.verify_step_state(&step, &result, &[], &HashSet::new());

        let import = v
            .mismatches
            .iter()
            .find(|m| m.kind == MismatchKind::ImportFailed)
            .expect("import mismatch");
        assert!(import.suggestion.as_deref().unwrap().contains("pip install plotly"));
        // 0.3 (no expectation) + 0.3 (no expected vars) + 0 + 0 = 0.6
        assert!((v.confidence - 0.6).abs() < 1e-9);
        assert_eq!(v.recommendation, Recommendation::Warning);
        assert!(!v.is_valid);
    }

    #[test]
    fn test_missing_variable_lowers_confidence() {
        let mut verifier = StateVerifier::new();
        let step = PlanStep::new(1, "define df");
        let result = ToolResult::ok("jupyter_cell", "");
        let defined: HashSet<String> = ["x".to_string()].into_iter().collect();
        let v = verifier.verify_step_state(&step, &result, &["df".to_string()], &defined);
        // 0.3*1.0 + 0.3*0.0 + 0.25*1.0 + 0.15*1.0 = 0.7
        assert!((v.confidence - 0.7).abs() < 1e-9);
        assert_eq!(v.recommendation, Recommendation::Warning);
    }

    #[test]
    fn test_extract_missing_module() {
        assert_eq!(
            extract_missing_module("No module named 'plotly'"),
            Some("plotly".to_string())
        );
        assert_eq!(
            extract_missing_module("ModuleNotFoundError: No module named \"sklearn.extra\""),
            Some("sklearn.extra".to_string())
        );
        assert_eq!(extract_missing_module("TypeError"), None);
    }

    #[test]
    fn test_trend_classification() {
        let mut verifier = StateVerifier::new();
        let step = PlanStep::new(1, "s");
        let fail = ToolResult::err("jupyter_cell", "NameError: x").with_error_name("NameError");
        let ok = ToolResult::ok("jupyter_cell", "fine");

        // Old results poor, recent results clean → improving
        for _ in 0..3 {
            verifier.verify_step_state(&step, &fail, &[], &HashSet::new());
        }
        for _ in 0..3 {
            verifier.verify_step_state(&step, &ok, &[], &HashSet::new());
        }
        assert_eq!(verifier.trend(), VerificationTrend::Improving);

        let mut declining = StateVerifier::new();
        for _ in 0..3 {
            declining.verify_step_state(&step, &ok, &[], &HashSet::new());
        }
        for _ in 0..3 {
            declining.verify_step_state(&step, &fail, &[], &HashSet::new());
        }
        assert_eq!(declining.trend(), VerificationTrend::Declining);

        let mut short = StateVerifier::new();
        short.verify_step_state(&step, &ok, &[], &HashSet::new());
        assert_eq!(short.trend(), VerificationTrend::Stable);
    }
}
