//! Verification Models
//!
//! Post-execution audit results: weighted confidence factors, structured
//! mismatches, and the proceed/warn/replan/escalate recommendation ladder.

use serde::{Deserialize, Serialize};

/// What the verifier recommends the orchestrator do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Confidence ≥ 0.8: continue silently
    Proceed,
    /// Confidence ≥ 0.6: continue, log a warning
    Warning,
    /// Confidence ≥ 0.4: note for the next replanning pass
    Replan,
    /// Confidence < 0.4: abort the task
    Escalate,
}

/// Kind of expected-vs-observed mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Output text did not match the expected pattern
    OutputMismatch,
    /// An expected variable was not created
    MissingVariable,
    /// An exception was raised
    ExceptionRaised,
    /// A module import failed
    ImportFailed,
    /// The step did not run to completion
    Incomplete,
}

/// Severity of a mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchSeverity {
    Info,
    Warning,
    Critical,
}

/// Structured record of one expected-vs-observed difference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mismatch {
    pub kind: MismatchKind,
    pub severity: MismatchSeverity,
    /// What was expected
    pub expected: String,
    /// What was observed
    pub actual: String,
    /// Suggested remedy, when derivable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Per-factor confidence breakdown. Each factor is in [0,1]; the overall
/// confidence is their fixed-weight combination.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceDetails {
    /// Output matched the expected pattern (weight 0.3)
    pub output_match: f64,
    /// Expected variables were created (weight 0.3)
    pub variables_created: f64,
    /// No exception was raised (weight 0.25)
    pub no_exception: f64,
    /// Execution ran to completion (weight 0.15)
    pub completeness: f64,
}

impl ConfidenceDetails {
    pub const WEIGHT_OUTPUT: f64 = 0.3;
    pub const WEIGHT_VARIABLES: f64 = 0.3;
    pub const WEIGHT_NO_EXCEPTION: f64 = 0.25;
    pub const WEIGHT_COMPLETENESS: f64 = 0.15;

    /// Weighted overall confidence, clamped to [0,1].
    pub fn overall(&self) -> f64 {
        let combined = self.output_match * Self::WEIGHT_OUTPUT
            + self.variables_created * Self::WEIGHT_VARIABLES
            + self.no_exception * Self::WEIGHT_NO_EXCEPTION
            + self.completeness * Self::WEIGHT_COMPLETENESS;
        combined.clamp(0.0, 1.0)
    }
}

/// Result of one post-execution state verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    /// True when no critical mismatch was found
    pub is_valid: bool,
    /// Overall confidence in [0,1]
    pub confidence: f64,
    /// Per-factor breakdown
    pub confidence_details: ConfidenceDetails,
    /// Structured mismatches found
    pub mismatches: Vec<Mismatch>,
    /// Deterministic step function of `confidence`
    pub recommendation: Recommendation,
}

impl VerificationResult {
    /// Threshold constants for the recommendation step function.
    pub const PROCEED_THRESHOLD: f64 = 0.8;
    pub const WARNING_THRESHOLD: f64 = 0.6;
    pub const REPLAN_THRESHOLD: f64 = 0.4;

    /// Map a confidence score to a recommendation.
    pub fn recommendation_for(confidence: f64) -> Recommendation {
        if confidence >= Self::PROCEED_THRESHOLD {
            Recommendation::Proceed
        } else if confidence >= Self::WARNING_THRESHOLD {
            Recommendation::Warning
        } else if confidence >= Self::REPLAN_THRESHOLD {
            Recommendation::Replan
        } else {
            Recommendation::Escalate
        }
    }
}

/// Trend classification over the verification history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationTrend {
    Improving,
    Declining,
    Stable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        let sum = ConfidenceDetails::WEIGHT_OUTPUT
            + ConfidenceDetails::WEIGHT_VARIABLES
            + ConfidenceDetails::WEIGHT_NO_EXCEPTION
            + ConfidenceDetails::WEIGHT_COMPLETENESS;
        assert!((sum - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overall_confidence_bounds() {
        let perfect = ConfidenceDetails {
            output_match: 1.0,
            variables_created: 1.0,
            no_exception: 1.0,
            completeness: 1.0,
        };
        assert!((perfect.overall() - 1.0).abs() < 1e-9);

        let zero = ConfidenceDetails {
            output_match: 0.0,
            variables_created: 0.0,
            no_exception: 0.0,
            completeness: 0.0,
        };
        assert_eq!(zero.overall(), 0.0);
    }

    #[test]
    fn test_recommendation_step_function() {
        assert_eq!(
            VerificationResult::recommendation_for(0.8),
            Recommendation::Proceed
        );
        assert_eq!(
            VerificationResult::recommendation_for(0.79),
            Recommendation::Warning
        );
        assert_eq!(
            VerificationResult::recommendation_for(0.6),
            Recommendation::Warning
        );
        assert_eq!(
            VerificationResult::recommendation_for(0.59),
            Recommendation::Replan
        );
        assert_eq!(
            VerificationResult::recommendation_for(0.4),
            Recommendation::Replan
        );
        assert_eq!(
            VerificationResult::recommendation_for(0.39),
            Recommendation::Escalate
        );
    }
}
