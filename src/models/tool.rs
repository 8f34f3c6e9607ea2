//! Tool Definition and Approval Models
//!
//! Capability catalogue entries (risk level, approval requirement,
//! category) and the request/response pair used by the approval channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool's potential for harmful side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Read-only operations
    Low,
    /// Reversible writes (cell edits, file writes inside the workspace)
    Medium,
    /// Shell commands, package installation
    High,
    /// Destructive operations (deletion, git history rewrites)
    Critical,
}

impl RiskLevel {
    /// Human-readable label used in approval descriptions.
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Functional grouping of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Cell create/modify/insert/delete/execute
    Cell,
    /// File read/write/list/search
    File,
    /// Shell commands and process control
    Process,
    /// Package installation
    Package,
    /// Git operations
    Git,
    /// Lint and test running
    Quality,
    /// Textual refactors
    Refactor,
    /// Notebook/folder creation
    Workspace,
    /// Terminal final-answer reporting
    Answer,
}

/// Catalogue entry for one registered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name (e.g. "jupyter_cell", "run_shell")
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// Potential for harmful side effects
    pub risk_level: RiskLevel,
    /// Whether invocations must pass the approval channel when the
    /// registry-level approval flag is set
    pub requires_approval: bool,
    /// Functional grouping
    pub category: ToolCategory,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        risk_level: RiskLevel,
        category: ToolCategory,
    ) -> Self {
        let requires_approval = matches!(risk_level, RiskLevel::High | RiskLevel::Critical);
        Self {
            name: name.into(),
            description: description.into(),
            risk_level,
            requires_approval,
            category,
        }
    }

    /// Override the approval requirement.
    pub fn with_requires_approval(mut self, requires: bool) -> Self {
        self.requires_approval = requires;
        self
    }
}

/// A pending risky call awaiting a human/automated decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Correlation id (UUID)
    pub id: String,
    /// Tool being invoked
    pub tool: String,
    /// Invocation parameters
    pub parameters: Value,
    /// Human-readable, risk-annotated description
    pub description: String,
    /// Risk level of the tool
    pub risk_level: RiskLevel,
}

impl ApprovalRequest {
    pub fn new(definition: &ToolDefinition, parameters: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tool: definition.name.clone(),
            description: format!(
                "[{} risk] {}: {}",
                definition.risk_level.label(),
                definition.name,
                definition.description
            ),
            risk_level: definition.risk_level,
            parameters,
        }
    }
}

/// Decision for a pending approval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResult {
    /// Whether the invocation may proceed
    pub approved: bool,
    /// Optional reason, surfaced in the failure result on denial
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When true, suppress future prompts for this tool in this registry
    #[serde(default)]
    pub always_allow: bool,
}

impl ApprovalResult {
    pub fn approve() -> Self {
        Self {
            approved: true,
            reason: None,
            always_allow: false,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
            always_allow: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_high_risk_requires_approval_by_default() {
        let def = ToolDefinition::new(
            "run_shell",
            "Run a shell command",
            RiskLevel::High,
            ToolCategory::Process,
        );
        assert!(def.requires_approval);

        let read = ToolDefinition::new(
            "read_file",
            "Read a file",
            RiskLevel::Low,
            ToolCategory::File,
        );
        assert!(!read.requires_approval);
    }

    #[test]
    fn test_approval_request_description_is_risk_annotated() {
        let def = ToolDefinition::new(
            "run_shell",
            "Run a shell command",
            RiskLevel::High,
            ToolCategory::Process,
        );
        let req = ApprovalRequest::new(&def, json!({"command": "ls"}));
        assert!(req.description.contains("[high risk]"));
        assert!(req.description.contains("run_shell"));
        assert!(!req.id.is_empty());
    }

    #[test]
    fn test_denial_carries_reason() {
        let result = ApprovalResult::deny("too risky");
        assert!(!result.approved);
        assert_eq!(result.reason.as_deref(), Some("too risky"));
    }
}
