//! Code Quality Tools
//!
//! Lint and test runners that shell out to the workspace's own tooling.

use async_trait::async_trait;
use serde_json::Value;

use crate::models::result::ToolResult;
use crate::models::tool::{RiskLevel, ToolCategory, ToolDefinition};
use crate::services::tools::impls::fs::validate_path;
use crate::services::tools::impls::shell::run_shell;
use crate::services::tools::trait_def::{Tool, ToolExecutionContext};

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Run a linter over a file or the whole workspace.
pub struct LintTool;

#[async_trait]
impl Tool for LintTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "lint_code",
            "Run the Python linter over a file or the whole workspace",
            RiskLevel::Low,
            ToolCategory::Quality,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let target = match args.get("path").and_then(|v| v.as_str()) {
            Some(p) => {
                if let Err(e) = validate_path(p, &ctx.workspace_root) {
                    return ToolResult::err("lint_code", e);
                }
                shell_quote(p)
            }
            None => ".".to_string(),
        };
        let command = format!("python -m ruff check {}", target);
        let result = run_shell(&command, ctx, "lint_code").await;
        // No findings and findings-present are both useful outcomes; only
        // a missing linter or crash is a hard failure.
        if !result.success {
            if let Some(err) = &result.error {
                if err.contains("status 1") {
                    return ToolResult::ok("lint_code", err.clone());
                }
            }
        }
        result
    }
}

/// Run the workspace test suite.
pub struct RunTestsTool;

#[async_trait]
impl Tool for RunTestsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "run_tests",
            "Run the Python test suite, optionally scoped to a path",
            RiskLevel::Medium,
            ToolCategory::Quality,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let target = match args.get("path").and_then(|v| v.as_str()) {
            Some(p) => {
                if let Err(e) = validate_path(p, &ctx.workspace_root) {
                    return ToolResult::err("run_tests", e);
                }
                format!(" {}", shell_quote(p))
            }
            None => String::new(),
        };
        let command = format!("python -m pytest -q{}", target);
        run_shell(&command, ctx, "run_tests").await
    }
}
