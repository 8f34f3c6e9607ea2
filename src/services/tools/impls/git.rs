//! Git Tool
//!
//! A thin gateway to a fixed set of read-mostly git subcommands. Anything
//! history-destructive is not in the allowlist.

use async_trait::async_trait;
use serde_json::Value;

use crate::models::result::ToolResult;
use crate::models::tool::{RiskLevel, ToolCategory, ToolDefinition};
use crate::services::tools::impls::shell::run_shell;
use crate::services::tools::trait_def::{Tool, ToolExecutionContext};

const ALLOWED_SUBCOMMANDS: &[&str] = &[
    "status", "log", "diff", "add", "commit", "branch", "checkout", "stash", "show",
];

pub struct GitTool;

#[async_trait]
impl Tool for GitTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "git",
            "Run an allowlisted git subcommand in the workspace",
            RiskLevel::Medium,
            ToolCategory::Git,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let subcommand = match args.get("subcommand").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::err("git", "Missing required parameter: subcommand"),
        };
        if !ALLOWED_SUBCOMMANDS.contains(&subcommand) {
            return ToolResult::err(
                "git",
                format!(
                    "Subcommand '{}' is not allowed (allowed: {})",
                    subcommand,
                    ALLOWED_SUBCOMMANDS.join(", ")
                ),
            );
        }
        let extra = args.get("args").and_then(|v| v.as_str()).unwrap_or("");
        if extra.contains(';') || extra.contains('|') || extra.contains('&') || extra.contains('`')
        {
            return ToolResult::err("git", "Shell metacharacters are not allowed in git args");
        }
        let command = if extra.is_empty() {
            format!("git {}", subcommand)
        } else {
            format!("git {} {}", subcommand, extra)
        };
        run_shell(&command, ctx, "git").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ctx_in(dir: &TempDir) -> ToolExecutionContext {
        ToolExecutionContext::new(Arc::new(MemoryDocument::new()), dir.path().to_path_buf())
    }

    #[tokio::test]
    async fn test_disallowed_subcommand_is_rejected() {
        let dir = TempDir::new().unwrap();
        let result = GitTool
            .execute(&ctx_in(&dir), json!({"subcommand": "push"}))
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("not allowed"));
    }

    #[tokio::test]
    async fn test_metacharacters_in_args_are_rejected() {
        let dir = TempDir::new().unwrap();
        let result = GitTool
            .execute(
                &ctx_in(&dir),
                json!({"subcommand": "status", "args": "; rm -rf /"}),
            )
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_status_in_fresh_repo() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_in(&dir);
        let init = run_shell("git init -q", &ctx, "git").await;
        assert!(init.success);
        let result = GitTool.execute(&ctx, json!({"subcommand": "status"})).await;
        assert!(result.success);
    }
}
