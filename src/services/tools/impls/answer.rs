//! Final Answer Tool
//!
//! The terminal tool: a successful call signals the task is complete and
//! the remaining plan steps are skipped.

use async_trait::async_trait;
use serde_json::Value;

use crate::models::result::ToolResult;
use crate::models::tool::{RiskLevel, ToolCategory, ToolDefinition};
use crate::services::tools::trait_def::{Tool, ToolExecutionContext};

pub const FINAL_ANSWER_TOOL_NAME: &str = "final_answer";

pub struct FinalAnswerTool;

#[async_trait]
impl Tool for FinalAnswerTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            FINAL_ANSWER_TOOL_NAME,
            "Report the final answer and finish the task",
            RiskLevel::Low,
            ToolCategory::Answer,
        )
    }

    async fn execute(&self, _ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let answer = args
            .get("answer")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        ToolResult::ok(FINAL_ANSWER_TOOL_NAME, answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_final_answer_echoes_answer() {
        let ctx = ToolExecutionContext::new(Arc::new(MemoryDocument::new()), std::env::temp_dir());
        let result = FinalAnswerTool
            .execute(&ctx, json!({"answer": "The mean is 4.2"}))
            .await;
        assert!(result.success);
        assert_eq!(result.tool, "final_answer");
        assert_eq!(result.output.as_deref(), Some("The mean is 4.2"));
    }
}
