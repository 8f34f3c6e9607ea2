//! Tool Executor
//!
//! Normalizes every tool call behind one choke point: cancellation check,
//! safety scan of code payloads, approval-gated registry dispatch, and a
//! hard timeout with kernel interrupt. Tool failures never escape as
//! errors; everything is a `ToolResult`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::models::plan::ToolCall;
use crate::models::result::ToolResult;
use crate::services::safety::SafetyChecker;
use crate::services::tools::trait_def::{ToolExecutionContext, ToolRegistry};

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    safety: SafetyChecker,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, safety: SafetyChecker) -> Self {
        Self { registry, safety }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute one tool call end to end.
    ///
    /// The safety scan runs before anything touches the document, so a
    /// blocked payload leaves no partial mutation behind. A timed-out
    /// call gets a kernel interrupt so a wedged cell cannot hold the
    /// kernel hostage.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolExecutionContext) -> ToolResult {
        if ctx.cancellation_token.is_cancelled() {
            return ToolResult::err(&call.tool, "Execution cancelled")
                .with_error_name("Cancelled");
        }

        if let Some(code) = call.code() {
            let report = self.safety.check_code_safety(code);
            for warning in &report.warnings {
                debug!(tool = %call.tool, rule = %warning.rule, severity = ?warning.severity,
                    "safety warning");
            }
            if !report.safe {
                warn!(tool = %call.tool, blocked = ?report.blocked_patterns,
                    "code blocked by safety check");
                return ToolResult::err(
                    &call.tool,
                    format!(
                        "Blocked by safety check: {}",
                        report.blocked_patterns.join(", ")
                    ),
                )
                .with_error_name("SafetyViolation");
            }
        }

        let timeout = Duration::from_millis(ctx.config.tool_timeout_ms);
        let dispatch = self
            .registry
            .execute_tool(&call.tool, ctx, call.parameters.clone());

        match tokio::time::timeout(timeout, dispatch).await {
            Ok(result) => result,
            Err(_) => {
                warn!(tool = %call.tool, timeout_ms = ctx.config.tool_timeout_ms,
                    "tool call timed out, interrupting kernel");
                if let Err(err) = ctx.document.interrupt_kernel().await {
                    warn!(%err, "kernel interrupt after timeout failed");
                }
                ToolResult::err(
                    &call.tool,
                    format!("Tool timed out after {}ms", ctx.config.tool_timeout_ms),
                )
                .with_error_name("Timeout")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::document::{DocumentAdapter, MemoryDocument};
    use crate::models::tool::{RiskLevel, ToolCategory, ToolDefinition};
    use crate::services::tools::trait_def::Tool;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("slow", "Sleeps forever", RiskLevel::Low, ToolCategory::Process)
        }

        async fn execute(
            &self,
            _ctx: &ToolExecutionContext,
            _args: serde_json::Value,
        ) -> ToolResult {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            ToolResult::ok("slow", "never happens")
        }
    }

    fn executor_with(tools: Vec<Arc<dyn Tool>>) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        ToolExecutor::new(Arc::new(registry), SafetyChecker::default())
    }

    fn ctx_with(doc: Arc<MemoryDocument>, config: AgentConfig) -> ToolExecutionContext {
        ToolExecutionContext::new(doc, std::env::temp_dir()).with_config(config)
    }

    #[tokio::test]
    async fn test_dangerous_code_blocked_before_execution() {
        let executor = executor_with(vec![]);
        let doc = Arc::new(MemoryDocument::new());
        let ctx = ctx_with(doc.clone(), AgentConfig::default());

        let call = ToolCall {
            tool: "jupyter_cell".to_string(),
            parameters: json!({"operation": "CREATE", "code": "import os\nos.system('rm -rf /')"}),
        };
        let result = executor.execute(&call, &ctx).await;
        assert!(!result.success);
        assert_eq!(result.error_name.as_deref(), Some("SafetyViolation"));
        // Nothing reached the document
        assert_eq!(doc.cell_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_timeout_interrupts_kernel() {
        let executor = executor_with(vec![Arc::new(SlowTool)]);
        let doc = Arc::new(MemoryDocument::new());
        let config = AgentConfig {
            tool_timeout_ms: 20,
            ..AgentConfig::default()
        };
        let ctx = ctx_with(doc.clone(), config);

        let call = ToolCall {
            tool: "slow".to_string(),
            parameters: json!({}),
        };
        let result = executor.execute(&call, &ctx).await;
        assert!(!result.success);
        assert_eq!(result.error_name.as_deref(), Some("Timeout"));
        assert_eq!(doc.interrupt_count().await, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch() {
        let executor = executor_with(vec![Arc::new(SlowTool)]);
        let doc = Arc::new(MemoryDocument::new());
        let token = CancellationToken::new();
        token.cancel();
        let ctx = ToolExecutionContext::new(doc, std::env::temp_dir()).with_cancellation(token);

        let call = ToolCall {
            tool: "slow".to_string(),
            parameters: json!({}),
        };
        let result = executor.execute(&call, &ctx).await;
        assert!(!result.success);
        assert_eq!(result.error_name.as_deref(), Some("Cancelled"));
    }

    #[tokio::test]
    async fn test_warning_level_code_still_runs() {
        let executor = executor_with(vec![]);
        let doc = Arc::new(MemoryDocument::new());
        let ctx = ctx_with(doc, AgentConfig::default());

        // eval() is warning severity; dispatch proceeds (to an unknown
        // tool here, which is its own failure mode, not a safety block)
        let call = ToolCall {
            tool: "nonexistent".to_string(),
            parameters: json!({"code": "eval('1+1')"}),
        };
        let result = executor.execute(&call, &ctx).await;
        assert!(!result.success);
        assert_ne!(result.error_name.as_deref(), Some("SafetyViolation"));
    }
}
