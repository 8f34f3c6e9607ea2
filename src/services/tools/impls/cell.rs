//! Cell Tools
//!
//! Cell mutation and execution against the host document. Holds the
//! execution protocol for code cells: run, bounded idle wait, settle
//! delay, output read-back, and error-metadata recovery when the host's
//! run signal reports failure without structured error output.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

use tracing::{debug, warn};

use crate::document::CellOutput;
use crate::models::checkpoint::CellType;
use crate::models::plan::CellOperation;
use crate::models::result::ToolResult;
use crate::models::tool::{RiskLevel, ToolCategory, ToolDefinition};
use crate::services::tools::trait_def::{Tool, ToolExecutionContext};

pub const CELL_TOOL_NAME: &str = "jupyter_cell";

fn missing_param_error(tool: &str, param: &str) -> ToolResult {
    ToolResult::err(tool, format!("Missing required parameter: {}", param))
}

/// Matches a bare exception line in raw output, e.g.
/// `ModuleNotFoundError: No module named 'plotly'`.
fn exception_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^([A-Za-z_][A-Za-z0-9_]*(?:Error|Exception))(?::\s*(.*))?$")
            .expect("static regex")
    })
}

/// Recover an error name/message from raw output when the host lost the
/// structured error metadata.
pub(crate) fn recover_error_from_output(raw: &str) -> Option<(String, String)> {
    exception_line_regex().captures(raw).map(|caps| {
        let name = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
        let message = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
        (name, message)
    })
}

/// Run a code cell and read back its outputs as a normalized result.
///
/// Protocol: trigger the host run → wait for kernel idle (bounded,
/// advisory) → settle delay for output-model synchronization → read
/// structured outputs. Cancellation mid-run requests a kernel interrupt.
pub(crate) async fn run_code_cell(ctx: &ToolExecutionContext, index: usize) -> ToolResult {
    let run_signal = match ctx.document.run_cell(index).await {
        Ok(signal) => signal,
        Err(err) => {
            return ToolResult::err(CELL_TOOL_NAME, format!("run failed: {}", err))
                .with_cell_index(index)
        }
    };

    let idle_timeout = Duration::from_millis(ctx.config.kernel_idle_timeout_ms);
    let became_idle = tokio::select! {
        idle = ctx.document.wait_idle(idle_timeout) => idle.unwrap_or(false),
        _ = ctx.cancellation_token.cancelled() => {
            let _ = ctx.document.interrupt_kernel().await;
            return ToolResult::err(CELL_TOOL_NAME, "execution cancelled")
                .with_error_name("Cancelled")
                .with_cell_index(index);
        }
    };
    if !became_idle {
        debug!(index, "kernel did not report idle within timeout; continuing");
    }
    tokio::time::sleep(Duration::from_millis(ctx.config.output_settle_ms)).await;

    let outputs = ctx.document.get_cell_outputs(index).await.unwrap_or_default();

    let mut text_parts: Vec<String> = Vec::new();
    let mut error: Option<(String, String, Vec<String>)> = None;
    for output in &outputs {
        match output {
            CellOutput::Stream { text } | CellOutput::Result { text } => {
                text_parts.push(text.clone())
            }
            CellOutput::Error {
                ename,
                evalue,
                traceback,
            } => error = Some((ename.clone(), evalue.clone(), traceback.clone())),
        }
    }
    let flat_output = text_parts.join("\n");

    if let Some((ename, evalue, traceback)) = error {
        return ToolResult::err(CELL_TOOL_NAME, format!("{}: {}", ename, evalue))
            .with_error_name(ename)
            .with_traceback(traceback.join("\n"))
            .with_cell_index(index);
    }

    if !run_signal {
        // Host reported failure but no structured error was captured:
        // recover error metadata from the raw text.
        if let Some((name, message)) = recover_error_from_output(&flat_output) {
            warn!(index, error = %name, "recovered error metadata from raw output");
            return ToolResult::err(CELL_TOOL_NAME, format!("{}: {}", name, message))
                .with_error_name(name)
                .with_cell_index(index);
        }
        return ToolResult::err(CELL_TOOL_NAME, "cell execution reported failure")
            .with_cell_index(index);
    }

    ToolResult::ok(CELL_TOOL_NAME, flat_output).with_cell_index(index)
}

/// Primary cell mutation tool: create/modify/insert a code or markdown
/// cell and, for code cells, execute it.
///
/// Unless the call explicitly requests INSERT_BEFORE/INSERT_AFTER, a new
/// cell is appended at the current end of the document — never spliced
/// into the middle — so document order reflects chronological execution
/// order. MODIFY updates an existing cell in place and retains its prior
/// content for rollback.
pub struct CellTool;

#[async_trait]
impl Tool for CellTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            CELL_TOOL_NAME,
            "Create, modify, or insert a notebook cell and execute it",
            RiskLevel::Medium,
            ToolCategory::Cell,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let code = match args.get("code").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return missing_param_error(CELL_TOOL_NAME, "code"),
        };
        let operation: CellOperation = args
            .get("operation")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let cell_type = match args.get("cell_type").and_then(|v| v.as_str()) {
            Some("markdown") => CellType::Markdown,
            _ => CellType::Code,
        };
        let anchor = args
            .get("cell_index")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize);
        let should_execute = args
            .get("execute")
            .and_then(|v| v.as_bool())
            .unwrap_or(cell_type == CellType::Code);

        let count = match ctx.document.cell_count().await {
            Ok(c) => c,
            Err(err) => return ToolResult::err(CELL_TOOL_NAME, err.to_string()),
        };

        let (index, previous) = match operation {
            CellOperation::Modify => {
                let index = match anchor {
                    Some(i) => i,
                    None => return missing_param_error(CELL_TOOL_NAME, "cell_index"),
                };
                let previous = match ctx.document.get_cell_source(index).await {
                    Ok(src) => src,
                    Err(err) => return ToolResult::err(CELL_TOOL_NAME, err.to_string()),
                };
                if let Err(err) = ctx.document.set_cell_source(index, code).await {
                    return ToolResult::err(CELL_TOOL_NAME, err.to_string());
                }
                (index, Some(previous))
            }
            CellOperation::InsertBefore | CellOperation::InsertAfter => {
                let anchor = match anchor {
                    Some(i) => i,
                    None => return missing_param_error(CELL_TOOL_NAME, "cell_index"),
                };
                let index = match operation {
                    CellOperation::InsertBefore => anchor.min(count),
                    _ => (anchor + 1).min(count),
                };
                if let Err(err) = ctx.document.insert_cell(index, cell_type, code).await {
                    return ToolResult::err(CELL_TOOL_NAME, err.to_string());
                }
                (index, None)
            }
            CellOperation::Create => {
                // Sequential insertion invariant: append at the current end.
                if let Err(err) = ctx.document.insert_cell(count, cell_type, code).await {
                    return ToolResult::err(CELL_TOOL_NAME, err.to_string());
                }
                (count, None)
            }
        };

        let mut result = if should_execute && cell_type == CellType::Code {
            run_code_cell(ctx, index).await
        } else {
            ToolResult::ok(CELL_TOOL_NAME, "").with_cell_index(index)
        };

        if let Some(previous) = previous {
            result = result.with_modified(previous);
        }
        result
    }
}

/// Delete a cell by index.
pub struct DeleteCellTool;

#[async_trait]
impl Tool for DeleteCellTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "delete_cell",
            "Delete a notebook cell by index",
            RiskLevel::Critical,
            ToolCategory::Cell,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let index = match args.get("cell_index").and_then(|v| v.as_u64()) {
            Some(i) => i as usize,
            None => return missing_param_error("delete_cell", "cell_index"),
        };
        let previous = match ctx.document.get_cell_source(index).await {
            Ok(src) => src,
            Err(err) => return ToolResult::err("delete_cell", err.to_string()),
        };
        match ctx.document.delete_cell(index).await {
            Ok(()) => ToolResult::ok("delete_cell", format!("deleted cell {}", index))
                .with_cell_index(index)
                .with_modified(previous),
            Err(err) => ToolResult::err("delete_cell", err.to_string()),
        }
    }
}

/// Re-execute an existing cell by index.
pub struct ExecuteCellTool;

#[async_trait]
impl Tool for ExecuteCellTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "execute_cell",
            "Execute an existing notebook cell by index",
            RiskLevel::Medium,
            ToolCategory::Cell,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let index = match args.get("cell_index").and_then(|v| v.as_u64()) {
            Some(i) => i as usize,
            None => return missing_param_error("execute_cell", "cell_index"),
        };
        let mut result = run_code_cell(ctx, index).await;
        result.tool = "execute_cell".to_string();
        result
    }
}
