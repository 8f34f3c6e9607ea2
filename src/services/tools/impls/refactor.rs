//! Refactor Tools
//!
//! Textual refactors over a single cell's source: rename a symbol with
//! word-boundary matching, extract an expression into a variable, or
//! inline a simple assignment. Each mutation retains the previous source
//! so checkpoints can restore it.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::document::DocumentAdapter;
use crate::models::result::ToolResult;
use crate::models::tool::{RiskLevel, ToolCategory, ToolDefinition};
use crate::services::tools::trait_def::{Tool, ToolExecutionContext};

const IDENT_RE: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

fn is_identifier(name: &str) -> bool {
    Regex::new(IDENT_RE).map(|re| re.is_match(name)).unwrap_or(false)
}

async fn read_cell_source(
    document: &dyn DocumentAdapter,
    cell_index: usize,
    tool: &str,
) -> Result<String, ToolResult> {
    match document.get_cell_source(cell_index).await {
        Ok(source) => Ok(source),
        Err(err) => Err(ToolResult::err(
            tool,
            format!("Failed to read cell {}: {}", cell_index, err),
        )),
    }
}

async fn write_cell_source(
    document: &dyn DocumentAdapter,
    cell_index: usize,
    source: String,
    previous: String,
    tool: &str,
    message: String,
) -> ToolResult {
    match document.set_cell_source(cell_index, &source).await {
        Ok(()) => ToolResult::ok(tool, message)
            .with_cell_index(cell_index)
            .with_modified(previous),
        Err(err) => ToolResult::err(tool, format!("Failed to update cell {}: {}", cell_index, err)),
    }
}

fn cell_index_arg(args: &Value, tool: &str) -> Result<usize, ToolResult> {
    args.get("cell_index")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .ok_or_else(|| ToolResult::err(tool, "Missing required parameter: cell_index"))
}

/// Rename every word-boundary occurrence of a symbol within a cell.
pub struct RenameSymbolTool;

#[async_trait]
impl Tool for RenameSymbolTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "rename_symbol",
            "Rename a symbol within a cell using word-boundary matching",
            RiskLevel::Medium,
            ToolCategory::Refactor,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let cell_index = match cell_index_arg(&args, "rename_symbol") {
            Ok(i) => i,
            Err(r) => return r,
        };
        let old_name = args.get("old_name").and_then(|v| v.as_str()).unwrap_or("");
        let new_name = args.get("new_name").and_then(|v| v.as_str()).unwrap_or("");
        if !is_identifier(old_name) || !is_identifier(new_name) {
            return ToolResult::err(
                "rename_symbol",
                "Both old_name and new_name must be valid identifiers",
            );
        }

        let source = match read_cell_source(ctx.document.as_ref(), cell_index, "rename_symbol").await
        {
            Ok(s) => s,
            Err(r) => return r,
        };
        let pattern = format!(r"\b{}\b", regex::escape(old_name));
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(err) => return ToolResult::err("rename_symbol", err.to_string()),
        };
        let count = re.find_iter(&source).count();
        if count == 0 {
            return ToolResult::err(
                "rename_symbol",
                format!("Symbol '{}' not found in cell {}", old_name, cell_index),
            );
        }
        let updated = re.replace_all(&source, new_name).into_owned();
        write_cell_source(
            ctx.document.as_ref(),
            cell_index,
            updated,
            source,
            "rename_symbol",
            format!("Renamed {} occurrence(s) of '{}' to '{}'", count, old_name, new_name),
        )
        .await
    }
}

/// Extract an expression into a named variable at the top of the cell.
pub struct ExtractVariableTool;

#[async_trait]
impl Tool for ExtractVariableTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "extract_variable",
            "Extract an expression into a named variable within a cell",
            RiskLevel::Medium,
            ToolCategory::Refactor,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let cell_index = match cell_index_arg(&args, "extract_variable") {
            Ok(i) => i,
            Err(r) => return r,
        };
        let expression = args.get("expression").and_then(|v| v.as_str()).unwrap_or("");
        let name = args.get("variable_name").and_then(|v| v.as_str()).unwrap_or("");
        if expression.is_empty() {
            return ToolResult::err("extract_variable", "Missing required parameter: expression");
        }
        if !is_identifier(name) {
            return ToolResult::err("extract_variable", "variable_name must be a valid identifier");
        }

        let source =
            match read_cell_source(ctx.document.as_ref(), cell_index, "extract_variable").await {
                Ok(s) => s,
                Err(r) => return r,
            };
        if !source.contains(expression) {
            return ToolResult::err(
                "extract_variable",
                format!("Expression not found in cell {}", cell_index),
            );
        }
        let replaced = source.replace(expression, name);
        let updated = format!("{} = {}\n{}", name, expression, replaced);
        write_cell_source(
            ctx.document.as_ref(),
            cell_index,
            updated,
            source,
            "extract_variable",
            format!("Extracted expression into '{}'", name),
        )
        .await
    }
}

/// Inline a simple `name = value` assignment within a cell.
pub struct InlineVariableTool;

#[async_trait]
impl Tool for InlineVariableTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "inline_variable",
            "Inline a simple variable assignment within a cell",
            RiskLevel::Medium,
            ToolCategory::Refactor,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let cell_index = match cell_index_arg(&args, "inline_variable") {
            Ok(i) => i,
            Err(r) => return r,
        };
        let name = args.get("variable_name").and_then(|v| v.as_str()).unwrap_or("");
        if !is_identifier(name) {
            return ToolResult::err("inline_variable", "variable_name must be a valid identifier");
        }

        let source =
            match read_cell_source(ctx.document.as_ref(), cell_index, "inline_variable").await {
                Ok(s) => s,
                Err(r) => return r,
            };
        let assign_re = match Regex::new(&format!(
            r"(?m)^{}\s*=\s*(.+)$",
            regex::escape(name)
        )) {
            Ok(re) => re,
            Err(err) => return ToolResult::err("inline_variable", err.to_string()),
        };
        let (value, assign_line) = match assign_re.captures(&source) {
            Some(caps) => {
                let whole = caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();
                let value = caps.get(1).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
                (value, whole)
            }
            None => {
                return ToolResult::err(
                    "inline_variable",
                    format!("No assignment to '{}' found in cell {}", name, cell_index),
                )
            }
        };

        let without_assign: String = source
            .lines()
            .filter(|line| *line != assign_line)
            .collect::<Vec<_>>()
            .join("\n");
        let use_re = match Regex::new(&format!(r"\b{}\b", regex::escape(name))) {
            Ok(re) => re,
            Err(err) => return ToolResult::err("inline_variable", err.to_string()),
        };
        let updated = use_re.replace_all(&without_assign, value.as_str()).into_owned();
        write_cell_source(
            ctx.document.as_ref(),
            cell_index,
            updated,
            source,
            "inline_variable",
            format!("Inlined '{}' as {}", name, value),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;
    use serde_json::json;
    use std::sync::Arc;

    async fn doc_with(source: &str) -> (Arc<MemoryDocument>, ToolExecutionContext) {
        let doc = Arc::new(MemoryDocument::new());
        doc.insert_cell(0, crate::models::checkpoint::CellType::Code, source)
            .await
            .unwrap();
        let ctx = ToolExecutionContext::new(doc.clone(), std::env::temp_dir());
        (doc, ctx)
    }

    #[tokio::test]
    async fn test_rename_respects_word_boundaries() {
        let (doc, ctx) = doc_with("data = 1\ndataset = data + data_frame").await;
        let result = RenameSymbolTool
            .execute(
                &ctx,
                json!({"cell_index": 0, "old_name": "data", "new_name": "df"}),
            )
            .await;
        assert!(result.success);
        assert!(result.was_modified);
        assert_eq!(
            doc.sources().await[0],
            "df = 1\ndataset = df + data_frame"
        );
    }

    #[tokio::test]
    async fn test_rename_missing_symbol_fails() {
        let (_doc, ctx) = doc_with("x = 1").await;
        let result = RenameSymbolTool
            .execute(
                &ctx,
                json!({"cell_index": 0, "old_name": "y", "new_name": "z"}),
            )
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_extract_variable_prepends_assignment() {
        let (doc, ctx) = doc_with("print(a + b * 2)").await;
        let result = ExtractVariableTool
            .execute(
                &ctx,
                json!({"cell_index": 0, "expression": "a + b * 2", "variable_name": "total"}),
            )
            .await;
        assert!(result.success);
        assert_eq!(doc.sources().await[0], "total = a + b * 2\nprint(total)");
    }

    #[tokio::test]
    async fn test_inline_variable_substitutes_value() {
        let (doc, ctx) = doc_with("rate = 0.05\ntotal = base * rate").await;
        let result = InlineVariableTool
            .execute(&ctx, json!({"cell_index": 0, "variable_name": "rate"}))
            .await;
        assert!(result.success);
        assert_eq!(doc.sources().await[0], "total = base * 0.05");
    }

    #[tokio::test]
    async fn test_mutations_retain_previous_source() {
        let (_doc, ctx) = doc_with("old_name = 1").await;
        let result = RenameSymbolTool
            .execute(
                &ctx,
                json!({"cell_index": 0, "old_name": "old_name", "new_name": "new_name"}),
            )
            .await;
        assert_eq!(result.previous_content.as_deref(), Some("old_name = 1"));
        assert_eq!(result.cell_index, Some(0));
    }
}
