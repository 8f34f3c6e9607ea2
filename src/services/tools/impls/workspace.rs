//! Workspace Tools
//!
//! Creation of notebooks and folders under the workspace root.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::models::result::ToolResult;
use crate::models::tool::{RiskLevel, ToolCategory, ToolDefinition};
use crate::services::tools::impls::fs::validate_path;
use crate::services::tools::trait_def::{Tool, ToolExecutionContext};

/// Minimal empty notebook document, nbformat 4.
fn empty_notebook() -> Value {
    json!({
        "cells": [],
        "metadata": {
            "kernelspec": {
                "display_name": "Python 3",
                "language": "python",
                "name": "python3"
            },
            "language_info": { "name": "python" }
        },
        "nbformat": 4,
        "nbformat_minor": 5
    })
}

/// Create a new empty notebook file.
pub struct CreateNotebookTool;

#[async_trait]
impl Tool for CreateNotebookTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "create_notebook",
            "Create a new empty notebook file in the workspace",
            RiskLevel::Medium,
            ToolCategory::Workspace,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let path_str = match args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::err("create_notebook", "Missing required parameter: path"),
        };
        let path_str = if path_str.ends_with(".ipynb") {
            path_str.to_string()
        } else {
            format!("{}.ipynb", path_str)
        };
        let path = match validate_path(&path_str, &ctx.workspace_root) {
            Ok(p) => p,
            Err(e) => return ToolResult::err("create_notebook", e),
        };
        if path.exists() {
            return ToolResult::err(
                "create_notebook",
                format!("Notebook already exists: {}", path_str),
            );
        }
        if let Some(parent) = path.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::err(
                    "create_notebook",
                    format!("Failed to create directories: {}", err),
                );
            }
        }
        let content = match serde_json::to_string_pretty(&empty_notebook()) {
            Ok(c) => c,
            Err(err) => return ToolResult::err("create_notebook", err.to_string()),
        };
        match tokio::fs::write(&path, content).await {
            Ok(()) => ToolResult::ok("create_notebook", format!("Created notebook {}", path_str)),
            Err(err) => ToolResult::err(
                "create_notebook",
                format!("Failed to create {}: {}", path_str, err),
            ),
        }
    }
}

/// Create a folder (and any missing parents).
pub struct CreateFolderTool;

#[async_trait]
impl Tool for CreateFolderTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "create_folder",
            "Create a folder in the workspace",
            RiskLevel::Low,
            ToolCategory::Workspace,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let path_str = match args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::err("create_folder", "Missing required parameter: path"),
        };
        let path = match validate_path(path_str, &ctx.workspace_root) {
            Ok(p) => p,
            Err(e) => return ToolResult::err("create_folder", e),
        };
        match tokio::fs::create_dir_all(&path).await {
            Ok(()) => ToolResult::ok("create_folder", format!("Created folder {}", path_str)),
            Err(err) => ToolResult::err(
                "create_folder",
                format!("Failed to create {}: {}", path_str, err),
            ),
        }
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
    async fn test_create_notebook_appends_extension() {
        let dir = TempDir::new().unwrap();
        let result = CreateNotebookTool
            .execute(&ctx_in(&dir), json!({"path": "analysis"}))
            .await;
        assert!(result.success);
        assert!(dir.path().join("analysis.ipynb").exists());
    }

    #[tokio::test]
    async fn test_create_notebook_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("nb.ipynb"), "{}").unwrap();
        let result = CreateNotebookTool
            .execute(&ctx_in(&dir), json!({"path": "nb.ipynb"}))
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("already exists"));
    }

    #[tokio::test]
    async fn test_create_folder_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_in(&dir);
        let first = CreateFolderTool
            .execute(&ctx, json!({"path": "data/raw"}))
            .await;
        let second = CreateFolderTool
            .execute(&ctx, json!({"path": "data/raw"}))
            .await;
        assert!(first.success);
        assert!(second.success);
        assert!(dir.path().join("data/raw").is_dir());
    }
}
