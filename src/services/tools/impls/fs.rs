//! File Tools
//!
//! Read/write/list/search within the workspace root. Path traversal is
//! rejected outright: absolute paths and `..` segments never reach the
//! filesystem.

use async_trait::async_trait;
use ignore::WalkBuilder;
use regex::Regex;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

use crate::models::result::ToolResult;
use crate::models::tool::{RiskLevel, ToolCategory, ToolDefinition};
use crate::services::tools::trait_def::{Tool, ToolExecutionContext};

/// Maximum matches reported by the search tool.
const MAX_SEARCH_MATCHES: usize = 200;

/// Resolve a workspace-relative path, rejecting absolute paths and any
/// `..` segment outright.
pub(crate) fn validate_path(path_str: &str, workspace_root: &Path) -> Result<PathBuf, String> {
    let path = Path::new(path_str);
    if path.is_absolute() {
        return Err(format!("Absolute paths are not allowed: {}", path_str));
    }
    for component in path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(format!("Path traversal ('..') is not allowed: {}", path_str));
        }
    }
    Ok(workspace_root.join(path))
}

fn missing_param(tool: &str, param: &str) -> ToolResult {
    ToolResult::err(tool, format!("Missing required parameter: {}", param))
}

/// Read a file inside the workspace.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "read_file",
            "Read the contents of a file inside the workspace",
            RiskLevel::Low,
            ToolCategory::File,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let path_str = match args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return missing_param("read_file", "path"),
        };
        let path = match validate_path(path_str, &ctx.workspace_root) {
            Ok(p) => p,
            Err(e) => return ToolResult::err("read_file", e),
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => ToolResult::ok("read_file", content),
            Err(err) => ToolResult::err("read_file", format!("Failed to read {}: {}", path_str, err)),
        }
    }
}

/// Write a file inside the workspace, creating parent directories.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "write_file",
            "Write content to a file inside the workspace, creating directories as needed",
            RiskLevel::Medium,
            ToolCategory::File,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let path_str = match args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return missing_param("write_file", "path"),
        };
        let content = match args.get("content").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return missing_param("write_file", "content"),
        };
        let path = match validate_path(path_str, &ctx.workspace_root) {
            Ok(p) => p,
            Err(e) => return ToolResult::err("write_file", e),
        };
        if let Some(parent) = path.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::err(
                    "write_file",
                    format!("Failed to create directories: {}", err),
                );
            }
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => ToolResult::ok(
                "write_file",
                format!("Wrote {} bytes to {}", content.len(), path_str),
            ),
            Err(err) => {
                ToolResult::err("write_file", format!("Failed to write {}: {}", path_str, err))
            }
        }
    }
}

/// List files matching a glob pattern inside the workspace.
pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "list_files",
            "List workspace files matching a glob pattern",
            RiskLevel::Low,
            ToolCategory::File,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let pattern = args
            .get("pattern")
            .and_then(|v| v.as_str())
            .unwrap_or("**/*");
        if pattern.starts_with('/') || pattern.contains("..") {
            return ToolResult::err("list_files", "Pattern must stay inside the workspace");
        }
        let full_pattern = ctx.workspace_root.join(pattern);
        let full_pattern = match full_pattern.to_str() {
            Some(p) => p.to_string(),
            None => return ToolResult::err("list_files", "Non-UTF8 workspace path"),
        };

        let root = ctx.workspace_root.clone();
        let entries = match glob::glob(&full_pattern) {
            Ok(paths) => paths,
            Err(err) => return ToolResult::err("list_files", format!("Bad pattern: {}", err)),
        };
        let mut files: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|p| {
                p.strip_prefix(&root)
                    .ok()
                    .map(|rel| rel.display().to_string())
            })
            .collect();
        files.sort();
        ToolResult::ok("list_files", files.join("\n"))
    }
}

/// Search file contents with a regex, honoring gitignore rules.
pub struct SearchFilesTool;

#[async_trait]
impl Tool for SearchFilesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "search_files",
            "Search workspace file contents with a regular expression",
            RiskLevel::Low,
            ToolCategory::File,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let pattern = match args.get("pattern").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return missing_param("search_files", "pattern"),
        };
        let regex = match Regex::new(pattern) {
            Ok(r) => r,
            Err(err) => return ToolResult::err("search_files", format!("Bad regex: {}", err)),
        };

        let root = ctx.workspace_root.clone();
        let regex_clone = regex.clone();
        // File walking is blocking work; keep it off the async executor.
        let matches = tokio::task::spawn_blocking(move || {
            let mut matches: Vec<String> = Vec::new();
            for entry in WalkBuilder::new(&root).build().flatten() {
                if matches.len() >= MAX_SEARCH_MATCHES {
                    break;
                }
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let content = match std::fs::read_to_string(path) {
                    Ok(c) => c,
                    Err(_) => continue,
                };
                for (line_no, line) in content.lines().enumerate() {
                    if regex_clone.is_match(line) {
                        let rel = path.strip_prefix(&root).unwrap_or(path);
                        matches.push(format!("{}:{}: {}", rel.display(), line_no + 1, line));
                        if matches.len() >= MAX_SEARCH_MATCHES {
                            break;
                        }
                    }
                }
            }
            matches
        })
        .await;

        match matches {
            Ok(matches) => ToolResult::ok("search_files", matches.join("\n")),
            Err(err) => ToolResult::err("search_files", format!("Search task failed: {}", err)),
        }
    }
}
