//! Shell and Package Tools
//!
//! Command execution in the workspace and package installation. Both are
//! high risk and approval-gated; a command gate rejects obviously
//! destructive invocations before anything is spawned.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::models::result::ToolResult;
use crate::models::tool::{RiskLevel, ToolCategory, ToolDefinition};
use crate::services::tools::trait_def::{Tool, ToolExecutionContext};

/// Commands we refuse to run no matter what the planner asks for.
fn dangerous_command_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"rm\s+(-[a-zA-Z]*[rf][a-zA-Z]*\s+)+(/|~|\$HOME)",
            r"mkfs(\.\w+)?\s",
            r"dd\s+.*of=/dev/",
            r":\(\)\s*\{.*\}\s*;?\s*:",
            r"shutdown|reboot|halt\b",
            r">\s*/dev/sd[a-z]",
            r"chmod\s+(-R\s+)?777\s+/",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

pub(crate) fn is_dangerous_command(command: &str) -> bool {
    dangerous_command_patterns()
        .iter()
        .any(|re| re.is_match(command))
}

pub(crate) async fn run_shell(command: &str, ctx: &ToolExecutionContext, tool: &str) -> ToolResult {
    debug!(%command, "spawning shell command");
    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(&ctx.workspace_root)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(err) => return ToolResult::err(tool, format!("Failed to spawn command: {}", err)),
    };

    let output = tokio::select! {
        output = child.wait_with_output() => output,
        _ = ctx.cancellation_token.cancelled() => {
            warn!(%command, "shell command cancelled");
            return ToolResult::err(tool, "Command cancelled").with_error_name("Cancelled");
        }
    };

    match output {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            if output.status.success() {
                let text = if stderr.is_empty() {
                    stdout
                } else {
                    format!("{}\n{}", stdout, stderr)
                };
                ToolResult::ok(tool, text.trim_end())
            } else {
                let code = output.status.code().unwrap_or(-1);
                ToolResult::err(
                    tool,
                    format!("Command exited with status {}: {}", code, stderr.trim_end()),
                )
            }
        }
        Err(err) => ToolResult::err(tool, format!("Failed to read command output: {}", err)),
    }
}

/// Run a shell command in the workspace root.
pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "run_command",
            "Run a shell command in the workspace root",
            RiskLevel::High,
            ToolCategory::Process,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let command = match args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::err("run_command", "Missing required parameter: command"),
        };
        if is_dangerous_command(command) {
            warn!(%command, "refusing dangerous command");
            return ToolResult::err(
                "run_command",
                format!("Command rejected as dangerous: {}", command),
            )
            .with_error_name("DangerousCommand");
        }
        run_shell(command, ctx, "run_command").await
    }
}

/// Install a Python package into the active environment.
pub struct InstallPackageTool;

#[async_trait]
impl Tool for InstallPackageTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "install_package",
            "Install a Python package with pip",
            RiskLevel::High,
            ToolCategory::Package,
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let package = match args.get("package").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => {
                return ToolResult::err("install_package", "Missing required parameter: package")
            }
        };
        // Package names only; anything shell-significant is rejected.
        let valid = package
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '=' | '<' | '>' | '[' | ']' | ','));
        if package.is_empty() || !valid {
            return ToolResult::err(
                "install_package",
                format!("Invalid package specifier: {}", package),
            );
        }
        let command = format!("python -m pip install '{}'", package);
        run_shell(&command, ctx, "install_package").await
    }
}
