//! Tool Layer
//!
//! The capability-gated tool abstraction: the `Tool` trait, the
//! dependency-injected `ToolRegistry` with its approval gate, the
//! `ToolExecutor` that normalizes execution, and the built-in tool
//! catalogue.

pub mod executor;
pub mod impls;
pub mod trait_def;

pub use executor::ToolExecutor;
pub use trait_def::{ApprovalCallback, Tool, ToolExecutionContext, ToolRegistry};

use std::sync::Arc;

/// Build a registry populated with the built-in tool catalogue.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(impls::cell::CellTool));
    registry.register(Arc::new(impls::cell::DeleteCellTool));
    registry.register(Arc::new(impls::cell::ExecuteCellTool));
    registry.register(Arc::new(impls::fs::ReadFileTool));
    registry.register(Arc::new(impls::fs::WriteFileTool));
    registry.register(Arc::new(impls::fs::ListFilesTool));
    registry.register(Arc::new(impls::fs::SearchFilesTool));
    registry.register(Arc::new(impls::shell::ShellTool));
    registry.register(Arc::new(impls::shell::InstallPackageTool));
    registry.register(Arc::new(impls::workspace::CreateNotebookTool));
    registry.register(Arc::new(impls::workspace::CreateFolderTool));
    registry.register(Arc::new(impls::quality::LintTool));
    registry.register(Arc::new(impls::quality::RunTestsTool));
    registry.register(Arc::new(impls::git::GitTool));
    registry.register(Arc::new(impls::refactor::RenameSymbolTool));
    registry.register(Arc::new(impls::refactor::ExtractVariableTool));
    registry.register(Arc::new(impls::refactor::InlineVariableTool));
    registry.register(Arc::new(impls::answer::FinalAnswerTool));
    registry
}
