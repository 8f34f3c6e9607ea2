//! Built-in Tool Implementations
//!
//! The tool catalogue: cell mutation and execution, file I/O, shell and
//! package installation, workspace creation, lint/test running, git
//! operations, textual refactors, and the terminal final-answer tool.

pub mod answer;
pub mod cell;
pub mod fs;
pub mod git;
pub mod quality;
pub mod refactor;
pub mod shell;
pub mod workspace;
