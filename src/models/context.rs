//! Context Models
//!
//! The notebook context handed to the LLM on each call, token usage
//! accounting, and cell priority tiers used during pruning.

use serde::{Deserialize, Serialize};

/// Priority tier assigned to a cell during pruning.
/// Higher tiers survive longer under budget pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellPriority {
    Low,
    Medium,
    High,
    /// The current/most recent cell; truncated but never dropped
    Critical,
}

/// One cell as seen by the context manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellInfo {
    /// Document index of the cell
    pub index: usize,
    /// Cell source text
    pub source: String,
    /// Flattened output text, when available
    #[serde(default)]
    pub output: String,
}

impl CellInfo {
    pub fn new(index: usize, source: impl Into<String>) -> Self {
        Self {
            index,
            source: source.into(),
            output: String::new(),
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }
}

/// Raw context gathered from the document/kernel before budgeting.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotebookContext {
    /// Recent cells, in document order
    pub cells: Vec<CellInfo>,
    /// Known variable names with a short repr each: (name, preview)
    pub variables: Vec<(String, String)>,
    /// Imported library names
    pub libraries: Vec<String>,
    /// Index of the cell the task is currently focused on, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_cell_index: Option<usize>,
}

/// Token accounting for one context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    /// Tokens attributed to cell sources and outputs
    pub cell_tokens: usize,
    /// Tokens attributed to variable previews
    pub variable_tokens: usize,
    /// Tokens attributed to library names
    pub library_tokens: usize,
    /// Sum of the above
    pub total_tokens: usize,
    /// total_tokens / (max_tokens - reserved_for_response)
    pub usage_percent: f64,
}

/// A cell kept after pruning, possibly truncated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreservedCell {
    /// Original document index
    pub index: usize,
    /// Kept source (tail portion when truncated)
    pub source: String,
    /// Kept output
    pub output: String,
    /// Priority it was assigned during pruning
    pub priority: CellPriority,
    /// True when the source was truncated to fit the budget
    pub truncated: bool,
}

/// Result of a pruning pass.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PrunedContext {
    /// Cells kept, in original index order
    pub preserved_cells: Vec<PreservedCell>,
    /// Variables kept
    pub variables: Vec<(String, String)>,
    /// Libraries kept
    pub libraries: Vec<String>,
    /// Estimated tokens after pruning
    pub estimated_tokens: usize,
    /// Whether any pruning actually happened
    pub was_pruned: bool,
}
