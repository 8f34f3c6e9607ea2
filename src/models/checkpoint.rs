//! Checkpoint Models
//!
//! Data structures for step checkpoints and rollback reporting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::plan::Plan;

/// Cell type within the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    Code,
    Markdown,
}

impl Default for CellType {
    fn default() -> Self {
        Self::Code
    }
}

/// A cell snapshot entry within a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellSnapshot {
    /// Cell index at snapshot time
    pub index: usize,
    /// Cell type
    pub cell_type: CellType,
    /// Cell source at snapshot time
    pub source: String,
    /// Captured outputs, when available
    pub outputs: Vec<String>,
    /// True when the step created this cell
    pub was_created: bool,
    /// True when the step modified this cell in place
    pub was_modified: bool,
    /// Source before the modification, for restore
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_source: Option<String>,
}

/// A checkpoint recorded after a successful step, sufficient to undo
/// all steps after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique checkpoint identifier (UUID)
    pub id: String,
    /// Step number this checkpoint was taken after
    pub step_number: u32,
    /// Creation timestamp (ISO 8601)
    pub timestamp: String,
    /// Human-readable description of the step
    pub description: String,
    /// Snapshot of the plan at checkpoint time
    pub plan_snapshot: Plan,
    /// Snapshots of every cell touched by the step
    pub cell_snapshots: Vec<CellSnapshot>,
    /// Cumulative variable names defined up to this step
    pub variable_names: BTreeSet<String>,
    /// Cumulative indices of cells created up to this step
    pub created_cell_indices: BTreeSet<usize>,
    /// Cumulative indices of cells modified up to this step
    pub modified_cell_indices: BTreeSet<usize>,
}

impl Checkpoint {
    /// Create an empty checkpoint for a step.
    pub fn new(step_number: u32, description: impl Into<String>, plan: Plan) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            step_number,
            timestamp: chrono::Utc::now().to_rfc3339(),
            description: description.into(),
            plan_snapshot: plan,
            cell_snapshots: Vec::new(),
            variable_names: BTreeSet::new(),
            created_cell_indices: BTreeSet::new(),
            modified_cell_indices: BTreeSet::new(),
        }
    }
}

/// Successful rollback summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackReport {
    /// Step number rolled back to
    pub rolled_back_to: u32,
    /// Indices of cells deleted (document indices at deletion time)
    pub deleted_cells: Vec<usize>,
    /// Indices of cells restored to their prior source
    pub restored_cells: Vec<usize>,
}

/// Structured rollback failure.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum RollbackError {
    /// No checkpoint exists for the requested step
    #[error("no checkpoint recorded for step {0}")]
    TargetNotFound(u32),
    /// The host document's cells could not be accessed
    #[error("document cells inaccessible: {0}")]
    DocumentInaccessible(String),
    /// A runtime error occurred mid-rollback
    #[error("rollback failed: {0}")]
    Runtime(String),
}
