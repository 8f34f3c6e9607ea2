//! Checkpoint Manager
//!
//! Snapshot/rollback subsystem. Records what each step created or modified
//! and can undo steps back to a chosen checkpoint. Retention is a circular
//! buffer: beyond `max_checkpoints`, the oldest checkpoint is evicted.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::document::DocumentAdapter;
use crate::models::checkpoint::{
    CellSnapshot, Checkpoint, RollbackError, RollbackReport,
};
use crate::models::plan::Plan;
use crate::models::result::StepResult;

/// Snapshot/rollback subsystem owned by the orchestrator for the lifetime
/// of a session.
#[derive(Debug)]
pub struct CheckpointManager {
    max_checkpoints: usize,
    /// Checkpoints in creation order (ascending step number)
    checkpoints: Vec<Checkpoint>,
    /// Running set of cell indices created this session
    created_cells: BTreeSet<usize>,
    /// Running set of cell indices modified this session
    modified_cells: BTreeSet<usize>,
    /// Running set of variable names defined this session
    variables: BTreeSet<String>,
}

impl CheckpointManager {
    pub fn new(max_checkpoints: usize) -> Self {
        Self {
            max_checkpoints: max_checkpoints.max(1),
            checkpoints: Vec::new(),
            created_cells: BTreeSet::new(),
            modified_cells: BTreeSet::new(),
            variables: BTreeSet::new(),
        }
    }

    /// Clear all checkpoints and tracking. Called at task start.
    pub fn start_new_session(&mut self) {
        self.checkpoints.clear();
        self.created_cells.clear();
        self.modified_cells.clear();
        self.variables.clear();
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn get_checkpoint(&self, step_number: u32) -> Option<&Checkpoint> {
        self.checkpoints
            .iter()
            .find(|c| c.step_number == step_number)
    }

    pub fn created_cells(&self) -> &BTreeSet<usize> {
        &self.created_cells
    }

    pub fn modified_cells(&self) -> &BTreeSet<usize> {
        &self.modified_cells
    }

    pub fn variables(&self) -> &BTreeSet<String> {
        &self.variables
    }

    /// Record a checkpoint after a successful step.
    ///
    /// Merges the step's created/modified cell indices and newly defined
    /// variable names into the running sets, snapshots every cell the step
    /// touched, and evicts the oldest checkpoint past the retention limit.
    pub async fn create_checkpoint(
        &mut self,
        step_number: u32,
        description: &str,
        plan: &Plan,
        step_result: &StepResult,
        new_variables: &[String],
        document: &dyn DocumentAdapter,
    ) -> crate::error::AgentResult<&Checkpoint> {
        let mut checkpoint = Checkpoint::new(step_number, description, plan.clone());

        for result in &step_result.tool_results {
            let index = match result.cell_index {
                Some(i) => i,
                None => continue,
            };
            if result.was_modified {
                self.modified_cells.insert(index);
            } else {
                self.created_cells.insert(index);
            }

            let snapshot = match document.get_cell(index).await {
                Ok(cell) => {
                    let outputs = document
                        .get_cell_outputs(index)
                        .await
                        .unwrap_or_default()
                        .iter()
                        .map(|o| o.text())
                        .collect();
                    CellSnapshot {
                        index,
                        cell_type: cell.cell_type,
                        source: cell.source,
                        outputs,
                        was_created: !result.was_modified,
                        was_modified: result.was_modified,
                        previous_source: result.previous_content.clone(),
                    }
                }
                Err(err) => {
                    warn!(index, %err, "cell vanished before checkpoint snapshot");
                    continue;
                }
            };
            checkpoint.cell_snapshots.push(snapshot);
        }

        self.variables.extend(new_variables.iter().cloned());
        checkpoint.variable_names = self.variables.clone();
        checkpoint.created_cell_indices = self.created_cells.clone();
        checkpoint.modified_cell_indices = self.modified_cells.clone();

        self.checkpoints.push(checkpoint);
        if self.checkpoints.len() > self.max_checkpoints {
            // Oldest checkpoint has the lowest step number by construction
            let evicted = self.checkpoints.remove(0);
            info!(step = evicted.step_number, "evicted oldest checkpoint");
        }

        Ok(self.checkpoints.last().expect("just pushed"))
    }

    /// Undo every step after `step_number`.
    ///
    /// Deletes cells created after the target (highest index first so
    /// earlier deletions never shift later ones), restores cells modified
    /// after the target to their pre-modification source (adjusting for
    /// already-deleted cells below), resets the running tracking sets to
    /// the target's recorded sets, and discards later checkpoints.
    pub async fn rollback_to(
        &mut self,
        step_number: u32,
        document: &dyn DocumentAdapter,
    ) -> Result<RollbackReport, RollbackError> {
        let target_pos = self
            .checkpoints
            .iter()
            .position(|c| c.step_number == step_number)
            .ok_or(RollbackError::TargetNotFound(step_number))?;

        document
            .cell_count()
            .await
            .map_err(|e| RollbackError::DocumentInaccessible(e.to_string()))?;

        let target_created = self.checkpoints[target_pos].created_cell_indices.clone();

        // 1. Delete created cells not present at the target, highest first.
        let mut to_delete: Vec<usize> = self
            .created_cells
            .iter()
            .filter(|idx| !target_created.contains(idx))
            .copied()
            .collect();
        to_delete.sort_unstable_by(|a, b| b.cmp(a));

        let mut deleted: Vec<usize> = Vec::new();
        for index in to_delete {
            document
                .delete_cell(index)
                .await
                .map_err(|e| RollbackError::Runtime(e.to_string()))?;
            deleted.push(index);
        }

        // 2. Restore modified snapshots from checkpoints after the target,
        //    newest first so the oldest previous_source wins.
        let mut restored: Vec<usize> = Vec::new();
        for checkpoint in self.checkpoints[target_pos + 1..].iter().rev() {
            for snapshot in &checkpoint.cell_snapshots {
                if !snapshot.was_modified {
                    continue;
                }
                if deleted.contains(&snapshot.index) {
                    continue;
                }
                let previous = match snapshot.previous_source.as_deref() {
                    Some(p) => p,
                    None => continue,
                };
                let shift = deleted.iter().filter(|d| **d < snapshot.index).count();
                let live_index = snapshot.index - shift;
                document
                    .set_cell_source(live_index, previous)
                    .await
                    .map_err(|e| RollbackError::Runtime(e.to_string()))?;
                if !restored.contains(&snapshot.index) {
                    restored.push(snapshot.index);
                }
            }
        }

        // 3. Reset live tracking to the target's recorded sets.
        let target = &self.checkpoints[target_pos];
        self.created_cells = target.created_cell_indices.clone();
        self.modified_cells = target.modified_cell_indices.clone();
        self.variables = target.variable_names.clone();

        // 4. Discard checkpoints after the target.
        self.checkpoints.truncate(target_pos + 1);

        info!(
            rolled_back_to = step_number,
            deleted = deleted.len(),
            restored = restored.len(),
            "rollback complete"
        );

        Ok(RollbackReport {
            rolled_back_to: step_number,
            deleted_cells: deleted,
            restored_cells: restored,
        })
    }
}
