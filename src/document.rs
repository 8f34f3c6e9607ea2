//! Document Adapter
//!
//! The single explicit interface through which the core reads and mutates
//! the host document/kernel. One adapter is written per host; the
//! orchestration core depends only on this trait.
//!
//! Ships with `MemoryDocument`, an in-memory adapter with scriptable
//! execution outcomes, used by the test suite and by embedding hosts that
//! have no live kernel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{AgentError, AgentResult};
use crate::models::checkpoint::CellType;

/// One structured output read back from a cell after execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CellOutput {
    /// stdout/stderr stream text
    Stream { text: String },
    /// Execution result / display data
    Result { text: String },
    /// Structured kernel error
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

impl CellOutput {
    /// Flattened text of this output, for classification and context.
    pub fn text(&self) -> String {
        match self {
            CellOutput::Stream { text } | CellOutput::Result { text } => text.clone(),
            CellOutput::Error { ename, evalue, .. } => format!("{}: {}", ename, evalue),
        }
    }
}

/// A cell as read back from the host document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCell {
    pub cell_type: CellType,
    pub source: String,
}

/// Host document/kernel access.
///
/// The document is mutated only through this trait and only by the tool
/// executor, preserving a single writer (no duck typing, no direct host
/// object probing).
#[async_trait]
pub trait DocumentAdapter: Send + Sync {
    /// Number of cells currently in the document.
    async fn cell_count(&self) -> AgentResult<usize>;

    /// Read a cell's type and source.
    async fn get_cell(&self, index: usize) -> AgentResult<DocumentCell>;

    /// Read a cell's source text.
    async fn get_cell_source(&self, index: usize) -> AgentResult<String> {
        Ok(self.get_cell(index).await?.source)
    }

    /// Overwrite a cell's source text.
    async fn set_cell_source(&self, index: usize, source: &str) -> AgentResult<()>;

    /// Insert a new cell at `index`, shifting later cells up by one.
    async fn insert_cell(&self, index: usize, cell_type: CellType, source: &str)
        -> AgentResult<()>;

    /// Delete the cell at `index`, shifting later cells down by one.
    async fn delete_cell(&self, index: usize) -> AgentResult<()>;

    /// Trigger execution of a code cell. Returns the host's run signal:
    /// `true` when the host reported success. A `false` here may still
    /// come with no structured error output; callers recover error
    /// metadata from the raw outputs in that case.
    async fn run_cell(&self, index: usize) -> AgentResult<bool>;

    /// Wait for the kernel to report idle, bounded by `timeout`.
    /// Returns whether idle was observed. Advisory: a timeout is not an
    /// error.
    async fn wait_idle(&self, timeout: Duration) -> AgentResult<bool>;

    /// Request a kernel interrupt (used on cancellation/timeout).
    async fn interrupt_kernel(&self) -> AgentResult<()>;

    /// Read back the structured outputs of a cell.
    async fn get_cell_outputs(&self, index: usize) -> AgentResult<Vec<CellOutput>>;
}

// ── In-memory adapter ────────────────────────────────────────────────

/// Scripted outcome for a code fragment in `MemoryDocument`.
#[derive(Debug, Clone)]
struct ScriptedOutcome {
    /// Substring of the cell source this rule applies to
    pattern: String,
    /// Host run signal to report
    success: bool,
    /// Outputs to attach to the cell
    outputs: Vec<CellOutput>,
    /// Consume the rule after its first match
    once: bool,
}

#[derive(Debug, Clone)]
struct MemCell {
    cell_type: CellType,
    source: String,
    outputs: Vec<CellOutput>,
}

#[derive(Debug, Default)]
struct MemoryDocumentState {
    cells: Vec<MemCell>,
    scripts: Vec<ScriptedOutcome>,
    interrupts: u32,
}

/// In-memory `DocumentAdapter` with scriptable execution outcomes.
///
/// Running a cell matches its source against scripted rules in
/// registration order; the first match supplies the run signal and
/// outputs. Unmatched cells succeed with no output.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    state: Arc<Mutex<MemoryDocumentState>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful run with the given output for cells whose
    /// source contains `pattern`.
    pub async fn script_output(&self, pattern: impl Into<String>, output: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.scripts.push(ScriptedOutcome {
            pattern: pattern.into(),
            success: true,
            outputs: vec![CellOutput::Stream {
                text: output.into(),
            }],
            once: false,
        });
    }

    /// Script a failing run with a structured kernel error for cells
    /// whose source contains `pattern`.
    pub async fn script_error(
        &self,
        pattern: impl Into<String>,
        ename: impl Into<String>,
        evalue: impl Into<String>,
    ) {
        let ename = ename.into();
        let evalue = evalue.into();
        let mut state = self.state.lock().await;
        state.scripts.push(ScriptedOutcome {
            pattern: pattern.into(),
            success: false,
            outputs: vec![CellOutput::Error {
                traceback: vec![format!("{}: {}", ename, evalue)],
                ename,
                evalue,
            }],
            once: false,
        });
    }

    /// Like `script_error`, but the rule is consumed after its first
    /// match. Models a transient failure that a repair step resolves
    /// (e.g. a missing package that gets installed).
    pub async fn script_error_once(
        &self,
        pattern: impl Into<String>,
        ename: impl Into<String>,
        evalue: impl Into<String>,
    ) {
        let ename = ename.into();
        let evalue = evalue.into();
        let mut state = self.state.lock().await;
        state.scripts.push(ScriptedOutcome {
            pattern: pattern.into(),
            success: false,
            outputs: vec![CellOutput::Error {
                traceback: vec![format!("{}: {}", ename, evalue)],
                ename,
                evalue,
            }],
            once: true,
        });
    }

    /// Script a failing run that loses its error metadata: the host
    /// reports failure but only raw stream text is captured.
    pub async fn script_raw_failure(
        &self,
        pattern: impl Into<String>,
        raw_output: impl Into<String>,
    ) {
        let mut state = self.state.lock().await;
        state.scripts.push(ScriptedOutcome {
            pattern: pattern.into(),
            success: false,
            outputs: vec![CellOutput::Stream {
                text: raw_output.into(),
            }],
            once: false,
        });
    }

    /// All cell sources, in document order. Test convenience.
    pub async fn sources(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.cells.iter().map(|c| c.source.clone()).collect()
    }

    /// Number of interrupt requests received. Test convenience.
    pub async fn interrupt_count(&self) -> u32 {
        self.state.lock().await.interrupts
    }
}

#[async_trait]
impl DocumentAdapter for MemoryDocument {
    async fn cell_count(&self) -> AgentResult<usize> {
        Ok(self.state.lock().await.cells.len())
    }

    async fn get_cell(&self, index: usize) -> AgentResult<DocumentCell> {
        let state = self.state.lock().await;
        let cell = state
            .cells
            .get(index)
            .ok_or_else(|| AgentError::document(format!("no cell at index {}", index)))?;
        Ok(DocumentCell {
            cell_type: cell.cell_type,
            source: cell.source.clone(),
        })
    }

    async fn set_cell_source(&self, index: usize, source: &str) -> AgentResult<()> {
        let mut state = self.state.lock().await;
        let cell = state
            .cells
            .get_mut(index)
            .ok_or_else(|| AgentError::document(format!("no cell at index {}", index)))?;
        cell.source = source.to_string();
        cell.outputs.clear();
        Ok(())
    }

    async fn insert_cell(
        &self,
        index: usize,
        cell_type: CellType,
        source: &str,
    ) -> AgentResult<()> {
        let mut state = self.state.lock().await;
        if index > state.cells.len() {
            return Err(AgentError::document(format!(
                "insert index {} out of range (len {})",
                index,
                state.cells.len()
            )));
        }
        state.cells.insert(
            index,
            MemCell {
                cell_type,
                source: source.to_string(),
                outputs: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_cell(&self, index: usize) -> AgentResult<()> {
        let mut state = self.state.lock().await;
        if index >= state.cells.len() {
            return Err(AgentError::document(format!(
                "delete index {} out of range (len {})",
                index,
                state.cells.len()
            )));
        }
        state.cells.remove(index);
        Ok(())
    }

    async fn run_cell(&self, index: usize) -> AgentResult<bool> {
        let mut state = self.state.lock().await;
        let source = state
            .cells
            .get(index)
            .map(|c| c.source.clone())
            .ok_or_else(|| AgentError::document(format!("no cell at index {}", index)))?;

        let matched = state
            .scripts
            .iter()
            .position(|s| source.contains(&s.pattern));
        let outcome = matched.map(|pos| {
            let scripted = state.scripts[pos].clone();
            if scripted.once {
                state.scripts.remove(pos);
            }
            scripted
        });

        let cell = &mut state.cells[index];
        match outcome {
            Some(scripted) => {
                cell.outputs = scripted.outputs;
                Ok(scripted.success)
            }
            None => {
                cell.outputs = Vec::new();
                Ok(true)
            }
        }
    }

    async fn wait_idle(&self, _timeout: Duration) -> AgentResult<bool> {
        Ok(true)
    }

    async fn interrupt_kernel(&self) -> AgentResult<()> {
        self.state.lock().await.interrupts += 1;
        Ok(())
    }

    async fn get_cell_outputs(&self, index: usize) -> AgentResult<Vec<CellOutput>> {
        let state = self.state.lock().await;
        state
            .cells
            .get(index)
            .map(|c| c.outputs.clone())
            .ok_or_else(|| AgentError::document(format!("no cell at index {}", index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let doc = MemoryDocument::new();
        doc.insert_cell(0, CellType::Code, "x = 1").await.unwrap();
        doc.insert_cell(1, CellType::Markdown, "# Title")
            .await
            .unwrap();
        assert_eq!(doc.cell_count().await.unwrap(), 2);
        assert_eq!(doc.get_cell_source(0).await.unwrap(), "x = 1");
        assert_eq!(
            doc.get_cell(1).await.unwrap().cell_type,
            CellType::Markdown
        );
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let doc = MemoryDocument::new();
        doc.script_error("import plotly", "ModuleNotFoundError", "No module named 'plotly'")
            .await;
        doc.insert_cell(0, CellType::Code, "import plotly")
            .await
            .unwrap();

        let ok = doc.run_cell(0).await.unwrap();
        assert!(!ok);
        let outputs = doc.get_cell_outputs(0).await.unwrap();
        assert!(matches!(&outputs[0], CellOutput::Error { ename, .. } if ename == "ModuleNotFoundError"));
    }

    #[tokio::test]
    async fn test_one_shot_script_consumed_after_first_match() {
        let doc = MemoryDocument::new();
        doc.script_error_once("import plotly", "ModuleNotFoundError", "No module named 'plotly'")
            .await;
        doc.insert_cell(0, CellType::Code, "import plotly")
            .await
            .unwrap();

        assert!(!doc.run_cell(0).await.unwrap());
        // Second run of the same source succeeds: the rule was consumed
        assert!(doc.run_cell(0).await.unwrap());
        assert!(doc.get_cell_outputs(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_shifts_indices() {
        let doc = MemoryDocument::new();
        for (i, src) in ["a", "b", "c"].iter().enumerate() {
            doc.insert_cell(i, CellType::Code, src).await.unwrap();
        }
        doc.delete_cell(1).await.unwrap();
        assert_eq!(doc.sources().await, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_out_of_range_errors() {
        let doc = MemoryDocument::new();
        assert!(doc.get_cell(0).await.is_err());
        assert!(doc.delete_cell(0).await.is_err());
        assert!(doc.insert_cell(5, CellType::Code, "x").await.is_err());
    }
}
