//! Context Manager
//!
//! Token-budget governor for the context handed to the LLM on each call.
//! Estimates tokens, accounts usage against the effective budget
//! (ceiling minus response reserve), and prunes cells by recency-based
//! priority when the hard budget is exceeded.

use tracing::{debug, warn};

use crate::config::ContextBudget;
use crate::models::context::{
    CellInfo, CellPriority, NotebookContext, PreservedCell, PrunedContext, TokenUsage,
};

/// Minimum remaining budget for which a critical/high cell is truncated
/// instead of dropped.
const MIN_TRUNCATION_TOKENS: usize = 100;

/// Token-budget accountant. Stateless per call apart from the last
/// computed usage.
#[derive(Debug, Clone, Default)]
pub struct ContextManager {
    budget: ContextBudget,
    last_usage: Option<TokenUsage>,
}

/// Estimate tokens for a text: ceil(len / 4).
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

impl ContextManager {
    pub fn new(budget: ContextBudget) -> Self {
        Self {
            budget,
            last_usage: None,
        }
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    /// The usage computed by the most recent `calculate_usage` call.
    pub fn last_usage(&self) -> Option<TokenUsage> {
        self.last_usage
    }

    /// Sum token estimates per category and derive the usage percentage
    /// against `max_tokens - reserved_for_response`.
    pub fn calculate_usage(&mut self, context: &NotebookContext) -> TokenUsage {
        let cell_tokens: usize = context
            .cells
            .iter()
            .map(|c| estimate_tokens(&c.source) + estimate_tokens(&c.output))
            .sum();
        let variable_tokens: usize = context
            .variables
            .iter()
            .map(|(name, preview)| estimate_tokens(name) + estimate_tokens(preview))
            .sum();
        let library_tokens: usize = context.libraries.iter().map(|l| estimate_tokens(l)).sum();

        let total_tokens = cell_tokens + variable_tokens + library_tokens;
        let effective = self.budget.effective_budget();
        let usage_percent = if effective == 0 {
            1.0
        } else {
            total_tokens as f64 / effective as f64
        };

        let usage = TokenUsage {
            cell_tokens,
            variable_tokens,
            library_tokens,
            total_tokens,
            usage_percent,
        };
        self.last_usage = Some(usage);
        usage
    }

    /// Assign a priority tier to every cell, by recency.
    ///
    /// The cell matching `current_cell_index` (or the last cell when none
    /// is specified) is Critical; the next 3 most recent are High; the
    /// next 5 Medium; the rest Low. Returned in the cells' original order.
    pub fn prioritize_cells(&self, context: &NotebookContext) -> Vec<(usize, CellPriority)> {
        let critical_index = context
            .current_cell_index
            .filter(|idx| context.cells.iter().any(|c| c.index == *idx))
            .or_else(|| context.cells.last().map(|c| c.index));

        // Recency rank among non-critical cells, newest first
        let mut rank = 0usize;
        let mut by_recency: Vec<(usize, CellPriority)> = context
            .cells
            .iter()
            .rev()
            .map(|cell| {
                if Some(cell.index) == critical_index {
                    (cell.index, CellPriority::Critical)
                } else {
                    let priority = if rank < 3 {
                        CellPriority::High
                    } else if rank < 8 {
                        CellPriority::Medium
                    } else {
                        CellPriority::Low
                    };
                    rank += 1;
                    (cell.index, priority)
                }
            })
            .collect();
        by_recency.reverse();
        by_recency
    }

    /// Prune a context down to `target_tokens`.
    ///
    /// Within budget: no-op. Otherwise cells are walked from highest to
    /// lowest priority, keeping whole cells while budget remains.
    /// Critical/High cells that no longer fit are truncated to the tail of
    /// their source (the most recently written portion) when at least
    /// `MIN_TRUNCATION_TOKENS` remain; lower-priority cells are dropped.
    /// Output preserves original index ordering.
    pub fn prune_context(&mut self, context: &NotebookContext, target_tokens: usize) -> PrunedContext {
        let usage = self.calculate_usage(context);
        let priorities = self.prioritize_cells(context);

        if usage.total_tokens <= target_tokens {
            let preserved = context
                .cells
                .iter()
                .zip(priorities.iter())
                .map(|(cell, (_, priority))| PreservedCell {
                    index: cell.index,
                    source: cell.source.clone(),
                    output: cell.output.clone(),
                    priority: *priority,
                    truncated: false,
                })
                .collect();
            return PrunedContext {
                preserved_cells: preserved,
                variables: context.variables.clone(),
                libraries: context.libraries.clone(),
                estimated_tokens: usage.total_tokens,
                was_pruned: false,
            };
        }

        // Variables and libraries are kept whole; cells compete for the rest.
        let overhead = usage.variable_tokens + usage.library_tokens;
        let mut remaining = target_tokens.saturating_sub(overhead);

        // Highest priority first; within a tier, most recent first.
        let mut ordered: Vec<(&CellInfo, CellPriority)> = context
            .cells
            .iter()
            .zip(priorities.iter())
            .map(|(cell, (_, p))| (cell, *p))
            .collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.index.cmp(&a.0.index)));

        let mut preserved: Vec<PreservedCell> = Vec::new();
        for (cell, priority) in ordered {
            let cost = estimate_tokens(&cell.source) + estimate_tokens(&cell.output);
            if cost <= remaining {
                remaining -= cost;
                preserved.push(PreservedCell {
                    index: cell.index,
                    source: cell.source.clone(),
                    output: cell.output.clone(),
                    priority,
                    truncated: false,
                });
            } else if priority >= CellPriority::High && remaining >= MIN_TRUNCATION_TOKENS {
                preserved.push(PreservedCell {
                    index: cell.index,
                    source: truncate_to_tail(&cell.source, remaining),
                    output: String::new(),
                    priority,
                    truncated: true,
                });
                remaining = 0;
            } else {
                debug!(cell_index = cell.index, ?priority, "dropping cell from context");
            }
        }

        preserved.sort_by_key(|c| c.index);
        let estimated_tokens = overhead
            + preserved
                .iter()
                .map(|c| estimate_tokens(&c.source) + estimate_tokens(&c.output))
                .sum::<usize>();

        PrunedContext {
            preserved_cells: preserved,
            variables: context.variables.clone(),
            libraries: context.libraries.clone(),
            estimated_tokens,
            was_pruned: true,
        }
    }

    /// Single entry point: warn once past the warning threshold, prune
    /// only when the hard budget is exceeded. Usage equal to the budget
    /// counts as within budget.
    pub fn extract_optimized_context(&mut self, context: &NotebookContext) -> PrunedContext {
        let usage = self.calculate_usage(context);
        let effective = self.budget.effective_budget();

        if usage.usage_percent >= self.budget.warning_threshold && usage.total_tokens <= effective {
            warn!(
                total_tokens = usage.total_tokens,
                usage_percent = format!("{:.0}%", usage.usage_percent * 100.0),
                "context approaching token budget"
            );
        }

        if usage.total_tokens <= effective {
            return self.prune_context(context, usage.total_tokens.max(effective));
        }

        warn!(
            total_tokens = usage.total_tokens,
            budget = effective,
            "context over token budget; pruning"
        );
        self.prune_context(context, effective)
    }
}

/// Keep the tail of `source` that fits in `token_budget`, aligned to a
/// char boundary.
fn truncate_to_tail(source: &str, token_budget: usize) -> String {
    let keep_bytes = token_budget.saturating_mul(4);
    if source.len() <= keep_bytes {
        return source.to_string();
    }
    let mut start = source.len() - keep_bytes;
    while start < source.len() && !source.is_char_boundary(start) {
        start += 1;
    }
    source[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(index: usize, len: usize) -> CellInfo {
        CellInfo::new(index, "a".repeat(len))
    }

    fn manager() -> ContextManager {
        ContextManager::new(ContextBudget {
            max_tokens: 8000,
            warning_threshold: 0.8,
            reserved_for_response: 2000,
        })
    }

    #[test]
    fn test_estimate_tokens_ceil_div_four() {
        assert_eq!(estimate_tokens(&"a".repeat(400)), 100);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_usage_is_monotonic_in_input() {
        let mut mgr = manager();
        let mut ctx = NotebookContext {
            cells: vec![cell(0, 100)],
            ..Default::default()
        };
        let before = mgr.calculate_usage(&ctx).total_tokens;
        ctx.cells.push(cell(1, 1));
        let after = mgr.calculate_usage(&ctx).total_tokens;
        assert!(after > before);
    }

    #[test]
    fn test_usage_percent_against_effective_budget() {
        let mut mgr = manager();
        let ctx = NotebookContext {
            cells: vec![cell(0, 12000)], // 3000 tokens
            ..Default::default()
        };
        let usage = mgr.calculate_usage(&ctx);
        assert_eq!(usage.total_tokens, 3000);
        assert!((usage.usage_percent - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_prioritize_by_recency() {
        let mgr = manager();
        let ctx = NotebookContext {
            cells: (0..12).map(|i| cell(i, 4)).collect(),
            ..Default::default()
        };
        let priorities = mgr.prioritize_cells(&ctx);
        assert_eq!(priorities[11].1, CellPriority::Critical);
        for (_, p) in &priorities[8..11] {
            assert_eq!(*p, CellPriority::High);
        }
        for (_, p) in &priorities[3..8] {
            assert_eq!(*p, CellPriority::Medium);
        }
        for (_, p) in &priorities[..3] {
            assert_eq!(*p, CellPriority::Low);
        }
    }

    #[test]
    fn test_current_index_becomes_critical() {
        let mgr = manager();
        let ctx = NotebookContext {
            cells: (0..5).map(|i| cell(i, 4)).collect(),
            current_cell_index: Some(2),
            ..Default::default()
        };
        let priorities = mgr.prioritize_cells(&ctx);
        assert_eq!(priorities[2], (2, CellPriority::Critical));
    }

    #[test]
    fn test_equal_to_budget_is_not_pruned() {
        let mut mgr = manager();
        // 6000 tokens exactly: equal to max(8000) - reserved(2000)
        let ctx = NotebookContext {
            cells: vec![cell(0, 24000)],
            ..Default::default()
        };
        let result = mgr.extract_optimized_context(&ctx);
        assert!(!result.was_pruned);
        assert_eq!(result.preserved_cells.len(), 1);
    }

    #[test]
    fn test_over_budget_is_pruned() {
        let mut mgr = manager();
        let ctx = NotebookContext {
            cells: (0..10).map(|i| cell(i, 4000)).collect(), // 10_000 tokens
            ..Default::default()
        };
        let result = mgr.extract_optimized_context(&ctx);
        assert!(result.was_pruned);
        assert!(result.estimated_tokens <= 6000);
    }

    #[test]
    fn test_critical_cell_survives_pruning() {
        let mut mgr = manager();
        // One enormous critical cell plus filler; budget forces truncation
        let ctx = NotebookContext {
            cells: vec![cell(0, 40000), cell(1, 40000)],
            ..Default::default()
        };
        let result = mgr.prune_context(&ctx, 500);
        let critical = result
            .preserved_cells
            .iter()
            .find(|c| c.priority == CellPriority::Critical);
        let critical = critical.expect("critical cell must be preserved");
        assert!(critical.truncated);
        assert_eq!(critical.index, 1);
    }

    #[test]
    fn test_truncation_keeps_tail() {
        let source = format!("{}{}", "x".repeat(1000), "tail_marker");
        let kept = truncate_to_tail(&source, 25); // 100 bytes
        assert!(kept.ends_with("tail_marker"));
        assert!(kept.len() <= 100);
    }

    #[test]
    fn test_pruned_output_preserves_index_order() {
        let mut mgr = manager();
        let ctx = NotebookContext {
            cells: (0..10).map(|i| cell(i, 4000)).collect(),
            ..Default::default()
        };
        let result = mgr.prune_context(&ctx, 3000);
        let indices: Vec<usize> = result.preserved_cells.iter().map(|c| c.index).collect();
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        assert_eq!(indices, sorted);
    }
}
