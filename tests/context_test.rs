//! Context budgeting behavior: accounting, prioritization, and pruning
//! under pressure.

use notepilot::{
    estimate_tokens, CellInfo, CellPriority, ContextBudget, ContextManager, NotebookContext,
};

fn cell(index: usize, chars: usize) -> CellInfo {
    CellInfo::new(index, "x".repeat(chars))
}

fn manager(max_tokens: usize, reserved: usize) -> ContextManager {
    ContextManager::new(ContextBudget {
        max_tokens,
        warning_threshold: 0.8,
        reserved_for_response: reserved,
    })
}

#[test]
fn test_usage_accounts_all_categories() {
    let mut mgr = manager(8000, 2000);
    let ctx = NotebookContext {
        cells: vec![cell(0, 400).with_output("y".repeat(40))],
        variables: vec![("df".to_string(), "DataFrame(100x4)".to_string())],
        libraries: vec!["pandas".to_string()],
        current_cell_index: None,
    };
    let usage = mgr.calculate_usage(&ctx);
    assert_eq!(usage.cell_tokens, 110);
    assert_eq!(
        usage.variable_tokens,
        estimate_tokens("df") + estimate_tokens("DataFrame(100x4)")
    );
    assert_eq!(usage.library_tokens, estimate_tokens("pandas"));
    assert_eq!(
        usage.total_tokens,
        usage.cell_tokens + usage.variable_tokens + usage.library_tokens
    );
}

#[test]
fn test_usage_equal_to_budget_is_not_pruned() {
    // 6000-token context against an effective budget of exactly 6000
    let mut mgr = manager(8000, 2000);
    let ctx = NotebookContext {
        cells: vec![cell(0, 24_000)],
        ..Default::default()
    };
    let usage = mgr.calculate_usage(&ctx);
    assert_eq!(usage.total_tokens, 6000);

    let pruned = mgr.extract_optimized_context(&ctx);
    assert!(!pruned.was_pruned);
    assert_eq!(pruned.preserved_cells.len(), 1);
    assert!(!pruned.preserved_cells[0].truncated);
}

#[test]
fn test_pruning_over_budget_keeps_critical_cell() {
    // 20 cells of 200 tokens each (4000 total) against a 1000-token target
    let mut mgr = manager(8000, 2000);
    let ctx = NotebookContext {
        cells: (0..20).map(|i| cell(i, 800)).collect(),
        ..Default::default()
    };

    let pruned = mgr.prune_context(&ctx, 1000);
    assert!(pruned.was_pruned);
    assert!(pruned.estimated_tokens <= 1000);

    // The most recent cell is critical and always survives
    let critical = pruned
        .preserved_cells
        .iter()
        .find(|c| c.priority == CellPriority::Critical)
        .expect("critical cell kept");
    assert_eq!(critical.index, 19);

    // Preserved cells come back in document order
    let indices: Vec<usize> = pruned.preserved_cells.iter().map(|c| c.index).collect();
    let mut sorted = indices.clone();
    sorted.sort_unstable();
    assert_eq!(indices, sorted);

    // Low-priority old cells were dropped, not truncated
    assert!(pruned.preserved_cells.iter().all(|c| c.index >= 11 || !c.truncated));
    assert!(pruned.preserved_cells.len() < 20);
}

#[test]
fn test_variables_and_libraries_survive_pruning() {
    let mut mgr = manager(8000, 2000);
    let ctx = NotebookContext {
        cells: (0..10).map(|i| cell(i, 2000)).collect(),
        variables: vec![("model".to_string(), "LinearRegression()".to_string())],
        libraries: vec!["sklearn".to_string(), "pandas".to_string()],
        current_cell_index: Some(9),
    };

    let pruned = mgr.prune_context(&ctx, 800);
    assert!(pruned.was_pruned);
    assert_eq!(pruned.variables.len(), 1);
    assert_eq!(pruned.libraries.len(), 2);
}

#[test]
fn test_truncation_keeps_source_tail() {
    // One huge critical cell: it cannot fit whole, so it is truncated to
    // the tail of its source rather than dropped.
    let mut mgr = manager(8000, 2000);
    let head = "0".repeat(4000);
    let tail = "recent_work = 42";
    let ctx = NotebookContext {
        cells: vec![CellInfo::new(0, format!("{}{}", head, tail))],
        ..Default::default()
    };

    let pruned = mgr.prune_context(&ctx, 500);
    assert!(pruned.was_pruned);
    assert_eq!(pruned.preserved_cells.len(), 1);
    let kept = &pruned.preserved_cells[0];
    assert!(kept.truncated);
    assert!(kept.source.ends_with(tail));
    assert!(estimate_tokens(&kept.source) <= 500);
}

#[test]
fn test_current_cell_index_overrides_recency() {
    let mgr = manager(8000, 2000);
    let ctx = NotebookContext {
        cells: (0..6).map(|i| cell(i, 40)).collect(),
        current_cell_index: Some(2),
        ..Default::default()
    };
    let priorities = mgr.prioritize_cells(&ctx);
    let critical: Vec<usize> = priorities
        .iter()
        .filter(|(_, p)| *p == CellPriority::Critical)
        .map(|(i, _)| *i)
        .collect();
    assert_eq!(critical, vec![2]);
}
