//! Orchestrator Service
//!
//! The control loop: generate a plan, execute it step by step, checkpoint
//! and verify after each success, and route every failure to the
//! replanner. Failures are never retried in place; the replanner decides
//! how the plan changes, and the whole repair budget is capped.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::document::DocumentAdapter;
use crate::models::checkpoint::{RollbackError, RollbackReport};
use crate::models::context::{CellInfo, NotebookContext};
use crate::models::result::{StepResult, TaskExecutionResult, TaskStatus, ToolResult};
use crate::models::verification::Recommendation;
use crate::planner::{Planner, ReflectionVerdict, ReplanContext, StructuredError, ValidationSeverity};
use crate::services::checkpoint::CheckpointManager;
use crate::services::context::ContextManager;
use crate::services::orchestrator::progress::{emit, ExecutionPhase, ProgressEvent, ProgressSender};
use crate::services::orchestrator::replan::{
    apply_decision, structured_error_for, DefaultFailureClassifier, FailureClassifier,
};
use crate::services::safety::SafetyChecker;
use crate::services::tools::{default_registry, ToolExecutionContext, ToolExecutor, ToolRegistry};
use crate::services::verifier::StateVerifier;

/// Plan-and-execute agent core.
///
/// One orchestrator runs one task at a time; a second `execute_task`
/// while a task is in flight is rejected with a Busy result and leaves
/// the running task untouched.
pub struct Orchestrator {
    planner: Arc<dyn Planner>,
    document: Arc<dyn DocumentAdapter>,
    registry: Arc<ToolRegistry>,
    executor: ToolExecutor,
    config: AgentConfig,
    workspace_root: PathBuf,
    classifier: Arc<dyn FailureClassifier>,
    progress: Option<ProgressSender>,
    /// Manual "proceed" signal consumed in step-by-step pacing
    step_signal: Mutex<Option<mpsc::Receiver<()>>>,
    checkpoints: Mutex<CheckpointManager>,
    verifier: Mutex<StateVerifier>,
    context_manager: Mutex<ContextManager>,
    is_running: AtomicBool,
    cancellation: std::sync::Mutex<CancellationToken>,
}

impl Orchestrator {
    /// Orchestrator with the built-in tool catalogue and default config.
    pub fn new(planner: Arc<dyn Planner>, document: Arc<dyn DocumentAdapter>) -> Self {
        Self::with_registry(planner, document, default_registry(), AgentConfig::default())
    }

    /// Orchestrator with an injected (already configured) registry.
    pub fn with_registry(
        planner: Arc<dyn Planner>,
        document: Arc<dyn DocumentAdapter>,
        mut registry: ToolRegistry,
        config: AgentConfig,
    ) -> Self {
        registry.set_approval_required(config.approval_required);
        let registry = Arc::new(registry);
        let executor = ToolExecutor::new(
            registry.clone(),
            SafetyChecker::new(config.safety.clone()),
        );
        Self {
            planner,
            document,
            executor,
            checkpoints: Mutex::new(CheckpointManager::new(config.max_checkpoints)),
            verifier: Mutex::new(StateVerifier::new()),
            context_manager: Mutex::new(ContextManager::new(config.context_budget.clone())),
            registry,
            config,
            workspace_root: std::env::temp_dir(),
            classifier: Arc::new(DefaultFailureClassifier),
            progress: None,
            step_signal: Mutex::new(None),
            is_running: AtomicBool::new(false),
            cancellation: std::sync::Mutex::new(CancellationToken::new()),
        }
    }

    pub fn with_workspace_root(mut self, root: PathBuf) -> Self {
        self.workspace_root = root;
        self
    }

    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn with_failure_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Wire the manual step signal used by step-by-step pacing.
    pub fn with_step_signal(self, receiver: mpsc::Receiver<()>) -> Self {
        if let Ok(mut guard) = self.step_signal.try_lock() {
            *guard = Some(receiver);
        }
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Request cooperative cancellation of the running task.
    pub fn cancel(&self) {
        if let Ok(token) = self.cancellation.lock() {
            token.cancel();
        }
    }

    /// Undo every step after `step_number`. Waits for checkpoint access,
    /// so calling this mid-task blocks until the current step settles.
    pub async fn rollback_to(&self, step_number: u32) -> Result<RollbackReport, RollbackError> {
        let mut checkpoints = self.checkpoints.lock().await;
        checkpoints
            .rollback_to(step_number, self.document.as_ref())
            .await
    }

    /// Run one task end to end.
    pub async fn execute_task(
        &self,
        request: &str,
        context: NotebookContext,
    ) -> TaskExecutionResult {
        if self
            .is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("task rejected: another task is running");
            return TaskExecutionResult::busy();
        }

        let result = self.run_task(request, context).await;
        self.is_running.store(false, Ordering::SeqCst);
        emit(
            &self.progress,
            ProgressEvent::TaskFinished {
                status: result.status,
            },
        );
        result
    }

    async fn run_task(&self, request: &str, context: NotebookContext) -> TaskExecutionResult {
        let started = Instant::now();
        let token = CancellationToken::new();
        if let Ok(mut guard) = self.cancellation.lock() {
            *guard = token.clone();
        }

        self.checkpoints.lock().await.start_new_session();
        self.verifier.lock().await.reset();

        let context = self.budget_context(context).await;

        emit(
            &self.progress,
            ProgressEvent::PhaseChanged {
                phase: ExecutionPhase::Planning,
            },
        );
        info!(%request, "generating plan");
        let plan_response = match self
            .planner
            .generate_plan(request, &context, &self.registry.definitions())
            .await
        {
            Ok(response) => response,
            Err(err) => {
                return self.finish(
                    TaskStatus::Failed,
                    Default::default(),
                    Vec::new(),
                    None,
                    Some(format!("Planning failed: {}", err)),
                    0,
                    started,
                )
                .await
            }
        };
        let mut plan = plan_response.plan;
        plan.renumber();
        let mut llm_tokens = plan_response.usage.total();
        info!(steps = plan.total_steps, "plan generated");
        emit(
            &self.progress,
            ProgressEvent::PlanCreated {
                total_steps: plan.total_steps,
            },
        );

        let exec_ctx = ToolExecutionContext::new(self.document.clone(), self.workspace_root.clone())
            .with_config(self.config.clone())
            .with_cancellation(token.clone());

        let mut defined: HashSet<String> =
            context.variables.iter().map(|(name, _)| name.clone()).collect();
        let mut executed: Vec<StepResult> = Vec::new();
        let mut completed_descriptions: Vec<String> = Vec::new();
        let mut replan_attempts = 0u32;
        let mut total_attempts = 0u32;
        let mut final_answer: Option<String> = None;
        let mut status = TaskStatus::Completed;
        let mut failure: Option<String> = None;
        let mut index = 0usize;

        while index < plan.steps.len() {
            if token.is_cancelled() {
                status = TaskStatus::Cancelled;
                failure = Some("Task cancelled".to_string());
                break;
            }
            if self.config.max_total_tokens > 0 && llm_tokens > self.config.max_total_tokens {
                status = TaskStatus::Failed;
                failure = Some(format!(
                    "LLM token budget exhausted ({} of {} tokens used)",
                    llm_tokens, self.config.max_total_tokens
                ));
                break;
            }
            if total_attempts > 0 && !self.pace(&token).await {
                status = TaskStatus::Cancelled;
                failure = Some("Task cancelled while pacing".to_string());
                break;
            }

            let step = plan.steps[index].clone();
            emit(
                &self.progress,
                ProgressEvent::StepStarted {
                    step_number: step.step_number,
                    total_steps: plan.total_steps,
                    description: step.description.clone(),
                },
            );
            emit(
                &self.progress,
                ProgressEvent::PhaseChanged {
                    phase: ExecutionPhase::Executing,
                },
            );

            // Pre-execution validation of code payloads. Backend failures
            // degrade to an unchecked step. Validation must see names
            // earlier steps defined, or later steps false-positive on them.
            emit(
                &self.progress,
                ProgressEvent::PhaseChanged {
                    phase: ExecutionPhase::Validating,
                },
            );
            let mut validation_ctx = context.clone();
            for name in &defined {
                if !validation_ctx.variables.iter().any(|(n, _)| n == name) {
                    validation_ctx.variables.push((name.clone(), String::new()));
                }
            }
            let mut validation_error: Option<StructuredError> = None;
            for call in &step.tool_calls {
                let code = match call.code() {
                    Some(code) => code,
                    None => continue,
                };
                match self.planner.validate(code, &validation_ctx).await {
                    Ok(report) => {
                        llm_tokens += report.usage.total();
                        if report.has_errors() {
                            let message = report
                                .issues
                                .iter()
                                .filter(|i| i.severity == ValidationSeverity::Error)
                                .map(|i| i.message.clone())
                                .collect::<Vec<_>>()
                                .join("; ");
                            validation_error = Some(StructuredError {
                                error_type: "validation".to_string(),
                                message,
                                error_name: Some("ValidationError".to_string()),
                                traceback: None,
                            });
                            break;
                        }
                        if report.has_warnings() {
                            debug!(step = step.step_number, "validation warnings present");
                        }
                    }
                    Err(err) => debug!(%err, "validation backend unavailable"),
                }
            }

            total_attempts += 1;

            let (step_result, step_error) = if let Some(error) = validation_error {
                let tool = step
                    .tool_calls
                    .first()
                    .map(|c| c.tool.clone())
                    .unwrap_or_else(|| "validate".to_string());
                let result = ToolResult::err(tool, error.message.clone())
                    .with_error_name("ValidationError");
                (
                    StepResult::from_tool_results(step.step_number, vec![result]),
                    Some(error),
                )
            } else {
                emit(
                    &self.progress,
                    ProgressEvent::PhaseChanged {
                        phase: ExecutionPhase::ToolCalling,
                    },
                );
                let mut results = Vec::new();
                for call in &step.tool_calls {
                    let result = self.executor.execute(call, &exec_ctx).await;
                    let failed = !result.success;
                    results.push(result);
                    if failed {
                        break;
                    }
                }
                let step_result = StepResult::from_tool_results(step.step_number, results);
                let error = if step_result.success {
                    step_result
                        .primary_result()
                        .and_then(|r| r.output.as_deref())
                        .and_then(|output| self.classifier.classify_output(output))
                } else {
                    Some(structured_error_for(&step_result))
                };
                (step_result, error)
            };

            emit(
                &self.progress,
                ProgressEvent::StepCompleted {
                    step_number: step.step_number,
                    success: step_error.is_none(),
                },
            );

            if token.is_cancelled() {
                executed.push(step_result);
                status = TaskStatus::Cancelled;
                failure = Some("Task cancelled".to_string());
                break;
            }

            let error = match step_error {
                None => {
                    // The repair budget covers consecutive failures only; a
                    // successful step closes the episode.
                    replan_attempts = 0;
                    let mut new_vars: Vec<String> = Vec::new();
                    for call in &step.tool_calls {
                        if let Some(code) = call.code() {
                            new_vars.extend(extract_defined_names(code));
                        }
                    }
                    defined.extend(new_vars.iter().cloned());

                    {
                        let mut checkpoints = self.checkpoints.lock().await;
                        if let Err(err) = checkpoints
                            .create_checkpoint(
                                step.step_number,
                                &step.description,
                                &plan,
                                &step_result,
                                &new_vars,
                                self.document.as_ref(),
                            )
                            .await
                        {
                            warn!(%err, "checkpoint creation failed");
                        }
                    }

                    emit(
                        &self.progress,
                        ProgressEvent::PhaseChanged {
                            phase: ExecutionPhase::Verifying,
                        },
                    );
                    let verification = {
                        let primary = step_result
                            .primary_result()
                            .cloned()
                            .unwrap_or_else(|| ToolResult::ok(&step.description, ""));
                        let mut verifier = self.verifier.lock().await;
                        verifier.verify_step_state(&step, &primary, &new_vars, &defined)
                    };
                    if verification.recommendation == Recommendation::Escalate {
                        executed.push(step_result);
                        status = TaskStatus::Failed;
                        failure = Some(format!(
                            "Verification escalated at step {} (confidence {:.2})",
                            step.step_number, verification.confidence
                        ));
                        break;
                    }

                    emit(
                        &self.progress,
                        ProgressEvent::PhaseChanged {
                            phase: ExecutionPhase::Reflecting,
                        },
                    );
                    match self.planner.reflect(&step, &step_result).await {
                        Ok(reflection) => {
                            llm_tokens += reflection.usage.total();
                            if reflection.verdict != ReflectionVerdict::Pass {
                                info!(
                                    step = step.step_number,
                                    verdict = ?reflection.verdict,
                                    confidence = reflection.confidence,
                                    "reflection flagged step outcome"
                                );
                            }
                        }
                        Err(err) => debug!(%err, "reflection backend unavailable"),
                    }

                    completed_descriptions.push(step.description.clone());
                    let reached_final = step_result.is_final_answer;
                    if reached_final {
                        final_answer = step_result.final_answer.clone();
                    }
                    executed.push(step_result);
                    if reached_final {
                        info!(
                            step = step.step_number,
                            "final answer reached, skipping remaining steps"
                        );
                        break;
                    }
                    index += 1;
                    continue;
                }
                Some(error) => error,
            };

            // Fast-fail: no in-place retry, route straight to the replanner.
            let failed_cell = step_result
                .tool_results
                .iter()
                .find(|r| !r.success)
                .and_then(|r| r.cell_index)
                .or_else(|| step_result.tool_results.iter().rev().find_map(|r| r.cell_index));
            let last_output = step_result
                .primary_result()
                .and_then(|r| r.output.clone());
            executed.push(step_result);

            replan_attempts += 1;
            if replan_attempts > self.config.max_replan_attempts {
                status = TaskStatus::Failed;
                failure = Some(format!(
                    "Replanning budget exhausted after {} attempts: {}",
                    self.config.max_replan_attempts, error.message
                ));
                break;
            }

            emit(
                &self.progress,
                ProgressEvent::PhaseChanged {
                    phase: ExecutionPhase::Replanning,
                },
            );
            emit(
                &self.progress,
                ProgressEvent::Replanning {
                    step_number: step.step_number,
                    attempt: replan_attempts,
                    reason: error.message.clone(),
                },
            );
            info!(
                step = step.step_number,
                attempt = replan_attempts,
                error = %error.message,
                "step failed, replanning"
            );

            let replan_context = ReplanContext {
                original_request: request.to_string(),
                executed_steps: completed_descriptions.clone(),
                failed_step: step,
                error,
                last_output,
            };
            match self.planner.replan(&replan_context).await {
                Ok(response) => {
                    llm_tokens += response.usage.total();
                    if !response.reasoning.is_empty() {
                        debug!(reasoning = %response.reasoning, "replanner reasoning");
                    }
                    apply_decision(&mut plan, index, response.decision, failed_cell);
                }
                Err(err) => {
                    status = TaskStatus::Failed;
                    failure = Some(format!("Replanning failed: {}", err));
                    break;
                }
            }
        }

        self.finish(
            status,
            plan,
            executed,
            final_answer,
            failure,
            total_attempts,
            started,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        status: TaskStatus,
        plan: crate::models::plan::Plan,
        executed_steps: Vec<StepResult>,
        final_answer: Option<String>,
        error: Option<String>,
        total_attempts: u32,
        started: Instant,
    ) -> TaskExecutionResult {
        let checkpoints = self.checkpoints.lock().await;
        TaskExecutionResult {
            success: status == TaskStatus::Completed,
            status,
            plan,
            executed_steps,
            created_cells: checkpoints.created_cells().iter().copied().collect(),
            modified_cells: checkpoints.modified_cells().iter().copied().collect(),
            final_answer,
            error,
            total_attempts,
            execution_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Wait out the configured inter-step pacing. Returns false when
    /// cancelled while waiting.
    async fn pace(&self, token: &CancellationToken) -> bool {
        match self.config.execution_speed.delay_ms() {
            Some(0) => true,
            Some(ms) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(ms)) => true,
                    _ = token.cancelled() => false,
                }
            }
            None => {
                let mut guard = self.step_signal.lock().await;
                match guard.as_mut() {
                    Some(receiver) => {
                        tokio::select! {
                            signal = receiver.recv() => signal.is_some(),
                            _ = token.cancelled() => false,
                        }
                    }
                    // No signal source wired; proceed rather than hang
                    None => true,
                }
            }
        }
    }

    /// Prune the incoming context down to the effective token budget.
    async fn budget_context(&self, context: NotebookContext) -> NotebookContext {
        let mut manager = self.context_manager.lock().await;
        let usage = manager.calculate_usage(&context);
        let effective = manager.budget().effective_budget();
        if usage.usage_percent >= manager.budget().warning_threshold {
            warn!(
                total_tokens = usage.total_tokens,
                effective_budget = effective,
                "context approaching token budget"
            );
        }
        if usage.total_tokens <= effective {
            return context;
        }
        let pruned = manager.prune_context(&context, effective);
        info!(
            before = usage.total_tokens,
            after = pruned.estimated_tokens,
            "context pruned to fit budget"
        );
        NotebookContext {
            cells: pruned
                .preserved_cells
                .iter()
                .map(|cell| CellInfo {
                    index: cell.index,
                    source: cell.source.clone(),
                    output: cell.output.clone(),
                })
                .collect(),
            variables: pruned.variables,
            libraries: pruned.libraries,
            current_cell_index: context.current_cell_index,
        }
    }
}

/// Names a code fragment defines: simple assignments, `import x [as y]`,
/// and `from m import a, b as c`.
pub(crate) fn extract_defined_names(code: &str) -> Vec<String> {
    static ASSIGN: OnceLock<Regex> = OnceLock::new();
    static IMPORT: OnceLock<Regex> = OnceLock::new();
    static FROM_IMPORT: OnceLock<Regex> = OnceLock::new();

    let assign = ASSIGN.get_or_init(|| {
        Regex::new(r"(?m)^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=[^=]").expect("static regex")
    });
    let import = IMPORT.get_or_init(|| {
        Regex::new(r"(?m)^\s*import\s+([A-Za-z_][A-Za-z0-9_.]*)(?:\s+as\s+([A-Za-z_][A-Za-z0-9_]*))?")
            .expect("static regex")
    });
    let from_import = FROM_IMPORT.get_or_init(|| {
        Regex::new(r"(?m)^\s*from\s+[A-Za-z_][A-Za-z0-9_.]*\s+import\s+(.+)$")
            .expect("static regex")
    });

    let mut names: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    };

    for caps in assign.captures_iter(code) {
        if let Some(name) = caps.get(1) {
            push(name.as_str());
        }
    }
    for caps in import.captures_iter(code) {
        match caps.get(2) {
            Some(alias) => push(alias.as_str()),
            None => {
                if let Some(module) = caps.get(1) {
                    push(module.as_str().split('.').next().unwrap_or(""));
                }
            }
        }
    }
    for caps in from_import.captures_iter(code) {
        if let Some(list) = caps.get(1) {
            for item in list.as_str().split(',') {
                let item = item.trim();
                if item == "*" || item.is_empty() {
                    continue;
                }
                let name = match item.split_once(" as ") {
                    Some((_, alias)) => alias.trim(),
                    None => item.split_whitespace().next().unwrap_or(""),
                };
                push(name);
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_assignments() {
        let names = extract_defined_names("x = 1\ny = x + 2\nz == 3\n  w = 4");
        assert_eq!(names, vec!["x", "y", "w"]);
    }

    #[test]
    fn test_extract_imports() {
        let names = extract_defined_names(
            "import pandas as pd\nimport os.path\nfrom sklearn.linear_model import LinearRegression, Ridge as R",
        );
        assert_eq!(names, vec!["pd", "os", "LinearRegression", "R"]);
    }

    #[test]
    fn test_extract_dedupes() {
        let names = extract_defined_names("x = 1\nx = 2");
        assert_eq!(names, vec!["x"]);
    }
}
