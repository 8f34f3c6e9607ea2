//! Tool Trait and Registry
//!
//! Defines the unified `Tool` trait interface and the dependency-injected
//! `ToolRegistry` for registration, lookup, and approval-gated execution.
//! The registry is a value owned by the orchestrator, never a global, so
//! multiple isolated orchestrators can coexist without cross-contamination.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::AgentConfig;
use crate::document::DocumentAdapter;
use crate::models::result::ToolResult;
use crate::models::tool::{ApprovalRequest, ApprovalResult, ToolDefinition};

/// Context provided to each tool during execution.
///
/// Carries all shared state tools need — host document, workspace root,
/// cancellation, timing config — so tool implementations never reach for
/// executor-private fields.
#[derive(Clone)]
pub struct ToolExecutionContext {
    /// Host document/kernel access (the only writer of document state)
    pub document: Arc<dyn DocumentAdapter>,
    /// Root directory for all file tools; paths never escape it
    pub workspace_root: PathBuf,
    /// Cancellation token for cooperative cancellation
    pub cancellation_token: CancellationToken,
    /// Agent configuration (timeouts, settle delays)
    pub config: AgentConfig,
}

impl ToolExecutionContext {
    pub fn new(document: Arc<dyn DocumentAdapter>, workspace_root: PathBuf) -> Self {
        Self {
            document,
            workspace_root,
            cancellation_token: CancellationToken::new(),
            config: AgentConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }
}

/// Unified tool interface.
///
/// Each tool provides its catalogue entry (name, description, risk level,
/// approval requirement, category) and its execution logic. Execution is
/// infallible at the type level: failures are reported through
/// `ToolResult`, so no tool error can escape the registry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Catalogue entry for this tool.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given context and arguments.
    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult;
}

/// Async approval callback: `ApprovalRequest → ApprovalResult`.
/// The core is agnostic to how the decision is rendered.
pub type ApprovalCallback = Arc<
    dyn Fn(ApprovalRequest) -> Pin<Box<dyn Future<Output = ApprovalResult> + Send>>
        + Send
        + Sync,
>;

fn auto_approve() -> ApprovalCallback {
    Arc::new(|_req| Box::pin(async { ApprovalResult::approve() }))
}

/// Registry of available tools.
///
/// Provides O(1) lookup by name, registration/unregistration, and
/// approval-gated execution. When a tool's definition requires approval
/// and the registry-level `approval_required` flag is set, the injected
/// approval callback decides; denials become failure results carrying the
/// reason. An approval with `always_allow` suppresses future prompts for
/// that tool for this registry's lifetime.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Insertion order for deterministic iteration
    order: Vec<String>,
    approval_required: bool,
    approval_callback: ApprovalCallback,
    always_allow: Mutex<HashSet<String>>,
}

impl ToolRegistry {
    /// Create an empty registry with auto-approval.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            approval_required: false,
            approval_callback: auto_approve(),
            always_allow: Mutex::new(HashSet::new()),
        }
    }

    /// Enable or disable the registry-level approval gate.
    pub fn set_approval_required(&mut self, required: bool) {
        self.approval_required = required;
    }

    /// Inject the approval callback (default: auto-approve).
    pub fn set_approval_callback(&mut self, callback: ApprovalCallback) {
        self.approval_callback = callback;
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    /// Unregister a tool by name. Returns the removed tool, if any.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.order.retain(|n| n != name);
        self.tools.remove(name)
    }

    /// Look up a tool by name.
    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Whether a tool is registered.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool definitions in registration order, suitable for handing
    /// to the planner.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// All registered tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name, routing risky calls through the approval
    /// gate first. Unknown tools and denials are failure results; no tool
    /// error escapes as a panic or `Err`.
    pub async fn execute_tool(
        &self,
        name: &str,
        ctx: &ToolExecutionContext,
        args: Value,
    ) -> ToolResult {
        let tool = match self.tools.get(name) {
            Some(tool) => tool.clone(),
            None => return ToolResult::err(name, format!("Unknown tool: {}", name)),
        };
        let definition = tool.definition();

        if self.approval_required && definition.requires_approval && !self.is_always_allowed(name)
        {
            let request = ApprovalRequest::new(&definition, args.clone());
            debug!(tool = name, request_id = %request.id, "awaiting approval");
            let decision = (self.approval_callback)(request).await;
            if !decision.approved {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| "approval denied".to_string());
                warn!(tool = name, %reason, "tool call denied");
                return ToolResult::err(name, format!("Approval denied: {}", reason))
                    .with_error_name("ApprovalDenied");
            }
            if decision.always_allow {
                if let Ok(mut allowed) = self.always_allow.lock() {
                    allowed.insert(name.to_string());
                }
            }
        }

        tool.execute(ctx, args).await
    }

    fn is_always_allowed(&self, name: &str) -> bool {
        self.always_allow
            .lock()
            .map(|allowed| allowed.contains(name))
            .unwrap_or(false)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
