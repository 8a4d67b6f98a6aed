//! Object-safe tool trait and the name→tool registry.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use helm_proto::ToolError;
use helm_types::ToolSchema;
use serde_json::Value;

use crate::descriptor::ToolDescriptor;

/// Fire-and-forget progress notifications from a running tool call.
///
/// Implementations must not block: `spec.md` §4.1 requires progress
/// callbacks to be non-blocking, since the executor awaits tool
/// completion on the same task that would otherwise stall on a slow
/// subscriber.
pub trait ProgressHandler: Send + Sync {
    /// Called zero or more times while a tool executes.
    fn on_progress(&self, payload: Value);
}

/// Object-safe tool implementation.
///
/// Any tool source (local function, MCP server, HTTP endpoint) implements
/// this trait; tools are stored as `Arc<dyn ToolDyn>` in [`ToolRegistry`].
pub trait ToolDyn: Send + Sync {
    /// The tool's unique name. Must match the key it's registered under.
    fn name(&self) -> &str;

    /// Execute the tool with already-validated input. `on_progress`, if
    /// given, is the tool's own channel for emitting incremental progress
    /// (e.g. browser snapshots during a long-running automation) — most
    /// tools ignore it entirely.
    fn call(
        &self,
        input: Value,
        on_progress: Option<Arc<dyn ProgressHandler>>,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>>;
}

/// Name→tool registry, paired with each tool's [`ToolDescriptor`].
///
/// The turn loop uses this to look up tools the model requests and to
/// build the model-facing function list (filtered by the caller-supplied
/// enabled-name set, per `spec.md` §4.2).
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolDyn>>,
    descriptors: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            descriptors: HashMap::new(),
        }
    }

    /// Register a tool and its descriptor. Overwrites any existing entry
    /// with the same name.
    pub fn register(&mut self, descriptor: ToolDescriptor, tool: Arc<dyn ToolDyn>) {
        self.descriptors.insert(descriptor.name.clone(), descriptor);
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool implementation by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolDyn>> {
        self.tools.get(name)
    }

    /// Look up a tool's descriptor by name.
    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.descriptors.get(name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The model-facing function list, filtered to `enabled` names.
    ///
    /// `enabled = None` means no filter (all registered tools exposed).
    pub fn tool_schemas(&self, enabled: Option<&HashSet<String>>) -> Vec<ToolSchema> {
        self.descriptors
            .values()
            .filter(|d| enabled.is_none_or(|e| e.contains(&d.name)))
            .map(|d| ToolSchema {
                name: d.name.clone(),
                description: d.description.clone(),
                input_schema: d.input_schema.clone(),
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
