//! Tool Executor Adapter (`spec.md` §4.1).

use std::sync::Arc;
use std::time::Instant;

use helm_proto::DurationMs;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::descriptor::ExecuteOutcome;
use crate::middleware::{Next, ToolCall, ToolMiddleware};
use crate::registry::ToolRegistry;

pub use crate::registry::ProgressHandler;

/// Invokes a named, registered tool with validated parameters, through
/// whatever [`ToolMiddleware`] chain the executor was built with.
///
/// The adapter contract is preserved under wrapping: a caller that wants
/// to intercept progress events (e.g. turning tool progress into
/// `browser.*` events on the session's channel, per `spec.md` §4.1) does
/// so with a [`ProgressHandler`] passed into [`ToolExecutor::execute`],
/// or with a [`ToolMiddleware`] registered via [`ToolExecutor::with_middleware`]
/// — the executor itself stays ignorant of either concern's payload shape.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    middleware: Vec<Arc<dyn ToolMiddleware>>,
}

impl ToolExecutor {
    /// Build an executor over a shared registry, with no middleware.
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry, middleware: Vec::new() }
    }

    /// Build an executor that runs every call through `middleware`, in
    /// order, before reaching the tool itself.
    pub fn with_middleware(registry: Arc<ToolRegistry>, middleware: Vec<Arc<dyn ToolMiddleware>>) -> Self {
        Self { registry, middleware }
    }

    /// Execute `name` with `params`, respecting the tool's declared
    /// timeout. `on_progress`, if given, is threaded through the
    /// middleware chain down to the tool's own [`crate::ToolDyn::call`],
    /// which invokes it directly if it supports incremental progress.
    #[instrument(skip(self, params, on_progress), fields(tool = name))]
    pub async fn execute(
        &self,
        name: &str,
        params: Value,
        on_progress: Option<Arc<dyn ProgressHandler>>,
    ) -> ExecuteOutcome {
        let started = Instant::now();

        let Some(descriptor) = self.registry.descriptor(name) else {
            return ExecuteOutcome::failed(
                format!("TOOL_VALIDATION: tool not found: {name}"),
                DurationMs::from(started.elapsed()),
            );
        };

        if let Err(reason) = validate_params(&descriptor.input_schema, &params) {
            return ExecuteOutcome::failed(
                format!("TOOL_VALIDATION: {reason}"),
                DurationMs::from(started.elapsed()),
            );
        }

        let Some(tool) = self.registry.get(name) else {
            return ExecuteOutcome::failed(
                format!("TOOL_VALIDATION: tool not found: {name}"),
                DurationMs::from(started.elapsed()),
            );
        };

        let call = ToolCall { name: name.to_string(), input: params };
        let next = Next::new(tool.as_ref(), &self.middleware);
        let call_fut = next.run(&call, on_progress);
        match tokio::time::timeout(descriptor.timeout.to_std(), call_fut).await {
            Ok(Ok(output)) => ExecuteOutcome::ok(
                output_to_text(&output),
                DurationMs::from(started.elapsed()),
            ),
            Ok(Err(err)) => {
                warn!(error = %err, "tool execution failed");
                ExecuteOutcome::failed(err.to_string(), DurationMs::from(started.elapsed()))
            }
            Err(_) => ExecuteOutcome::failed(
                format!("TOOL_TIMEOUT: {name} exceeded {}", descriptor.timeout),
                DurationMs::from(started.elapsed()),
            ),
        }
    }
}

/// Minimal structural check: a schema with a `required` array must see
/// those keys present in an object-shaped `params`. Full JSON Schema
/// validation is a collaborator concern (out of scope per `spec.md` §1);
/// this is the boundary-level check the adapter itself owns.
fn validate_params(schema: &Value, params: &Value) -> Result<(), String> {
    let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
        return Ok(());
    };
    let obj = params.as_object();
    for key in required {
        let Some(key) = key.as_str() else { continue };
        let present = obj.is_some_and(|o| o.contains_key(key));
        if !present {
            return Err(format!("missing required field: {key}"));
        }
    }
    Ok(())
}

fn output_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ToolDescriptor;
    use crate::registry::ToolDyn;
    use helm_proto::ToolError;
    use serde_json::json;
    use std::future::Future;
    use std::pin::Pin;

    struct EchoTool;
    impl ToolDyn for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn call(
            &self,
            input: Value,
            _on_progress: Option<Arc<dyn ProgressHandler>>,
        ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
            Box::pin(async move { Ok(input) })
        }
    }

    struct SlowTool;
    impl ToolDyn for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn call(
            &self,
            _input: Value,
            _on_progress: Option<Arc<dyn ProgressHandler>>,
        ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
            Box::pin(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok(json!("done"))
            })
        }
    }

    struct ProgressEmittingTool;
    impl ToolDyn for ProgressEmittingTool {
        fn name(&self) -> &str {
            "progress"
        }
        fn call(
            &self,
            _input: Value,
            on_progress: Option<Arc<dyn ProgressHandler>>,
        ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
            Box::pin(async move {
                if let Some(handler) = on_progress {
                    handler.on_progress(json!({"percent": 50}));
                }
                Ok(json!("done"))
            })
        }
    }

    struct RecordingProgressHandler {
        seen: std::sync::Mutex<Vec<Value>>,
    }

    impl ProgressHandler for RecordingProgressHandler {
        fn on_progress(&self, payload: Value) {
            self.seen.lock().expect("lock poisoned").push(payload);
        }
    }

    fn registry_with(descriptor: ToolDescriptor, tool: Arc<dyn ToolDyn>) -> Arc<ToolRegistry> {
        let mut reg = ToolRegistry::new();
        reg.register(descriptor, tool);
        Arc::new(reg)
    }

    #[tokio::test]
    async fn missing_required_field_fails_validation() {
        let descriptor = ToolDescriptor {
            name: "echo".into(),
            description: "echo".into(),
            input_schema: json!({"type": "object", "required": ["q"]}),
            timeout: DurationMs::from_secs(1),
            requires_confirmation: false,
            is_search_class: false,
        };
        let executor = ToolExecutor::new(registry_with(descriptor, Arc::new(EchoTool)));
        let outcome = executor.execute("echo", json!({}), None).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().starts_with("TOOL_VALIDATION"));
    }

    #[tokio::test]
    async fn unknown_tool_fails_validation() {
        let reg = Arc::new(ToolRegistry::new());
        let executor = ToolExecutor::new(reg);
        let outcome = executor.execute("nope", json!({}), None).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn exceeding_timeout_fails_with_timeout_marker() {
        let descriptor = ToolDescriptor {
            name: "slow".into(),
            description: "slow".into(),
            input_schema: json!({"type": "object"}),
            timeout: DurationMs::from_millis(5),
            requires_confirmation: false,
            is_search_class: false,
        };
        let executor = ToolExecutor::new(registry_with(descriptor, Arc::new(SlowTool)));
        let outcome = executor.execute("slow", json!({}), None).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().starts_with("TOOL_TIMEOUT"));
    }

    #[tokio::test]
    async fn successful_call_returns_output_and_duration() {
        let descriptor = ToolDescriptor {
            name: "echo".into(),
            description: "echo".into(),
            input_schema: json!({"type": "object"}),
            timeout: DurationMs::from_secs(1),
            requires_confirmation: false,
            is_search_class: false,
        };
        let executor = ToolExecutor::new(registry_with(descriptor, Arc::new(EchoTool)));
        let outcome = executor.execute("echo", json!("hi"), None).await;
        assert!(outcome.success);
        assert_eq!(outcome.output, "hi");
    }

    #[tokio::test]
    async fn progress_handler_is_threaded_through_to_the_tool() {
        let descriptor = ToolDescriptor {
            name: "progress".into(),
            description: "progress".into(),
            input_schema: json!({"type": "object"}),
            timeout: DurationMs::from_secs(1),
            requires_confirmation: false,
            is_search_class: false,
        };
        let executor = ToolExecutor::new(registry_with(descriptor, Arc::new(ProgressEmittingTool)));
        let handler = Arc::new(RecordingProgressHandler { seen: std::sync::Mutex::new(Vec::new()) });
        let outcome = executor.execute("progress", json!({}), Some(handler.clone() as Arc<dyn ProgressHandler>)).await;
        assert!(outcome.success);
        assert_eq!(handler.seen.lock().expect("lock poisoned").as_slice(), &[json!({"percent": 50})]);
    }

    #[tokio::test]
    async fn middleware_chain_wraps_the_call() {
        use crate::middleware::{Next, ToolCall};
        use std::future::Future as StdFuture;

        struct TagMiddleware;
        impl ToolMiddleware for TagMiddleware {
            fn process<'a>(
                &'a self,
                call: &'a ToolCall,
                next: Next<'a>,
                on_progress: Option<Arc<dyn ProgressHandler>>,
            ) -> Pin<Box<dyn StdFuture<Output = Result<Value, ToolError>> + Send + 'a>> {
                Box::pin(async move {
                    let result = next.run(call, on_progress).await?;
                    Ok(json!({"wrapped": result}))
                })
            }
        }

        let descriptor = ToolDescriptor {
            name: "echo".into(),
            description: "echo".into(),
            input_schema: json!({"type": "object"}),
            timeout: DurationMs::from_secs(1),
            requires_confirmation: false,
            is_search_class: false,
        };
        let mut reg = ToolRegistry::new();
        reg.register(descriptor, Arc::new(EchoTool));
        let middleware: Vec<Arc<dyn ToolMiddleware>> = vec![Arc::new(TagMiddleware)];
        let executor = ToolExecutor::with_middleware(Arc::new(reg), middleware);
        let outcome = executor.execute("echo", json!("hi"), None).await;
        assert!(outcome.success);
        assert_eq!(outcome.output, json!({"wrapped": "hi"}).to_string());
    }
}
