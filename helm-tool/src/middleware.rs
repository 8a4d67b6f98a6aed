//! Composable tool-wrapping pipeline (`spec.md` §4.1's "wrapping is
//! composable; the adapter contract is preserved").
//!
//! Grounded on the teacher's `neuron-tool::middleware`: the same
//! `Next`-chain shape, generalized from its WASM-portability concern to
//! the concrete need here — a browser-events wrapper that turns tool
//! progress into `browser.*` events without the executor itself knowing
//! about event sinks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use helm_proto::ToolError;
use serde_json::Value;

use crate::registry::{ProgressHandler, ToolDyn};

/// A tool call in flight through the middleware pipeline.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Tool name being invoked.
    pub name: String,
    /// Input arguments.
    pub input: Value,
}

type BoxedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Middleware wrapping tool execution: inspect/modify the call, decide
/// whether to continue the chain, inspect/modify the result.
pub trait ToolMiddleware: Send + Sync {
    /// Process a call, optionally delegating to `next`. `on_progress` is
    /// forwarded unchanged to whichever middleware (or the tool itself)
    /// ends up handling the call — middleware that wants to observe
    /// progress without suppressing it clones the handler before passing
    /// it on.
    fn process<'a>(
        &'a self,
        call: &'a ToolCall,
        next: Next<'a>,
        on_progress: Option<Arc<dyn ProgressHandler>>,
    ) -> BoxedFuture<'a, Result<Value, ToolError>>;
}

/// Remaining middleware plus the underlying tool. Consumed on use to
/// prevent double invocation.
pub struct Next<'a> {
    tool: &'a dyn ToolDyn,
    middleware: &'a [Arc<dyn ToolMiddleware>],
}

impl<'a> Next<'a> {
    /// Build a `Next` over the full middleware slice and the target tool.
    pub fn new(tool: &'a dyn ToolDyn, middleware: &'a [Arc<dyn ToolMiddleware>]) -> Self {
        Self { tool, middleware }
    }

    /// Continue the chain, eventually invoking the tool once middleware
    /// is exhausted.
    pub async fn run(
        self,
        call: &'a ToolCall,
        on_progress: Option<Arc<dyn ProgressHandler>>,
    ) -> Result<Value, ToolError> {
        if let Some((head, tail)) = self.middleware.split_first() {
            let next = Next::new(self.tool, tail);
            head.process(call, next, on_progress).await
        } else {
            self.tool.call(call.input.clone(), on_progress).await
        }
    }
}
