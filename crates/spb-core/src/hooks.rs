//! Extension hooks for pipeline observation.
//!
//! The request pipeline emits events at fixed points: around batch creation
//! and around webhook dispatch. Embedders register [`PipelineHook`]
//! implementations to observe them without patching the pipeline itself.
//!
//! Hooks run in registration order and strictly sequentially, so a hook may
//! rely on earlier hooks having completed. Hook failures are logged and
//! swallowed; observation never alters request outcomes.

use std::sync::Arc;

use crate::models::{CreatedPage, DeliveryStatus, ItemError, RequestId};

/// Event emitted at a fixed pipeline extension point.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A validated batch is about to be processed.
    BatchStarted {
        /// Correlation id of the request.
        request_id: RequestId,
        /// Name of the authenticated credential.
        credential_name: String,
        /// Number of items submitted.
        total_requested: usize,
    },

    /// Batch processing finished; the response is about to be built.
    BatchCompleted {
        /// Correlation id of the request.
        request_id: RequestId,
        /// Pages that were created.
        created: Vec<CreatedPage>,
        /// Items that failed.
        errors: Vec<ItemError>,
    },

    /// A webhook dispatch sequence is about to start.
    DispatchStarted {
        /// Correlation id of the originating request.
        request_id: RequestId,
        /// Resolved destination URL.
        url: String,
    },

    /// A webhook dispatch sequence finished and was recorded.
    DispatchCompleted {
        /// Correlation id of the originating request.
        request_id: RequestId,
        /// Final outcome of the attempt sequence.
        status: DeliveryStatus,
        /// Total attempts made.
        attempts: u32,
    },
}

impl PipelineEvent {
    /// The correlation id this event belongs to.
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::BatchStarted { request_id, .. }
            | Self::BatchCompleted { request_id, .. }
            | Self::DispatchStarted { request_id, .. }
            | Self::DispatchCompleted { request_id, .. } => request_id,
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BatchStarted { .. } => "batch_started",
            Self::BatchCompleted { .. } => "batch_completed",
            Self::DispatchStarted { .. } => "dispatch_started",
            Self::DispatchCompleted { .. } => "dispatch_completed",
        }
    }
}

/// Observer of pipeline events.
///
/// Implementations must not assume any particular event ordering beyond the
/// pipeline's own: `BatchStarted` precedes `BatchCompleted` for a given
/// request, and `DispatchStarted` precedes `DispatchCompleted`.
#[async_trait::async_trait]
pub trait PipelineHook: Send + Sync {
    /// Handles a single pipeline event.
    ///
    /// Errors are logged by the registry and never propagate to the
    /// pipeline.
    async fn on_event(&self, event: &PipelineEvent) -> anyhow::Result<()>;
}

/// Hook that ignores every event.
///
/// Default when an embedder registers nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHook;

#[async_trait::async_trait]
impl PipelineHook for NoOpHook {
    async fn on_event(&self, _event: &PipelineEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Ordered collection of hooks.
///
/// Emission walks hooks in registration order, awaiting each before the
/// next. A failing hook is logged and skipped; remaining hooks still run.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn PipelineHook>>,
}

impl HookRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook. Registration order is emission order.
    pub fn register(&mut self, hook: Arc<dyn PipelineHook>) {
        self.hooks.push(hook);
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Emits an event to every hook, in order.
    pub async fn emit(&self, event: &PipelineEvent) {
        for hook in &self.hooks {
            if let Err(error) = hook.on_event(event).await {
                tracing::warn!(
                    event = event.name(),
                    request_id = %event.request_id(),
                    %error,
                    "pipeline hook failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry").field("hooks", &self.hooks.len()).finish()
    }
}
