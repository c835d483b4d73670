//! Collaborator trait interfaces for the step execution core.
//!
//! Every pluggable component is an async trait with a narrow signature, so
//! the dispatch layer can be exercised with test doubles. Concrete protocol
//! implementations live in `conveyor-adapters`; the orchestrator supplies
//! the adapter lookup.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::errors::{LookupError, StepError};
use crate::node_config::NodeConfig;
use crate::types::{Adapter, FlowExecutionStep, ResultMap};

// ---------------------------------------------------------------------------
// StepCommand
// ---------------------------------------------------------------------------

/// One node type's runtime behavior.
///
/// `run` is step-specific logic only. The template entry point
/// [`execute_step`](crate::steps::execute_step) owns contract validation,
/// failure capture, and metadata merging, and is never overridden.
#[async_trait]
pub trait StepCommand: Send + Sync {
    /// The node type this command executes (`"start"`, `"adapter"`, ...).
    fn step_type(&self) -> &str;

    /// Whether this command handles the given raw node configuration.
    /// Default: the node's `type` (or legacy `stepType`) field matches
    /// [`step_type`](Self::step_type), case-insensitively.
    fn can_handle(&self, node: &Value) -> bool {
        node.get("type")
            .or_else(|| node.get("stepType"))
            .and_then(Value::as_str)
            .map(|t| t.eq_ignore_ascii_case(self.step_type()))
            .unwrap_or(false)
    }

    /// Execute the node-specific logic against the normalized configuration
    /// and the shared execution context.
    async fn run(
        &self,
        step: &mut FlowExecutionStep,
        config: &NodeConfig,
        ctx: &mut ExecutionContext,
    ) -> Result<ResultMap, StepError>;
}

// ---------------------------------------------------------------------------
// AdapterLookup
// ---------------------------------------------------------------------------

/// Resolves an opaque adapter identifier to its descriptor.
///
/// Implemented by the (out-of-scope) persistence layer; the core never
/// lists or persists adapters. [`InMemoryAdapterLookup`] in
/// [`defaults`](crate::defaults) serves tests and embedding.
#[async_trait]
pub trait AdapterLookup: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<Adapter>, LookupError>;
}

// ---------------------------------------------------------------------------
// Execution delegates
// ---------------------------------------------------------------------------

/// Executes a resolved adapter against the context. Implemented by the
/// executor factory layer in `conveyor-adapters`.
#[async_trait]
pub trait AdapterRunner: Send + Sync {
    async fn execute_adapter(
        &self,
        adapter: &Adapter,
        ctx: &mut ExecutionContext,
        step: &mut FlowExecutionStep,
    ) -> Result<ResultMap, StepError>;
}

/// Dispatches a utility operation family. Implemented by
/// [`UtilityProcessors`](crate::util::UtilityProcessors).
#[async_trait]
pub trait UtilityRunner: Send + Sync {
    async fn execute_utility(
        &self,
        utility_type: &str,
        config: &Value,
        ctx: &mut ExecutionContext,
        step: &mut FlowExecutionStep,
    ) -> Result<ResultMap, StepError>;
}
