//! Step execution dispatch: the template entry point and command registry.
//!
//! `execute_step` is the only way a step command runs. It owns the
//! validate → delegate → enrich → capture-failure sequence so concrete
//! commands contain node-specific logic only. A failing step produces a
//! `success=false` result mapping; it never aborts the dispatch loop. Only
//! contract violations (a non-object node configuration) propagate.

pub mod adapter;
pub mod parallel_split;
pub mod start;
pub mod utility;

pub use adapter::AdapterStepCommand;
pub use parallel_split::ParallelSplitStepCommand;
pub use start::StartStepCommand;
pub use utility::UtilityStepCommand;

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::errors::ContractViolation;
use crate::node_config::NodeConfig;
use crate::traits::StepCommand;
use crate::types::{FlowExecutionStep, ResultMap, StepStatus};

// ---------------------------------------------------------------------------
// Template entry point
// ---------------------------------------------------------------------------

/// Execute one step through its command.
///
/// 1. Validates the raw node configuration is a JSON object (fatal,
///    propagates as [`ContractViolation`]).
/// 2. Normalizes the configuration once and delegates to
///    [`StepCommand::run`].
/// 3. On success or captured failure, merges common metadata: `stepType`,
///    `stepId`, `stepName`, `executedAt`.
pub async fn execute_step(
    cmd: &dyn StepCommand,
    step: &mut FlowExecutionStep,
    node: &Value,
    ctx: &mut ExecutionContext,
) -> Result<ResultMap, ContractViolation> {
    if !node.is_object() {
        return Err(ContractViolation::InvalidNodeConfig);
    }
    let config = NodeConfig::normalize(node);
    step.status = StepStatus::Running;

    tracing::debug!(step_type = cmd.step_type(), step_id = %step.id, "executing step");

    let mut result = match cmd.run(step, &config, ctx).await {
        Ok(map) => {
            step.status = StepStatus::Completed;
            map
        }
        Err(err) => {
            tracing::warn!(
                step_type = cmd.step_type(),
                step_id = %step.id,
                error = %err,
                "step execution failed"
            );
            step.status = StepStatus::Failed;
            let mut map = ResultMap::new();
            map.insert("success".into(), Value::Bool(false));
            map.insert("error".into(), Value::String(err.to_string()));
            map.insert("errorKind".into(), Value::String(err.kind().to_string()));
            map
        }
    };

    result.insert("stepType".into(), Value::String(cmd.step_type().to_string()));
    result.insert("stepId".into(), Value::String(step.id.clone()));
    result.insert("stepName".into(), Value::String(step.step_name.clone()));
    result.insert("executedAt".into(), Value::String(Utc::now().to_rfc3339()));
    Ok(result)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Thread-safe registry of step commands, resolved by `can_handle`.
///
/// Cheaply cloneable (inner state is `Arc`-wrapped); clones share the same
/// underlying registry.
#[derive(Clone, Default)]
pub struct StepRegistry {
    inner: Arc<RwLock<Vec<Arc<dyn StepCommand>>>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, cmd: Arc<dyn StepCommand>) {
        self.inner.write().push(cmd);
    }

    /// First registered command that handles the node, in registration order.
    pub fn resolve(&self, node: &Value) -> Option<Arc<dyn StepCommand>> {
        self.inner
            .read()
            .iter()
            .find(|cmd| cmd.can_handle(node))
            .cloned()
    }

    /// Resolve and execute in one call.
    pub async fn dispatch(
        &self,
        step: &mut FlowExecutionStep,
        node: &Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Option<ResultMap>, ContractViolation> {
        match self.resolve(node) {
            Some(cmd) => execute_step(cmd.as_ref(), step, node, ctx).await.map(Some),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
