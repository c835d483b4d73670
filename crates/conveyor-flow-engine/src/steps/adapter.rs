//! Adapter step: resolves a configured adapter and delegates execution.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::errors::StepError;
use crate::node_config::NodeConfig;
use crate::traits::{AdapterLookup, AdapterRunner, StepCommand};
use crate::types::{FlowExecutionStep, ResultMap};

/// Intermediate node that runs one configured protocol adapter.
pub struct AdapterStepCommand {
    lookup: Arc<dyn AdapterLookup>,
    runner: Arc<dyn AdapterRunner>,
}

impl AdapterStepCommand {
    pub fn new(lookup: Arc<dyn AdapterLookup>, runner: Arc<dyn AdapterRunner>) -> Self {
        Self { lookup, runner }
    }
}

#[async_trait]
impl StepCommand for AdapterStepCommand {
    fn step_type(&self) -> &str {
        "adapter"
    }

    async fn run(
        &self,
        step: &mut FlowExecutionStep,
        config: &NodeConfig,
        ctx: &mut ExecutionContext,
    ) -> Result<ResultMap, StepError> {
        // Normalization already merged the nested `data` shape, so a flat
        // legacy `adapterId` and a nested one both land here.
        let id = config
            .str_field("adapterId")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StepError::Config {
                message: "adapter step requires an 'adapterId' field".into(),
            })?
            .to_string();

        let adapter = self
            .lookup
            .find(&id)
            .await
            .map_err(|e| StepError::Execution {
                message: e.to_string(),
            })?
            .ok_or_else(|| StepError::AdapterNotFound { id: id.clone() })?;

        if !adapter.active {
            return Err(StepError::AdapterInactive { id });
        }

        tracing::debug!(
            adapter_id = %adapter.id,
            adapter_type = %adapter.adapter_type,
            direction = %adapter.direction,
            "running adapter"
        );

        let mut result = self.runner.execute_adapter(&adapter, ctx, step).await?;
        result.insert("adapterId".into(), Value::String(adapter.id.clone()));
        result.insert("adapterName".into(), Value::String(adapter.name.clone()));
        Ok(result)
    }
}
