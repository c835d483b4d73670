//! Start step: flow-control entry node.
//!
//! Reads the trigger payload out of the context and stages any discovered
//! files for downstream processing. A missing trigger payload is not an
//! error — manual and test executions have no trigger.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::{
    ExecutionContext, KEY_FILES_TO_PROCESS, KEY_FOUND_FILES, KEY_SENDER_PROCESSED_FILES,
};
use crate::errors::StepError;
use crate::node_config::NodeConfig;
use crate::traits::StepCommand;
use crate::types::{FlowExecutionStep, ResultMap};

/// Entry node of every flow.
pub struct StartStepCommand;

#[async_trait]
impl StepCommand for StartStepCommand {
    fn step_type(&self) -> &str {
        "start"
    }

    async fn run(
        &self,
        _step: &mut FlowExecutionStep,
        _config: &NodeConfig,
        ctx: &mut ExecutionContext,
    ) -> Result<ResultMap, StepError> {
        let trigger = ctx.trigger_data();
        let mut result = ResultMap::new();

        let has_data = match trigger.get(KEY_FOUND_FILES) {
            Some(Value::Array(found)) => {
                ctx.set(KEY_FILES_TO_PROCESS, Value::Array(found.clone()));
                ctx.set(KEY_SENDER_PROCESSED_FILES, Value::Array(found.clone()));
                true
            }
            _ => false,
        };

        // All other trigger fields pass through into the result verbatim.
        for (key, value) in &trigger {
            if key != KEY_FOUND_FILES {
                result.insert(key.clone(), value.clone());
            }
        }

        result.insert("success".into(), Value::Bool(true));
        result.insert("hasData".into(), Value::Bool(has_data));
        Ok(result)
    }
}
