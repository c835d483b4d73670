//! Utility step: dispatches a structured data/file operation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::errors::StepError;
use crate::node_config::NodeConfig;
use crate::traits::{StepCommand, UtilityRunner};
use crate::types::{FlowExecutionStep, ResultMap};

/// Node that runs one `(domain, operation)` utility through the dispatch
/// collaborator.
pub struct UtilityStepCommand {
    runner: Arc<dyn UtilityRunner>,
}

impl UtilityStepCommand {
    pub fn new(runner: Arc<dyn UtilityRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl StepCommand for UtilityStepCommand {
    fn step_type(&self) -> &str {
        "utility"
    }

    async fn run(
        &self,
        step: &mut FlowExecutionStep,
        config: &NodeConfig,
        ctx: &mut ExecutionContext,
    ) -> Result<ResultMap, StepError> {
        let utility_type = config
            .str_field("utilityType")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| StepError::Config {
                message: "utility step requires a 'utilityType' field".into(),
            })?
            .to_string();

        // The operation's own settings live in a nested `config` sub-mapping;
        // legacy nodes put them flat, so fall back to the whole node config.
        let op_config = match config.get("config") {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            _ => Value::Object(config.fields().clone()),
        };

        let mut result = self
            .runner
            .execute_utility(&utility_type, &op_config, ctx, step)
            .await?;

        result.insert("utilityType".into(), Value::String(utility_type));
        result
            .entry("success".to_string())
            .or_insert(Value::Bool(true));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::execute_step;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingUtilityRunner {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UtilityRunner for RecordingUtilityRunner {
        async fn execute_utility(
            &self,
            utility_type: &str,
            config: &Value,
            _ctx: &mut ExecutionContext,
            _step: &mut FlowExecutionStep,
        ) -> Result<ResultMap, StepError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut map = ResultMap::new();
            map.insert("operation".into(), json!(utility_type));
            map.insert("echo".into(), config.clone());
            Ok(map)
        }
    }

    #[tokio::test]
    async fn dispatches_with_nested_config() {
        let runner = Arc::new(RecordingUtilityRunner {
            calls: AtomicUsize::new(0),
        });
        let cmd = UtilityStepCommand::new(runner.clone());
        let mut step = FlowExecutionStep::new("s1", "hash", "utility");
        let mut ctx = ExecutionContext::new();

        let node = json!({
            "type": "utility",
            "data": {
                "utilityType": "file.hash",
                "config": { "sourcePath": "/tmp/x", "algorithm": "md5" }
            }
        });
        let result = execute_step(&cmd, &mut step, &node, &mut ctx).await.unwrap();

        assert_eq!(result["utilityType"], json!("file.hash"));
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["echo"]["algorithm"], json!("md5"));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_utility_type_fails_before_dispatch() {
        let runner = Arc::new(RecordingUtilityRunner {
            calls: AtomicUsize::new(0),
        });
        let cmd = UtilityStepCommand::new(runner.clone());
        let mut step = FlowExecutionStep::new("s1", "hash", "utility");
        let mut ctx = ExecutionContext::new();

        let result = execute_step(&cmd, &mut step, &json!({"type": "utility"}), &mut ctx)
            .await
            .unwrap();
        assert_eq!(result["success"], json!(false));
        assert_eq!(result["errorKind"], json!("config"));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn flat_legacy_config_falls_back_to_node_fields() {
        let runner = Arc::new(RecordingUtilityRunner {
            calls: AtomicUsize::new(0),
        });
        let cmd = UtilityStepCommand::new(runner);
        let mut step = FlowExecutionStep::new("s1", "hash", "utility");
        let mut ctx = ExecutionContext::new();

        let node = json!({
            "type": "utility",
            "utilityType": "file.hash",
            "sourcePath": "/tmp/y"
        });
        let result = execute_step(&cmd, &mut step, &node, &mut ctx).await.unwrap();
        assert_eq!(result["echo"]["sourcePath"], json!("/tmp/y"));
    }
}
