//! Parallel-split step: proves data is ready for fan-out and says how many
//! branches to expect.
//!
//! The actual fan-out — creating N independent branches and feeding each a
//! [`branch_copy`](crate::context::ExecutionContext::branch_copy) — belongs
//! to the orchestrator. This command only counts queued files and produces
//! a monitoring snapshot that is safe to retain: no raw payload bytes ever
//! enter the snapshot.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::errors::StepError;
use crate::node_config::NodeConfig;
use crate::traits::StepCommand;
use crate::types::{FlowExecutionStep, ResultMap};

const DEFAULT_PARALLEL_PATHS: u64 = 2;

/// Fan-out preparation node.
pub struct ParallelSplitStepCommand;

#[async_trait]
impl StepCommand for ParallelSplitStepCommand {
    fn step_type(&self) -> &str {
        "parallel-split"
    }

    fn can_handle(&self, node: &Value) -> bool {
        node.get("type")
            .or_else(|| node.get("stepType"))
            .and_then(Value::as_str)
            .map(|t| {
                t.eq_ignore_ascii_case("parallel-split") || t.eq_ignore_ascii_case("parallel_split")
            })
            .unwrap_or(false)
    }

    async fn run(
        &self,
        _step: &mut FlowExecutionStep,
        config: &NodeConfig,
        ctx: &mut ExecutionContext,
    ) -> Result<ResultMap, StepError> {
        let parallel_paths = config.u64_field("parallelPaths", DEFAULT_PARALLEL_PATHS);
        let available = ctx.max_queued_files();

        tracing::debug!(parallel_paths, available, "parallel split prepared");

        let mut result = ResultMap::new();
        result.insert("success".into(), Value::Bool(true));
        result.insert("parallelPaths".into(), Value::from(parallel_paths));
        result.insert("filesAvailableForSplit".into(), Value::from(available));
        result.insert(
            "contextSnapshot".into(),
            Value::Object(ctx.sanitized_snapshot()),
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::KEY_FILES_TO_PROCESS;
    use crate::steps::execute_step;
    use serde_json::json;

    fn file_entry(name: &str) -> Value {
        json!({
            "fileName": name,
            "filePath": format!("/in/{name}"),
            "fileSize": 42,
            "lastModified": "2026-02-01T10:00:00Z",
            "content": "cGF5bG9hZA==",
        })
    }

    #[tokio::test]
    async fn reports_paths_and_available_files() {
        let cmd = ParallelSplitStepCommand;
        let mut step = FlowExecutionStep::new("s1", "split", "parallel-split");
        let mut ctx = ExecutionContext::new();
        ctx.set(
            KEY_FILES_TO_PROCESS,
            Value::Array((0..5).map(|i| file_entry(&format!("f{i}.csv"))).collect()),
        );

        let node = json!({"type": "parallel-split", "data": {"parallelPaths": 3}});
        let result = execute_step(&cmd, &mut step, &node, &mut ctx).await.unwrap();

        assert_eq!(result["parallelPaths"], json!(3));
        assert_eq!(result["filesAvailableForSplit"], json!(5));

        let snapshot = result["contextSnapshot"].as_object().unwrap();
        let entries = snapshot[KEY_FILES_TO_PROCESS].as_array().unwrap();
        assert_eq!(entries.len(), 5);
        for entry in entries {
            let obj = entry.as_object().unwrap();
            let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
            keys.sort_unstable();
            assert_eq!(keys, ["fileName", "filePath", "fileSize", "lastModified"]);
        }
    }

    #[tokio::test]
    async fn snapshot_after_start_step_carries_no_payload_bytes() {
        use crate::steps::start::StartStepCommand;

        let mut step = FlowExecutionStep::new("s0", "start", "start");
        let mut ctx = ExecutionContext::new();
        ctx.set(
            crate::context::KEY_TRIGGER_DATA,
            json!({"foundFiles": [file_entry("a.csv")]}),
        );
        execute_step(&StartStepCommand, &mut step, &json!({"type": "start"}), &mut ctx)
            .await
            .unwrap();

        let mut split = FlowExecutionStep::new("s1", "split", "parallel-split");
        let result = execute_step(
            &ParallelSplitStepCommand,
            &mut split,
            &json!({"type": "parallel-split"}),
            &mut ctx,
        )
        .await
        .unwrap();

        let snapshot = serde_json::to_string(&result["contextSnapshot"]).unwrap();
        assert!(!snapshot.contains("cGF5bG9hZA=="));
        assert!(!snapshot.contains("\"content\""));
    }

    #[tokio::test]
    async fn parallel_paths_defaults_to_two() {
        let cmd = ParallelSplitStepCommand;
        let mut step = FlowExecutionStep::new("s1", "split", "parallel-split");
        let mut ctx = ExecutionContext::new();

        let result = execute_step(&cmd, &mut step, &json!({"type": "parallel_split"}), &mut ctx)
            .await
            .unwrap();
        assert_eq!(result["parallelPaths"], json!(2));
        assert_eq!(result["filesAvailableForSplit"], json!(0));
    }
}
