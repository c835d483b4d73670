//! The engine-facing runner: resolves an executor from the factory,
//! validates the adapter's config, and runs it.

use std::sync::Arc;

use async_trait::async_trait;

use conveyor_flow_engine::{
    Adapter, AdapterRunner, ExecutionContext, FlowExecutionStep, ResultMap, StepError,
};

use crate::factory::ExecutorFactory;

/// [`AdapterRunner`] implementation backed by an [`ExecutorFactory`].
pub struct DefaultAdapterRunner {
    factory: Arc<ExecutorFactory>,
}

impl DefaultAdapterRunner {
    pub fn new(factory: Arc<ExecutorFactory>) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl AdapterRunner for DefaultAdapterRunner {
    async fn execute_adapter(
        &self,
        adapter: &Adapter,
        ctx: &mut ExecutionContext,
        step: &mut FlowExecutionStep,
    ) -> Result<ResultMap, StepError> {
        let executor = self
            .factory
            .create(adapter.adapter_type, adapter.direction)
            .ok_or_else(|| StepError::Config {
                message: format!(
                    "unsupported adapter: {} {}",
                    adapter.adapter_type, adapter.direction
                ),
            })?;
        executor.validate_config(adapter)?;
        tracing::debug!(
            adapter = %adapter.id,
            protocol = %adapter.adapter_type,
            direction = %adapter.direction,
            "execute adapter"
        );
        Ok(executor.execute(adapter, ctx, step).await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{MailTransport, OutboundEmail, SmtpEndpoint};
    use crate::errors::ExecError;
    use crate::sftp::memfs::InMemorySftp;
    use conveyor_flow_engine::{
        execute_step, AdapterDirection, AdapterStepCommand, AdapterType, InMemoryAdapterLookup,
        KEY_FILES_TO_PROCESS,
    };
    use serde_json::json;
    use std::collections::BTreeMap;

    struct NullTransport;
    impl MailTransport for NullTransport {
        fn send(&self, _: &SmtpEndpoint, _: &OutboundEmail) -> Result<(), ExecError> {
            Ok(())
        }
    }

    fn runner_with_memfs(fs: InMemorySftp) -> Arc<DefaultAdapterRunner> {
        let factory = ExecutorFactory::with_backends(Arc::new(fs), Arc::new(NullTransport));
        Arc::new(DefaultAdapterRunner::new(Arc::new(factory)))
    }

    fn sftp_adapter(direction: AdapterDirection, remote_dir: &str) -> Adapter {
        Adapter {
            id: "sftp-1".into(),
            name: "edge".into(),
            adapter_type: AdapterType::Sftp,
            direction,
            active: true,
            config: [
                ("host".to_string(), json!("sftp.example.net")),
                ("username".to_string(), json!("ops")),
                ("password".to_string(), json!("pw")),
                ("remoteDirectory".to_string(), json!(remote_dir)),
            ]
            .into_iter()
            .collect::<BTreeMap<_, _>>(),
        }
    }

    #[tokio::test]
    async fn runner_rejects_unsupported_pairs_as_config_errors() {
        let runner = runner_with_memfs(InMemorySftp::new());
        let adapter = Adapter {
            id: "em-1".into(),
            name: "inbox".into(),
            adapter_type: AdapterType::Email,
            direction: AdapterDirection::Sender,
            active: true,
            config: BTreeMap::new(),
        };
        let mut ctx = ExecutionContext::new();
        let mut step = FlowExecutionStep::new("s1", "collect", "adapter");

        let err = runner
            .execute_adapter(&adapter, &mut ctx, &mut step)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Config { .. }));
        assert!(err.to_string().contains("EMAIL SENDER"));
    }

    #[tokio::test]
    async fn runner_validates_config_before_executing() {
        let fs = InMemorySftp::new();
        let runner = runner_with_memfs(fs);
        let mut adapter = sftp_adapter(AdapterDirection::Sender, "/in");
        adapter.config.remove("host");
        let mut ctx = ExecutionContext::new();
        let mut step = FlowExecutionStep::new("s1", "pull", "adapter");

        let err = runner
            .execute_adapter(&adapter, &mut ctx, &mut step)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    /// Full pipeline: adapter step command resolves the adapter through
    /// the lookup and runs it through this runner against the in-memory
    /// remote filesystem.
    #[tokio::test]
    async fn adapter_step_pipeline_pulls_remote_files_into_context() {
        let fs = InMemorySftp::new();
        fs.seed_file("/in/orders.csv", b"id\n1\n2");
        let runner = runner_with_memfs(fs);

        let lookup = InMemoryAdapterLookup::new();
        lookup.insert(sftp_adapter(AdapterDirection::Sender, "/in"));
        let command = AdapterStepCommand::new(Arc::new(lookup), runner);

        let mut ctx = ExecutionContext::new();
        let mut step = FlowExecutionStep::new("s1", "pull orders", "adapter");
        let node = json!({ "type": "adapter", "data": { "adapterId": "sftp-1" } });

        let result = execute_step(&command, &mut step, &node, &mut ctx)
            .await
            .unwrap();
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["adapterName"], json!("edge"));
        assert_eq!(result["filesProcessed"], json!(1));
        assert_eq!(step.files_processed(), 1);
        let queued = ctx.file_list(KEY_FILES_TO_PROCESS).unwrap();
        assert_eq!(queued[0]["fileName"], json!("orders.csv"));
    }
}
