//! SFTP adapter executors, built on the operation commands.
//!
//! Each `execute` call opens one channel through the connector and runs
//! every file operation serially on it; a channel is never shared between
//! concurrent executions. Per-file transfer failures are accumulated, not
//! aborted on.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use conveyor_flow_engine::{
    Adapter, AdapterDirection, AdapterType, ExecutionContext, FlowExecutionStep, ResultMap,
    KEY_FILES_TO_PROCESS, KEY_SENDER_FILES,
};

use crate::errors::ExecError;
use crate::executor::{entry_file_name, file_entry, AdapterExecutor};
use crate::file_adapter::matches_pattern;
use crate::sftp::{
    join_remote, DownloadCommand, ListCommand, SftpCommand, SftpConnector, SftpEndpoint,
    UploadCommand,
};

fn epoch_rfc3339(secs: Option<u64>) -> String {
    secs.and_then(|s| DateTime::<Utc>::from_timestamp(s as i64, 0))
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Downloads files from `remoteDirectory` into the context file lists.
pub struct SftpSenderExecutor {
    connector: Arc<dyn SftpConnector>,
}

impl SftpSenderExecutor {
    pub fn new(connector: Arc<dyn SftpConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl AdapterExecutor for SftpSenderExecutor {
    fn protocol(&self) -> AdapterType {
        AdapterType::Sftp
    }

    fn direction(&self) -> AdapterDirection {
        AdapterDirection::Sender
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["host", "username", "remoteDirectory"]
    }

    async fn execute(
        &self,
        adapter: &Adapter,
        ctx: &mut ExecutionContext,
        step: &mut FlowExecutionStep,
    ) -> Result<ResultMap, ExecError> {
        let endpoint = SftpEndpoint::from_adapter(adapter)?;
        let remote_dir = adapter.config_str("remoteDirectory").unwrap_or_default();
        let pattern = adapter.config_str("filePattern").unwrap_or("");
        tracing::debug!(adapter = %adapter.id, host = %endpoint.host, remote_dir, "sftp sender");

        let mut channel = self.connector.connect(&endpoint)?;
        let listing = ListCommand.execute(channel.as_mut(), &json!({ "remotePath": remote_dir }));
        if !listing.success {
            // The connection is already up at this point; a failed listing
            // is an operational fault, not a config contract violation.
            return Err(ExecError::Remote {
                message: listing
                    .error
                    .unwrap_or_else(|| format!("cannot list {remote_dir}")),
            });
        }

        let mut entries = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut total_bytes = 0u64;
        let listed = listing.data["entries"].as_array().cloned().unwrap_or_default();
        for remote in &listed {
            if remote["isDirectory"].as_bool().unwrap_or(false) {
                continue;
            }
            let name = remote["fileName"].as_str().unwrap_or_default().to_string();
            if !matches_pattern(&name, pattern) {
                continue;
            }
            let path = remote["filePath"].as_str().unwrap_or_default();
            let download =
                DownloadCommand.execute(channel.as_mut(), &json!({ "remotePath": path }));
            if !download.success {
                errors.push(
                    download
                        .error
                        .unwrap_or_else(|| format!("download of {path} failed")),
                );
                continue;
            }
            let size = download.data["fileSize"].as_u64().unwrap_or(0);
            total_bytes += size;
            step.record_file(&name, "sftp", size);
            let mut entry = file_entry(
                &name,
                path,
                &[],
                epoch_rfc3339(remote["lastModified"].as_u64()),
            );
            if let Some(obj) = entry.as_object_mut() {
                obj.insert("fileSize".into(), json!(size));
                obj.insert("content".into(), download.data["content"].clone());
            }
            entries.push(entry);
        }

        let mut result = ResultMap::new();
        result.insert("success".into(), json!(errors.is_empty()));
        result.insert("host".into(), json!(endpoint.host));
        result.insert("remoteDirectory".into(), json!(remote_dir));
        result.insert("filesProcessed".into(), json!(entries.len()));
        result.insert("totalBytes".into(), json!(total_bytes));
        if entries.is_empty() && errors.is_empty() {
            result.insert("message".into(), json!("no matching remote files, nothing to do"));
        }
        if !errors.is_empty() {
            result.insert("error".into(), json!(errors.join("; ")));
            result.insert("errors".into(), json!(errors));
        }
        ctx.set(KEY_FILES_TO_PROCESS, Value::Array(entries.clone()));
        ctx.set(KEY_SENDER_FILES, Value::Array(entries));
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Uploads queued `filesToProcess` entries into `remoteDirectory`,
/// passing `overwriteExisting` / `createDirectories` / `verifyUpload`
/// through to the upload command.
pub struct SftpReceiverExecutor {
    connector: Arc<dyn SftpConnector>,
}

impl SftpReceiverExecutor {
    pub fn new(connector: Arc<dyn SftpConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl AdapterExecutor for SftpReceiverExecutor {
    fn protocol(&self) -> AdapterType {
        AdapterType::Sftp
    }

    fn direction(&self) -> AdapterDirection {
        AdapterDirection::Receiver
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["host", "username", "remoteDirectory"]
    }

    async fn execute(
        &self,
        adapter: &Adapter,
        ctx: &mut ExecutionContext,
        step: &mut FlowExecutionStep,
    ) -> Result<ResultMap, ExecError> {
        let endpoint = SftpEndpoint::from_adapter(adapter)?;
        let remote_dir = adapter.config_str("remoteDirectory").unwrap_or_default();
        tracing::debug!(adapter = %adapter.id, host = %endpoint.host, remote_dir, "sftp receiver");

        let queued: Vec<Value> = ctx
            .file_list(KEY_FILES_TO_PROCESS)
            .cloned()
            .unwrap_or_default();

        let mut result = ResultMap::new();
        result.insert("host".into(), json!(endpoint.host));
        result.insert("remoteDirectory".into(), json!(remote_dir));
        if queued.is_empty() {
            result.insert("success".into(), json!(true));
            result.insert("filesProcessed".into(), json!(0));
            result.insert("totalBytes".into(), json!(0));
            result.insert("message".into(), json!("no files queued, nothing to do"));
            return Ok(result);
        }

        let mut channel = self.connector.connect(&endpoint)?;
        let mut delivered = Vec::with_capacity(queued.len());
        let mut errors: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut total_bytes = 0u64;

        for mut entry in queued {
            let name = match entry_file_name(&entry) {
                Some(name) => name.to_string(),
                None => {
                    errors.push("file entry without a fileName".to_string());
                    delivered.push(entry);
                    continue;
                }
            };
            let remote_path = join_remote(remote_dir, &name);
            let params = json!({
                "remotePath": remote_path,
                "content": entry.get("content").cloned().unwrap_or(Value::Null),
                "overwriteExisting": adapter.config_bool("overwriteExisting", false),
                "createDirectories": adapter.config_bool("createDirectories", true),
                "verifyUpload": adapter.config_bool("verifyUpload", false),
            });
            let upload = UploadCommand.execute(channel.as_mut(), &params);
            for warning in &upload.warnings {
                warnings.push(format!("{name}: {warning}"));
            }
            if upload.success {
                let bytes = upload.data["bytesTransferred"].as_u64().unwrap_or(0);
                total_bytes += bytes;
                step.record_file(&name, "sftp", bytes);
                if let Some(obj) = entry.as_object_mut() {
                    obj.remove("content");
                    obj.insert("deliveredTo".into(), json!(remote_path));
                }
            } else {
                errors.push(
                    upload
                        .error
                        .unwrap_or_else(|| format!("upload of {name} failed")),
                );
            }
            delivered.push(entry);
        }

        let files_processed = step.files_processed();
        ctx.set(KEY_FILES_TO_PROCESS, Value::Array(delivered));
        result.insert("success".into(), json!(errors.is_empty()));
        result.insert("filesProcessed".into(), json!(files_processed));
        result.insert("totalBytes".into(), json!(total_bytes));
        if !warnings.is_empty() {
            result.insert("warnings".into(), json!(warnings));
        }
        if !errors.is_empty() {
            result.insert("error".into(), json!(errors.join("; ")));
            result.insert("errors".into(), json!(errors));
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
