//! Local-filesystem adapter executors.
//!
//! The sender pulls matching files from a source directory into the
//! context file lists; the receiver delivers queued context files into a
//! target directory and strips their content from the context afterwards,
//! so delivered payloads do not linger in run state.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use conveyor_flow_engine::{
    Adapter, AdapterDirection, AdapterType, ExecutionContext, FlowExecutionStep, ResultMap,
    KEY_FILES_TO_PROCESS, KEY_SENDER_FILES,
};

use crate::errors::ExecError;
use crate::executor::{entry_bytes, entry_file_name, file_entry, AdapterExecutor};

/// Wildcard-lite file name match: `*` matches any run of characters,
/// everything else is literal. An empty or absent pattern matches all.
pub(crate) fn matches_pattern(name: &str, pattern: &str) -> bool {
    if pattern.is_empty() || pattern == "*" {
        return true;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = name;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(idx) => rest = &rest[idx + part.len()..],
                None => return false,
            }
        }
    }
    // A pattern not ending in `*` must have consumed the whole name.
    parts.last().map(|p| p.is_empty()).unwrap_or(true) || rest.is_empty()
}

fn modified_rfc3339(metadata: &fs::Metadata) -> String {
    metadata
        .modified()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Loads files matching `filePattern` from `sourceDirectory` into the
/// `filesToProcess` and `senderFiles` context lists.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSenderExecutor;

#[async_trait]
impl AdapterExecutor for FileSenderExecutor {
    fn protocol(&self) -> AdapterType {
        AdapterType::File
    }

    fn direction(&self) -> AdapterDirection {
        AdapterDirection::Sender
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["sourceDirectory"]
    }

    async fn execute(
        &self,
        adapter: &Adapter,
        ctx: &mut ExecutionContext,
        step: &mut FlowExecutionStep,
    ) -> Result<ResultMap, ExecError> {
        let source_dir = adapter.config_str("sourceDirectory").unwrap_or_default();
        let pattern = adapter.config_str("filePattern").unwrap_or("");
        tracing::debug!(adapter = %adapter.id, source_dir, pattern, "file sender");

        let mut entries = Vec::new();
        let mut total_bytes = 0u64;
        let mut names: Vec<(String, fs::DirEntry)> = Vec::new();
        for dir_entry in fs::read_dir(source_dir)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            names.push((name, dir_entry));
        }
        // Deterministic pickup order.
        names.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, dir_entry) in names {
            let metadata = dir_entry.metadata()?;
            if !metadata.is_file() || !matches_pattern(&name, pattern) {
                continue;
            }
            let path = dir_entry.path();
            let bytes = fs::read(&path)?;
            total_bytes += bytes.len() as u64;
            step.record_file(&name, "file", bytes.len() as u64);
            entries.push(file_entry(
                &name,
                &path.to_string_lossy(),
                &bytes,
                modified_rfc3339(&metadata),
            ));
        }

        let mut result = ResultMap::new();
        result.insert("success".into(), json!(true));
        result.insert("sourceDirectory".into(), json!(source_dir));
        result.insert("filesProcessed".into(), json!(entries.len()));
        result.insert("totalBytes".into(), json!(total_bytes));
        if entries.is_empty() {
            result.insert("message".into(), json!("no matching files, nothing to do"));
        }
        ctx.set(KEY_FILES_TO_PROCESS, Value::Array(entries.clone()));
        ctx.set(KEY_SENDER_FILES, Value::Array(entries));
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Writes queued `filesToProcess` entries into `targetDirectory`. After a
/// successful write the entry's `content` field is removed from the
/// context; metadata stays for monitoring.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileReceiverExecutor;

#[async_trait]
impl AdapterExecutor for FileReceiverExecutor {
    fn protocol(&self) -> AdapterType {
        AdapterType::File
    }

    fn direction(&self) -> AdapterDirection {
        AdapterDirection::Receiver
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["targetDirectory"]
    }

    async fn execute(
        &self,
        adapter: &Adapter,
        ctx: &mut ExecutionContext,
        step: &mut FlowExecutionStep,
    ) -> Result<ResultMap, ExecError> {
        let target_dir = adapter.config_str("targetDirectory").unwrap_or_default();
        let overwrite = adapter.config_bool("overwriteExisting", false);
        tracing::debug!(adapter = %adapter.id, target_dir, "file receiver");

        let queued: Vec<Value> = ctx
            .file_list(KEY_FILES_TO_PROCESS)
            .cloned()
            .unwrap_or_default();

        let mut result = ResultMap::new();
        result.insert("targetDirectory".into(), json!(target_dir));
        if queued.is_empty() {
            result.insert("success".into(), json!(true));
            result.insert("filesProcessed".into(), json!(0));
            result.insert("totalBytes".into(), json!(0));
            result.insert("message".into(), json!("no files queued, nothing to do"));
            return Ok(result);
        }

        fs::create_dir_all(target_dir)?;
        let mut delivered = Vec::with_capacity(queued.len());
        let mut errors: Vec<String> = Vec::new();
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
            let bytes = match entry_bytes(&entry) {
                Some(bytes) => bytes,
                None => {
                    errors.push(format!("{name}: no decodable content"));
                    delivered.push(entry);
                    continue;
                }
            };
            let target = Path::new(target_dir).join(&name);
            if target.exists() && !overwrite {
                errors.push(format!("target already exists: {}", target.display()));
                delivered.push(entry);
                continue;
            }
            if let Err(e) = fs::write(&target, &bytes) {
                errors.push(format!("{name}: {e}"));
                delivered.push(entry);
                continue;
            }
            total_bytes += bytes.len() as u64;
            step.record_file(&name, "file", bytes.len() as u64);
            if let Some(obj) = entry.as_object_mut() {
                obj.remove("content");
                obj.insert("deliveredTo".into(), json!(target.to_string_lossy()));
            }
            delivered.push(entry);
        }

        let files_processed = step.files_processed();
        ctx.set(KEY_FILES_TO_PROCESS, Value::Array(delivered));
        result.insert("success".into(), json!(errors.is_empty()));
        result.insert("filesProcessed".into(), json!(files_processed));
        result.insert("totalBytes".into(), json!(total_bytes));
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
