//! Upload and download commands, singular and batch.
//!
//! Upload ordering is fixed: validate, existence/overwrite check, parent
//! creation, streamed write, optional verify. A verify mismatch is a
//! warning on a success (the transfer already completed); every I/O fault
//! is a failure with cause and elapsed time, with no partial success.

use std::fs;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};

use conveyor_flow_engine::{CommandResult, ResultMap};

use crate::errors::CommandError;
use crate::sftp::commands::{fail_channel, param_bool, param_str, require_param, SftpCommand};
use crate::sftp::{remote_parent, MkdirCommand, SftpChannel, SftpOperation};

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// Upload one file from in-memory content (`content`, base64) or a local
/// path (`localPath`). Flags: `overwriteExisting`, `createDirectories`,
/// `verifyUpload`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UploadCommand;

enum UploadSource {
    Content(Vec<u8>),
    Local(String),
}

impl UploadCommand {
    fn source(params: &Value) -> Result<UploadSource, String> {
        if let Some(encoded) = param_str(params, "content") {
            return BASE64
                .decode(encoded)
                .map(UploadSource::Content)
                .map_err(|e| format!("'content' is not valid base64: {e}"));
        }
        match param_str(params, "localPath") {
            Some(path) => Ok(UploadSource::Local(path.to_string())),
            None => Err("either 'content' or 'localPath' is required".to_string()),
        }
    }
}

impl SftpCommand for UploadCommand {
    fn name(&self) -> &'static str {
        "sftp.upload"
    }

    fn description(&self) -> &'static str {
        "Upload a file to a remote path"
    }

    fn operation(&self) -> SftpOperation {
        SftpOperation::Upload
    }

    fn mutates_remote(&self) -> bool {
        true
    }

    fn validate_params(&self, params: &Value) -> Result<(), CommandError> {
        require_param(self.name(), params, "remotePath")?;
        Self::source(params)
            .map(|_| ())
            .map_err(|message| CommandError::InvalidParams {
                command: self.name().to_string(),
                message,
            })
    }

    fn execute(&self, channel: &mut dyn SftpChannel, params: &Value) -> CommandResult {
        let started = Instant::now();
        let remote_path = match param_str(params, "remotePath") {
            Some(path) => path,
            None => return CommandResult::fail(self.name(), "'remotePath' is required"),
        };
        let overwrite = param_bool(params, "overwriteExisting", false);
        let create_dirs = param_bool(params, "createDirectories", false);
        let verify = param_bool(params, "verifyUpload", false);

        let content = match Self::source(params) {
            Ok(UploadSource::Content(bytes)) => bytes,
            Ok(UploadSource::Local(path)) => match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    return CommandResult::fail_with_cause(
                        self.name(),
                        format!("cannot read local source {path}"),
                        e,
                    )
                    .with_elapsed(started)
                }
            },
            Err(message) => return CommandResult::fail(self.name(), message),
        };

        let mut warnings = Vec::new();
        match channel.stat(remote_path) {
            Ok(Some(stat)) if stat.is_dir => {
                return CommandResult::fail(
                    self.name(),
                    format!("remote path is a directory: {remote_path}"),
                )
                .with_elapsed(started)
            }
            Ok(Some(_)) if !overwrite => {
                return CommandResult::fail(
                    self.name(),
                    format!("remote path already exists: {remote_path}"),
                )
                .with_elapsed(started)
            }
            Ok(Some(_)) => warnings.push(format!("overwrote existing remote file {remote_path}")),
            Ok(None) => {}
            Err(e) => {
                return fail_channel(self.name(), format!("cannot stat {remote_path}"), e, started)
            }
        }

        if create_dirs {
            if let Some(parent) = remote_parent(remote_path) {
                if parent != "/" {
                    if let Err(e) = MkdirCommand::ensure_dir(channel, parent, true) {
                        return fail_channel(
                            self.name(),
                            format!("cannot create remote directory {parent}"),
                            e,
                            started,
                        );
                    }
                }
            }
        }

        tracing::debug!(remote_path, bytes = content.len(), "sftp upload");
        let transferred = match channel.write(remote_path, &content) {
            Ok(n) => n,
            Err(e) => {
                return fail_channel(self.name(), format!("upload of {remote_path} failed"), e, started)
            }
        };

        if verify {
            match channel.stat(remote_path) {
                Ok(Some(stat)) if stat.size != content.len() as u64 => {
                    warnings.push(format!(
                        "size mismatch after upload: sent {} bytes, remote reports {}",
                        content.len(),
                        stat.size
                    ));
                }
                Ok(Some(_)) => {}
                Ok(None) => warnings.push(format!(
                    "verification could not find {remote_path} after upload"
                )),
                Err(e) => {
                    return fail_channel(
                        self.name(),
                        format!("cannot verify {remote_path}"),
                        e,
                        started,
                    )
                }
            }
        }

        let file_name = remote_path.rsplit('/').next().unwrap_or(remote_path);
        let mut data = ResultMap::new();
        data.insert("remotePath".into(), json!(remote_path));
        data.insert("fileName".into(), json!(file_name));
        data.insert("bytesTransferred".into(), json!(transferred));
        CommandResult::ok_with_warnings(self.name(), data, warnings).with_elapsed(started)
    }
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// Download one remote file, either to `localPath` or inline as base64
/// `content` in the result data.
#[derive(Debug, Default, Clone, Copy)]
pub struct DownloadCommand;

impl SftpCommand for DownloadCommand {
    fn name(&self) -> &'static str {
        "sftp.download"
    }

    fn description(&self) -> &'static str {
        "Download a remote file"
    }

    fn operation(&self) -> SftpOperation {
        SftpOperation::Download
    }

    fn mutates_remote(&self) -> bool {
        false
    }

    fn validate_params(&self, params: &Value) -> Result<(), CommandError> {
        require_param(self.name(), params, "remotePath")
    }

    fn execute(&self, channel: &mut dyn SftpChannel, params: &Value) -> CommandResult {
        let started = Instant::now();
        let remote_path = match param_str(params, "remotePath") {
            Some(path) => path,
            None => return CommandResult::fail(self.name(), "'remotePath' is required"),
        };
        tracing::debug!(remote_path, "sftp download");
        let content = match channel.read(remote_path) {
            Ok(content) => content,
            Err(e) => {
                return fail_channel(
                    self.name(),
                    format!("download of {remote_path} failed"),
                    e,
                    started,
                )
            }
        };

        let file_name = remote_path.rsplit('/').next().unwrap_or(remote_path);
        let mut data = ResultMap::new();
        data.insert("remotePath".into(), json!(remote_path));
        data.insert("fileName".into(), json!(file_name));
        data.insert("fileSize".into(), json!(content.len()));
        match param_str(params, "localPath") {
            Some(local) => {
                if let Err(e) = fs::write(local, &content) {
                    return CommandResult::fail_with_cause(
                        self.name(),
                        format!("cannot write local target {local}"),
                        e,
                    )
                    .with_elapsed(started);
                }
                data.insert("localPath".into(), json!(local));
            }
            None => {
                data.insert("content".into(), json!(BASE64.encode(&content)));
            }
        }
        CommandResult::ok(self.name(), data).with_elapsed(started)
    }
}

// ---------------------------------------------------------------------------
// Batch composites
// ---------------------------------------------------------------------------

fn validate_batch(
    command: &'static str,
    singular: &dyn SftpCommand,
    params: &Value,
) -> Result<(), CommandError> {
    let files = params
        .get("files")
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
        .ok_or_else(|| CommandError::InvalidParams {
            command: command.to_string(),
            message: "'files' must be a non-empty array".to_string(),
        })?;
    for entry in files {
        singular.validate_params(entry)?;
    }
    Ok(())
}

/// Run a singular command over every entry of `files`, accumulating
/// per-file outcomes. A failed entry is recorded, never an abort; the
/// batch itself fails only in the sense that zero-error batches succeed.
fn run_batch(
    command: &'static str,
    singular: &dyn SftpCommand,
    channel: &mut dyn SftpChannel,
    params: &Value,
) -> CommandResult {
    let started = Instant::now();
    let files = match params.get("files").and_then(Value::as_array) {
        Some(files) if !files.is_empty() => files,
        _ => return CommandResult::fail(command, "'files' must be a non-empty array"),
    };

    let mut outcomes = Vec::new();
    let mut warnings = Vec::new();
    let mut failed = 0usize;
    for entry in files {
        let result = singular.execute(channel, entry);
        let path = entry
            .get("remotePath")
            .and_then(Value::as_str)
            .unwrap_or("?");
        for warning in &result.warnings {
            warnings.push(format!("{path}: {warning}"));
        }
        if !result.success {
            failed += 1;
        }
        outcomes.push(json!({
            "remotePath": path,
            "success": result.success,
            "error": result.error,
        }));
    }

    let mut data = ResultMap::new();
    data.insert("filesRequested".into(), json!(files.len()));
    data.insert("filesSucceeded".into(), json!(files.len() - failed));
    data.insert("filesFailed".into(), json!(failed));
    data.insert("results".into(), Value::Array(outcomes));
    if failed == 0 {
        CommandResult::ok_with_warnings(command, data, warnings).with_elapsed(started)
    } else {
        let mut result = CommandResult::fail(
            command,
            format!("{failed} of {} transfers failed", files.len()),
        );
        result.data = data;
        result.with_elapsed(started)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BatchUploadCommand;

impl SftpCommand for BatchUploadCommand {
    fn name(&self) -> &'static str {
        "sftp.batch_upload"
    }

    fn description(&self) -> &'static str {
        "Upload a set of files, accumulating per-file outcomes"
    }

    fn operation(&self) -> SftpOperation {
        SftpOperation::BatchUpload
    }

    fn mutates_remote(&self) -> bool {
        true
    }

    fn validate_params(&self, params: &Value) -> Result<(), CommandError> {
        validate_batch(self.name(), &UploadCommand, params)
    }

    fn execute(&self, channel: &mut dyn SftpChannel, params: &Value) -> CommandResult {
        run_batch(self.name(), &UploadCommand, channel, params)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BatchDownloadCommand;

impl SftpCommand for BatchDownloadCommand {
    fn name(&self) -> &'static str {
        "sftp.batch_download"
    }

    fn description(&self) -> &'static str {
        "Download a set of files, accumulating per-file outcomes"
    }

    fn operation(&self) -> SftpOperation {
        SftpOperation::BatchDownload
    }

    fn mutates_remote(&self) -> bool {
        false
    }

    fn validate_params(&self, params: &Value) -> Result<(), CommandError> {
        validate_batch(self.name(), &DownloadCommand, params)
    }

    fn execute(&self, channel: &mut dyn SftpChannel, params: &Value) -> CommandResult {
        run_batch(self.name(), &DownloadCommand, channel, params)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::memfs::InMemorySftp;

    fn encoded(bytes: &[u8]) -> String {
        BASE64.encode(bytes)
    }

    #[test]
    fn upload_then_verify_round_trip_succeeds_without_warnings() {
        let fs = InMemorySftp::new();
        fs.seed_dir("/out");
        let mut channel = fs.channel();

        let result = UploadCommand.execute(
            &mut channel,
            &json!({
                "remotePath": "/out/a.txt",
                "content": encoded(b"payload"),
                "verifyUpload": true,
            }),
        );
        assert!(result.success);
        assert!(result.warnings.is_empty());
        assert_eq!(result.data["bytesTransferred"], json!(7));
        assert_eq!(fs.file_content("/out/a.txt").unwrap(), b"payload");
    }

    #[test]
    fn truncated_remote_report_is_exactly_one_size_mismatch_warning() {
        let fs = InMemorySftp::new();
        fs.seed_dir("/out");
        fs.force_reported_size("/out/a.txt", 3);
        let mut channel = fs.channel();

        let result = UploadCommand.execute(
            &mut channel,
            &json!({
                "remotePath": "/out/a.txt",
                "content": encoded(b"payload"),
                "verifyUpload": true,
            }),
        );
        assert!(result.success);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("size mismatch"));
    }

    #[test]
    fn existing_remote_path_without_overwrite_fails_naming_the_path() {
        let fs = InMemorySftp::new();
        fs.seed_file("/out/a.txt", b"old");
        let mut channel = fs.channel();

        let result = UploadCommand.execute(
            &mut channel,
            &json!({ "remotePath": "/out/a.txt", "content": encoded(b"new") }),
        );
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("/out/a.txt"));
        // The old content is untouched.
        assert_eq!(fs.file_content("/out/a.txt").unwrap(), b"old");
    }

    #[test]
    fn overwrite_proceeds_with_a_recorded_warning() {
        let fs = InMemorySftp::new();
        fs.seed_file("/out/a.txt", b"old");
        let mut channel = fs.channel();

        let result = UploadCommand.execute(
            &mut channel,
            &json!({
                "remotePath": "/out/a.txt",
                "content": encoded(b"new"),
                "overwriteExisting": true,
            }),
        );
        assert!(result.success);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("overwrote"));
        assert_eq!(fs.file_content("/out/a.txt").unwrap(), b"new");
    }

    #[test]
    fn create_directories_builds_missing_parents() {
        let fs = InMemorySftp::new();
        let mut channel = fs.channel();

        let result = UploadCommand.execute(
            &mut channel,
            &json!({
                "remotePath": "/out/deep/a.txt",
                "content": encoded(b"x"),
                "createDirectories": true,
            }),
        );
        assert!(result.success);
        assert_eq!(fs.file_content("/out/deep/a.txt").unwrap(), b"x");
    }

    #[test]
    fn upload_without_parents_fails_with_cause_and_no_partial_state() {
        let fs = InMemorySftp::new();
        let mut channel = fs.channel();

        let result = UploadCommand.execute(
            &mut channel,
            &json!({ "remotePath": "/out/a.txt", "content": encoded(b"x") }),
        );
        assert!(!result.success);
        assert!(result.cause.is_some());
        assert!(fs.file_content("/out/a.txt").is_none());
    }

    #[test]
    fn upload_reads_local_source_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("src.bin");
        std::fs::write(&local, b"local bytes").expect("write local");
        let fs = InMemorySftp::new();
        fs.seed_dir("/out");
        let mut channel = fs.channel();

        let result = UploadCommand.execute(
            &mut channel,
            &json!({ "remotePath": "/out/src.bin", "localPath": local.to_str().unwrap() }),
        );
        assert!(result.success);
        assert_eq!(fs.file_content("/out/src.bin").unwrap(), b"local bytes");
    }

    #[test]
    fn validate_requires_a_source() {
        let err = UploadCommand
            .validate_params(&json!({ "remotePath": "/out/a.txt" }))
            .unwrap_err();
        assert!(err.to_string().contains("content"));
    }

    #[test]
    fn download_returns_inline_base64_without_local_target() {
        let fs = InMemorySftp::new();
        fs.seed_file("/in/a.txt", b"hello");
        let mut channel = fs.channel();

        let result =
            DownloadCommand.execute(&mut channel, &json!({ "remotePath": "/in/a.txt" }));
        assert!(result.success);
        assert_eq!(result.data["fileSize"], json!(5));
        assert_eq!(result.data["content"], json!(encoded(b"hello")));
    }

    #[test]
    fn batch_upload_records_per_file_failures_without_aborting() {
        let fs = InMemorySftp::new();
        fs.seed_dir("/out");
        fs.seed_file("/out/taken.txt", b"old");
        let mut channel = fs.channel();

        let result = BatchUploadCommand.execute(
            &mut channel,
            &json!({ "files": [
                { "remotePath": "/out/a.txt", "content": encoded(b"a") },
                { "remotePath": "/out/taken.txt", "content": encoded(b"t") },
                { "remotePath": "/out/b.txt", "content": encoded(b"b") },
            ]}),
        );
        assert!(!result.success);
        assert_eq!(result.data["filesSucceeded"], json!(2));
        assert_eq!(result.data["filesFailed"], json!(1));
        // Later entries still ran after the failure.
        assert_eq!(fs.file_content("/out/b.txt").unwrap(), b"b");
        let outcomes = result.data["results"].as_array().unwrap();
        assert_eq!(outcomes[1]["success"], json!(false));
    }

    #[test]
    fn batch_validation_reuses_the_singular_contract() {
        let err = BatchUploadCommand
            .validate_params(&json!({ "files": [ { "content": encoded(b"x") } ] }))
            .unwrap_err();
        assert!(err.to_string().contains("remotePath"));
        let err = BatchDownloadCommand.validate_params(&json!({})).unwrap_err();
        assert!(err.to_string().contains("files"));
    }
}
