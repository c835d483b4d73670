//! SFTP operation commands.
//!
//! Each command is one validated, invocable remote operation. Parameter
//! validation runs before the channel is touched and is reused by the
//! batch composites in `transfer`; operational failures come back as
//! failed [`CommandResult`]s, never as panics or propagated errors.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use conveyor_flow_engine::{CommandResult, ResultMap};

use crate::errors::{ChannelError, CommandError};
use crate::sftp::{remote_parent, SftpChannel};

/// The enumerated remote operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SftpOperation {
    List,
    Download,
    Upload,
    Delete,
    Rename,
    Mkdir,
    Rmdir,
    Exists,
    GetInfo,
    BatchDownload,
    BatchUpload,
}

/// One remote operation: declared identity plus validate-then-execute.
pub trait SftpCommand: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn operation(&self) -> SftpOperation;

    /// Whether executing this command changes remote state.
    fn mutates_remote(&self) -> bool;

    /// Reject malformed parameters before any remote round trip.
    fn validate_params(&self, params: &Value) -> Result<(), CommandError>;

    fn execute(&self, channel: &mut dyn SftpChannel, params: &Value) -> CommandResult;
}

// ---------------------------------------------------------------------------
// Parameter helpers
// ---------------------------------------------------------------------------

pub(super) fn param_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub(super) fn param_bool(params: &Value, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub(super) fn require_param(
    command: &'static str,
    params: &Value,
    key: &str,
) -> Result<(), CommandError> {
    if param_str(params, key).is_none() {
        return Err(CommandError::InvalidParams {
            command: command.to_string(),
            message: format!("'{key}' must be a non-empty string"),
        });
    }
    Ok(())
}

pub(super) fn fail_channel(
    command: &str,
    message: impl Into<String>,
    err: ChannelError,
    started: Instant,
) -> CommandResult {
    CommandResult::fail_with_cause(command, message, err).with_elapsed(started)
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// Directory listing with per-entry metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListCommand;

impl SftpCommand for ListCommand {
    fn name(&self) -> &'static str {
        "sftp.list"
    }

    fn description(&self) -> &'static str {
        "List the entries of a remote directory"
    }

    fn operation(&self) -> SftpOperation {
        SftpOperation::List
    }

    fn mutates_remote(&self) -> bool {
        false
    }

    fn validate_params(&self, params: &Value) -> Result<(), CommandError> {
        require_param(self.name(), params, "remotePath")
    }

    fn execute(&self, channel: &mut dyn SftpChannel, params: &Value) -> CommandResult {
        let started = Instant::now();
        let path = match param_str(params, "remotePath") {
            Some(path) => path,
            None => return CommandResult::fail(self.name(), "'remotePath' is required"),
        };
        tracing::debug!(path, "sftp list");
        match channel.read_dir(path) {
            Ok(entries) => {
                let listed: Vec<Value> = entries
                    .iter()
                    .map(|e| {
                        json!({
                            "fileName": e.name,
                            "filePath": e.path,
                            "fileSize": e.stat.size,
                            "isDirectory": e.stat.is_dir,
                            "lastModified": e.stat.modified,
                        })
                    })
                    .collect();
                let mut data = ResultMap::new();
                data.insert("remotePath".into(), json!(path));
                data.insert("entryCount".into(), json!(listed.len()));
                data.insert("entries".into(), Value::Array(listed));
                CommandResult::ok(self.name(), data).with_elapsed(started)
            }
            Err(e) => fail_channel(self.name(), format!("cannot list {path}"), e, started),
        }
    }
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct DeleteCommand;

impl SftpCommand for DeleteCommand {
    fn name(&self) -> &'static str {
        "sftp.delete"
    }

    fn description(&self) -> &'static str {
        "Remove a remote file"
    }

    fn operation(&self) -> SftpOperation {
        SftpOperation::Delete
    }

    fn mutates_remote(&self) -> bool {
        true
    }

    fn validate_params(&self, params: &Value) -> Result<(), CommandError> {
        require_param(self.name(), params, "remotePath")
    }

    fn execute(&self, channel: &mut dyn SftpChannel, params: &Value) -> CommandResult {
        let started = Instant::now();
        let path = match param_str(params, "remotePath") {
            Some(path) => path,
            None => return CommandResult::fail(self.name(), "'remotePath' is required"),
        };
        tracing::debug!(path, "sftp delete");
        match channel.remove_file(path) {
            Ok(()) => {
                let mut data = ResultMap::new();
                data.insert("remotePath".into(), json!(path));
                data.insert("deleted".into(), json!(true));
                CommandResult::ok(self.name(), data).with_elapsed(started)
            }
            Err(e) => fail_channel(self.name(), format!("cannot delete {path}"), e, started),
        }
    }
}

// ---------------------------------------------------------------------------
// Rename
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct RenameCommand;

impl SftpCommand for RenameCommand {
    fn name(&self) -> &'static str {
        "sftp.rename"
    }

    fn description(&self) -> &'static str {
        "Rename or move a remote path"
    }

    fn operation(&self) -> SftpOperation {
        SftpOperation::Rename
    }

    fn mutates_remote(&self) -> bool {
        true
    }

    fn validate_params(&self, params: &Value) -> Result<(), CommandError> {
        require_param(self.name(), params, "fromPath")?;
        require_param(self.name(), params, "toPath")
    }

    fn execute(&self, channel: &mut dyn SftpChannel, params: &Value) -> CommandResult {
        let started = Instant::now();
        let (from, to) = match (param_str(params, "fromPath"), param_str(params, "toPath")) {
            (Some(from), Some(to)) => (from, to),
            _ => return CommandResult::fail(self.name(), "'fromPath' and 'toPath' are required"),
        };
        tracing::debug!(from, to, "sftp rename");
        match channel.rename(from, to) {
            Ok(()) => {
                let mut data = ResultMap::new();
                data.insert("fromPath".into(), json!(from));
                data.insert("toPath".into(), json!(to));
                CommandResult::ok(self.name(), data).with_elapsed(started)
            }
            Err(e) => fail_channel(
                self.name(),
                format!("cannot rename {from} to {to}"),
                e,
                started,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Mkdir
// ---------------------------------------------------------------------------

/// Creates a remote directory; with `recursive=true` every missing parent
/// is created too, re-checking existence before each segment so repeated
/// runs are idempotent.
#[derive(Debug, Default, Clone, Copy)]
pub struct MkdirCommand;

impl MkdirCommand {
    pub(super) fn ensure_dir(
        channel: &mut dyn SftpChannel,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<String>, ChannelError> {
        let mut created = Vec::new();
        if recursive {
            if let Some(parent) = remote_parent(path) {
                if parent != "/" && channel.stat(parent)?.is_none() {
                    created.extend(Self::ensure_dir(channel, parent, true)?);
                }
            }
        }
        match channel.stat(path)? {
            Some(stat) if stat.is_dir => {}
            Some(_) => {
                return Err(ChannelError::channel(format!(
                    "{path} exists and is not a directory"
                )))
            }
            None => {
                channel.mkdir(path)?;
                created.push(path.to_string());
            }
        }
        Ok(created)
    }
}

impl SftpCommand for MkdirCommand {
    fn name(&self) -> &'static str {
        "sftp.mkdir"
    }

    fn description(&self) -> &'static str {
        "Create a remote directory, optionally with missing parents"
    }

    fn operation(&self) -> SftpOperation {
        SftpOperation::Mkdir
    }

    fn mutates_remote(&self) -> bool {
        true
    }

    fn validate_params(&self, params: &Value) -> Result<(), CommandError> {
        require_param(self.name(), params, "remotePath")
    }

    fn execute(&self, channel: &mut dyn SftpChannel, params: &Value) -> CommandResult {
        let started = Instant::now();
        let path = match param_str(params, "remotePath") {
            Some(path) => path,
            None => return CommandResult::fail(self.name(), "'remotePath' is required"),
        };
        let recursive = param_bool(params, "recursive", false);
        tracing::debug!(path, recursive, "sftp mkdir");
        match Self::ensure_dir(channel, path, recursive) {
            Ok(created) => {
                let mut data = ResultMap::new();
                data.insert("remotePath".into(), json!(path));
                data.insert("created".into(), json!(created));
                CommandResult::ok(self.name(), data).with_elapsed(started)
            }
            Err(e) => fail_channel(self.name(), format!("cannot create {path}"), e, started),
        }
    }
}

// ---------------------------------------------------------------------------
// Rmdir
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct RmdirCommand;

impl SftpCommand for RmdirCommand {
    fn name(&self) -> &'static str {
        "sftp.rmdir"
    }

    fn description(&self) -> &'static str {
        "Remove an empty remote directory"
    }

    fn operation(&self) -> SftpOperation {
        SftpOperation::Rmdir
    }

    fn mutates_remote(&self) -> bool {
        true
    }

    fn validate_params(&self, params: &Value) -> Result<(), CommandError> {
        require_param(self.name(), params, "remotePath")
    }

    fn execute(&self, channel: &mut dyn SftpChannel, params: &Value) -> CommandResult {
        let started = Instant::now();
        let path = match param_str(params, "remotePath") {
            Some(path) => path,
            None => return CommandResult::fail(self.name(), "'remotePath' is required"),
        };
        tracing::debug!(path, "sftp rmdir");
        match channel.rmdir(path) {
            Ok(()) => {
                let mut data = ResultMap::new();
                data.insert("remotePath".into(), json!(path));
                data.insert("removed".into(), json!(true));
                CommandResult::ok(self.name(), data).with_elapsed(started)
            }
            Err(e) => fail_channel(self.name(), format!("cannot remove {path}"), e, started),
        }
    }
}

// ---------------------------------------------------------------------------
// Exists / GetInfo
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct ExistsCommand;

impl SftpCommand for ExistsCommand {
    fn name(&self) -> &'static str {
        "sftp.exists"
    }

    fn description(&self) -> &'static str {
        "Check whether a remote path exists"
    }

    fn operation(&self) -> SftpOperation {
        SftpOperation::Exists
    }

    fn mutates_remote(&self) -> bool {
        false
    }

    fn validate_params(&self, params: &Value) -> Result<(), CommandError> {
        require_param(self.name(), params, "remotePath")
    }

    fn execute(&self, channel: &mut dyn SftpChannel, params: &Value) -> CommandResult {
        let started = Instant::now();
        let path = match param_str(params, "remotePath") {
            Some(path) => path,
            None => return CommandResult::fail(self.name(), "'remotePath' is required"),
        };
        match channel.stat(path) {
            Ok(stat) => {
                let mut data = ResultMap::new();
                data.insert("remotePath".into(), json!(path));
                data.insert("exists".into(), json!(stat.is_some()));
                CommandResult::ok(self.name(), data).with_elapsed(started)
            }
            Err(e) => fail_channel(self.name(), format!("cannot stat {path}"), e, started),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GetInfoCommand;

impl SftpCommand for GetInfoCommand {
    fn name(&self) -> &'static str {
        "sftp.get_info"
    }

    fn description(&self) -> &'static str {
        "Fetch the metadata of a remote path"
    }

    fn operation(&self) -> SftpOperation {
        SftpOperation::GetInfo
    }

    fn mutates_remote(&self) -> bool {
        false
    }

    fn validate_params(&self, params: &Value) -> Result<(), CommandError> {
        require_param(self.name(), params, "remotePath")
    }

    fn execute(&self, channel: &mut dyn SftpChannel, params: &Value) -> CommandResult {
        let started = Instant::now();
        let path = match param_str(params, "remotePath") {
            Some(path) => path,
            None => return CommandResult::fail(self.name(), "'remotePath' is required"),
        };
        match channel.stat(path) {
            Ok(Some(stat)) => {
                let mut data = ResultMap::new();
                data.insert("remotePath".into(), json!(path));
                data.insert("fileSize".into(), json!(stat.size));
                data.insert("isDirectory".into(), json!(stat.is_dir));
                data.insert("lastModified".into(), json!(stat.modified));
                CommandResult::ok(self.name(), data).with_elapsed(started)
            }
            Ok(None) => CommandResult::fail(self.name(), format!("not found: {path}"))
                .with_elapsed(started),
            Err(e) => fail_channel(self.name(), format!("cannot stat {path}"), e, started),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::memfs::InMemorySftp;

    #[test]
    fn validate_rejects_missing_remote_path_before_any_channel_use() {
        let err = ListCommand.validate_params(&json!({})).unwrap_err();
        assert!(err.to_string().contains("remotePath"));
        let err = RenameCommand
            .validate_params(&json!({ "fromPath": "/a" }))
            .unwrap_err();
        assert!(err.to_string().contains("toPath"));
    }

    #[test]
    fn list_reports_entry_metadata() {
        let fs = InMemorySftp::new();
        fs.seed_file("/in/a.txt", b"aaaa");
        fs.seed_file("/in/b.txt", b"bb");
        let mut channel = fs.channel();

        let result = ListCommand.execute(&mut channel, &json!({ "remotePath": "/in" }));
        assert!(result.success);
        assert_eq!(result.data["entryCount"], json!(2));
        let entries = result.data["entries"].as_array().unwrap();
        assert_eq!(entries[0]["fileName"], json!("a.txt"));
        assert_eq!(entries[0]["fileSize"], json!(4));
    }

    #[test]
    fn delete_of_missing_path_is_a_failure_with_cause() {
        let fs = InMemorySftp::new();
        let mut channel = fs.channel();

        let result = DeleteCommand.execute(&mut channel, &json!({ "remotePath": "/ghost" }));
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("/ghost"));
        assert!(result.cause.is_some());
    }

    #[test]
    fn mkdir_recursive_is_idempotent() {
        let fs = InMemorySftp::new();
        let mut channel = fs.channel();
        let params = json!({ "remotePath": "/out/deep/nested", "recursive": true });

        let first = MkdirCommand.execute(&mut channel, &params);
        assert!(first.success);
        assert_eq!(
            first.data["created"],
            json!(["/out", "/out/deep", "/out/deep/nested"])
        );

        let second = MkdirCommand.execute(&mut channel, &params);
        assert!(second.success);
        assert_eq!(second.data["created"], json!([]));
    }

    #[test]
    fn exists_distinguishes_presence_without_failing() {
        let fs = InMemorySftp::new();
        fs.seed_file("/in/a.txt", b"x");
        let mut channel = fs.channel();

        let hit = ExistsCommand.execute(&mut channel, &json!({ "remotePath": "/in/a.txt" }));
        assert_eq!(hit.data["exists"], json!(true));
        let miss = ExistsCommand.execute(&mut channel, &json!({ "remotePath": "/nope" }));
        assert!(miss.success);
        assert_eq!(miss.data["exists"], json!(false));
    }

    #[test]
    fn rename_moves_the_entry() {
        let fs = InMemorySftp::new();
        fs.seed_file("/in/a.txt", b"x");
        let mut channel = fs.channel();

        let result = RenameCommand.execute(
            &mut channel,
            &json!({ "fromPath": "/in/a.txt", "toPath": "/in/b.txt" }),
        );
        assert!(result.success);
        assert!(channel.stat("/in/a.txt").unwrap().is_none());
        assert!(channel.stat("/in/b.txt").unwrap().is_some());
    }

    #[test]
    fn get_info_reports_size_and_kind() {
        let fs = InMemorySftp::new();
        fs.seed_file("/in/a.txt", b"abcde");
        let mut channel = fs.channel();

        let result = GetInfoCommand.execute(&mut channel, &json!({ "remotePath": "/in/a.txt" }));
        assert!(result.success);
        assert_eq!(result.data["fileSize"], json!(5));
        assert_eq!(result.data["isDirectory"], json!(false));
    }

    #[test]
    fn command_identity_is_declared() {
        assert!(DeleteCommand.mutates_remote());
        assert!(!ListCommand.mutates_remote());
        assert_eq!(MkdirCommand.operation(), SftpOperation::Mkdir);
        assert!(!GetInfoCommand.description().is_empty());
    }
}
