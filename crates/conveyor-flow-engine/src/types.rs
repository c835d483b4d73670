//! Foundational types for the step execution model.
//!
//! Every type here is `Serialize + Deserialize + Debug + Clone`. Owned map
//! fields use `BTreeMap` (never `HashMap`) to guarantee deterministic
//! serialization. Result mappings handed back to the orchestrator keep the
//! wire-level camelCase keys and are plain `serde_json` maps.
//!
//! All enums use `#[non_exhaustive]` so adding variants is never a
//! breaking change for downstream consumers.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A step or command result mapping, persisted verbatim by the orchestrator.
pub type ResultMap = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Adapter descriptor
// ---------------------------------------------------------------------------

/// Protocol family an adapter speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum AdapterType {
    File,
    Sftp,
    Email,
}

impl AdapterType {
    /// Canonical upper-case label, used for factory cache keys.
    pub fn label(&self) -> &'static str {
        match self {
            Self::File => "FILE",
            Self::Sftp => "SFTP",
            Self::Email => "EMAIL",
        }
    }

    /// Case-insensitive parse of the wire label.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FILE" => Some(Self::File),
            "SFTP" => Some(Self::Sftp),
            "EMAIL" => Some(Self::Email),
            _ => None,
        }
    }
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Data direction of an adapter.
///
/// A SENDER pulls data into the flow; a RECEIVER pushes data out. The email
/// "receiver" therefore delivers outbound mail — collecting an inbox is not
/// a supported operation anywhere in the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[non_exhaustive]
pub enum AdapterDirection {
    Sender,
    Receiver,
}

impl AdapterDirection {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sender => "SENDER",
            Self::Receiver => "RECEIVER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SENDER" => Some(Self::Sender),
            "RECEIVER" => Some(Self::Receiver),
            _ => None,
        }
    }
}

impl fmt::Display for AdapterDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A configured protocol endpoint, loaded by the orchestrator and read-only
/// to the core. Immutable for the duration of one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Adapter {
    pub id: String,
    pub name: String,
    pub adapter_type: AdapterType,
    pub direction: AdapterDirection,
    #[serde(default = "default_true")]
    pub active: bool,
    /// String-keyed configuration: hosts, credentials, paths, templates.
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
}

fn default_true() -> bool {
    true
}

impl Adapter {
    /// String config field, `None` when absent or not a string.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    pub fn config_u64(&self, key: &str, default: u64) -> u64 {
        self.config.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    pub fn config_bool(&self, key: &str, default: bool) -> bool {
        self.config.get(key).and_then(Value::as_bool).unwrap_or(default)
    }
}

// ---------------------------------------------------------------------------
// Flow execution step
// ---------------------------------------------------------------------------

/// Lifecycle status of a step record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// One file handled during a step, recorded for monitoring. Carries metadata
/// only — never content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessedFile {
    pub file_name: String,
    pub category: String,
    pub size_bytes: u64,
}

/// Runtime record of one node execution: identity plus running totals of
/// files processed. The file list is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FlowExecutionStep {
    pub id: String,
    pub step_name: String,
    pub step_type: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub processed_files: Vec<ProcessedFile>,
}

impl FlowExecutionStep {
    pub fn new(
        id: impl Into<String>,
        step_name: impl Into<String>,
        step_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            step_name: step_name.into(),
            step_type: step_type.into(),
            status: StepStatus::Pending,
            processed_files: Vec::new(),
        }
    }

    /// Append a processed-file record. There is no removal API.
    pub fn record_file(
        &mut self,
        file_name: impl Into<String>,
        category: impl Into<String>,
        size_bytes: u64,
    ) {
        self.processed_files.push(ProcessedFile {
            file_name: file_name.into(),
            category: category.into(),
            size_bytes,
        });
    }

    pub fn files_processed(&self) -> usize {
        self.processed_files.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.processed_files.iter().map(|f| f.size_bytes).sum()
    }
}

// ---------------------------------------------------------------------------
// Command result
// ---------------------------------------------------------------------------

/// Outcome of a single protocol or data command.
///
/// This is a success/failure union built only through the constructors:
/// a result either succeeds (optionally with non-fatal warnings) or fails
/// with a message and optional cause. It never carries both a success flag
/// and an error message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CommandResult {
    pub command: String,
    pub success: bool,
    #[serde(default)]
    pub data: ResultMap,
    /// Ordered, non-fatal warnings accumulated during execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl CommandResult {
    pub fn ok(command: impl Into<String>, data: ResultMap) -> Self {
        Self {
            command: command.into(),
            success: true,
            data,
            warnings: Vec::new(),
            error: None,
            cause: None,
            elapsed_ms: 0,
        }
    }

    pub fn ok_with_warnings(
        command: impl Into<String>,
        data: ResultMap,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            warnings,
            ..Self::ok(command, data)
        }
    }

    pub fn fail(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            success: false,
            data: ResultMap::new(),
            warnings: Vec::new(),
            error: Some(message.into()),
            cause: None,
            elapsed_ms: 0,
        }
    }

    pub fn fail_with_cause(
        command: impl Into<String>,
        message: impl Into<String>,
        cause: impl fmt::Display,
    ) -> Self {
        Self {
            cause: Some(cause.to_string()),
            ..Self::fail(command, message)
        }
    }

    /// Stamp the elapsed duration measured from `started`.
    pub fn with_elapsed(mut self, started: Instant) -> Self {
        self.elapsed_ms = started.elapsed().as_millis() as u64;
        self
    }

    /// Record a non-fatal warning. Only meaningful on a success result.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
