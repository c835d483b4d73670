//! The adapter executor trait and shared file-entry helpers.
//!
//! One executor per protocol+direction pair. Executors are stateless and
//! `Arc`-shared by the factory; per-call state (connections, buffers)
//! lives on the stack of `execute`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

use conveyor_flow_engine::{Adapter, AdapterDirection, AdapterType, ExecutionContext,
    FlowExecutionStep, ResultMap};

use crate::errors::ExecError;

/// One protocol+direction strategy.
///
/// `validate_config` runs before `execute` and must not perform I/O; the
/// default checks that every [`required_fields`](Self::required_fields)
/// key is present and non-empty (a non-empty string, or a non-empty
/// array for list-shaped fields such as recipients).
#[async_trait]
pub trait AdapterExecutor: Send + Sync {
    fn protocol(&self) -> AdapterType;

    fn direction(&self) -> AdapterDirection;

    /// Config keys this executor requires.
    fn required_fields(&self) -> &'static [&'static str];

    fn validate_config(&self, adapter: &Adapter) -> Result<(), ExecError> {
        for field in self.required_fields() {
            let present = match adapter.config.get(*field) {
                Some(Value::String(s)) => !s.trim().is_empty(),
                Some(Value::Array(items)) => !items.is_empty(),
                Some(Value::Null) | None => false,
                Some(_) => true,
            };
            if !present {
                return Err(ExecError::MissingConfig {
                    field: (*field).to_string(),
                });
            }
        }
        Ok(())
    }

    /// Run the protocol operation(s) for this direction. A sender pulls
    /// data into the context; a receiver pushes queued context files out.
    async fn execute(
        &self,
        adapter: &Adapter,
        ctx: &mut ExecutionContext,
        step: &mut FlowExecutionStep,
    ) -> Result<ResultMap, ExecError>;
}

// ---------------------------------------------------------------------------
// File-entry helpers
// ---------------------------------------------------------------------------

/// Decoded byte content of a context file entry (`content` field,
/// base64-encoded on the wire).
pub fn entry_bytes(entry: &Value) -> Option<Vec<u8>> {
    entry
        .get("content")
        .and_then(Value::as_str)
        .and_then(|encoded| BASE64.decode(encoded).ok())
}

pub fn entry_file_name(entry: &Value) -> Option<&str> {
    entry.get("fileName").and_then(Value::as_str)
}

/// Build a context file entry with metadata plus base64 content.
pub fn file_entry(name: &str, path: &str, bytes: &[u8], last_modified: String) -> Value {
    serde_json::json!({
        "fileName": name,
        "filePath": path,
        "fileSize": bytes.len(),
        "lastModified": last_modified,
        "content": BASE64.encode(bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_round_trip_preserves_bytes() {
        let entry = file_entry("a.txt", "/in/a.txt", b"payload", "2026-01-01T00:00:00Z".into());
        assert_eq!(entry_file_name(&entry), Some("a.txt"));
        assert_eq!(entry["fileSize"], json!(7));
        assert_eq!(entry_bytes(&entry).unwrap(), b"payload");
    }

    #[test]
    fn entry_bytes_rejects_invalid_base64() {
        assert!(entry_bytes(&json!({ "content": "%%%" })).is_none());
        assert!(entry_bytes(&json!({})).is_none());
    }
}
