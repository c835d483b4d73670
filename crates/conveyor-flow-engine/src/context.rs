//! Mutable, run-scoped execution context threaded through every step.
//!
//! The context is the only state shared across step invocations within one
//! (non-branched) run and is mutated in place. Ownership rule: single writer
//! per branch — once a run fans out, each branch must operate on its own
//! [`branch_copy`](ExecutionContext::branch_copy).
//!
//! Monitoring snapshots produced here are scrubbed: raw payload bytes never
//! leave the live context. Only `fileName`, `filePath`, `fileSize`, and
//! `lastModified` survive into a snapshot.

use serde_json::{Map, Value};

/// Context key for the payload handed from a sender adapter to the start node.
pub const KEY_TRIGGER_DATA: &str = "triggerData";
/// Context key for the queue of files awaiting delivery.
pub const KEY_FILES_TO_PROCESS: &str = "filesToProcess";
/// Context key for files collected by a sender adapter.
pub const KEY_SENDER_FILES: &str = "senderFiles";
/// Context key for files discovered by an upstream trigger.
pub const KEY_FOUND_FILES: &str = "foundFiles";
/// Context key the start node fills for downstream monitoring.
pub const KEY_SENDER_PROCESSED_FILES: &str = "senderProcessedFiles";

/// The file-list keys a split node inspects. The lists may overlap in
/// meaning depending on the upstream stage; none is authoritative.
pub const FILE_LIST_KEYS: [&str; 3] = [KEY_FILES_TO_PROCESS, KEY_SENDER_FILES, KEY_FOUND_FILES];

/// Every key whose entries must be scrubbed before leaving the context in a
/// snapshot. Strictly wider than [`FILE_LIST_KEYS`]: `senderProcessedFiles`
/// is populated by the start node with the verbatim trigger entries, so it
/// carries raw `content` bytes too, even though the split node never counts it.
const SNAPSHOT_SCRUB_KEYS: [&str; 4] = [
    KEY_FILES_TO_PROCESS,
    KEY_SENDER_FILES,
    KEY_FOUND_FILES,
    KEY_SENDER_PROCESSED_FILES,
];

/// Metadata fields allowed to appear in a snapshot file entry.
const SNAPSHOT_FILE_FIELDS: [&str; 4] = ["fileName", "filePath", "fileSize", "lastModified"];

/// Mutable, string-keyed state bag for one flow run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    values: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// The trigger payload, defaulting to an empty mapping. A missing
    /// `triggerData` is not an error: manual and test runs have no trigger.
    pub fn trigger_data(&self) -> Map<String, Value> {
        match self.values.get(KEY_TRIGGER_DATA) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    /// Entries of one named file list, if present and a list.
    pub fn file_list(&self, key: &str) -> Option<&Vec<Value>> {
        self.values.get(key).and_then(Value::as_array)
    }

    /// Maximum entry count across the known file-list keys.
    ///
    /// The maximum (rather than a single authoritative list) is preserved
    /// behavior from the original system: which list is populated depends on
    /// the upstream stage, and the split node does not know which one.
    pub fn max_queued_files(&self) -> usize {
        FILE_LIST_KEYS
            .iter()
            .filter_map(|key| self.file_list(key))
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }

    /// A monitoring-safe copy of the context.
    ///
    /// Every entry under a known file-list key is rebuilt field-by-field
    /// from the metadata whitelist; the original entry object (which may
    /// carry raw `content` bytes) is never cloned into the snapshot. The
    /// trigger payload gets the same treatment: its nested file lists
    /// (notably `foundFiles`) are scrubbed before the payload is copied.
    pub fn sanitized_snapshot(&self) -> Map<String, Value> {
        let mut snapshot = Map::new();
        for (key, value) in &self.values {
            if SNAPSHOT_SCRUB_KEYS.contains(&key.as_str()) {
                snapshot.insert(key.clone(), sanitized_list(value));
            } else if key == KEY_TRIGGER_DATA {
                let mut trigger = match value.as_object() {
                    Some(map) => map.clone(),
                    None => Map::new(),
                };
                for list_key in SNAPSHOT_SCRUB_KEYS {
                    if let Some(list) = trigger.get(list_key) {
                        let scrubbed = sanitized_list(list);
                        trigger.insert(list_key.to_string(), scrubbed);
                    }
                }
                snapshot.insert(key.clone(), Value::Object(trigger));
            } else {
                snapshot.insert(key.clone(), value.clone());
            }
        }
        snapshot
    }

    /// An independently mutable copy for one parallel branch. No backing
    /// maps or arrays are shared with the parent context.
    pub fn branch_copy(&self) -> ExecutionContext {
        // serde_json values are tree-shaped; clone is a deep copy.
        Self {
            values: self.values.clone(),
        }
    }
}

fn sanitized_list(value: &Value) -> Value {
    let entries = value
        .as_array()
        .map(|list| list.iter().map(file_metadata).collect::<Vec<_>>())
        .unwrap_or_default();
    Value::Array(entries)
}

/// Extract the metadata-only view of a file entry.
pub fn file_metadata(entry: &Value) -> Value {
    let mut meta = Map::new();
    if let Some(obj) = entry.as_object() {
        for field in SNAPSHOT_FILE_FIELDS {
            if let Some(v) = obj.get(field) {
                meta.insert(field.to_string(), v.clone());
            }
        }
    }
    Value::Object(meta)
}
