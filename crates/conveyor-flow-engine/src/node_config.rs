//! Node configuration normalization.
//!
//! Flow definitions arrive in two shapes: the newer format nests
//! node-specific fields under a `data` sub-object, the legacy format keeps
//! them flat. Normalization happens exactly once, at dispatch entry — the
//! rest of a command consumes one canonical structure and never re-checks
//! both shapes per field.

use serde_json::{Map, Value};

/// Canonical, merged node configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    fields: Map<String, Value>,
}

impl NodeConfig {
    /// Merge a raw node configuration into canonical form. Fields under the
    /// nested `data` object take precedence over flat legacy fields.
    pub fn normalize(node: &Value) -> Self {
        let mut fields = node.as_object().cloned().unwrap_or_default();
        if let Some(Value::Object(data)) = fields.remove("data") {
            for (key, value) in data {
                fields.insert(key, value);
            }
        }
        Self { fields }
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn u64_field(&self, key: &str, default: u64) -> u64 {
        self.fields.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    pub fn bool_field(&self, key: &str, default: bool) -> bool {
        self.fields.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// A nested object field, empty when absent or not an object.
    pub fn sub_object(&self, key: &str) -> Map<String, Value> {
        match self.fields.get(key) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_legacy_fields_are_read() {
        let config = NodeConfig::normalize(&json!({
            "type": "adapter",
            "adapterId": "a-1"
        }));
        assert_eq!(config.str_field("adapterId"), Some("a-1"));
    }

    #[test]
    fn nested_data_fields_are_read() {
        let config = NodeConfig::normalize(&json!({
            "type": "adapter",
            "data": { "adapterId": "a-2" }
        }));
        assert_eq!(config.str_field("adapterId"), Some("a-2"));
    }

    #[test]
    fn nested_data_wins_over_flat() {
        let config = NodeConfig::normalize(&json!({
            "adapterId": "legacy",
            "data": { "adapterId": "nested" }
        }));
        assert_eq!(config.str_field("adapterId"), Some("nested"));
    }

    #[test]
    fn typed_accessors_fall_back_to_defaults() {
        let config = NodeConfig::normalize(&json!({ "parallelPaths": 4 }));
        assert_eq!(config.u64_field("parallelPaths", 2), 4);
        assert_eq!(config.u64_field("missing", 2), 2);
        assert!(!config.bool_field("missing", false));
        assert!(config.sub_object("missing").is_empty());
    }

    #[test]
    fn non_object_node_yields_empty_config() {
        let config = NodeConfig::normalize(&json!(null));
        assert!(config.fields().is_empty());
    }
}
