//! Stateless data/file utility processors.
//!
//! One dispatch entry point keyed by `(domain, operation)` — `file.split`,
//! `csv.validate`, `xml.xpath`, and so on. Every concrete operation
//! validates its required configuration keys before touching any I/O;
//! operational failures (unreadable file, conflicting target) come back as
//! `success=false` result mappings, and record-level problems in
//! multi-record operations are accumulated instead of aborting at the
//! first bad record.

pub mod csv_ops;
pub mod file_ops;
pub mod xml_ops;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::ExecutionContext;
use crate::errors::{StepError, UtilityError};
use crate::traits::UtilityRunner;
use crate::types::{FlowExecutionStep, ResultMap};

// ---------------------------------------------------------------------------
// Shared config/result helpers
// ---------------------------------------------------------------------------

pub(crate) fn require_str<'a>(
    cfg: &'a Map<String, Value>,
    field: &str,
) -> Result<&'a str, UtilityError> {
    cfg.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| UtilityError::MissingField {
            field: field.to_string(),
        })
}

pub(crate) fn opt_str<'a>(cfg: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    cfg.get(field).and_then(Value::as_str)
}

pub(crate) fn opt_u64(cfg: &Map<String, Value>, field: &str) -> Option<u64> {
    cfg.get(field).and_then(Value::as_u64)
}

pub(crate) fn opt_bool(cfg: &Map<String, Value>, field: &str, default: bool) -> bool {
    cfg.get(field).and_then(Value::as_bool).unwrap_or(default)
}

/// Start a success mapping for one operation.
pub(crate) fn ok_map(operation: &str) -> ResultMap {
    let mut map = ResultMap::new();
    map.insert("success".into(), Value::Bool(true));
    map.insert("operation".into(), Value::String(operation.to_string()));
    map
}

/// Build a failure mapping for one operation. Distinct from a
/// warning-bearing success: `success=false` plus an `error` field.
pub(crate) fn fail_map(operation: &str, error: impl Into<String>) -> ResultMap {
    let mut map = ResultMap::new();
    map.insert("success".into(), Value::Bool(false));
    map.insert("operation".into(), Value::String(operation.to_string()));
    map.insert("error".into(), Value::String(error.into()));
    map
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// The built-in utility operation registry, implementing
/// [`UtilityRunner`] for the utility step.
#[derive(Debug, Default, Clone, Copy)]
pub struct UtilityProcessors;

impl UtilityProcessors {
    pub fn new() -> Self {
        Self
    }
}

/// Resolve `(domain, operation)` from a `"domain.operation"` identifier, or
/// from a bare domain plus an `operation` config field.
fn split_operation(
    utility_type: &str,
    cfg: &Map<String, Value>,
) -> Result<(String, String), UtilityError> {
    if let Some((domain, operation)) = utility_type.split_once('.') {
        if !domain.is_empty() && !operation.is_empty() {
            return Ok((domain.to_ascii_lowercase(), operation.to_ascii_lowercase()));
        }
    }
    let operation = require_str(cfg, "operation")?;
    Ok((
        utility_type.to_ascii_lowercase(),
        operation.to_ascii_lowercase(),
    ))
}

#[async_trait]
impl UtilityRunner for UtilityProcessors {
    async fn execute_utility(
        &self,
        utility_type: &str,
        config: &Value,
        _ctx: &mut ExecutionContext,
        step: &mut FlowExecutionStep,
    ) -> Result<ResultMap, StepError> {
        let cfg = config.as_object().cloned().unwrap_or_default();
        let (domain, operation) = split_operation(utility_type, &cfg)?;

        tracing::debug!(%domain, %operation, "dispatching utility operation");

        let result = match domain.as_str() {
            "file" => file_ops::dispatch(&operation, &cfg, step),
            "csv" => csv_ops::dispatch(&operation, &cfg),
            "xml" => xml_ops::dispatch(&operation, &cfg),
            _ => Err(UtilityError::Unsupported { domain, operation }),
        };
        result.map_err(StepError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dotted_identifier_splits() {
        let (d, o) = split_operation("file.Hash", &Map::new()).unwrap();
        assert_eq!((d.as_str(), o.as_str()), ("file", "hash"));
    }

    #[test]
    fn bare_domain_reads_operation_field() {
        let cfg = json!({"operation": "split"});
        let (d, o) = split_operation("file", cfg.as_object().unwrap()).unwrap();
        assert_eq!((d.as_str(), o.as_str()), ("file", "split"));
    }

    #[test]
    fn missing_operation_is_named() {
        let err = split_operation("file", &Map::new()).unwrap_err();
        assert!(err.to_string().contains("operation"));
    }

    #[tokio::test]
    async fn unknown_domain_is_unsupported() {
        let mut ctx = ExecutionContext::new();
        let mut step = FlowExecutionStep::new("s1", "u", "utility");
        let err = UtilityProcessors::new()
            .execute_utility("pdf.render", &json!({}), &mut ctx, &mut step)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("pdf.render"));
    }
}
