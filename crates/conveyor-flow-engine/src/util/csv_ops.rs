//! CSV utility operations: parse, validate, transform, merge.
//!
//! Record-level problems never abort a multi-record operation: validation
//! walks every row and reports each invalid one, and merge skips (and
//! reports) incompatible source files while still writing the rest.

use std::fs;
use std::path::Path;

use serde_json::{json, Map, Value};

use super::{fail_map, ok_map, opt_bool, opt_str, require_str};
use crate::errors::UtilityError;
use crate::types::ResultMap;

pub(super) fn dispatch(
    operation: &str,
    cfg: &Map<String, Value>,
) -> Result<ResultMap, UtilityError> {
    match operation {
        "parse" => parse(cfg),
        "validate" => validate(cfg),
        "transform" => transform(cfg),
        "merge" => merge(cfg),
        _ => Err(UtilityError::Unsupported {
            domain: "csv".into(),
            operation: operation.into(),
        }),
    }
}

fn delimiter(cfg: &Map<String, Value>, field: &str) -> u8 {
    opt_str(cfg, field)
        .and_then(|s| s.as_bytes().first().copied())
        .unwrap_or(b',')
}

/// Reader with header handling disabled so physical row numbers stay under
/// our control (the header is row 1, the first record row 2).
fn raw_reader(path: &str, delim: u8) -> csv::Result<csv::Reader<fs::File>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delim)
        .from_path(path)
}

// ---------------------------------------------------------------------------
// parse
// ---------------------------------------------------------------------------

fn parse(cfg: &Map<String, Value>) -> Result<ResultMap, UtilityError> {
    let source = require_str(cfg, "sourcePath")?;
    let has_header = opt_bool(cfg, "hasHeader", true);
    let delim = delimiter(cfg, "delimiter");

    let mut reader = match raw_reader(source, delim) {
        Ok(r) => r,
        Err(e) => return Ok(fail_map("csv.parse", format!("cannot open {source}: {e}"))),
    };

    let mut header: Vec<String> = Vec::new();
    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row_number = idx + 1;
        let record = match row {
            Ok(record) => record,
            Err(e) => {
                return Ok(fail_map(
                    "csv.parse",
                    format!("row {row_number}: {e}"),
                ))
            }
        };

        if has_header && row_number == 1 {
            header = record.iter().map(String::from).collect();
            continue;
        }

        let values: Value = if has_header {
            let mut map = Map::new();
            for (i, field) in record.iter().enumerate() {
                let key = header
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("column{}", i + 1));
                map.insert(key, Value::String(field.to_string()));
            }
            Value::Object(map)
        } else {
            Value::Array(record.iter().map(|f| Value::String(f.to_string())).collect())
        };

        records.push(json!({ "row": row_number, "values": values }));
    }

    let mut result = ok_map("csv.parse");
    result.insert("rowCount".into(), json!(records.len()));
    result.insert("columns".into(), json!(header));
    result.insert("records".into(), Value::Array(records));
    Ok(result)
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(cfg: &Map<String, Value>) -> Result<ResultMap, UtilityError> {
    let source = require_str(cfg, "sourcePath")?;
    let delim = delimiter(cfg, "delimiter");
    let required_columns: Vec<String> = cfg
        .get("requiredColumns")
        .and_then(Value::as_array)
        .map(|cols| {
            cols.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let mut reader = match raw_reader(source, delim) {
        Ok(r) => r,
        Err(e) => return Ok(fail_map("csv.validate", format!("cannot open {source}: {e}"))),
    };

    let mut errors: Vec<String> = Vec::new();
    let mut header: Vec<String> = Vec::new();
    let mut processed = 0usize;
    let mut valid = 0usize;

    for (idx, row) in reader.records().enumerate() {
        let row_number = idx + 1;
        let record = match row {
            Ok(record) => record,
            Err(e) => {
                errors.push(format!("row {row_number}: unreadable record: {e}"));
                continue;
            }
        };

        if row_number == 1 {
            header = record.iter().map(String::from).collect();
            for col in &required_columns {
                if !header.contains(col) {
                    errors.push(format!("missing required column: {col}"));
                }
            }
            continue;
        }

        processed += 1;
        let mut row_errors = 0;
        if record.len() != header.len() {
            errors.push(format!(
                "row {row_number}: expected {} fields, found {}",
                header.len(),
                record.len()
            ));
            row_errors += 1;
        }
        for col in &required_columns {
            if let Some(i) = header.iter().position(|h| h == col) {
                if record.get(i).map(str::trim).unwrap_or("").is_empty() {
                    errors.push(format!("row {row_number}: empty value for required column {col}"));
                    row_errors += 1;
                }
            }
        }
        if row_errors == 0 {
            valid += 1;
        }
    }

    // Failure still carries the partial statistics.
    let mut result = if errors.is_empty() {
        ok_map("csv.validate")
    } else {
        fail_map(
            "csv.validate",
            format!("{} validation error(s)", errors.len()),
        )
    };
    result.insert("rowsProcessed".into(), json!(processed));
    result.insert("rowsValid".into(), json!(valid));
    result.insert("rowsInvalid".into(), json!(processed - valid));
    result.insert("errors".into(), json!(errors));
    Ok(result)
}

// ---------------------------------------------------------------------------
// transform
// ---------------------------------------------------------------------------

fn transform(cfg: &Map<String, Value>) -> Result<ResultMap, UtilityError> {
    let source = require_str(cfg, "sourcePath")?;
    let target = require_str(cfg, "targetPath")?;
    let delim = delimiter(cfg, "delimiter");
    let out_delim = cfg
        .get("outputDelimiter")
        .and_then(Value::as_str)
        .and_then(|s| s.as_bytes().first().copied())
        .unwrap_or(delim);
    let selected: Option<Vec<String>> = cfg.get("columns").and_then(Value::as_array).map(|cols| {
        cols.iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect()
    });
    let rename = cfg
        .get("rename")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let mut reader = match csv::ReaderBuilder::new()
        .delimiter(delim)
        .from_path(source)
    {
        Ok(r) => r,
        Err(e) => return Ok(fail_map("csv.transform", format!("cannot open {source}: {e}"))),
    };
    let header: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(String::from).collect(),
        Err(e) => return Ok(fail_map("csv.transform", format!("cannot read header: {e}"))),
    };

    // Resolve the output column set against the source header.
    let indices: Vec<usize> = match &selected {
        Some(cols) => {
            let mut indices = Vec::with_capacity(cols.len());
            for col in cols {
                match header.iter().position(|h| h == col) {
                    Some(i) => indices.push(i),
                    None => {
                        return Ok(fail_map(
                            "csv.transform",
                            format!("column not found in source: {col}"),
                        ))
                    }
                }
            }
            indices
        }
        None => (0..header.len()).collect(),
    };

    if let Some(parent) = Path::new(target).parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            return Ok(fail_map(
                "csv.transform",
                format!("cannot create {}: {e}", parent.display()),
            ));
        }
    }
    let mut writer = match csv::WriterBuilder::new()
        .delimiter(out_delim)
        .from_path(target)
    {
        Ok(w) => w,
        Err(e) => return Ok(fail_map("csv.transform", format!("cannot open {target}: {e}"))),
    };

    let out_header: Vec<String> = indices
        .iter()
        .map(|&i| {
            let name = &header[i];
            rename
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or(name)
                .to_string()
        })
        .collect();
    if let Err(e) = writer.write_record(&out_header) {
        return Ok(fail_map("csv.transform", format!("write failed: {e}")));
    }

    let mut rows_written = 0usize;
    for row in reader.records() {
        let record = match row {
            Ok(record) => record,
            Err(e) => return Ok(fail_map("csv.transform", format!("read failed: {e}"))),
        };
        let out: Vec<&str> = indices
            .iter()
            .map(|&i| record.get(i).unwrap_or(""))
            .collect();
        if let Err(e) = writer.write_record(&out) {
            return Ok(fail_map("csv.transform", format!("write failed: {e}")));
        }
        rows_written += 1;
    }
    if let Err(e) = writer.flush() {
        return Ok(fail_map("csv.transform", format!("flush failed: {e}")));
    }

    let mut result = ok_map("csv.transform");
    result.insert("rowsWritten".into(), json!(rows_written));
    result.insert("columns".into(), json!(out_header));
    result.insert("targetPath".into(), json!(target));
    Ok(result)
}

// ---------------------------------------------------------------------------
// merge
// ---------------------------------------------------------------------------

fn merge(cfg: &Map<String, Value>) -> Result<ResultMap, UtilityError> {
    let sources = super::file_ops::source_paths(cfg)?;
    let target = require_str(cfg, "targetPath")?;
    let delim = delimiter(cfg, "delimiter");

    let mut writer = match csv::WriterBuilder::new()
        .delimiter(delim)
        .from_path(target)
    {
        Ok(w) => w,
        Err(e) => return Ok(fail_map("csv.merge", format!("cannot open {target}: {e}"))),
    };

    let mut canonical_header: Option<Vec<String>> = None;
    let mut errors: Vec<String> = Vec::new();
    let mut rows_written = 0usize;
    let mut files_merged = 0usize;

    for source in &sources {
        let mut reader = match csv::ReaderBuilder::new().delimiter(delim).from_path(source) {
            Ok(r) => r,
            Err(e) => {
                errors.push(format!("cannot open {source}: {e}"));
                continue;
            }
        };
        let header: Vec<String> = match reader.headers() {
            Ok(h) => h.iter().map(String::from).collect(),
            Err(e) => {
                errors.push(format!("cannot read header of {source}: {e}"));
                continue;
            }
        };

        match &canonical_header {
            None => {
                if let Err(e) = writer.write_record(&header) {
                    return Ok(fail_map("csv.merge", format!("write failed: {e}")));
                }
                canonical_header = Some(header);
            }
            Some(expected) if *expected != header => {
                errors.push(format!("header mismatch in {source}, file skipped"));
                continue;
            }
            Some(_) => {}
        }

        let mut file_ok = true;
        for row in reader.records() {
            match row {
                Ok(record) => {
                    if let Err(e) = writer.write_record(&record) {
                        return Ok(fail_map("csv.merge", format!("write failed: {e}")));
                    }
                    rows_written += 1;
                }
                Err(e) => {
                    errors.push(format!("unreadable record in {source}: {e}"));
                    file_ok = false;
                }
            }
        }
        if file_ok {
            files_merged += 1;
        }
    }
    if let Err(e) = writer.flush() {
        return Ok(fail_map("csv.merge", format!("flush failed: {e}")));
    }

    let mut result = if errors.is_empty() {
        ok_map("csv.merge")
    } else {
        fail_map("csv.merge", format!("{} merge error(s)", errors.len()))
    };
    result.insert("filesMerged".into(), json!(files_merged));
    result.insert("rowsWritten".into(), json!(rows_written));
    result.insert("errors".into(), json!(errors));
    Ok(result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
