//! File utility operations: split, merge, copy, move, hash, validate.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use super::{fail_map, ok_map, opt_bool, opt_str, opt_u64, require_str};
use crate::errors::UtilityError;
use crate::types::{FlowExecutionStep, ResultMap};

const FILE_CATEGORY: &str = "utility";

pub(super) fn dispatch(
    operation: &str,
    cfg: &Map<String, Value>,
    step: &mut FlowExecutionStep,
) -> Result<ResultMap, UtilityError> {
    match operation {
        "split" => split(cfg, step),
        "merge" => merge(cfg, step),
        "copy" => copy(cfg, step),
        "move" => move_file(cfg, step),
        "hash" => hash(cfg),
        "validate" => validate(cfg),
        _ => Err(UtilityError::Unsupported {
            domain: "file".into(),
            operation: operation.into(),
        }),
    }
}

// ---------------------------------------------------------------------------
// split
// ---------------------------------------------------------------------------

fn split(cfg: &Map<String, Value>, step: &mut FlowExecutionStep) -> Result<ResultMap, UtilityError> {
    let source = require_str(cfg, "sourcePath")?;
    let target_dir = require_str(cfg, "targetDirectory")?;
    let max_bytes = opt_u64(cfg, "maxBytes");
    let max_lines = opt_u64(cfg, "maxLines");
    if max_bytes.is_none() && max_lines.is_none() {
        return Err(UtilityError::Invalid {
            message: "file.split requires 'maxBytes' or 'maxLines'".into(),
        });
    }

    let content = match fs::read(source) {
        Ok(bytes) => bytes,
        Err(e) => return Ok(fail_map("file.split", format!("cannot read {source}: {e}"))),
    };
    if let Err(e) = fs::create_dir_all(target_dir) {
        return Ok(fail_map(
            "file.split",
            format!("cannot create {target_dir}: {e}"),
        ));
    }

    let chunks: Vec<Vec<u8>> = if let Some(lines) = max_lines {
        chunk_by_lines(&content, lines.max(1) as usize)
    } else {
        content
            .chunks(max_bytes.unwrap_or(1).max(1) as usize)
            .map(<[u8]>::to_vec)
            .collect()
    };

    let source_path = Path::new(source);
    let stem = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "part".into());
    let ext = source_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut parts = Vec::new();
    let mut total_bytes = 0u64;
    for (i, chunk) in chunks.iter().enumerate() {
        let name = format!("{stem}.part{:03}{ext}", i + 1);
        let path = Path::new(target_dir).join(&name);
        if let Err(e) = fs::write(&path, chunk) {
            return Ok(fail_map(
                "file.split",
                format!("cannot write {}: {e}", path.display()),
            ));
        }
        total_bytes += chunk.len() as u64;
        step.record_file(&name, FILE_CATEGORY, chunk.len() as u64);
        parts.push(json!({ "fileName": name, "sizeBytes": chunk.len() }));
    }

    let mut result = ok_map("file.split");
    result.insert("partsWritten".into(), json!(parts.len()));
    result.insert("totalBytes".into(), json!(total_bytes));
    result.insert("parts".into(), Value::Array(parts));
    Ok(result)
}

/// Split raw bytes into chunks of at most `max_lines` newline-terminated
/// lines, preserving line endings.
fn chunk_by_lines(content: &[u8], max_lines: usize) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut lines_in_current = 0;
    for line in content.split_inclusive(|b| *b == b'\n') {
        current.extend_from_slice(line);
        lines_in_current += 1;
        if lines_in_current == max_lines {
            chunks.push(std::mem::take(&mut current));
            lines_in_current = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

// ---------------------------------------------------------------------------
// merge
// ---------------------------------------------------------------------------

fn merge(cfg: &Map<String, Value>, step: &mut FlowExecutionStep) -> Result<ResultMap, UtilityError> {
    let sources = source_paths(cfg)?;
    let target = require_str(cfg, "targetPath")?;

    if let Some(parent) = Path::new(target).parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            return Ok(fail_map(
                "file.merge",
                format!("cannot create {}: {e}", parent.display()),
            ));
        }
    }

    let mut merged = Vec::new();
    let mut errors = Vec::new();
    let mut files_merged = 0usize;
    for source in &sources {
        match fs::read(source) {
            Ok(bytes) => {
                merged.extend_from_slice(&bytes);
                files_merged += 1;
            }
            Err(e) => errors.push(format!("cannot read {source}: {e}")),
        }
    }

    if let Err(e) = fs::write(target, &merged) {
        return Ok(fail_map("file.merge", format!("cannot write {target}: {e}")));
    }
    step.record_file(file_name_of(target), FILE_CATEGORY, merged.len() as u64);

    let mut result = if errors.is_empty() {
        ok_map("file.merge")
    } else {
        fail_map(
            "file.merge",
            format!("{} of {} source files unreadable", errors.len(), sources.len()),
        )
    };
    result.insert("filesMerged".into(), json!(files_merged));
    result.insert("totalBytes".into(), json!(merged.len()));
    result.insert("errors".into(), json!(errors));
    Ok(result)
}

pub(super) fn source_paths(cfg: &Map<String, Value>) -> Result<Vec<String>, UtilityError> {
    let paths: Vec<String> = cfg
        .get("sourcePaths")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    if paths.is_empty() {
        return Err(UtilityError::MissingField {
            field: "sourcePaths".into(),
        });
    }
    Ok(paths)
}

// ---------------------------------------------------------------------------
// copy / move
// ---------------------------------------------------------------------------

fn copy(cfg: &Map<String, Value>, step: &mut FlowExecutionStep) -> Result<ResultMap, UtilityError> {
    transfer(cfg, step, "file.copy", false)
}

fn move_file(
    cfg: &Map<String, Value>,
    step: &mut FlowExecutionStep,
) -> Result<ResultMap, UtilityError> {
    transfer(cfg, step, "file.move", true)
}

fn transfer(
    cfg: &Map<String, Value>,
    step: &mut FlowExecutionStep,
    operation: &str,
    remove_source: bool,
) -> Result<ResultMap, UtilityError> {
    let source = require_str(cfg, "sourcePath")?;
    let target = require_str(cfg, "targetPath")?;
    let overwrite = opt_bool(cfg, "overwrite", false);

    let target_path = PathBuf::from(target);
    if !Path::new(source).is_file() {
        return Ok(fail_map(operation, format!("source file not found: {source}")));
    }
    if target_path.exists() && !overwrite {
        return Ok(fail_map(
            operation,
            format!("target already exists: {target}"),
        ));
    }
    if let Some(parent) = target_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            return Ok(fail_map(
                operation,
                format!("cannot create {}: {e}", parent.display()),
            ));
        }
    }

    let bytes = match fs::copy(source, &target_path) {
        Ok(n) => n,
        Err(e) => return Ok(fail_map(operation, format!("copy failed: {e}"))),
    };
    if remove_source {
        if let Err(e) = fs::remove_file(source) {
            return Ok(fail_map(
                operation,
                format!("copied but cannot remove source {source}: {e}"),
            ));
        }
    }
    step.record_file(file_name_of(target), FILE_CATEGORY, bytes);

    let mut result = ok_map(operation);
    result.insert("bytesTransferred".into(), json!(bytes));
    result.insert("targetPath".into(), json!(target));
    Ok(result)
}

fn file_name_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

// ---------------------------------------------------------------------------
// hash
// ---------------------------------------------------------------------------

fn hash(cfg: &Map<String, Value>) -> Result<ResultMap, UtilityError> {
    let source = require_str(cfg, "sourcePath")?;
    let algorithm = opt_str(cfg, "algorithm")
        .unwrap_or("sha256")
        .to_ascii_lowercase();
    // Validate the algorithm before any I/O.
    if !matches!(algorithm.as_str(), "md5" | "sha1" | "sha256") {
        return Err(UtilityError::Invalid {
            message: format!("unknown hash algorithm: {algorithm}"),
        });
    }

    let bytes = match fs::read(source) {
        Ok(bytes) => bytes,
        Err(e) => {
            // An unreadable hash source is flagged critical so the
            // orchestrator can halt downstream dependent steps.
            let mut result = fail_map("file.hash", format!("cannot read {source}: {e}"));
            result.insert("critical".into(), Value::Bool(true));
            return Ok(result);
        }
    };

    let digest = match algorithm.as_str() {
        "md5" => format!("{:x}", md5::compute(&bytes)),
        "sha1" => hex::encode(Sha1::digest(&bytes)),
        _ => hex::encode(Sha256::digest(&bytes)),
    };

    let mut result = ok_map("file.hash");
    result.insert("algorithm".into(), json!(algorithm));
    result.insert("hash".into(), json!(digest));
    result.insert("sizeBytes".into(), json!(bytes.len()));
    Ok(result)
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(cfg: &Map<String, Value>) -> Result<ResultMap, UtilityError> {
    let source = require_str(cfg, "sourcePath")?;
    let min_bytes = opt_u64(cfg, "minBytes");
    let max_bytes = opt_u64(cfg, "maxBytes");
    let require_non_empty = opt_bool(cfg, "requireNonEmpty", false);

    let mut checks = Vec::new();
    let mut push = |name: &str, ok: bool, detail: String| {
        checks.push(json!({ "check": name, "ok": ok, "detail": detail }));
        ok
    };

    let path = Path::new(source);
    let meta = path.metadata().ok();
    let exists = push("exists", meta.is_some(), source.to_string());

    let mut all_ok = exists;
    let mut size = 0u64;
    if let Some(meta) = meta {
        all_ok &= push("is_file", meta.is_file(), format!("{}", path.display()));
        size = meta.len();
        all_ok &= push(
            "readable",
            fs::File::open(path).is_ok(),
            source.to_string(),
        );
        if require_non_empty {
            all_ok &= push("non_empty", size > 0, format!("{size} bytes"));
        }
        if let Some(min) = min_bytes {
            all_ok &= push("min_bytes", size >= min, format!("{size} >= {min}"));
        }
        if let Some(max) = max_bytes {
            all_ok &= push("max_bytes", size <= max, format!("{size} <= {max}"));
        }
    } else {
        all_ok = false;
    }

    let mut result = if all_ok {
        ok_map("file.validate")
    } else {
        fail_map("file.validate", format!("validation failed for {source}"))
    };
    result.insert("sizeBytes".into(), json!(size));
    result.insert("checks".into(), Value::Array(checks));
    Ok(result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step() -> FlowExecutionStep {
        FlowExecutionStep::new("s1", "util", "utility")
    }

    fn cfg(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn hash_md5_of_empty_file_is_well_known() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.bin");
        fs::write(&path, b"").unwrap();

        let result = hash(&cfg(json!({
            "sourcePath": path.to_str().unwrap(),
            "algorithm": "MD5"
        })))
        .unwrap();
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["hash"], json!("d41d8cd98f00b204e9800998ecf8427e"));
    }

    #[test]
    fn hash_is_deterministic_and_lowercase() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.txt");
        fs::write(&path, b"conveyor").unwrap();
        let c = cfg(json!({
            "sourcePath": path.to_str().unwrap(),
            "algorithm": "sha256"
        }));

        let first = hash(&c).unwrap();
        let second = hash(&c).unwrap();
        assert_eq!(first["hash"], second["hash"]);
        let digest = first["hash"].as_str().unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hash_unreadable_source_is_critical_failure() {
        let result = hash(&cfg(json!({ "sourcePath": "/nonexistent/x.bin" }))).unwrap();
        assert_eq!(result["success"], json!(false));
        assert_eq!(result["critical"], json!(true));
    }

    #[test]
    fn hash_rejects_unknown_algorithm_before_io() {
        let err = hash(&cfg(json!({
            "sourcePath": "/nonexistent/x.bin",
            "algorithm": "crc32"
        })))
        .unwrap_err();
        assert!(err.to_string().contains("crc32"));
    }

    #[test]
    fn split_by_lines_then_merge_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("rows.txt");
        fs::write(&source, "1\n2\n3\n4\n5\n").unwrap();
        let parts_dir = dir.path().join("parts");

        let mut s = step();
        let result = split(
            &cfg(json!({
                "sourcePath": source.to_str().unwrap(),
                "targetDirectory": parts_dir.to_str().unwrap(),
                "maxLines": 2
            })),
            &mut s,
        )
        .unwrap();
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["partsWritten"], json!(3));
        assert_eq!(s.files_processed(), 3);

        let part_paths: Vec<String> = result["parts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| {
                parts_dir
                    .join(p["fileName"].as_str().unwrap())
                    .to_string_lossy()
                    .to_string()
            })
            .collect();

        let target = dir.path().join("merged.txt");
        let merged = merge(
            &cfg(json!({
                "sourcePaths": part_paths,
                "targetPath": target.to_str().unwrap()
            })),
            &mut s,
        )
        .unwrap();
        assert_eq!(merged["success"], json!(true));
        assert_eq!(fs::read_to_string(&target).unwrap(), "1\n2\n3\n4\n5\n");
    }

    #[test]
    fn split_requires_a_chunking_bound() {
        let err = split(
            &cfg(json!({ "sourcePath": "/x", "targetDirectory": "/y" })),
            &mut step(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("maxBytes"));
    }

    #[test]
    fn merge_accumulates_unreadable_sources() {
        let dir = tempfile::tempdir().expect("tempdir");
        let good = dir.path().join("good.txt");
        fs::write(&good, "ok").unwrap();
        let target = dir.path().join("out.txt");

        let result = merge(
            &cfg(json!({
                "sourcePaths": [good.to_str().unwrap(), "/nonexistent/bad.txt"],
                "targetPath": target.to_str().unwrap()
            })),
            &mut step(),
        )
        .unwrap();
        assert_eq!(result["success"], json!(false));
        assert_eq!(result["filesMerged"], json!(1));
        assert_eq!(result["errors"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn copy_refuses_existing_target_without_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("a.txt");
        let target = dir.path().join("b.txt");
        fs::write(&source, "src").unwrap();
        fs::write(&target, "dst").unwrap();

        let result = copy(
            &cfg(json!({
                "sourcePath": source.to_str().unwrap(),
                "targetPath": target.to_str().unwrap()
            })),
            &mut step(),
        )
        .unwrap();
        assert_eq!(result["success"], json!(false));
        assert!(result["error"]
            .as_str()
            .unwrap()
            .contains(target.to_str().unwrap()));
    }

    #[test]
    fn move_removes_the_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("a.txt");
        let target = dir.path().join("moved/a.txt");
        fs::write(&source, "payload").unwrap();

        let result = move_file(
            &cfg(json!({
                "sourcePath": source.to_str().unwrap(),
                "targetPath": target.to_str().unwrap()
            })),
            &mut step(),
        )
        .unwrap();
        assert_eq!(result["success"], json!(true));
        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "payload");
    }

    #[test]
    fn validate_reports_each_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.bin");
        fs::write(&path, vec![0u8; 100]).unwrap();

        let result = validate(&cfg(json!({
            "sourcePath": path.to_str().unwrap(),
            "minBytes": 10,
            "maxBytes": 50
        })))
        .unwrap();
        assert_eq!(result["success"], json!(false));
        let checks = result["checks"].as_array().unwrap();
        let max_check = checks
            .iter()
            .find(|c| c["check"] == json!("max_bytes"))
            .unwrap();
        assert_eq!(max_check["ok"], json!(false));
    }

    #[test]
    fn unknown_file_operation_is_unsupported() {
        let err = dispatch("shred", &Map::new(), &mut step()).unwrap_err();
        assert!(err.to_string().contains("file.shred"));
    }
}
