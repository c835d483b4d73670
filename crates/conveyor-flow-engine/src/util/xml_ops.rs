//! XML utility operations: parse, validate, xpath, transform.
//!
//! All operations accept the document either inline (`content`) or from
//! disk (`sourcePath`). The `xpath` operation supports absolute
//! slash-separated element paths, which covers the extraction shapes the
//! flows actually use; full XPath axes are out of scope.

use std::fs;

use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
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
        "xpath" => xpath(cfg),
        "transform" => transform(cfg),
        _ => Err(UtilityError::Unsupported {
            domain: "xml".into(),
            operation: operation.into(),
        }),
    }
}

/// Inline `content` wins over `sourcePath`; one of the two is required.
fn load_source(cfg: &Map<String, Value>) -> Result<Result<String, String>, UtilityError> {
    if let Some(content) = opt_str(cfg, "content") {
        return Ok(Ok(content.to_string()));
    }
    let path = require_str(cfg, "sourcePath")?;
    Ok(fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}")))
}

fn text_of(t: &quick_xml::events::BytesText<'_>) -> String {
    match t.unescape() {
        Ok(cow) => cow.into_owned(),
        Err(_) => String::from_utf8_lossy(t.as_ref()).into_owned(),
    }
}

fn name_of(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

// ---------------------------------------------------------------------------
// parse
// ---------------------------------------------------------------------------

fn parse(cfg: &Map<String, Value>) -> Result<ResultMap, UtilityError> {
    let text = match load_source(cfg)? {
        Ok(text) => text,
        Err(e) => return Ok(fail_map("xml.parse", e)),
    };

    let mut reader = Reader::from_str(&text);
    reader.trim_text(true);

    let mut root: Option<String> = None;
    let mut elements = 0usize;
    let mut attributes = 0usize;
    let mut text_nodes = 0usize;
    let mut depth = 0usize;
    let mut max_depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if root.is_none() {
                    root = Some(name_of(e.name().as_ref()));
                }
                elements += 1;
                attributes += e.attributes().count();
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            Ok(Event::Empty(e)) => {
                if root.is_none() {
                    root = Some(name_of(e.name().as_ref()));
                }
                elements += 1;
                attributes += e.attributes().count();
                max_depth = max_depth.max(depth + 1);
            }
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Text(t)) => {
                if !text_of(&t).trim().is_empty() {
                    text_nodes += 1;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Ok(fail_map(
                    "xml.parse",
                    format!("malformed at byte {}: {e}", reader.buffer_position()),
                ))
            }
        }
    }

    if root.is_none() {
        return Ok(fail_map("xml.parse", "document has no root element"));
    }

    let mut result = ok_map("xml.parse");
    result.insert("rootElement".into(), json!(root));
    result.insert("elementCount".into(), json!(elements));
    result.insert("attributeCount".into(), json!(attributes));
    result.insert("textNodeCount".into(), json!(text_nodes));
    result.insert("maxDepth".into(), json!(max_depth));
    Ok(result)
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(cfg: &Map<String, Value>) -> Result<ResultMap, UtilityError> {
    let text = match load_source(cfg)? {
        Ok(text) => text,
        Err(e) => return Ok(fail_map("xml.validate", e)),
    };

    let mut reader = Reader::from_str(&text);
    reader.trim_text(true);
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) | Ok(Event::Empty(_)) => saw_root = true,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                let mut result = fail_map(
                    "xml.validate",
                    format!("malformed at byte {}: {e}", reader.buffer_position()),
                );
                result.insert("wellFormed".into(), json!(false));
                return Ok(result);
            }
        }
    }

    if !saw_root {
        let mut result = fail_map("xml.validate", "document has no root element");
        result.insert("wellFormed".into(), json!(false));
        return Ok(result);
    }
    let mut result = ok_map("xml.validate");
    result.insert("wellFormed".into(), json!(true));
    Ok(result)
}

// ---------------------------------------------------------------------------
// xpath
// ---------------------------------------------------------------------------

fn xpath(cfg: &Map<String, Value>) -> Result<ResultMap, UtilityError> {
    let path = require_str(cfg, "path")?;
    let text = match load_source(cfg)? {
        Ok(text) => text,
        Err(e) => return Ok(fail_map("xml.xpath", e)),
    };

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(UtilityError::Invalid {
            message: "xml.xpath 'path' must name at least one element".into(),
        });
    }
    // A trailing `@attr` segment selects an attribute of the parent path.
    let (element_segments, attribute) = match segments.last() {
        Some(last) if last.starts_with('@') => {
            (&segments[..segments.len() - 1], Some(&last[1..]))
        }
        _ => (&segments[..], None),
    };

    let mut reader = Reader::from_str(&text);
    reader.trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut matches: Vec<Value> = Vec::new();
    let mut capture: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(name_of(e.name().as_ref()));
                if stack == element_segments {
                    match attribute {
                        Some(attr) => {
                            if let Some(v) = attr_value(&e, attr) {
                                matches.push(json!(v));
                            }
                        }
                        None => capture = Some(String::new()),
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                stack.push(name_of(e.name().as_ref()));
                if stack == element_segments {
                    match attribute {
                        Some(attr) => {
                            if let Some(v) = attr_value(&e, attr) {
                                matches.push(json!(v));
                            }
                        }
                        None => matches.push(json!("")),
                    }
                }
                stack.pop();
            }
            Ok(Event::End(_)) => {
                if stack == element_segments {
                    if let Some(buf) = capture.take() {
                        matches.push(json!(buf));
                    }
                }
                stack.pop();
            }
            Ok(Event::Text(t)) => {
                if let Some(buf) = capture.as_mut() {
                    buf.push_str(&text_of(&t));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Ok(fail_map(
                    "xml.xpath",
                    format!("malformed at byte {}: {e}", reader.buffer_position()),
                ))
            }
        }
    }

    let mut result = ok_map("xml.xpath");
    result.insert("path".into(), json!(path));
    result.insert("matchCount".into(), json!(matches.len()));
    result.insert("matches".into(), Value::Array(matches));
    Ok(result)
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.as_ref() == name.as_bytes() {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

// ---------------------------------------------------------------------------
// transform
// ---------------------------------------------------------------------------

/// Re-indents the document and optionally strips comments. The result is
/// written to `targetPath` when given, and always returned inline.
fn transform(cfg: &Map<String, Value>) -> Result<ResultMap, UtilityError> {
    let strip_comments = opt_bool(cfg, "stripComments", false);
    let indent = cfg.get("indent").and_then(Value::as_u64).unwrap_or(2) as usize;
    let text = match load_source(cfg)? {
        Ok(text) => text,
        Err(e) => return Ok(fail_map("xml.transform", e)),
    };

    let mut reader = Reader::from_str(&text);
    reader.trim_text(true);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', indent);
    let mut comments_stripped = 0usize;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                return Ok(fail_map(
                    "xml.transform",
                    format!("malformed at byte {}: {e}", reader.buffer_position()),
                ))
            }
        };
        match event {
            Event::Eof => break,
            Event::Comment(_) if strip_comments => comments_stripped += 1,
            other => {
                if let Err(e) = writer.write_event(other) {
                    return Ok(fail_map("xml.transform", format!("write failed: {e}")));
                }
            }
        }
    }

    let output = String::from_utf8_lossy(&writer.into_inner()).into_owned();
    if let Some(target) = opt_str(cfg, "targetPath") {
        if let Err(e) = fs::write(target, &output) {
            return Ok(fail_map(
                "xml.transform",
                format!("cannot write {target}: {e}"),
            ));
        }
    }

    let mut result = ok_map("xml.transform");
    result.insert("content".into(), json!(output));
    result.insert("commentsStripped".into(), json!(comments_stripped));
    Ok(result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    const DOC: &str = "<order id=\"42\"><item sku=\"a1\"><name>bolt</name><qty>3</qty></item>\
                       <item sku=\"b2\"><name>nut</name><qty>7</qty></item></order>";

    #[test]
    fn parse_reports_document_shape() {
        let result = parse(&cfg(json!({ "content": DOC }))).unwrap();
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["rootElement"], json!("order"));
        assert_eq!(result["elementCount"], json!(7));
        assert_eq!(result["attributeCount"], json!(3));
        assert_eq!(result["maxDepth"], json!(3));
    }

    #[test]
    fn parse_reads_from_disk_when_no_inline_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.xml");
        fs::write(&path, DOC).expect("write doc");

        let result = parse(&cfg(json!({ "sourcePath": path.to_str().unwrap() }))).unwrap();
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["rootElement"], json!("order"));
    }

    #[test]
    fn validate_flags_mismatched_tags_with_position() {
        let result =
            validate(&cfg(json!({ "content": "<a><b>text</a></b>" }))).unwrap();
        assert_eq!(result["success"], json!(false));
        assert_eq!(result["wellFormed"], json!(false));
        assert!(result["error"].as_str().unwrap().contains("byte"));
    }

    #[test]
    fn validate_accepts_well_formed_document() {
        let result = validate(&cfg(json!({ "content": DOC }))).unwrap();
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["wellFormed"], json!(true));
    }

    #[test]
    fn xpath_extracts_element_text_in_document_order() {
        let result = xpath(&cfg(json!({
            "content": DOC,
            "path": "/order/item/name"
        })))
        .unwrap();
        assert_eq!(result["matchCount"], json!(2));
        assert_eq!(result["matches"], json!(["bolt", "nut"]));
    }

    #[test]
    fn xpath_extracts_attributes() {
        let result = xpath(&cfg(json!({
            "content": DOC,
            "path": "/order/item/@sku"
        })))
        .unwrap();
        assert_eq!(result["matches"], json!(["a1", "b2"]));
    }

    #[test]
    fn xpath_with_no_matches_is_still_a_success() {
        let result = xpath(&cfg(json!({
            "content": DOC,
            "path": "/order/ghost"
        })))
        .unwrap();
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["matchCount"], json!(0));
    }

    #[test]
    fn transform_strips_comments_and_reindents() {
        let result = transform(&cfg(json!({
            "content": "<a><!-- secret --><b>x</b></a>",
            "stripComments": true
        })))
        .unwrap();
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["commentsStripped"], json!(1));
        let content = result["content"].as_str().unwrap();
        assert!(!content.contains("secret"));
        assert!(content.contains("<b>x</b>"));
    }

    #[test]
    fn transform_writes_target_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("out.xml");

        let result = transform(&cfg(json!({
            "content": "<a><b>x</b></a>",
            "targetPath": target.to_str().unwrap()
        })))
        .unwrap();
        assert_eq!(result["success"], json!(true));
        let written = fs::read_to_string(&target).unwrap();
        assert!(written.contains("<b>x</b>"));
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let err = dispatch("explode", &Map::new()).unwrap_err();
        assert!(err.to_string().contains("explode"));
    }
}
