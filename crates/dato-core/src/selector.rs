//! JSONPath-like selection over tool output.
//!
//! Execute tools return whole API payloads; a selector lets the caller keep
//! only the part it needs before the byte cap truncates the rest. The
//! dialect is deliberately small: dot-separated keys, `[n]` indices, and `*`
//! wildcards.
//!
//! # Examples
//!
//! ```
//! use dato_mcp_core::select;
//! use serde_json::json;
//!
//! let payload = json!({"data": [{"id": "1", "title": "a"}, {"id": "2", "title": "b"}]});
//!
//! assert_eq!(select(&payload, "data[0].id").unwrap(), json!("1"));
//! assert_eq!(select(&payload, "data.*.title").unwrap(), json!(["a", "b"]));
//! ```

use crate::{Error, Result};
use serde_json::Value;

#[derive(Debug, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

/// Applies a selector `path` to `value`.
///
/// A path selecting exactly one value returns it as-is; a path traversing a
/// wildcard returns an array of every match.
///
/// # Errors
///
/// Returns [`Error::Selector`] when the path is malformed or selects
/// nothing.
pub fn select(value: &Value, path: &str) -> Result<Value> {
    let segments = parse_path(path)?;

    let mut current: Vec<&Value> = vec![value];
    let mut saw_wildcard = false;

    for segment in &segments {
        let mut next = Vec::new();
        for candidate in &current {
            match segment {
                Segment::Key(key) => {
                    if let Some(child) = candidate.get(key) {
                        next.push(child);
                    }
                }
                Segment::Index(index) => {
                    if let Some(child) = candidate.get(index) {
                        next.push(child);
                    }
                }
                Segment::Wildcard => {
                    saw_wildcard = true;
                    match candidate {
                        Value::Array(items) => next.extend(items.iter()),
                        Value::Object(map) => next.extend(map.values()),
                        _ => {}
                    }
                }
            }
        }
        current = next;
        if current.is_empty() {
            return Err(Error::Selector {
                message: format!("path {path:?} selected nothing"),
            });
        }
    }

    if current.len() == 1 && !saw_wildcard {
        Ok(current[0].clone())
    } else {
        Ok(Value::Array(current.into_iter().cloned().collect()))
    }
}

fn parse_path(path: &str) -> Result<Vec<Segment>> {
    let trimmed = path.trim().trim_start_matches('$').trim_start_matches('.');
    if trimmed.is_empty() {
        return Err(Error::Selector {
            message: "selector path is empty".to_string(),
        });
    }

    let mut segments = Vec::new();
    for part in trimmed.split('.') {
        let mut rest = part;
        // A part may be `key`, `key[0]`, `key[0][1]`, `[0]`, or `*`.
        if let Some(bracket) = rest.find('[') {
            let key = &rest[..bracket];
            if !key.is_empty() {
                segments.push(key_segment(key));
            }
            rest = &rest[bracket..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let close = stripped.find(']').ok_or_else(|| Error::Selector {
                    message: format!("unclosed index bracket in {path:?}"),
                })?;
                let raw = &stripped[..close];
                if raw == "*" {
                    segments.push(Segment::Wildcard);
                } else {
                    let index = raw.parse().map_err(|_| Error::Selector {
                        message: format!("invalid array index {raw:?} in {path:?}"),
                    })?;
                    segments.push(Segment::Index(index));
                }
                rest = &stripped[close + 1..];
            }
            if !rest.is_empty() {
                return Err(Error::Selector {
                    message: format!("unexpected trailing {rest:?} in {path:?}"),
                });
            }
        } else if rest.is_empty() {
            return Err(Error::Selector {
                message: format!("empty segment in {path:?}"),
            });
        } else {
            segments.push(key_segment(rest));
        }
    }

    Ok(segments)
}

fn key_segment(raw: &str) -> Segment {
    if raw == "*" {
        Segment::Wildcard
    } else {
        Segment::Key(raw.to_string())
    }
}
