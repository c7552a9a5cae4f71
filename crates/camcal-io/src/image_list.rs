//! Image-list files.
//!
//! Accepted shapes are a bare array of strings, or an object whose first
//! member is such an array:
//!
//! ```json
//! { "images": ["left01.jpg", "left02.jpg"] }
//! ```

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::ResultIoError;

/// Read an image list from `path`.
///
/// Anything that is not a list of strings (including files that are not JSON
/// at all) yields [`ResultIoError::MalformedInputList`].
pub fn load_image_list(path: impl AsRef<Path>) -> Result<Vec<String>, ResultIoError> {
    let path = path.as_ref();
    let raw = fs::read(path)?;
    let list = parse_image_list(&raw)?;
    log::debug!("{}: {} images", path.display(), list.len());
    Ok(list)
}

/// Parse an image list from raw bytes.
pub fn parse_image_list(raw: &[u8]) -> Result<Vec<String>, ResultIoError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| ResultIoError::MalformedInputList(e.to_string()))?;

    let seq = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.values().next() {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(ResultIoError::MalformedInputList(
                    "first member is not a sequence".into(),
                ))
            }
            None => return Err(ResultIoError::MalformedInputList("empty object".into())),
        },
        _ => {
            return Err(ResultIoError::MalformedInputList(
                "top-level node is not a sequence".into(),
            ))
        }
    };

    seq.iter()
        .map(|item| {
            item.as_str().map(str::to_owned).ok_or_else(|| {
                ResultIoError::MalformedInputList(format!("non-string entry {item}"))
            })
        })
        .collect()
}

/// Write `images` as `{"images": [...]}`.
pub fn write_image_list(path: impl AsRef<Path>, images: &[String]) -> Result<(), ResultIoError> {
    let doc = serde_json::json!({ "images": images });
    fs::write(path, serde_json::to_string_pretty(&doc)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn malformed(raw: &str) -> bool {
        matches!(
            parse_image_list(raw.as_bytes()),
            Err(ResultIoError::MalformedInputList(_))
        )
    }

    #[test]
    fn bare_array() {
        let list = parse_image_list(br#"["a.png", "b.png"]"#).expect("list");
        assert_eq!(list, ["a.png", "b.png"]);
    }

    #[test]
    fn first_member_of_object() {
        let raw = br#"{"images": ["x.jpg"], "comment": "ignored"}"#;
        assert_eq!(parse_image_list(raw).expect("list"), ["x.jpg"]);
    }

    #[test]
    fn first_member_must_be_the_sequence() {
        assert!(malformed(r#"{"comment": "no", "images": ["x.jpg"]}"#));
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(malformed("{}"));
        assert!(malformed("42"));
        assert!(malformed(r#"[1, 2]"#));
        assert!(malformed("\u{0}\u{1}GIF89a"));
    }

    #[test]
    fn empty_list_is_valid() {
        assert!(parse_image_list(b"[]").expect("list").is_empty());
    }
}
