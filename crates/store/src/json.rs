//! Defensive decoding for JSON-typed columns.
//!
//! Historical rows may hold empty strings, `null`, or malformed text; a
//! reader never fails because of them. Bad data decodes to the type's zero
//! value and logs a warning.

use {serde::de::DeserializeOwned, tracing::warn};

/// Decode a JSON column into `T`, falling back to `T::default()`.
pub fn decode_or_default<T: DeserializeOwned + Default>(raw: Option<&str>, column: &str) -> T {
    let Some(text) = raw else {
        return T::default();
    };
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return T::default();
    }
    match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            warn!(column, error = %e, "malformed JSON column, using default");
            T::default()
        },
    }
}

/// Decode an optional JSON column; empty and malformed both yield `None`.
pub fn decode_optional(raw: Option<&str>, column: &str) -> Option<serde_json::Value> {
    let text = raw?;
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(column, error = %e, "malformed JSON column, dropping value");
            None
        },
    }
}

/// Encode a value for a JSON column.
pub fn encode<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_null_yield_default() {
        let v: Vec<String> = decode_or_default(Some(""), "tags");
        assert!(v.is_empty());
        let v: Vec<String> = decode_or_default(Some("null"), "tags");
        assert!(v.is_empty());
        let v: Vec<String> = decode_or_default(None, "tags");
        assert!(v.is_empty());
    }

    #[test]
    fn malformed_yields_default() {
        let v: serde_json::Value = decode_or_default(Some("{not json"), "config");
        assert!(v.is_null());
        let v: Vec<String> = decode_or_default(Some("[1,2"), "tags");
        assert!(v.is_empty());
    }

    #[test]
    fn valid_json_decodes() {
        let v: Vec<String> = decode_or_default(Some(r#"["a","b"]"#), "tags");
        assert_eq!(v, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn optional_column() {
        assert_eq!(decode_optional(Some(""), "enc"), None);
        assert_eq!(decode_optional(Some("oops"), "enc"), None);
        assert_eq!(
            decode_optional(Some(r#"{"k":1}"#), "enc"),
            Some(serde_json::json!({"k":1}))
        );
    }

    proptest::proptest! {
        // Any string whatsoever must decode without panicking.
        #[test]
        fn never_panics(raw in ".*") {
            let _: Vec<String> = decode_or_default(Some(&raw), "fuzz");
            let _ = decode_optional(Some(&raw), "fuzz");
        }
    }
}
