//! Input hygiene: XSS stripping, dangerous-key rejection, pagination
//! bounds.

use serde::Deserialize;

use crate::envelope::ApiError;

/// Object keys that poison JS consumers of stored data.
const FORBIDDEN_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// Strip HTML tags, `javascript:` URIs, and inline `on*=` handlers from a
/// string input.
pub fn sanitize_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {},
        }
    }

    // Remove javascript: scheme wherever it appears (case-insensitive).
    let lowered = out.to_lowercase();
    if lowered.contains("javascript:") {
        let mut cleaned = String::with_capacity(out.len());
        let mut rest = out.as_str();
        loop {
            let lower = rest.to_lowercase();
            match lower.find("javascript:") {
                Some(idx) => {
                    cleaned.push_str(&rest[..idx]);
                    rest = &rest[idx + "javascript:".len()..];
                },
                None => {
                    cleaned.push_str(rest);
                    break;
                },
            }
        }
        out = cleaned;
    }

    // Remove on*= event handler attributes.
    let re_like = |s: &str| {
        // "onclick=", "onload =" etc.: "on" + letters + optional spaces + '='
        let bytes = s.as_bytes();
        let mut result = String::with_capacity(s.len());
        let mut i = 0;
        while i < bytes.len() {
            let rest = &s[i..];
            let lower = rest.to_lowercase();
            if lower.starts_with("on") {
                let tail = &lower[2..];
                let alpha_len = tail.chars().take_while(|c| c.is_ascii_alphabetic()).count();
                if alpha_len > 0 {
                    let after = tail[alpha_len..].trim_start();
                    if after.starts_with('=') {
                        // Skip to and past the '='.
                        let eq_offset = rest
                            .char_indices()
                            .find(|(idx, c)| *idx >= 2 + alpha_len && *c == '=')
                            .map(|(idx, _)| idx + 1)
                            .unwrap_or(rest.len());
                        i += eq_offset;
                        continue;
                    }
                }
            }
            let ch_len = rest.chars().next().map(char::len_utf8).unwrap_or(1);
            result.push_str(&rest[..ch_len]);
            i += ch_len;
        }
        result
    };
    re_like(&out)
}

/// Recursively reject forbidden object keys and sanitize string values.
pub fn sanitize_json(value: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
    match value {
        serde_json::Value::Object(map) => {
            let mut cleaned = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                if FORBIDDEN_KEYS.contains(&key.as_str()) {
                    return Err(ApiError::validation(format!("forbidden object key: {key}")));
                }
                cleaned.insert(key.clone(), sanitize_json(val)?);
            }
            Ok(serde_json::Value::Object(cleaned))
        },
        serde_json::Value::Array(items) => Ok(serde_json::Value::Array(
            items.iter().map(sanitize_json).collect::<Result<_, _>>()?,
        )),
        serde_json::Value::String(s) => Ok(serde_json::Value::String(sanitize_string(s))),
        other => Ok(other.clone()),
    }
}

// ── Pagination ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl PageQuery {
    /// Assemble from separate query parameters, applying defaults.
    pub fn from_parts(page: Option<u32>, limit: Option<u32>) -> Self {
        let defaults = Self::default();
        Self {
            page: page.unwrap_or(defaults.page),
            limit: limit.unwrap_or(defaults.limit),
        }
    }

    /// Validate the documented bounds: page ≥ 1, limit 1–100.
    pub fn validated(self) -> Result<mochi_store::Page, ApiError> {
        if self.page < 1 {
            return Err(ApiError::validation("page must be >= 1"));
        }
        if !(1..=100).contains(&self.limit) {
            return Err(ApiError::validation("limit must be between 1 and 100"));
        }
        Ok(mochi_store::Page {
            page: self.page,
            limit: self.limit,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags() {
        assert_eq!(sanitize_string("<script>alert(1)</script>hi"), "alert(1)hi");
        assert_eq!(sanitize_string("plain"), "plain");
    }

    #[test]
    fn strips_javascript_uris() {
        assert_eq!(sanitize_string("JavaScript:alert(1)"), "alert(1)");
        assert_eq!(sanitize_string("go to javascript:void(0) now"), "go to void(0) now");
    }

    #[test]
    fn strips_event_handlers() {
        let out = sanitize_string("x onclick=alert(1) y");
        assert!(!out.to_lowercase().contains("onclick="), "got: {out}");
    }

    #[test]
    fn rejects_proto_keys() {
        let bad = serde_json::json!({ "__proto__": { "polluted": true } });
        assert!(sanitize_json(&bad).is_err());

        let nested = serde_json::json!({ "a": [{ "constructor": 1 }] });
        assert!(sanitize_json(&nested).is_err());
    }

    #[test]
    fn sanitizes_nested_strings() {
        let dirty = serde_json::json!({ "name": "<b>Bob</b>", "tags": ["<i>x</i>"] });
        let clean = sanitize_json(&dirty).unwrap();
        assert_eq!(clean["name"], "Bob");
        assert_eq!(clean["tags"][0], "x");
    }

    #[test]
    fn page_bounds() {
        assert!(PageQuery { page: 0, limit: 20 }.validated().is_err());
        assert!(PageQuery { page: 1, limit: 0 }.validated().is_err());
        assert!(PageQuery { page: 1, limit: 101 }.validated().is_err());
        let page = PageQuery { page: 2, limit: 50 }.validated().unwrap();
        assert_eq!(page.offset(), 50);
    }
}
