//! API version negotiation: path, `X-API-Version` header, Accept media
//! type, or `?version=` query.

use axum::http::{HeaderMap, Uri};

use crate::envelope::ApiError;

pub const SUPPORTED_VERSIONS: &[&str] = &["v1"];

/// Extract the requested version, if any, and check it is supported.
///
/// `None` (nothing requested anywhere) means the default (latest) version.
pub fn negotiate(uri: &Uri, headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let mut requested: Option<String> = None;

    // Path: /api/v1/...
    let path = uri.path();
    if let Some(rest) = path.strip_prefix("/api/")
        && let Some(first) = rest.split('/').next()
        && first.len() >= 2
        && first.starts_with('v')
        && first[1..].chars().all(|c| c.is_ascii_digit())
    {
        requested = Some(first.to_string());
    }

    // X-API-Version: "v1" or "1".
    if requested.is_none()
        && let Some(value) = headers.get("x-api-version").and_then(|v| v.to_str().ok())
    {
        requested = Some(normalize(value));
    }

    // Accept: application/vnd.mochi-link.v1+json
    if requested.is_none()
        && let Some(accept) = headers.get("accept").and_then(|v| v.to_str().ok())
        && let Some(idx) = accept.find("vnd.mochi-link.")
    {
        let tail = &accept[idx + "vnd.mochi-link.".len()..];
        let version: String = tail.chars().take_while(|c| *c != '+' && *c != ';').collect();
        if !version.is_empty() {
            requested = Some(normalize(&version));
        }
    }

    // ?version=1
    if requested.is_none()
        && let Some(query) = uri.query()
    {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("version=") {
                requested = Some(normalize(value));
                break;
            }
        }
    }

    match requested {
        None => Ok(None),
        Some(v) if SUPPORTED_VERSIONS.contains(&v.as_str()) => Ok(Some(v)),
        Some(_) => Err(ApiError::version_not_supported(SUPPORTED_VERSIONS)),
    }
}

fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('v') {
        trimmed.to_string()
    } else {
        format!("v{trimmed}")
    }
}
