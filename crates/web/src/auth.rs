//! Bearer-token authentication for the admin API.
//!
//! A bearer token is an API token issued for a server; it authenticates as
//! that server's owner. Authorization per target server then goes through
//! the ACL like every other path.

use {
    axum::http::HeaderMap,
    mochi_common::now_ms,
    mochi_hub::Actor,
};

use crate::{envelope::ApiError, state::WebState};

pub async fn authenticate(state: &WebState, headers: &HeaderMap) -> Result<Actor, ApiError> {
    let token = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(ApiError::unauthenticated)?;

    let hash = mochi_auth::sha256_hex(token);

    // Per-token request budget; keyed by hash so the raw secret never
    // lands in the limiter.
    if let Some(limit) = state.rate_limit
        && !state.limiter.allow(
            &hash,
            std::time::Duration::from_millis(limit.window_ms),
            limit.max_requests,
        )
    {
        return Err(ApiError::new(
            mochi_common::ErrorKind::RateLimited,
            "request rate limit exceeded",
        ));
    }

    let record = state
        .hub
        .store()
        .find_token_by_hash(&hash)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "token lookup failed");
            ApiError::new(mochi_common::ErrorKind::Internal, "internal error")
        })?
        .ok_or_else(ApiError::unauthenticated)?;

    if let Some(expires_at) = record.expires_at
        && now_ms() >= expires_at
    {
        return Err(ApiError::unauthenticated());
    }

    let server = state
        .hub
        .store()
        .get_server(&record.server_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "server lookup failed");
            ApiError::new(mochi_common::ErrorKind::Internal, "internal error")
        })?
        .ok_or_else(ApiError::unauthenticated)?;

    let mut actor = Actor::new(server.owner_id);
    actor.user_agent = headers
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Ok(actor)
}
