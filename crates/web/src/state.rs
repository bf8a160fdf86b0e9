use std::sync::Arc;

use {mochi_hub::Hub, mochi_routing::SlidingWindow};

/// Per-token request rate limit (`security.rateLimit`).
#[derive(Debug, Clone, Copy)]
pub struct ApiRateLimit {
    pub window_ms: u64,
    pub max_requests: u32,
}

/// Axum state for the admin API.
#[derive(Clone)]
pub struct WebState {
    pub hub: Arc<Hub>,
    pub rate_limit: Option<ApiRateLimit>,
    pub limiter: Arc<SlidingWindow>,
}

impl WebState {
    pub fn new(hub: Arc<Hub>, rate_limit: Option<ApiRateLimit>) -> Self {
        Self {
            hub,
            rate_limit,
            limiter: Arc::new(SlidingWindow::new()),
        }
    }
}
