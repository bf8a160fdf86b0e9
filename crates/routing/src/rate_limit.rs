//! Sliding-window rate limiting keyed by route.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::{Duration, Instant},
};

/// Sliding-window counters keyed by an arbitrary route string.
///
/// Window and limit are supplied per call so each binding can carry its own
/// settings while sharing one limiter.
#[derive(Default)]
pub struct SlidingWindow {
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempt for `key`; true when it fits within
    /// `max` hits per `window`.
    pub fn allow(&self, key: &str, window: Duration, max: u32) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        let queue = hits.entry(key.to_string()).or_default();

        while let Some(front) = queue.front() {
            if now.duration_since(*front) >= window {
                queue.pop_front();
            } else {
                break;
            }
        }

        if queue.len() >= max as usize {
            return false;
        }
        queue.push_back(now);
        true
    }

    /// Drop windows with no hits newer than `max_age`. Called periodically
    /// so abandoned routes do not accumulate.
    pub fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        hits.retain(|_, queue| {
            queue
                .back()
                .is_some_and(|last| now.duration_since(*last) < max_age)
        });
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.hits.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn n_pass_then_drop() {
        let limiter = SlidingWindow::new();
        let window = Duration::from_secs(60);
        for _ in 0..3 {
            assert!(limiter.allow("g1:s1", window, 3));
        }
        assert!(!limiter.allow("g1:s1", window, 3));
        // Other routes are unaffected.
        assert!(limiter.allow("g2:s1", window, 3));
    }

    #[test]
    fn window_resets() {
        let limiter = SlidingWindow::new();
        let window = Duration::from_millis(40);
        assert!(limiter.allow("k", window, 1));
        assert!(!limiter.allow("k", window, 1));
        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.allow("k", window, 1));
    }

    #[test]
    fn cleanup_drops_stale_routes() {
        let limiter = SlidingWindow::new();
        assert!(limiter.allow("stale", Duration::from_millis(10), 5));
        std::thread::sleep(Duration::from_millis(30));
        limiter.cleanup(Duration::from_millis(20));
        assert_eq!(limiter.tracked_keys(), 0);
    }

    proptest::proptest! {
        // Exactly `max` attempts succeed inside one window, regardless of max.
        #[test]
        fn exactly_max_pass(max in 1u32..50) {
            let limiter = SlidingWindow::new();
            let window = Duration::from_secs(300);
            let mut passed = 0;
            for _ in 0..(max + 10) {
                if limiter.allow("k", window, max) {
                    passed += 1;
                }
            }
            proptest::prop_assert_eq!(passed, max);
        }
    }
}
