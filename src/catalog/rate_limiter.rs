//! Process-wide request gate for the catalog provider.
//!
//! The provider enforces a hard quota of N requests per rolling second. The
//! [`RateLimiter`] keeps the issue times of the last N requests and makes a
//! caller wait until the oldest one has left the window.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use catalog_relay::catalog::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::per_second(5));
//!
//! // Up to five calls proceed immediately, the sixth waits for the window.
//! for _ in 0..6 {
//!     limiter.acquire().await;
//! }
//! # }
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Default provider quota.
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 5;

const WINDOW: Duration = Duration::from_secs(1);

/// Sliding-window limiter shared by every component calling the catalog.
///
/// Designed to be wrapped in `Arc` and cloned into each client. Waiters are
/// served in arrival order because the window lock is held while sleeping.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum acquisitions per rolling second; `None` disables limiting.
    max_per_window: Option<usize>,
    /// Issue times of the most recent acquisitions, oldest first.
    issued: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `requests` acquisitions per rolling second.
    ///
    /// A value of zero is treated as one.
    #[must_use]
    #[instrument]
    pub fn per_second(requests: u32) -> Self {
        let max = usize::try_from(requests.max(1)).unwrap_or(usize::MAX);
        debug!(max, "creating catalog rate limiter");
        Self {
            max_per_window: Some(max),
            issued: Mutex::new(VecDeque::with_capacity(max)),
        }
    }

    /// Creates a limiter that never waits. Used by tests and local mocks.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_per_window: None,
            issued: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns whether limiting is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.max_per_window.is_none()
    }

    /// Waits until a request slot is available, then claims it.
    ///
    /// Never fails; backpressure is always resolved by waiting.
    pub async fn acquire(&self) {
        let Some(max) = self.max_per_window else {
            return;
        };

        let mut issued = self.issued.lock().await;
        loop {
            let now = Instant::now();
            while issued
                .front()
                .is_some_and(|oldest| now.duration_since(*oldest) >= WINDOW)
            {
                issued.pop_front();
            }

            if issued.len() < max {
                issued.push_back(now);
                return;
            }

            // Full window: wait for the oldest slot to expire.
            if let Some(oldest) = issued.front().copied() {
                let wake_at = oldest + WINDOW;
                debug!(
                    delay_ms = wake_at.saturating_duration_since(now).as_millis(),
                    "catalog rate limit reached, waiting"
                );
                tokio::time::sleep_until(wake_at).await;
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_second(DEFAULT_REQUESTS_PER_SECOND)
    }
}
