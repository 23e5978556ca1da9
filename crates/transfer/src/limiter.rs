//! Process-wide token bucket for outbound fetches.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Refill rate in tokens per second. Zero, negative or non-finite
    /// disables limiting.
    pub per_second: f64,
    /// Bucket capacity.
    pub burst: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            per_second: 20.0,
            burst: 40,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, rate: f64, burst: f64) {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(burst);
        self.last = now;
    }
}

/// Token bucket shared by every assembly in the process.
///
/// Waiters queue on a fair async mutex, so tokens are handed out in arrival
/// order. The bucket starts full.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        let burst = f64::from(limit.burst.max(1));
        let rate = if limit.per_second.is_finite() {
            limit.per_second
        } else {
            0.0
        };
        Self {
            rate,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    /// Waits until a token is available and takes it.
    pub async fn acquire(&self) {
        if self.rate <= 0.0 {
            return;
        }

        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now(), self.rate, self.burst);
        if bucket.tokens < 1.0 {
            let wait = Duration::try_from_secs_f64((1.0 - bucket.tokens) / self.rate)
                .unwrap_or(Duration::MAX);
            tokio::time::sleep(wait).await;
            bucket.refill(Instant::now(), self.rate, self.burst);
        }
        bucket.tokens -= 1.0;
    }
}
