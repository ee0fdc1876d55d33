//! Token-bucket rate limiter shared across concurrent workers.
//!
//! One limiter instance gates every outbound registry and download
//! operation. The bucket refills continuously at the configured rate and
//! holds at most one second's worth of tokens, so a burst can never exceed
//! the per-second budget.
//!
//! # Fairness
//!
//! Waiters queue on the internal async mutex, so tokens are granted in
//! request order. There is no per-caller fairness beyond that.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token-bucket limiter bounding outbound operations per second.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<Bucket>,
    /// Tokens added per second; also the bucket capacity.
    rate: f64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter granting `per_second` tokens per second.
    ///
    /// The bucket starts full, so the first `per_second` acquisitions
    /// proceed without waiting.
    pub fn new(per_second: u32) -> Self {
        let rate = f64::from(per_second.max(1));
        tracing::debug!(per_second = rate, "created rate limiter");
        Self {
            state: Mutex::new(Bucket {
                tokens: rate,
                last_refill: Instant::now(),
            }),
            rate,
        }
    }

    /// Block until `n` tokens are available, then consume them.
    ///
    /// `n` is clamped to the bucket capacity; a request larger than one
    /// second's budget could otherwise never be satisfied.
    pub async fn acquire(&self, n: u32) {
        let needed = f64::from(n.max(1)).min(self.rate);

        // The lock is held across the sleep on purpose: it is what makes
        // token grants FIFO.
        let mut bucket = self.state.lock().await;
        loop {
            let now = Instant::now();
            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.rate);
            bucket.last_refill = now;

            if bucket.tokens >= needed {
                bucket.tokens -= needed;
                return;
            }

            let deficit = needed - bucket.tokens;
            let wait = Duration::from_secs_f64(deficit / self.rate);
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_initial_burst_is_free() {
        let limiter = RateLimiter::new(5);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire(1).await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_beyond_burst_waits() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        // 6 tokens at 2/s with a full 2-token bucket: 4 tokens must refill,
        // taking no less than 2 seconds.
        for _ in 0..6 {
            limiter.acquire(1).await;
        }
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_bucket() {
        let limiter = Arc::new(RateLimiter::new(4));
        let start = Instant::now();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire(1).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        // 8 tokens at 4/s with a full bucket: at least 1 second total.
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_request_is_clamped() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        // Asking for more than the capacity must not hang forever.
        limiter.acquire(100).await;
        limiter.acquire(100).await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_time_refills_bucket() {
        let limiter = RateLimiter::new(2);
        limiter.acquire(2).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        // Bucket refilled (and capped) while idle; this must not wait.
        let start = Instant::now();
        limiter.acquire(2).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
