//! Token bucket rate limiter shared by all request attempts.

use crate::GitlabError;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A token bucket sized by `(rate, burst)`.
///
/// The bucket starts full. [`acquire`](Self::acquire) takes one token,
/// sleeping until one becomes available; the sleep is cancellation-aware.
/// Safe for concurrent use: workers share one limiter behind an `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<Bucket>,
    /// Tokens replenished per second.
    rate: f64,
    burst: f64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

impl RateLimiter {
    /// Create a limiter replenishing `rate` tokens per second with the given
    /// burst capacity. Non-positive inputs are clamped to a working minimum.
    #[must_use]
    pub fn new(rate: f64, burst: u32) -> Self {
        let rate = if rate > 0.0 { rate } else { 1.0 };
        let burst = f64::from(burst.max(1));
        Self {
            state: Mutex::new(Bucket {
                tokens: burst,
                refilled_at: Instant::now(),
            }),
            rate,
            burst,
        }
    }

    /// Block until a token is available, then consume it.
    ///
    /// # Errors
    ///
    /// [`GitlabError::Cancelled`] if the token is cancelled during the wait.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), GitlabError> {
        loop {
            let wait = {
                let mut bucket = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
                bucket.refilled_at = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return Ok(());
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate)
            };

            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                () = cancel.cancelled() => return Err(GitlabError::Cancelled),
            }
        }
    }
}
