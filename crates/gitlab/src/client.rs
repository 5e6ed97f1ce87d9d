//! Retry-aware HTTP request execution.

use crate::{GitlabError, RateLimiter};
use rand::Rng;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Backoff never exceeds this, whatever the attempt count says.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Clamp on the exponent so the shift cannot overflow.
const MAX_BACKOFF_SHIFT: u32 = 30;

/// Connection settings for [`Client`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// GitLab base URL, e.g. `https://gitlab.com`.
    pub base_url: String,
    /// Private token attached to every request.
    pub token: String,
    /// Sustained request rate; 0 selects the default of 10.
    pub requests_per_second: f64,
    /// Bucket burst; 0 selects `max(1, ceil(rps))`.
    pub burst: u32,
    /// Retries after the first attempt; 0 selects the default of 3.
    pub retry_max: u32,
    /// First backoff step; zero selects the default of 1s.
    pub retry_initial_backoff: Duration,
    /// Underlying HTTP client; defaults to a 30s-timeout client.
    pub http: Option<reqwest::Client>,
}

/// Rate-limited, retry-aware HTTP client for the GitLab API.
///
/// The limiter and the HTTP connection pool are shared read-only across
/// workers; both are safe for concurrent use.
#[derive(Debug)]
pub struct Client {
    pub(crate) base_url: String,
    token: String,
    retry_max: u32,
    retry_initial_backoff: Duration,
    limiter: RateLimiter,
    http: reqwest::Client,
}

impl Client {
    /// Build a client, applying defaults for zero-value config fields.
    #[must_use]
    pub fn new(mut cfg: ClientConfig) -> Self {
        let rps = if cfg.requests_per_second > 0.0 {
            cfg.requests_per_second
        } else {
            10.0
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let burst = if cfg.burst > 0 {
            cfg.burst
        } else {
            (rps.ceil() as u32).max(1)
        };
        let retry_max = if cfg.retry_max > 0 { cfg.retry_max } else { 3 };
        let retry_initial_backoff = if cfg.retry_initial_backoff.is_zero() {
            Duration::from_secs(1)
        } else {
            cfg.retry_initial_backoff
        };

        // Building the default client only fails on broken TLS setups;
        // treat that as a fatal environment problem.
        let http = cfg.http.take().unwrap_or_else(|| {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to create HTTP client - TLS backend initialization failed")
        });

        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            token: cfg.token,
            retry_max,
            retry_initial_backoff,
            limiter: RateLimiter::new(rps, burst),
            http,
        }
    }

    /// Execute one logical request with rate limiting, retry, and backoff.
    ///
    /// The body is buffered once so it can be replayed across attempts.
    /// 401 aborts immediately; 429 honours `Retry-After`; 5xx and transport
    /// errors back off exponentially until the retry budget runs out.
    pub(crate) async fn execute(
        &self,
        cancel: &CancellationToken,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, GitlabError> {
        let mut attempt: u32 = 0;
        loop {
            // One token per attempt, not per logical call.
            self.limiter.acquire(cancel).await?;

            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header("PRIVATE-TOKEN", &self.token);
            if let Some(bytes) = &body {
                request = request
                    .header(CONTENT_TYPE, "application/json")
                    .body(bytes.clone());
            }

            let sent = tokio::select! {
                sent = request.send() => sent,
                () = cancel.cancelled() => return Err(GitlabError::Cancelled),
            };

            let response = match sent {
                Ok(response) => response,
                Err(err) => {
                    warn!(%method, %url, attempt, error = %err, "transport error");
                    if attempt >= self.retry_max {
                        return Err(GitlabError::RetriesExhausted {
                            attempts: attempt + 1,
                            source: Box::new(GitlabError::Transport(err)),
                        });
                    }
                    self.backoff_sleep(cancel, attempt, Duration::ZERO).await?;
                    attempt += 1;
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                return Err(GitlabError::AuthFailed);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let extra = parse_retry_after(response.headers());
                drop(response);
                if attempt >= self.retry_max {
                    return Err(GitlabError::RateLimitExhausted {
                        attempts: attempt + 1,
                    });
                }
                debug!(attempt, retry_after_secs = extra.as_secs(), "throttled by server");
                self.backoff_sleep(cancel, attempt, extra).await?;
                attempt += 1;
                continue;
            }

            if status.is_server_error() {
                warn!(%method, %url, attempt, status = status.as_u16(), "server error");
                drop(response);
                if attempt >= self.retry_max {
                    return Err(GitlabError::RetriesExhausted {
                        attempts: attempt + 1,
                        source: Box::new(GitlabError::Server {
                            status: status.as_u16(),
                        }),
                    });
                }
                self.backoff_sleep(cancel, attempt, Duration::ZERO).await?;
                attempt += 1;
                continue;
            }

            return Ok(response);
        }
    }

    /// Sleep for the computed backoff, honouring cancellation.
    async fn backoff_sleep(
        &self,
        cancel: &CancellationToken,
        attempt: u32,
        extra: Duration,
    ) -> Result<(), GitlabError> {
        let delay = self.backoff(attempt, extra);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "retry backoff");
        tokio::select! {
            () = tokio::time::sleep(delay) => Ok(()),
            () = cancel.cancelled() => Err(GitlabError::Cancelled),
        }
    }

    /// `min(5min, initial * 2^attempt + jitter[0,500ms) + extra)`.
    fn backoff(&self, attempt: u32, extra: Duration) -> Duration {
        let exp = 1u32 << attempt.min(MAX_BACKOFF_SHIFT);
        let base = self.retry_initial_backoff.saturating_mul(exp);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..500));
        base.saturating_add(jitter).saturating_add(extra).min(MAX_BACKOFF)
    }
}

/// `Retry-After` as whole seconds; absent or unparseable reads as zero.
fn parse_retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(Duration::ZERO, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(initial_backoff_ms: u64) -> Client {
        Client::new(ClientConfig {
            base_url: "https://gitlab.example.com".into(),
            token: "t".into(),
            retry_initial_backoff: Duration::from_millis(initial_backoff_ms),
            ..ClientConfig::default()
        })
    }

    #[test]
    fn backoff_grows_exponentially() {
        let client = test_client(100);
        let first = client.backoff(0, Duration::ZERO);
        let third = client.backoff(2, Duration::ZERO);
        assert!(first >= Duration::from_millis(100));
        assert!(first < Duration::from_millis(600));
        assert!(third >= Duration::from_millis(400));
        assert!(third < Duration::from_millis(900));
    }

    #[test]
    fn backoff_is_capped_at_five_minutes() {
        let client = test_client(1000);
        // Far past the clamp; must not overflow and must stay at the cap.
        assert_eq!(client.backoff(63, Duration::ZERO), MAX_BACKOFF);
    }

    #[test]
    fn backoff_adds_retry_after_hint() {
        let client = test_client(1);
        let with_hint = client.backoff(0, Duration::from_secs(7));
        assert!(with_hint >= Duration::from_secs(7));
    }

    #[test]
    fn retry_after_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), Duration::ZERO);

        headers.insert("retry-after", "13".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Duration::from_secs(13));

        headers.insert("retry-after", "not-a-number".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Duration::ZERO);
    }

    #[test]
    fn defaults_applied_for_zero_config() {
        let client = Client::new(ClientConfig {
            base_url: "https://gitlab.com/".into(),
            ..ClientConfig::default()
        });
        assert_eq!(client.base_url, "https://gitlab.com");
        assert_eq!(client.retry_max, 3);
        assert_eq!(client.retry_initial_backoff, Duration::from_secs(1));
    }
}
