//! Error taxonomy for the variables API client.

use thiserror::Error;

/// Errors surfaced by [`Client`](crate::Client) operations.
#[derive(Debug, Error)]
pub enum GitlabError {
    /// HTTP 401. Never retried; the token will not get better on its own.
    #[error("authentication failed (HTTP 401); check the GitLab token")]
    AuthFailed,

    /// HTTP 429 kept coming back past the retry budget.
    #[error("rate limited by the server after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    /// HTTP 5xx from the server.
    #[error("server error (HTTP {status})")]
    Server { status: u16 },

    /// Any other non-success status, with up to 512 bytes of body quoted.
    #[error("unexpected status {status}: {body}")]
    Remote { status: u16, body: String },

    /// The retry budget ran out; wraps the last attempt's error.
    #[error("request failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<GitlabError>,
    },

    /// Cancellation observed while waiting or mid-flight.
    #[error("operation cancelled")]
    Cancelled,

    /// The response body did not decode as the expected JSON shape.
    #[error("decode response: {0}")]
    Decode(#[source] reqwest::Error),

    /// Request body failed to serialize.
    #[error("encode request: {0}")]
    Encode(#[source] serde_json::Error),

    /// Connection-level failure (DNS, TLS, timeout, reset).
    #[error("http transport: {0}")]
    Transport(#[source] reqwest::Error),

    /// The configured base URL or project path did not form a valid URL.
    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),

    /// The server kept handing out next pages past the defensive cap.
    #[error("variable listing exceeded {max_pages} pages; possible pagination loop")]
    PaginationLoop { max_pages: u32 },
}
