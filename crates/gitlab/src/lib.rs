//! GitLab CI/CD variables API client for dotlab
//!
//! A small HTTP client specialised for the project variables endpoints with
//! four responsibilities: authentication injection, rate limiting, retry
//! with exponential backoff, and the CRUD + paginated list surface.
//!
//! Every request takes one token from a shared [`RateLimiter`] per attempt,
//! and every wait (limiter, backoff, in-flight I/O) honours the caller's
//! [`CancellationToken`](tokio_util::sync::CancellationToken).

mod client;
mod error;
mod limiter;
mod variables;

pub use client::{Client, ClientConfig};
pub use error::GitlabError;
pub use limiter::RateLimiter;
pub use variables::{filter_by_scope, ListOptions, UpsertRequest, Variable};
