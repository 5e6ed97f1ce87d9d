//! Reconciliation engine for dotlab
//!
//! Computes the change list between parsed local entries and the remote
//! variable store ([`Engine::diff`]), then drives the mutations through a
//! bounded worker pool with streaming results, cooperative cancellation,
//! and a dry-run mode ([`Engine::apply`]).
//!
//! The engine talks to GitLab through the minimal [`VariablesApi`]
//! capability set so tests can substitute an in-memory fake.

mod api;
mod change;
mod engine;
mod report;

pub use api::VariablesApi;
pub use change::{Change, ChangeKind, DiffResult};
pub use engine::{Engine, Options};
pub use report::{ApplyResult, SyncReport};

use dotlab_gitlab::GitlabError;
use thiserror::Error;

/// A per-change apply failure, carrying the operation and key.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("create {key}: {source}")]
    Create {
        key: String,
        #[source]
        source: GitlabError,
    },

    #[error("update {key}: {source}")]
    Update {
        key: String,
        #[source]
        source: GitlabError,
    },

    #[error("delete {key}: {source}")]
    Delete {
        key: String,
        #[source]
        source: GitlabError,
    },

    /// The run was cancelled before this change was attempted.
    #[error("cancelled before {key} was applied")]
    Cancelled { key: String },
}
