//! The mutation capability set the engine needs from the remote store.

use async_trait::async_trait;
use dotlab_gitlab::{Client, GitlabError, UpsertRequest, Variable};
use tokio_util::sync::CancellationToken;

/// Subset of the GitLab client used during apply.
///
/// Listing is deliberately absent: callers fetch remote entries themselves
/// and hand them to [`Engine::diff`](crate::Engine::diff), which keeps the
/// diff logic testable without HTTP at all.
#[async_trait]
pub trait VariablesApi: Send + Sync {
    async fn create_variable(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        request: &UpsertRequest,
    ) -> Result<Variable, GitlabError>;

    async fn update_variable(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        request: &UpsertRequest,
    ) -> Result<Variable, GitlabError>;

    async fn delete_variable(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        key: &str,
        scope: &str,
    ) -> Result<(), GitlabError>;
}

#[async_trait]
impl VariablesApi for Client {
    async fn create_variable(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        request: &UpsertRequest,
    ) -> Result<Variable, GitlabError> {
        Client::create_variable(self, cancel, project_id, request).await
    }

    async fn update_variable(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        request: &UpsertRequest,
    ) -> Result<Variable, GitlabError> {
        Client::update_variable(self, cancel, project_id, request).await
    }

    async fn delete_variable(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        key: &str,
        scope: &str,
    ) -> Result<(), GitlabError> {
        Client::delete_variable(self, cancel, project_id, key, scope).await
    }
}
