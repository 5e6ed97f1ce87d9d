//! Project variables: wire records, scope filtering, CRUD, pagination.

use crate::{Client, GitlabError};
use dotlab_classify::VarType;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_PER_PAGE: u32 = 100;

/// Defence against servers that hand out non-terminating `x-next-page`
/// values; listing past this many pages is reported as an error.
const MAX_PAGES: u32 = 1000;

/// How much of an error response body is quoted in diagnostics.
const ERROR_BODY_LIMIT: usize = 512;

/// A GitLab CI/CD project variable as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Variable {
    pub key: String,
    pub value: String,
    pub variable_type: VarType,
    pub environment_scope: String,
    pub protected: bool,
    pub masked: bool,
    pub raw: bool,
}

impl Default for Variable {
    fn default() -> Self {
        Self {
            key: String::new(),
            value: String::new(),
            variable_type: VarType::EnvVar,
            environment_scope: "*".to_string(),
            protected: false,
            masked: false,
            raw: false,
        }
    }
}

/// Payload for creating or updating a variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsertRequest {
    pub key: String,
    pub value: String,
    pub variable_type: VarType,
    pub environment_scope: String,
    pub protected: bool,
    pub masked: bool,
    pub raw: bool,
}

/// Pagination and filtering for [`Client::list_variables`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Scope filter forwarded to the server; empty means unfiltered.
    pub environment_scope: String,
    /// First page to fetch; 0 means page 1.
    pub page: u32,
    /// Page size; 0 means the default of 100.
    pub per_page: u32,
}

/// Client-side scope filtering.
///
/// The list endpoint does not reliably honour `filter[environment_scope]`
/// (<https://gitlab.com/gitlab-org/gitlab/-/issues/343169>), so the response
/// is filtered again locally:
///
/// - empty scope: everything passes
/// - scope `*`: only variables scoped exactly `*`
/// - specific scope: variables with that scope or the wildcard `*`
///
/// Input order is preserved.
#[must_use]
pub fn filter_by_scope(vars: Vec<Variable>, scope: &str) -> Vec<Variable> {
    if scope.is_empty() {
        return vars;
    }
    vars.into_iter()
        .filter(|v| {
            v.environment_scope == scope || (scope != "*" && v.environment_scope == "*")
        })
        .collect()
}

impl Client {
    /// All variables for the project, following pagination to the end.
    ///
    /// # Errors
    ///
    /// Transport-level failures, non-200 responses, undecodable pages, and
    /// [`GitlabError::PaginationLoop`] past the page cap.
    pub async fn list_variables(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        opts: ListOptions,
    ) -> Result<Vec<Variable>, GitlabError> {
        let per_page = if opts.per_page == 0 {
            DEFAULT_PER_PAGE
        } else {
            opts.per_page
        };
        let mut page = if opts.page == 0 { 1 } else { opts.page };
        let mut all = Vec::new();

        for _ in 0..MAX_PAGES {
            let mut url = self.variables_url(project_id, None)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("per_page", &per_page.to_string());
                query.append_pair("page", &page.to_string());
                if !opts.environment_scope.is_empty() {
                    query.append_pair("filter[environment_scope]", &opts.environment_scope);
                }
            }

            let response = self.execute(cancel, Method::GET, url, None).await?;
            if response.status() != StatusCode::OK {
                return Err(remote_error(response).await);
            }

            let next = next_page(response.headers());
            let page_vars: Vec<Variable> =
                response.json().await.map_err(GitlabError::Decode)?;
            all.extend(page_vars);

            match next {
                // A next page that does not advance would loop forever.
                Some(n) if n > page => page = n,
                _ => {
                    debug!(project = project_id, count = all.len(), "listed variables");
                    return Ok(all);
                }
            }
        }

        Err(GitlabError::PaginationLoop {
            max_pages: MAX_PAGES,
        })
    }

    /// Create a new variable. Expects `201 Created`.
    pub async fn create_variable(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        request: &UpsertRequest,
    ) -> Result<Variable, GitlabError> {
        let body = serde_json::to_vec(request).map_err(GitlabError::Encode)?;
        let url = self.variables_url(project_id, None)?;

        let response = self.execute(cancel, Method::POST, url, Some(body)).await?;
        if response.status() != StatusCode::CREATED {
            return Err(remote_error(response).await);
        }
        response.json().await.map_err(GitlabError::Decode)
    }

    /// Update an existing variable addressed by key and the request's scope.
    /// Expects `200 OK`.
    pub async fn update_variable(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        request: &UpsertRequest,
    ) -> Result<Variable, GitlabError> {
        let body = serde_json::to_vec(request).map_err(GitlabError::Encode)?;
        let mut url = self.variables_url(project_id, Some(&request.key))?;
        if !request.environment_scope.is_empty() {
            url.query_pairs_mut()
                .append_pair("filter[environment_scope]", &request.environment_scope);
        }

        let response = self.execute(cancel, Method::PUT, url, Some(body)).await?;
        if response.status() != StatusCode::OK {
            return Err(remote_error(response).await);
        }
        response.json().await.map_err(GitlabError::Decode)
    }

    /// Delete a variable; `scope` is optional, empty omits the filter.
    /// Expects `204 No Content`.
    pub async fn delete_variable(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        key: &str,
        scope: &str,
    ) -> Result<(), GitlabError> {
        let mut url = self.variables_url(project_id, Some(key))?;
        if !scope.is_empty() {
            url.query_pairs_mut()
                .append_pair("filter[environment_scope]", scope);
        }

        let response = self.execute(cancel, Method::DELETE, url, None).await?;
        if response.status() != StatusCode::NO_CONTENT {
            return Err(remote_error(response).await);
        }
        Ok(())
    }

    /// `{base}/api/v4/projects/{project}/variables[/{key}]` with both path
    /// segments percent-escaped (project paths contain `/`).
    fn variables_url(&self, project_id: &str, key: Option<&str>) -> Result<Url, GitlabError> {
        let mut raw = format!(
            "{}/api/v4/projects/{}/variables",
            self.base_url,
            urlencoding::encode(project_id)
        );
        if let Some(key) = key {
            raw.push('/');
            raw.push_str(&urlencoding::encode(key));
        }
        Ok(Url::parse(&raw)?)
    }
}

/// Read the `x-next-page` response header; `""` and `"0"` end pagination.
fn next_page(headers: &HeaderMap) -> Option<u32> {
    let value = headers.get("x-next-page")?.to_str().ok()?;
    match value.trim() {
        "" | "0" => None,
        n => n.parse().ok(),
    }
}

/// Fold a non-success response into [`GitlabError::Remote`], quoting up to
/// 512 bytes of the body.
async fn remote_error(response: reqwest::Response) -> GitlabError {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    GitlabError::Remote { status, body }
}
