//! Diff computation and bounded-concurrency apply.

use crate::{ApplyResult, Change, ChangeKind, DiffResult, SyncError, SyncReport, VariablesApi};
use dotlab_classify::Classifier;
use dotlab_envfile::EnvVar;
use dotlab_gitlab::{filter_by_scope, UpsertRequest, Variable};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Engine behaviour knobs.
#[derive(Debug, Clone)]
pub struct Options {
    /// Concurrent apply workers; 0 selects the default of 5.
    pub workers: usize,
    /// Tally intent without issuing any remote mutation.
    pub dry_run: bool,
    /// Emit deletes for remote-only keys.
    pub delete_missing: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            workers: 5,
            dry_run: false,
            delete_missing: false,
        }
    }
}

/// Orchestrates diff and apply for one project.
///
/// Stateless across runs: it holds only the API handle, the classifier,
/// and the options it was built with.
pub struct Engine {
    api: Arc<dyn VariablesApi>,
    classifier: Classifier,
    opts: Options,
    project_id: String,
}

impl Engine {
    #[must_use]
    pub fn new(
        api: Arc<dyn VariablesApi>,
        classifier: Classifier,
        mut opts: Options,
        project_id: impl Into<String>,
    ) -> Self {
        if opts.workers == 0 {
            opts.workers = 5;
        }
        Self {
            api,
            classifier,
            opts,
            project_id: project_id.into(),
        }
    }

    /// Compute the changes that bring the remote store in line with `local`.
    ///
    /// `remote` is scope-filtered client-side first. The per-key remote
    /// index prefers an exact-scope record over a wildcard one, so the value
    /// comparison and the target of any follow-up mutation are the most
    /// specific match. A key whose only remote record sits on a different
    /// specific scope is *created* at the target scope; updating it would
    /// address a record the API cannot find under this scope filter.
    #[must_use]
    pub fn diff(&self, local: &[EnvVar], remote: Vec<Variable>, scope: &str) -> DiffResult {
        let remote = filter_by_scope(remote, scope);

        let mut remote_index: HashMap<&str, &Variable> = HashMap::with_capacity(remote.len());
        for var in &remote {
            let replace = remote_index
                .get(var.key.as_str())
                .map_or(true, |existing| existing.environment_scope == "*");
            if replace {
                remote_index.insert(var.key.as_str(), var);
            }
        }

        let mut local_keys: HashSet<&str> = HashSet::with_capacity(local.len());
        let mut changes = Vec::with_capacity(local.len());

        for entry in local {
            local_keys.insert(entry.key.as_str());
            let cl = self.classifier.classify(&entry.key, &entry.value, scope);

            let remote_var = remote_index.get(entry.key.as_str()).copied();
            let scope_match = remote_var
                .is_some_and(|rv| rv.environment_scope == scope || rv.environment_scope == "*");

            match remote_var {
                Some(rv) if scope_match => {
                    let drifted = rv.value != entry.value
                        || rv.variable_type != cl.var_type
                        || rv.masked != cl.masked
                        || rv.protected != cl.protected;
                    if drifted {
                        changes.push(Change {
                            kind: ChangeKind::Update,
                            key: entry.key.clone(),
                            old_value: Some(rv.value.clone()),
                            new_value: Some(entry.value.clone()),
                            classification: Some(cl),
                            skip_reason: None,
                            scope: rv.environment_scope.clone(),
                            raw: rv.raw,
                        });
                    } else {
                        changes.push(Change {
                            kind: ChangeKind::Unchanged,
                            key: entry.key.clone(),
                            old_value: Some(rv.value.clone()),
                            new_value: Some(entry.value.clone()),
                            classification: Some(cl),
                            skip_reason: None,
                            scope: rv.environment_scope.clone(),
                            raw: rv.raw,
                        });
                    }
                }
                _ => changes.push(Change {
                    kind: ChangeKind::Create,
                    key: entry.key.clone(),
                    old_value: None,
                    new_value: Some(entry.value.clone()),
                    classification: Some(cl),
                    skip_reason: None,
                    scope: scope.to_string(),
                    raw: false,
                }),
            }
        }

        if self.opts.delete_missing {
            for rv in &remote {
                if !local_keys.contains(rv.key.as_str()) {
                    changes.push(Change {
                        kind: ChangeKind::Delete,
                        key: rv.key.clone(),
                        old_value: Some(rv.value.clone()),
                        new_value: None,
                        classification: None,
                        skip_reason: None,
                        scope: rv.environment_scope.clone(),
                        raw: rv.raw,
                    });
                }
            }
        }

        DiffResult { changes }
    }

    /// Apply all changes; equivalent to [`apply_with_callback`] with a no-op
    /// callback.
    ///
    /// [`apply_with_callback`]: Self::apply_with_callback
    pub async fn apply(&self, cancel: &CancellationToken, diff: DiffResult) -> SyncReport {
        self.apply_with_callback(cancel, diff, |_| {}).await
    }

    /// Apply all changes through the worker pool.
    ///
    /// `on_result` is invoked synchronously on the collector for every
    /// result, in completion order, which allows streaming UIs; it must not
    /// block indefinitely. Failures never halt sibling workers, and
    /// cancellation drains the pool rather than abandoning it, so the
    /// returned report always covers the full change list.
    pub async fn apply_with_callback<F>(
        &self,
        cancel: &CancellationToken,
        diff: DiffResult,
        mut on_result: F,
    ) -> SyncReport
    where
        F: FnMut(&ApplyResult),
    {
        let started = Instant::now();
        let mut report = SyncReport::default();

        // Non-actionable changes are counted up front and never enqueued.
        let mut actionable = Vec::new();
        for change in diff.changes {
            match change.kind {
                ChangeKind::Unchanged => {
                    report.unchanged += 1;
                    on_result(&ApplyResult::ok(change));
                }
                ChangeKind::Skipped => {
                    report.skipped += 1;
                    on_result(&ApplyResult::ok(change));
                }
                _ => actionable.push(change),
            }
        }

        if actionable.is_empty() {
            report.duration = started.elapsed();
            return report;
        }

        debug!(
            actionable = actionable.len(),
            workers = self.opts.workers,
            dry_run = self.opts.dry_run,
            "starting apply"
        );

        // Result channel sized to the task count so workers never block on
        // emit; the semaphore bounds how many tasks run at once.
        let (tx, mut rx) = mpsc::channel::<ApplyResult>(actionable.len());
        let semaphore = Arc::new(Semaphore::new(self.opts.workers));
        let mut pool = JoinSet::new();

        for change in actionable {
            let api = Arc::clone(&self.api);
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            let cancel = cancel.clone();
            let project_id = self.project_id.clone();
            let dry_run = self.opts.dry_run;
            pool.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                // Fail fast on queued work once cancellation is observed;
                // the task still reports so the collector sees every change.
                let result = if cancel.is_cancelled() {
                    ApplyResult {
                        error: Some(SyncError::Cancelled {
                            key: change.key.clone(),
                        }),
                        change,
                    }
                } else {
                    apply_one(api.as_ref(), &cancel, &project_id, dry_run, change).await
                };
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        // Single-threaded collector: counters are never shared.
        while let Some(result) = rx.recv().await {
            on_result(&result);
            let ApplyResult { change, error } = result;
            if let Some(err) = error {
                report.failed += 1;
                report.errors.push(err);
                continue;
            }
            match change.kind {
                ChangeKind::Create => report.created += 1,
                ChangeKind::Update => report.updated += 1,
                ChangeKind::Delete => report.deleted += 1,
                ChangeKind::Unchanged | ChangeKind::Skipped => continue,
            }
            if !self.opts.dry_run {
                report.api_calls += 1;
            }
        }

        while pool.join_next().await.is_some() {}

        report.duration = started.elapsed();
        report
    }
}

/// Route one change to the matching API call.
async fn apply_one(
    api: &dyn VariablesApi,
    cancel: &CancellationToken,
    project_id: &str,
    dry_run: bool,
    change: Change,
) -> ApplyResult {
    if dry_run {
        return ApplyResult::ok(change);
    }

    match change.kind {
        ChangeKind::Unchanged | ChangeKind::Skipped => ApplyResult::ok(change),

        ChangeKind::Create => {
            let request = upsert_request(&change);
            match api.create_variable(cancel, project_id, &request).await {
                Ok(_) => ApplyResult::ok(change),
                Err(source) => ApplyResult {
                    error: Some(SyncError::Create {
                        key: change.key.clone(),
                        source,
                    }),
                    change,
                },
            }
        }

        ChangeKind::Update => {
            let request = upsert_request(&change);
            match api.update_variable(cancel, project_id, &request).await {
                Ok(_) => ApplyResult::ok(change),
                Err(source) => ApplyResult {
                    error: Some(SyncError::Update {
                        key: change.key.clone(),
                        source,
                    }),
                    change,
                },
            }
        }

        ChangeKind::Delete => {
            match api
                .delete_variable(cancel, project_id, &change.key, &change.scope)
                .await
            {
                Ok(()) => ApplyResult::ok(change),
                Err(source) => ApplyResult {
                    error: Some(SyncError::Delete {
                        key: change.key.clone(),
                        source,
                    }),
                    change,
                },
            }
        }
    }
}

/// Build the wire payload for a create/update, defaulting the type to a
/// plain variable when no classification was attached.
fn upsert_request(change: &Change) -> UpsertRequest {
    let cl = change.classification.unwrap_or_default();
    UpsertRequest {
        key: change.key.clone(),
        value: change.new_value.clone().unwrap_or_default(),
        variable_type: cl.var_type,
        environment_scope: change.scope.clone(),
        protected: cl.protected,
        masked: cl.masked,
        raw: change.raw,
    }
}
