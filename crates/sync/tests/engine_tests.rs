//! Engine diff and apply behaviour against an in-memory API fake.

use async_trait::async_trait;
use dotlab_classify::{Classifier, VarType};
use dotlab_envfile::EnvVar;
use dotlab_gitlab::{GitlabError, UpsertRequest, Variable};
use dotlab_sync::{ApplyResult, ChangeKind, Engine, Options, SyncError, VariablesApi};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Create(UpsertRequest),
    Update(UpsertRequest),
    Delete { key: String, scope: String },
}

/// In-memory stand-in for the GitLab client.
#[derive(Default)]
struct FakeApi {
    calls: Mutex<Vec<Call>>,
    fail_keys: HashSet<String>,
    /// Park every call until cancellation, then fail like the transport.
    wait_for_cancel: bool,
}

impl FakeApi {
    fn failing(keys: &[&str]) -> Self {
        Self {
            fail_keys: keys.iter().map(|k| (*k).to_string()).collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    async fn complete(&self, key: &str, cancel: &CancellationToken) -> Result<(), GitlabError> {
        if self.wait_for_cancel {
            cancel.cancelled().await;
            return Err(GitlabError::Cancelled);
        }
        if self.fail_keys.contains(key) {
            return Err(GitlabError::Server { status: 500 });
        }
        Ok(())
    }
}

#[async_trait]
impl VariablesApi for FakeApi {
    async fn create_variable(
        &self,
        cancel: &CancellationToken,
        _project_id: &str,
        request: &UpsertRequest,
    ) -> Result<Variable, GitlabError> {
        self.calls.lock().unwrap().push(Call::Create(request.clone()));
        self.complete(&request.key, cancel).await?;
        Ok(Variable {
            key: request.key.clone(),
            value: request.value.clone(),
            variable_type: request.variable_type,
            environment_scope: request.environment_scope.clone(),
            protected: request.protected,
            masked: request.masked,
            raw: request.raw,
        })
    }

    async fn update_variable(
        &self,
        cancel: &CancellationToken,
        _project_id: &str,
        request: &UpsertRequest,
    ) -> Result<Variable, GitlabError> {
        self.calls.lock().unwrap().push(Call::Update(request.clone()));
        self.complete(&request.key, cancel).await?;
        Ok(Variable {
            key: request.key.clone(),
            value: request.value.clone(),
            variable_type: request.variable_type,
            environment_scope: request.environment_scope.clone(),
            protected: request.protected,
            masked: request.masked,
            raw: request.raw,
        })
    }

    async fn delete_variable(
        &self,
        cancel: &CancellationToken,
        _project_id: &str,
        key: &str,
        scope: &str,
    ) -> Result<(), GitlabError> {
        self.calls.lock().unwrap().push(Call::Delete {
            key: key.to_string(),
            scope: scope.to_string(),
        });
        self.complete(key, cancel).await
    }
}

fn local(key: &str, value: &str) -> EnvVar {
    EnvVar {
        key: key.into(),
        value: value.into(),
        line: 1,
    }
}

fn remote(key: &str, value: &str, scope: &str) -> Variable {
    Variable {
        key: key.into(),
        value: value.into(),
        environment_scope: scope.into(),
        ..Variable::default()
    }
}

fn engine_with(api: Arc<FakeApi>, opts: Options) -> Engine {
    Engine::new(api, Classifier::default(), opts, "123")
}

fn kinds(changes: &[dotlab_sync::Change]) -> Vec<ChangeKind> {
    changes.iter().map(|c| c.kind).collect()
}

// --- diff -----------------------------------------------------------------

#[test]
fn diff_creates_when_remote_is_empty() {
    let engine = engine_with(Arc::default(), Options::default());
    let diff = engine.diff(&[local("A", "1")], vec![], "production");

    assert_eq!(diff.changes.len(), 1);
    let change = &diff.changes[0];
    assert_eq!(change.kind, ChangeKind::Create);
    assert_eq!(change.key, "A");
    assert_eq!(change.new_value.as_deref(), Some("1"));
    assert_eq!(change.scope, "production");
}

#[test]
fn diff_unchanged_when_identical() {
    let engine = engine_with(Arc::default(), Options::default());
    let diff = engine.diff(
        &[local("A", "1")],
        vec![remote("A", "1", "production")],
        "production",
    );
    assert_eq!(kinds(&diff.changes), [ChangeKind::Unchanged]);
    assert!(diff.is_noop());
}

#[test]
fn diff_updates_when_value_differs() {
    let engine = engine_with(Arc::default(), Options::default());
    let diff = engine.diff(
        &[local("A", "new")],
        vec![remote("A", "old", "production")],
        "production",
    );

    let change = &diff.changes[0];
    assert_eq!(change.kind, ChangeKind::Update);
    assert_eq!(change.old_value.as_deref(), Some("old"));
    assert_eq!(change.new_value.as_deref(), Some("new"));
    assert_eq!(change.scope, "production");
}

#[test]
fn diff_updates_when_classification_drifts() {
    // Same value, but the remote record is unmasked while the classifier
    // wants API_KEY masked.
    let engine = engine_with(Arc::default(), Options::default());
    let diff = engine.diff(
        &[local("API_KEY", "abcdef123456")],
        vec![remote("API_KEY", "abcdef123456", "staging")],
        "staging",
    );
    assert_eq!(kinds(&diff.changes), [ChangeKind::Update]);
}

#[test]
fn diff_creates_at_target_scope_when_remote_scope_differs() {
    let engine = engine_with(Arc::default(), Options::default());
    let diff = engine.diff(
        &[local("A", "new")],
        vec![remote("A", "old", "staging")],
        "production",
    );

    let change = &diff.changes[0];
    assert_eq!(change.kind, ChangeKind::Create);
    assert_eq!(change.scope, "production");
}

#[test]
fn diff_updates_wildcard_remote_in_place() {
    let engine = engine_with(Arc::default(), Options::default());
    let diff = engine.diff(
        &[local("A", "new")],
        vec![remote("A", "old", "*")],
        "production",
    );

    let change = &diff.changes[0];
    assert_eq!(change.kind, ChangeKind::Update);
    // The PUT must address the wildcard record, not "production".
    assert_eq!(change.scope, "*");
}

#[test]
fn diff_wildcard_remote_with_matching_value_is_unchanged() {
    let engine = engine_with(Arc::default(), Options::default());
    let diff = engine.diff(&[local("A", "1")], vec![remote("A", "1", "*")], "production");
    assert_eq!(kinds(&diff.changes), [ChangeKind::Unchanged]);
}

#[test]
fn diff_prefers_exact_scope_over_wildcard() {
    let engine = engine_with(Arc::default(), Options::default());
    // The wildcard record holds a stale value; the exact record matches.
    let diff = engine.diff(
        &[local("A", "1")],
        vec![remote("A", "stale", "*"), remote("A", "1", "production")],
        "production",
    );
    assert_eq!(kinds(&diff.changes), [ChangeKind::Unchanged]);
    assert_eq!(diff.changes[0].scope, "production");
}

#[test]
fn diff_emits_no_deletes_without_flag() {
    let engine = engine_with(Arc::default(), Options::default());
    let diff = engine.diff(&[], vec![remote("ORPHAN", "x", "*")], "production");
    assert!(diff.changes.is_empty());
}

#[test]
fn diff_deletes_remote_only_keys_with_flag() {
    let engine = engine_with(
        Arc::default(),
        Options {
            delete_missing: true,
            ..Options::default()
        },
    );
    let diff = engine.diff(
        &[local("KEEP", "1")],
        vec![remote("KEEP", "1", "production"), remote("ORPHAN", "x", "*")],
        "production",
    );

    assert_eq!(
        kinds(&diff.changes),
        [ChangeKind::Unchanged, ChangeKind::Delete]
    );
    let delete = &diff.changes[1];
    assert_eq!(delete.key, "ORPHAN");
    assert_eq!(delete.scope, "*");
}

#[test]
fn diff_preserves_local_file_order() {
    let engine = engine_with(Arc::default(), Options::default());
    let diff = engine.diff(
        &[local("Z", "1"), local("A", "2"), local("M", "3")],
        vec![],
        "*",
    );
    let keys: Vec<_> = diff.changes.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(keys, ["Z", "A", "M"]);
}

// --- apply ----------------------------------------------------------------

#[tokio::test]
async fn apply_twenty_creates_with_five_workers() {
    let api = Arc::new(FakeApi::default());
    let engine = engine_with(api.clone(), Options::default());
    let locals: Vec<EnvVar> = (0..20).map(|i| local(&format!("KEY_{i}"), "v")).collect();
    let diff = engine.diff(&locals, vec![], "production");

    let cancel = CancellationToken::new();
    let report = engine.apply(&cancel, diff).await;

    assert_eq!(report.created, 20);
    assert_eq!(report.failed, 0);
    assert_eq!(report.api_calls, 20);
    assert!(report.errors.is_empty());
    assert_eq!(api.calls().len(), 20);
}

#[tokio::test]
async fn apply_failing_task_does_not_stop_siblings() {
    let api = Arc::new(FakeApi::failing(&["BAD"]));
    let engine = engine_with(api.clone(), Options::default());
    let diff = engine.diff(
        &[local("GOOD_1", "a"), local("BAD", "b"), local("GOOD_2", "c")],
        vec![],
        "*",
    );
    let total = diff.changes.len();

    let cancel = CancellationToken::new();
    let report = engine.apply(&cancel, diff).await;

    assert_eq!(report.created, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(report.errors[0], SyncError::Create { ref key, .. } if key == "BAD"));
    assert_eq!(
        report.created + report.updated + report.deleted + report.unchanged + report.skipped
            + report.failed,
        total
    );
}

#[tokio::test]
async fn apply_dry_run_counts_intent_without_calls() {
    let api = Arc::new(FakeApi::default());
    let engine = engine_with(
        api.clone(),
        Options {
            dry_run: true,
            delete_missing: true,
            ..Options::default()
        },
    );
    let diff = engine.diff(
        &[local("NEW", "1"), local("CHANGED", "new")],
        vec![
            remote("CHANGED", "old", "production"),
            remote("ORPHAN", "x", "production"),
        ],
        "production",
    );

    let cancel = CancellationToken::new();
    let report = engine.apply(&cancel, diff).await;

    assert_eq!(report.created, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.api_calls, 0);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn apply_counts_unchanged_and_skipped_without_enqueueing() {
    let api = Arc::new(FakeApi::default());
    let engine = engine_with(api.clone(), Options::default());

    let mut diff = engine.diff(&[local("A", "1")], vec![remote("A", "1", "*")], "*");
    let mut skipped = dotlab_sync::Change::new(ChangeKind::Skipped, "PLACEHOLDER_KEY");
    skipped.skip_reason = Some("placeholder".into());
    diff.changes.push(skipped);

    let cancel = CancellationToken::new();
    let mut seen = Vec::new();
    let report = engine
        .apply_with_callback(&cancel, diff, |r: &ApplyResult| {
            seen.push(r.change.key.clone());
        })
        .await;

    assert_eq!(report.unchanged, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.api_calls, 0);
    assert!(api.calls().is_empty());
    assert_eq!(seen, ["A", "PLACEHOLDER_KEY"]);
}

#[tokio::test]
async fn apply_streams_results_through_callback() {
    let api = Arc::new(FakeApi::default());
    let engine = engine_with(api, Options::default());
    let locals: Vec<EnvVar> = (0..8).map(|i| local(&format!("KEY_{i}"), "v")).collect();
    let diff = engine.diff(&locals, vec![], "*");

    let cancel = CancellationToken::new();
    let mut streamed = 0usize;
    let report = engine
        .apply_with_callback(&cancel, diff, |r: &ApplyResult| {
            assert!(r.error.is_none());
            streamed += 1;
        })
        .await;

    assert_eq!(streamed, 8);
    assert_eq!(report.created, 8);
}

#[tokio::test]
async fn apply_update_preserves_remote_raw_and_scope() {
    let api = Arc::new(FakeApi::default());
    let engine = engine_with(api.clone(), Options::default());
    let mut wildcard = remote("A", "old", "*");
    wildcard.raw = true;
    let diff = engine.diff(&[local("A", "new")], vec![wildcard], "production");

    let cancel = CancellationToken::new();
    let report = engine.apply(&cancel, diff).await;
    assert_eq!(report.updated, 1);

    match &api.calls()[0] {
        Call::Update(req) => {
            assert_eq!(req.environment_scope, "*");
            assert!(req.raw);
            assert_eq!(req.value, "new");
        }
        other => panic!("unexpected call: {other:?}"),
    }
}

#[tokio::test]
async fn apply_delete_uses_remote_record_scope() {
    let api = Arc::new(FakeApi::default());
    let engine = engine_with(
        api.clone(),
        Options {
            delete_missing: true,
            ..Options::default()
        },
    );
    let diff = engine.diff(&[], vec![remote("X", "", "*")], "production");

    let cancel = CancellationToken::new();
    let report = engine.apply(&cancel, diff).await;

    assert_eq!(report.deleted, 1);
    assert_eq!(report.api_calls, 1);
    assert_eq!(
        api.calls(),
        [Call::Delete {
            key: "X".into(),
            scope: "*".into(),
        }]
    );
}

#[tokio::test]
async fn apply_create_defaults_type_to_env_var() {
    let api = Arc::new(FakeApi::default());
    let engine = engine_with(api.clone(), Options::default());

    // A hand-built change with no classification attached.
    let mut change = dotlab_sync::Change::new(ChangeKind::Create, "BARE");
    change.new_value = Some("v".into());
    change.scope = "*".into();
    let diff = dotlab_sync::DiffResult {
        changes: vec![change],
    };

    let cancel = CancellationToken::new();
    let report = engine.apply(&cancel, diff).await;
    assert_eq!(report.created, 1);

    match &api.calls()[0] {
        Call::Create(req) => assert_eq!(req.variable_type, VarType::EnvVar),
        other => panic!("unexpected call: {other:?}"),
    }
}

#[tokio::test]
async fn apply_under_cancellation_drains_and_reports() {
    let api = Arc::new(FakeApi {
        wait_for_cancel: true,
        ..FakeApi::default()
    });
    let engine = engine_with(
        api,
        Options {
            workers: 2,
            ..Options::default()
        },
    );
    let locals: Vec<EnvVar> = (0..20).map(|i| local(&format!("KEY_{i}"), "v")).collect();
    let diff = engine.diff(&locals, vec![], "*");
    let total = diff.changes.len();

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(5), engine.apply(&cancel, diff))
        .await
        .expect("apply must drain under cancellation");

    assert!(report.failed > 0);
    assert!(report.created < 20);
    assert_eq!(
        report.created + report.updated + report.deleted + report.unchanged + report.skipped
            + report.failed,
        total
    );
    assert_eq!(report.errors.len(), report.failed);
}

#[tokio::test]
async fn apply_empty_diff_returns_immediately() {
    let api = Arc::new(FakeApi::default());
    let engine = engine_with(api, Options::default());
    let cancel = CancellationToken::new();

    let report = engine
        .apply(&cancel, dotlab_sync::DiffResult::default())
        .await;
    assert_eq!(report.created + report.updated + report.deleted, 0);
    assert_eq!(report.api_calls, 0);
}

#[tokio::test]
async fn end_to_end_wildcard_and_create_scenario() {
    // Local A=1, B=2; remote [{A,1,*}]; scope production.
    let api = Arc::new(FakeApi::default());
    let engine = engine_with(api.clone(), Options::default());
    let diff = engine.diff(
        &[local("A", "1"), local("B", "2")],
        vec![remote("A", "1", "*")],
        "production",
    );

    assert_eq!(
        kinds(&diff.changes),
        [ChangeKind::Unchanged, ChangeKind::Create]
    );
    assert_eq!(diff.changes[1].scope, "production");

    let cancel = CancellationToken::new();
    let report = engine.apply(&cancel, diff).await;
    assert_eq!(report.created, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.api_calls, 1);
}
