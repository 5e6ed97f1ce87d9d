//! Change list produced by diff and consumed by apply.

use dotlab_classify::Classification;

/// What kind of mutation (or non-mutation) a change represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
    Unchanged,
    Skipped,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Unchanged => "unchanged",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// One entry of the diff.
///
/// `scope` records which remote record the operation targets: the desired
/// scope for creates, the remote record's actual scope for everything else.
/// That distinction matters when the remote record is wildcard-scoped; the
/// follow-up PUT/DELETE must address `*`, not the requested scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// Carried from diff to apply so it is never re-derived.
    pub classification: Option<Classification>,
    /// Why a skipped entry was skipped, for display.
    pub skip_reason: Option<String>,
    pub scope: String,
    /// `raw` flag preserved from the remote record on updates.
    pub raw: bool,
}

impl Change {
    /// A change with everything defaulted except kind and key.
    #[must_use]
    pub fn new(kind: ChangeKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            old_value: None,
            new_value: None,
            classification: None,
            skip_reason: None,
            scope: String::new(),
            raw: false,
        }
    }
}

/// Ordered set of changes: local entries in file order, then deletes in
/// remote iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub changes: Vec<Change>,
}

impl DiffResult {
    /// Number of changes of the given kind.
    #[must_use]
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind == kind).count()
    }

    /// True when applying would issue no remote mutation.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.changes
            .iter()
            .all(|c| matches!(c.kind, ChangeKind::Unchanged | ChangeKind::Skipped))
    }
}
