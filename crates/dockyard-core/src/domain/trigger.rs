//! Repository events that start a pipeline run.

use serde::{Deserialize, Serialize};

/// Ref prefix for branches.
pub const HEADS_PREFIX: &str = "refs/heads/";

/// Ref prefix for tags.
pub const TAGS_PREFIX: &str = "refs/tags/";

/// Classification of the repository event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Push,
    PullRequest,
    TagPush,
    Release,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::Push => write!(f, "push"),
            TriggerKind::PullRequest => write!(f, "pull_request"),
            TriggerKind::TagPush => write!(f, "tag_push"),
            TriggerKind::Release => write!(f, "release"),
        }
    }
}

impl std::str::FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "push" => Ok(TriggerKind::Push),
            "pull_request" | "pr" => Ok(TriggerKind::PullRequest),
            "tag_push" | "tag" => Ok(TriggerKind::TagPush),
            "release" => Ok(TriggerKind::Release),
            other => Err(format!("unknown trigger kind: {}", other)),
        }
    }
}

/// The external event supplied by the CI platform. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trigger {
    pub kind: TriggerKind,

    /// Git ref, e.g. `refs/heads/master`, `refs/tags/v1.2.3`, `refs/pull/7/merge`.
    #[serde(rename = "ref")]
    pub git_ref: String,

    /// Commit SHA the event points at.
    pub sha: String,

    /// Target branch of a pull request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
}

impl Trigger {
    pub fn new(kind: TriggerKind, git_ref: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            kind,
            git_ref: git_ref.into(),
            sha: sha.into(),
            base_branch: None,
        }
    }

    pub fn push(git_ref: impl Into<String>, sha: impl Into<String>) -> Self {
        Self::new(TriggerKind::Push, git_ref, sha)
    }

    pub fn pull_request(
        git_ref: impl Into<String>,
        sha: impl Into<String>,
        base_branch: impl Into<String>,
    ) -> Self {
        Self {
            base_branch: Some(base_branch.into()),
            ..Self::new(TriggerKind::PullRequest, git_ref, sha)
        }
    }

    pub fn tag_push(git_ref: impl Into<String>, sha: impl Into<String>) -> Self {
        Self::new(TriggerKind::TagPush, git_ref, sha)
    }

    pub fn release(git_ref: impl Into<String>, sha: impl Into<String>) -> Self {
        Self::new(TriggerKind::Release, git_ref, sha)
    }

    /// Branch name for branch refs (`refs/heads/x` or a bare name).
    pub fn branch(&self) -> Option<&str> {
        if let Some(name) = self.git_ref.strip_prefix(HEADS_PREFIX) {
            return Some(name);
        }
        if self.git_ref.starts_with("refs/") {
            return None;
        }
        Some(self.git_ref.as_str())
    }

    /// Whether the ref points into `refs/tags/`.
    pub fn is_tag_ref(&self) -> bool {
        self.git_ref.starts_with(TAGS_PREFIX)
    }
}

/// Strip a known ref prefix (`refs/tags/`, `refs/heads/`) from a ref.
pub fn strip_ref_prefix(git_ref: &str) -> &str {
    git_ref
        .strip_prefix(TAGS_PREFIX)
        .or_else(|| git_ref.strip_prefix(HEADS_PREFIX))
        .unwrap_or(git_ref)
}
