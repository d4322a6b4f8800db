//! Build results and push outcomes.

use serde::{Deserialize, Serialize};

use super::error::ErrorDescriptor;

/// Terminal status of a single (variant, tag) build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Succeeded => write!(f, "succeeded"),
            BuildStatus::Failed => write!(f, "failed"),
            BuildStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of building one variant under one tag. Terminal once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildResult {
    /// Variant name (variant identity).
    pub variant: String,

    pub tag: String,

    pub status: BuildStatus,

    /// Local image reference produced by the build primitive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,

    /// Wall-clock duration in milliseconds (0 when never started).
    pub duration_ms: u64,
}

impl BuildResult {
    pub fn succeeded(
        variant: impl Into<String>,
        tag: impl Into<String>,
        image_ref: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            variant: variant.into(),
            tag: tag.into(),
            status: BuildStatus::Succeeded,
            image_ref: Some(image_ref.into()),
            error: None,
            duration_ms,
        }
    }

    pub fn failed(
        variant: impl Into<String>,
        tag: impl Into<String>,
        error: ErrorDescriptor,
        duration_ms: u64,
    ) -> Self {
        Self {
            variant: variant.into(),
            tag: tag.into(),
            status: BuildStatus::Failed,
            image_ref: None,
            error: Some(error),
            duration_ms,
        }
    }

    pub fn skipped(variant: impl Into<String>, tag: impl Into<String>, error: ErrorDescriptor) -> Self {
        Self {
            variant: variant.into(),
            tag: tag.into(),
            status: BuildStatus::Skipped,
            image_ref: None,
            error: Some(error),
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Succeeded
    }

    /// The (variant, tag) pair this result belongs to.
    pub fn key(&self) -> (&str, &str) {
        (self.variant.as_str(), self.tag.as_str())
    }
}

/// A (variant, tag) pair that was published.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PushedImage {
    pub variant: String,
    pub tag: String,
}

impl PushedImage {
    pub fn new(variant: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            variant: variant.into(),
            tag: tag.into(),
        }
    }
}

/// What the push gate did with a build result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PushOutcome {
    /// Pushed to the registry under `reference`.
    Pushed {
        variant: String,
        tag: String,
        reference: String,
    },
    /// Build succeeded but the intent is not push-eligible.
    Withheld { variant: String, tag: String },
    /// Build did not succeed; nothing was pushed.
    NotBuilt {
        variant: String,
        tag: String,
        status: BuildStatus,
    },
    /// Push primitive or authentication failed.
    Failed {
        variant: String,
        tag: String,
        error: ErrorDescriptor,
    },
    /// The run was cancelled before the push completed.
    Abandoned { variant: String, tag: String },
}

impl PushOutcome {
    pub fn variant(&self) -> &str {
        match self {
            PushOutcome::Pushed { variant, .. }
            | PushOutcome::Withheld { variant, .. }
            | PushOutcome::NotBuilt { variant, .. }
            | PushOutcome::Failed { variant, .. }
            | PushOutcome::Abandoned { variant, .. } => variant,
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            PushOutcome::Pushed { tag, .. }
            | PushOutcome::Withheld { tag, .. }
            | PushOutcome::NotBuilt { tag, .. }
            | PushOutcome::Failed { tag, .. }
            | PushOutcome::Abandoned { tag, .. } => tag,
        }
    }

    pub fn is_pushed(&self) -> bool {
        matches!(self, PushOutcome::Pushed { .. })
    }

    /// Whether this outcome counts against the variant.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PushOutcome::Failed { .. } | PushOutcome::Abandoned { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            PushOutcome::Pushed { .. } => "pushed",
            PushOutcome::Withheld { .. } => "withheld",
            PushOutcome::NotBuilt { .. } => "not_built",
            PushOutcome::Failed { .. } => "failed",
            PushOutcome::Abandoned { .. } => "abandoned",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorKind;

    #[test]
    fn test_build_result_constructors() {
        let ok = BuildResult::succeeded("cpu", "abc1234", "dockyard/cpu:abc1234", 10);
        assert!(ok.is_success());
        assert_eq!(ok.key(), ("cpu", "abc1234"));

        let failed = BuildResult::failed(
            "gpu",
            "abc1234",
            ErrorDescriptor::new(ErrorKind::BuildPrimitive, "exit 1"),
            5,
        );
        assert!(!failed.is_success());
        assert!(failed.image_ref.is_none());

        let skipped = BuildResult::skipped(
            "arm",
            "abc1234",
            ErrorDescriptor::new(ErrorKind::Precondition, "no emulation"),
        );
        assert_eq!(skipped.status, BuildStatus::Skipped);
        assert_eq!(skipped.duration_ms, 0);
    }

    #[test]
    fn test_push_outcome_accessors() {
        let o = PushOutcome::Pushed {
            variant: "cpu".into(),
            tag: "v1.0.0".into(),
            reference: "docker.io/org/cpu:v1.0.0".into(),
        };
        assert_eq!(o.variant(), "cpu");
        assert_eq!(o.tag(), "v1.0.0");
        assert!(o.is_pushed());
        assert!(!o.is_failure());

        let o = PushOutcome::Abandoned {
            variant: "gpu".into(),
            tag: "v1.0.0".into(),
        };
        assert!(o.is_failure());
        assert_eq!(o.label(), "abandoned");
    }

    #[test]
    fn test_push_outcome_serde_tag() {
        let o = PushOutcome::Withheld {
            variant: "cpu".into(),
            tag: "abc1234".into(),
        };
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json["outcome"], "withheld");
    }
}
