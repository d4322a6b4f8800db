//! Pipeline report, lifecycle timeline and aggregate status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use super::result::{BuildResult, BuildStatus, PushOutcome, PushedImage};
use super::trigger::Trigger;

/// Aggregate status of a pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    PartialFailure,
    Failure,
}

impl OverallStatus {
    /// Process exit code for this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            OverallStatus::Success => 0,
            OverallStatus::PartialFailure | OverallStatus::Failure => 1,
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallStatus::Success => write!(f, "success"),
            OverallStatus::PartialFailure => write!(f, "partial_failure"),
            OverallStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Classification of a lifecycle event in a run's timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEventKind {
    RunStarted {
        trigger: String,
        git_ref: String,
    },
    IntentClassified {
        variants: Vec<String>,
        push_eligible: bool,
        reason: String,
    },
    TagsResolved {
        tags: Vec<String>,
    },
    EmulationInitialized {
        ready: bool,
    },
    BuildStarted {
        variant: String,
        tag: String,
    },
    BuildFinished {
        variant: String,
        tag: String,
        status: BuildStatus,
    },
    PushStarted {
        variant: String,
        tag: String,
    },
    PushFinished {
        variant: String,
        tag: String,
        outcome: String,
    },
    RunFinished {
        status: OverallStatus,
    },
}

/// A single lifecycle event in a run's timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineEvent {
    /// Monotonically increasing sequence number within the run.
    pub seq: u64,

    pub timestamp: DateTime<Utc>,

    pub kind: PipelineEventKind,
}

/// Aggregated outcome of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,

    pub trigger: Trigger,

    /// Human-readable reason the intent was shaped the way it was.
    pub intent_reason: String,

    pub push_eligible: bool,

    /// Resolved tags in preference order.
    pub tags: Vec<String>,

    /// Every (variant, tag) result, in registry then tag order.
    pub results: Vec<BuildResult>,

    /// Every push gate decision, in the same order as `results`.
    pub pushes: Vec<PushOutcome>,

    /// (variant, tag) pairs actually published.
    pub pushed: BTreeSet<PushedImage>,

    pub overall_status: OverallStatus,

    pub timeline: Vec<PipelineEvent>,

    /// SHA-256 of the ordered variant catalog.
    pub registry_digest: String,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    pub duration_ms: u64,
}

impl PipelineReport {
    pub fn exit_code(&self) -> i32 {
        self.overall_status.exit_code()
    }

    /// Results for one variant.
    pub fn results_for<'a>(&'a self, variant: &'a str) -> impl Iterator<Item = &'a BuildResult> + 'a {
        self.results.iter().filter(move |r| r.variant == variant)
    }

    /// Whether `(variant, tag)` was published.
    pub fn was_pushed(&self, variant: &str, tag: &str) -> bool {
        self.pushed.contains(&PushedImage::new(variant, tag))
    }

    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == BuildStatus::Failed)
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == BuildStatus::Skipped)
            .count()
    }

    /// Check that every pushed pair has a succeeded build, and that its
    /// `BuildFinished` event precedes its `PushStarted` event in the timeline.
    pub fn verify_push_after_build(&self) -> bool {
        let mut built_at: HashMap<(&str, &str), u64> = HashMap::new();
        let mut push_at: HashMap<(&str, &str), u64> = HashMap::new();
        for event in &self.timeline {
            match &event.kind {
                PipelineEventKind::BuildFinished {
                    variant,
                    tag,
                    status: BuildStatus::Succeeded,
                } => {
                    built_at.insert((variant.as_str(), tag.as_str()), event.seq);
                }
                PipelineEventKind::PushStarted { variant, tag } => {
                    push_at.insert((variant.as_str(), tag.as_str()), event.seq);
                }
                _ => {}
            }
        }

        self.pushed.iter().all(|p| {
            let key = (p.variant.as_str(), p.tag.as_str());
            let has_result = self
                .results
                .iter()
                .any(|r| r.key() == key && r.is_success());
            let ordered = match (built_at.get(&key), push_at.get(&key)) {
                (Some(b), Some(s)) => b < s,
                _ => false,
            };
            has_result && ordered
        })
    }
}

/// Compute the overall status from per-variant contributions.
///
/// A variant succeeds when all of its results succeeded and none of its
/// pushes failed. A run that selected no variant at all is a `Success`.
pub fn compute_overall_status(
    results: &[BuildResult],
    pushes: &[PushOutcome],
    intent_skipped: bool,
) -> OverallStatus {
    if intent_skipped {
        return OverallStatus::Success;
    }

    let mut variants: Vec<&str> = Vec::new();
    for r in results {
        if !variants.contains(&r.variant.as_str()) {
            variants.push(&r.variant);
        }
    }
    if variants.is_empty() {
        return OverallStatus::Failure;
    }

    let succeeded = variants
        .iter()
        .filter(|name| {
            let builds_ok = results
                .iter()
                .filter(|r| r.variant == **name)
                .all(|r| r.is_success());
            let pushes_ok = !pushes
                .iter()
                .any(|p| p.variant() == **name && p.is_failure());
            builds_ok && pushes_ok
        })
        .count();

    if succeeded == variants.len() {
        OverallStatus::Success
    } else if succeeded == 0 {
        OverallStatus::Failure
    } else {
        OverallStatus::PartialFailure
    }
}
