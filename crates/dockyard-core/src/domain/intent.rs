//! The decided scope of work for a trigger.

use serde::{Deserialize, Serialize};

use super::variant::Variant;

/// Why an intent has the shape it has.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntentReason {
    /// Pull request: build every variant for validation only.
    Validation { base_branch: Option<String> },
    /// Push to the trunk branch.
    Trunk { branch: String },
    /// Push to a whitelisted non-trunk branch: build but never push.
    WhitelistedBranch { branch: String },
    /// Push to a branch that is neither trunk nor whitelisted.
    GatedBranch { branch: String },
    /// Tag push.
    Tag { tag: String },
    /// Release publication.
    Release { tag: String },
}

impl IntentReason {
    /// Human-readable summary used in logs and reports.
    pub fn describe(&self) -> String {
        match self {
            IntentReason::Validation { base_branch } => match base_branch {
                Some(base) => format!("pull request into '{}' (validation only)", base),
                None => "pull request (validation only)".to_string(),
            },
            IntentReason::Trunk { branch } => format!("push to trunk '{}'", branch),
            IntentReason::WhitelistedBranch { branch } => {
                format!("push to whitelisted branch '{}' (build only)", branch)
            }
            IntentReason::GatedBranch { branch } => {
                format!("push to branch '{}' is not whitelisted", branch)
            }
            IntentReason::Tag { tag } => format!("tag push '{}'", tag),
            IntentReason::Release { tag } => format!("release '{}'", tag),
        }
    }
}

/// Which variants to act on, which tags to produce and whether to push.
///
/// Invariant: `push_eligible` is only true for tag/release events and for
/// pushes to the trunk branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseIntent {
    /// Selected variants, in registry order, without duplicates.
    pub variants: Vec<Variant>,

    /// Tag candidates in preference order.
    pub tag_candidates: Vec<String>,

    /// Whether successful builds may be published.
    pub push_eligible: bool,

    pub reason: IntentReason,
}

impl ReleaseIntent {
    /// True when no variant was selected (gated run).
    pub fn is_skipped(&self) -> bool {
        self.variants.is_empty()
    }

    /// Whether the named variant is part of this intent.
    pub fn selects(&self, variant_name: &str) -> bool {
        self.variants.iter().any(|v| v.name == variant_name)
    }

    /// Names of the selected variants.
    pub fn variant_names(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.name.as_str()).collect()
    }
}
