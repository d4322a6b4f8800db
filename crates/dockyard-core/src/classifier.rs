//! Event classifier: maps a [`Trigger`] to a [`ReleaseIntent`].
//!
//! All branch/tag gating policy lives here, in one pure function:
//!
//! | trigger                    | variants | push | tag candidates        |
//! |----------------------------|----------|------|-----------------------|
//! | pull_request               | all      | no   | short SHA             |
//! | push, trunk                | all      | yes  | short SHA (+ trunk)   |
//! | push, whitelisted branch   | all      | no   | short SHA             |
//! | push, other branch         | none     | no   | short SHA             |
//! | tag_push / release         | all      | yes  | tag name (+ `latest`) |

use crate::config::PipelineConfig;
use crate::domain::{
    strip_ref_prefix, IntentReason, ReleaseIntent, Result, Trigger, TriggerKind, Variant,
};
use crate::tag::short_sha;

/// Alias appended to tag/release builds when `alias_latest` is set.
pub const LATEST_ALIAS: &str = "latest";

/// Decide which variants to act on, which tags to produce and whether to push.
///
/// Deterministic: the same inputs always produce the same intent.
pub fn classify(
    trigger: &Trigger,
    variants: &[Variant],
    config: &PipelineConfig,
) -> Result<ReleaseIntent> {
    let all = variants.to_vec();

    let intent = match trigger.kind {
        TriggerKind::PullRequest => ReleaseIntent {
            variants: all,
            tag_candidates: vec![short_sha(&trigger.sha)?],
            push_eligible: false,
            reason: IntentReason::Validation {
                base_branch: trigger.base_branch.clone(),
            },
        },

        TriggerKind::Push if trigger.is_tag_ref() => tag_intent(trigger, all, config, false),

        TriggerKind::Push => {
            let branch = trigger.branch().unwrap_or(trigger.git_ref.as_str()).to_string();
            let sha_tag = short_sha(&trigger.sha)?;

            if branch == config.trunk_branch {
                let mut tag_candidates = vec![sha_tag];
                if config.alias_trunk {
                    tag_candidates.push(config.trunk_branch.clone());
                }
                ReleaseIntent {
                    variants: all,
                    tag_candidates,
                    push_eligible: true,
                    reason: IntentReason::Trunk { branch },
                }
            } else if config.is_whitelisted(&branch) {
                ReleaseIntent {
                    variants: all,
                    tag_candidates: vec![sha_tag],
                    push_eligible: false,
                    reason: IntentReason::WhitelistedBranch { branch },
                }
            } else {
                ReleaseIntent {
                    variants: Vec::new(),
                    tag_candidates: vec![sha_tag],
                    push_eligible: false,
                    reason: IntentReason::GatedBranch { branch },
                }
            }
        }

        TriggerKind::TagPush => tag_intent(trigger, all, config, false),

        TriggerKind::Release => tag_intent(trigger, all, config, true),
    };

    tracing::debug!(
        trigger = %trigger.kind,
        git_ref = %trigger.git_ref,
        variants = intent.variants.len(),
        push_eligible = intent.push_eligible,
        "trigger classified"
    );

    Ok(intent)
}

fn tag_intent(
    trigger: &Trigger,
    variants: Vec<Variant>,
    config: &PipelineConfig,
    release: bool,
) -> ReleaseIntent {
    let tag = strip_ref_prefix(&trigger.git_ref).to_string();
    let mut tag_candidates = vec![tag.clone()];
    if config.alias_latest {
        tag_candidates.push(LATEST_ALIAS.to_string());
    }
    let reason = if release {
        IntentReason::Release { tag }
    } else {
        IntentReason::Tag { tag }
    };
    ReleaseIntent {
        variants,
        tag_candidates,
        push_eligible: true,
        reason,
    }
}
