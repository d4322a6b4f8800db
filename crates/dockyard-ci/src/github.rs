//! GitHub Actions trigger adapter.
//!
//! | `GITHUB_EVENT_NAME`                   | trigger                              |
//! |---------------------------------------|--------------------------------------|
//! | `push` to `refs/tags/*`               | tag_push                             |
//! | `push`                                | push                                 |
//! | `pull_request`, `pull_request_target` | pull_request (base: `GITHUB_BASE_REF`) |
//! | `release`                             | release                              |
//! | `create` of a tag                     | tag_push                             |

use std::path::PathBuf;

use dockyard_core::domain::trigger::TAGS_PREFIX;
use dockyard_core::{Trigger, TriggerKind};

use crate::error::{CiError, Result};

pub const EVENT_NAME_VAR: &str = "GITHUB_EVENT_NAME";
pub const REF_VAR: &str = "GITHUB_REF";
pub const SHA_VAR: &str = "GITHUB_SHA";
pub const BASE_REF_VAR: &str = "GITHUB_BASE_REF";
pub const STEP_SUMMARY_VAR: &str = "GITHUB_STEP_SUMMARY";

/// Build a trigger from environment lookups.
pub fn trigger_from_lookup<F>(lookup: F) -> Result<Trigger>
where
    F: Fn(&str) -> Option<String>,
{
    let require = |name: &str| -> Result<String> {
        lookup(name)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| CiError::MissingEnv(name.to_string()))
    };

    let event = require(EVENT_NAME_VAR)?;
    let git_ref = require(REF_VAR)?;
    let sha = require(SHA_VAR)?;

    let kind = match event.as_str() {
        "push" | "create" if git_ref.starts_with(TAGS_PREFIX) => TriggerKind::TagPush,
        "push" => TriggerKind::Push,
        "pull_request" | "pull_request_target" => TriggerKind::PullRequest,
        "release" => TriggerKind::Release,
        other => return Err(CiError::UnsupportedEvent(other.to_string())),
    };

    let mut trigger = Trigger::new(kind, git_ref, sha);
    if kind == TriggerKind::PullRequest {
        trigger.base_branch = lookup(BASE_REF_VAR).filter(|b| !b.is_empty());
    }
    Ok(trigger)
}

/// Build a trigger from the process environment.
pub fn trigger_from_env() -> Result<Trigger> {
    trigger_from_lookup(|name| std::env::var(name).ok())
}

/// Job summary file, when the runner provides one.
pub fn step_summary_path() -> Option<PathBuf> {
    std::env::var_os(STEP_SUMMARY_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
