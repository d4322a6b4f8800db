//! Structured observability hooks for pipeline run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via [`run_span`]
//! - Emission functions for key lifecycle events: start, classification,
//!   build, push, finish, fatal abort
//!
//! Events are emitted at `info!` level (failures at `warn!`). Filter with
//! `RUST_LOG`; pass `--json` to the CLI for newline-delimited JSON.

use tracing::{error, info, warn};

use crate::domain::{
    BuildResult, FatalDiagnostic, OverallStatus, PushOutcome, ReleaseIntent, Trigger,
};

/// Run-scoped span; every event emitted inside carries the run_id.
///
/// ```ignore
/// run_inner().instrument(run_span("4b1c...")).await
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("dockyard.run", run_id = %run_id)
}

/// Emit event: run started for a trigger.
pub fn emit_run_started(run_id: &str, trigger: &Trigger) {
    info!(
        event = "run.started",
        run_id = %run_id,
        trigger = %trigger.kind,
        git_ref = %trigger.git_ref,
        sha = %trigger.sha,
    );
}

/// Emit event: trigger classified into an intent.
pub fn emit_intent_classified(intent: &ReleaseIntent, tags: &[String]) {
    info!(
        event = "intent.classified",
        variants = ?intent.variant_names(),
        tags = ?tags,
        push_eligible = intent.push_eligible,
        reason = %intent.reason.describe(),
    );
}

/// Emit event: build primitive invoked.
pub fn emit_build_started(variant: &str, tag: &str) {
    info!(event = "build.started", variant = %variant, tag = %tag);
}

/// Emit event: a (variant, tag) build reached a terminal status.
pub fn emit_build_finished(result: &BuildResult) {
    match &result.error {
        None => info!(
            event = "build.finished",
            variant = %result.variant,
            tag = %result.tag,
            status = %result.status,
            duration_ms = result.duration_ms,
        ),
        Some(error) => warn!(
            event = "build.finished",
            variant = %result.variant,
            tag = %result.tag,
            status = %result.status,
            duration_ms = result.duration_ms,
            error = %error,
        ),
    }
}

/// Emit event: push gate decided on a build result.
pub fn emit_push_finished(outcome: &PushOutcome) {
    match outcome {
        PushOutcome::Failed { variant, tag, error } => warn!(
            event = "push.finished",
            variant = %variant,
            tag = %tag,
            outcome = outcome.label(),
            error = %error,
        ),
        _ => info!(
            event = "push.finished",
            variant = %outcome.variant(),
            tag = %outcome.tag(),
            outcome = outcome.label(),
        ),
    }
}

/// Emit event: run finished with duration and aggregate status.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, status: OverallStatus, pushed: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        status = %status,
        pushed = pushed,
    );
}

/// Emit event: run aborted by a fatal error (warning level).
pub fn emit_run_aborted(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.aborted", run_id = %run_id, error = %error);
}

/// Emit event: the run could not start or complete (error level).
pub fn emit_run_fatal(diagnostic: &FatalDiagnostic) {
    error!(
        event = "run.fatal",
        kind = %diagnostic.kind,
        message = %diagnostic.message,
    );
}
