//! Domain models for dockyard.
//!
//! Canonical definitions for the core entities:
//! - `Variant`: one flavor of the image to build
//! - `Trigger`: the repository event that starts a run
//! - `ReleaseIntent`: decided scope of work for a trigger
//! - `BuildResult` / `PushOutcome`: per (variant, tag) outcomes
//! - `PipelineReport`: aggregate run result

pub mod error;
pub mod intent;
pub mod report;
pub mod result;
pub mod trigger;
pub mod variant;

pub use error::{
    DockyardError, ErrorDescriptor, ErrorKind, FatalDiagnostic, FatalKind, Result,
};
pub use intent::{IntentReason, ReleaseIntent};
pub use report::{
    compute_overall_status, OverallStatus, PipelineEvent, PipelineEventKind, PipelineReport,
};
pub use result::{BuildResult, BuildStatus, PushOutcome, PushedImage};
pub use trigger::{strip_ref_prefix, Trigger, TriggerKind};
pub use variant::{Variant, DEFAULT_PLATFORM};
