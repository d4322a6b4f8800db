//! Dockyard Core Library
//!
//! Release orchestration for multi-variant container images: classify a
//! repository event, resolve tags, build every selected variant at most once
//! per tag, and publish only what built successfully on a push-eligible event.

pub mod cancel;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod primitives;
pub mod push_gate;
pub mod registry;
pub mod reporting;
pub mod tag;
pub mod telemetry;
pub mod timeline;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use classifier::{classify, LATEST_ALIAS};
pub use config::{DockyardConfig, PipelineConfig, VariantDefinition};
pub use coordinator::{BuildCoordinator, CoordinatorConfig};
pub use domain::{
    compute_overall_status, BuildResult, BuildStatus, DockyardError, ErrorDescriptor, ErrorKind,
    FatalDiagnostic, FatalKind, IntentReason, OverallStatus, PipelineEvent, PipelineEventKind,
    PipelineReport, PushOutcome, PushedImage, ReleaseIntent, Result, Trigger, TriggerKind, Variant,
};
pub use pipeline::{PipelineDriver, PipelinePhase, RunPlan};
pub use primitives::{
    BuildOutput, BuildPrimitive, BuildRequest, EmulationSetup, PushOutput, PushPrimitive,
    PushRequest, RegistryLogin,
};
pub use push_gate::PushGate;
pub use registry::VariantRegistry;
pub use reporting::{
    render_fatal_json, render_report_md, write_fatal_json, write_report_json, write_report_md,
};
pub use tag::{image_reference, is_valid_tag, resolve as resolve_tags, short_sha};
pub use telemetry::init_tracing;
pub use timeline::Timeline;

/// Dockyard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
