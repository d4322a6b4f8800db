//! Pipeline driver: sequences one run from trigger to report.
//!
//! ```text
//! Init -> Classifying -> Building -> Pushing -> Reporting -> Done
//! ```
//!
//! The driver is data-driven: adding a variant to the registry is the only
//! change needed to build and publish it. Every build finishes before any
//! push starts.

use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{warn, Instrument};
use uuid::Uuid;

use crate::cancel::CancelSignal;
use crate::classifier::classify;
use crate::config::PipelineConfig;
use crate::coordinator::{BuildCoordinator, CoordinatorConfig};
use crate::domain::{
    compute_overall_status, BuildResult, DockyardError, ErrorDescriptor, ErrorKind,
    PipelineEventKind, PipelineReport, PushOutcome, PushedImage, ReleaseIntent, Result, Trigger,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::primitives::{BuildPrimitive, EmulationSetup, PushPrimitive, RegistryLogin};
use crate::push_gate::PushGate;
use crate::registry::VariantRegistry;
use crate::tag;
use crate::timeline::Timeline;

/// Lifecycle phase of a run. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelinePhase {
    Init,
    Classifying,
    Building,
    Pushing,
    Reporting,
    Done,
}

impl PipelinePhase {
    /// Move to `next`, rejecting any backward (or repeated) transition.
    /// Skipping forward is allowed (a gated run goes straight to reporting).
    pub fn advance(self, next: PipelinePhase) -> Result<PipelinePhase> {
        if next <= self {
            return Err(DockyardError::InvalidPhaseTransition {
                current: self.to_string(),
                requested: next.to_string(),
            });
        }
        Ok(next)
    }
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::Init => write!(f, "init"),
            PipelinePhase::Classifying => write!(f, "classifying"),
            PipelinePhase::Building => write!(f, "building"),
            PipelinePhase::Pushing => write!(f, "pushing"),
            PipelinePhase::Reporting => write!(f, "reporting"),
            PipelinePhase::Done => write!(f, "done"),
        }
    }
}

/// What a trigger would do, without building anything.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub intent: ReleaseIntent,
    pub tags: Vec<String>,
}

/// Runs the classify → build → push → report sequence for one trigger.
pub struct PipelineDriver {
    registry: VariantRegistry,
    config: PipelineConfig,
    builder: Arc<dyn BuildPrimitive>,
    pusher: Arc<dyn PushPrimitive>,
    emulation: Option<Arc<dyn EmulationSetup>>,
    login: Option<Arc<dyn RegistryLogin>>,
}

impl PipelineDriver {
    pub fn new(
        registry: VariantRegistry,
        config: PipelineConfig,
        builder: Arc<dyn BuildPrimitive>,
        pusher: Arc<dyn PushPrimitive>,
    ) -> Self {
        Self {
            registry,
            config,
            builder,
            pusher,
            emulation: None,
            login: None,
        }
    }

    pub fn with_emulation(mut self, emulation: Arc<dyn EmulationSetup>) -> Self {
        self.emulation = Some(emulation);
        self
    }

    pub fn with_login(mut self, login: Arc<dyn RegistryLogin>) -> Self {
        self.login = Some(login);
        self
    }

    pub fn registry(&self) -> &VariantRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Classify the trigger and resolve its tags. Pure.
    pub fn plan(&self, trigger: &Trigger) -> Result<RunPlan> {
        let intent = classify(trigger, self.registry.list_variants(), &self.config)?;
        let tags = tag::resolve(&intent)?;
        Ok(RunPlan { intent, tags })
    }

    /// Execute one run.
    ///
    /// Returns `Err` only for fatal errors (classification or tag
    /// resolution); every per-variant failure is reported in the
    /// [`PipelineReport`].
    pub async fn run(&self, trigger: &Trigger, cancel: CancelSignal) -> Result<PipelineReport> {
        let run_id = Uuid::new_v4();
        let span = obs::run_span(&run_id.to_string());
        self.execute(run_id, trigger, cancel).instrument(span).await
    }

    async fn execute(
        &self,
        run_id: Uuid,
        trigger: &Trigger,
        cancel: CancelSignal,
    ) -> Result<PipelineReport> {
        let run_id_str = run_id.to_string();
        let started_at = Utc::now();
        let start = Instant::now();
        let timeline = Arc::new(Timeline::new());

        let mut phase = PipelinePhase::Init;
        timeline.record(PipelineEventKind::RunStarted {
            trigger: trigger.kind.to_string(),
            git_ref: trigger.git_ref.clone(),
        });
        obs::emit_run_started(&run_id_str, trigger);

        phase = phase.advance(PipelinePhase::Classifying)?;
        let RunPlan { intent, tags } = match self.plan(trigger) {
            Ok(plan) => plan,
            Err(e) => {
                obs::emit_run_aborted(&run_id_str, &e);
                return Err(e);
            }
        };
        timeline.record(PipelineEventKind::IntentClassified {
            variants: intent.variant_names().iter().map(|s| s.to_string()).collect(),
            push_eligible: intent.push_eligible,
            reason: intent.reason.describe(),
        });
        timeline.record(PipelineEventKind::TagsResolved { tags: tags.clone() });
        obs::emit_intent_classified(&intent, &tags);

        let (results, pushes) = if intent.is_skipped() {
            (self.gated_results(&intent, &tags), Vec::new())
        } else {
            phase = phase.advance(PipelinePhase::Building)?;
            let coordinator = BuildCoordinator::new(
                self.builder.clone(),
                CoordinatorConfig::from(&self.config),
                cancel.clone(),
                timeline.clone(),
            );
            self.prepare_emulation(&intent, &coordinator, &timeline).await;
            let tag_list = &tags;
            let results = join_all(
                intent
                    .variants
                    .iter()
                    .flat_map(move |v| tag_list.iter().map(move |t| (v, t)))
                    .map(|(v, t)| coordinator.build(v, t)),
            )
            .await;

            phase = phase.advance(PipelinePhase::Pushing)?;
            let mut gate = PushGate::new(
                self.pusher.clone(),
                self.config.registry.clone(),
                cancel.clone(),
                timeline.clone(),
            );
            if let Some(login) = &self.login {
                gate = gate.with_login(login.clone());
            }
            let pushes = push_all(&gate, &intent, &results).await;
            (results, pushes)
        };

        phase = phase.advance(PipelinePhase::Reporting)?;
        let pushed: BTreeSet<PushedImage> = pushes
            .iter()
            .filter(|p| p.is_pushed())
            .map(|p| PushedImage::new(p.variant(), p.tag()))
            .collect();
        let overall_status = compute_overall_status(&results, &pushes, intent.is_skipped());
        timeline.record(PipelineEventKind::RunFinished {
            status: overall_status,
        });

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_run_finished(&run_id_str, duration_ms, overall_status, pushed.len());
        METRICS.flush();

        let report = PipelineReport {
            run_id,
            trigger: trigger.clone(),
            intent_reason: intent.reason.describe(),
            push_eligible: intent.push_eligible,
            tags,
            results,
            pushes,
            pushed,
            overall_status,
            timeline: timeline.snapshot(),
            registry_digest: self.registry.digest().to_string(),
            started_at,
            finished_at: Utc::now(),
            duration_ms,
        };
        phase.advance(PipelinePhase::Done)?;
        Ok(report)
    }

    /// Every registry variant, marked skipped because the intent selected
    /// none of them.
    fn gated_results(&self, intent: &ReleaseIntent, tags: &[String]) -> Vec<BuildResult> {
        let reason = intent.reason.describe();
        self.registry
            .list_variants()
            .iter()
            .flat_map(move |v| {
                let reason = reason.clone();
                tags.iter().map(move |t| {
                    BuildResult::skipped(
                        &v.name,
                        t,
                        ErrorDescriptor::new(ErrorKind::Gated, reason.clone()),
                    )
                })
            })
            .collect()
    }

    /// Initialize emulation when any selected variant needs it. A failure
    /// leaves those variants to be skipped by the coordinator.
    async fn prepare_emulation(
        &self,
        intent: &ReleaseIntent,
        coordinator: &BuildCoordinator,
        timeline: &Timeline,
    ) {
        let mut platforms: Vec<String> = Vec::new();
        for variant in intent.variants.iter().filter(|v| v.requires_emulation) {
            for platform in &variant.platforms {
                if !platforms.contains(platform) {
                    platforms.push(platform.clone());
                }
            }
        }
        if platforms.is_empty() {
            return;
        }

        let ready = match &self.emulation {
            Some(emulation) => match emulation.initialize(&platforms).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, platforms = ?platforms, "emulation setup failed");
                    false
                }
            },
            None => {
                warn!(platforms = ?platforms, "no emulation collaborator configured");
                false
            }
        };
        if ready {
            coordinator.mark_emulation_ready();
        }
        timeline.record(PipelineEventKind::EmulationInitialized { ready });
    }
}

/// Push every result. Variants proceed concurrently; the tags of one variant
/// are pushed in order. Outcomes keep the order of `results`.
async fn push_all(
    gate: &PushGate,
    intent: &ReleaseIntent,
    results: &[BuildResult],
) -> Vec<PushOutcome> {
    let per_variant = join_all(intent.variants.iter().map(|variant| async move {
        let mut outcomes = Vec::new();
        for result in results.iter().filter(|r| r.variant == variant.name) {
            outcomes.push(gate.push(result, intent).await);
        }
        outcomes
    }))
    .await;
    per_variant.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_advances_forward() {
        let phase = PipelinePhase::Init;
        let phase = phase.advance(PipelinePhase::Classifying).unwrap();
        let phase = phase.advance(PipelinePhase::Building).unwrap();
        let phase = phase.advance(PipelinePhase::Pushing).unwrap();
        let phase = phase.advance(PipelinePhase::Reporting).unwrap();
        assert_eq!(
            phase.advance(PipelinePhase::Done).unwrap(),
            PipelinePhase::Done
        );
    }

    #[test]
    fn test_phase_may_skip_forward() {
        let phase = PipelinePhase::Classifying;
        assert_eq!(
            phase.advance(PipelinePhase::Reporting).unwrap(),
            PipelinePhase::Reporting
        );
    }

    #[test]
    fn test_phase_rejects_backward_transition() {
        let err = PipelinePhase::Pushing
            .advance(PipelinePhase::Building)
            .unwrap_err();
        assert!(matches!(err, DockyardError::InvalidPhaseTransition { .. }));
        assert!(err.to_string().contains("pushing -> building"));

        assert!(PipelinePhase::Done.advance(PipelinePhase::Done).is_err());
    }
}
