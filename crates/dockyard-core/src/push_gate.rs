//! Push gate: decides, per build result, whether an image is published.
//!
//! | build status     | push eligible | action                         |
//! |------------------|---------------|--------------------------------|
//! | succeeded        | yes           | push, record in `pushed`       |
//! | succeeded        | no            | withhold                       |
//! | failed / skipped | any           | never push                     |
//!
//! Registry authentication is checked once per run, before the first
//! eligible push. Push failures are never retried.

use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::cancel::CancelSignal;
use crate::domain::{
    BuildResult, ErrorDescriptor, ErrorKind, PipelineEventKind, PushOutcome, ReleaseIntent,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::primitives::{PushPrimitive, PushRequest, RegistryLogin};
use crate::timeline::Timeline;

pub struct PushGate {
    pusher: Arc<dyn PushPrimitive>,
    login: Option<Arc<dyn RegistryLogin>>,
    registry: String,
    auth: OnceCell<Result<(), ErrorDescriptor>>,
    cancel: CancelSignal,
    timeline: Arc<Timeline>,
}

impl PushGate {
    pub fn new(
        pusher: Arc<dyn PushPrimitive>,
        registry: impl Into<String>,
        cancel: CancelSignal,
        timeline: Arc<Timeline>,
    ) -> Self {
        Self {
            pusher,
            login: None,
            registry: registry.into(),
            auth: OnceCell::new(),
            cancel,
            timeline,
        }
    }

    /// Require a registry session before the first push.
    pub fn with_login(mut self, login: Arc<dyn RegistryLogin>) -> Self {
        self.login = Some(login);
        self
    }

    /// Apply the push policy to one build result.
    pub async fn push(&self, result: &BuildResult, intent: &ReleaseIntent) -> PushOutcome {
        let outcome = if !result.is_success() {
            PushOutcome::NotBuilt {
                variant: result.variant.clone(),
                tag: result.tag.clone(),
                status: result.status,
            }
        } else if !intent.push_eligible {
            PushOutcome::Withheld {
                variant: result.variant.clone(),
                tag: result.tag.clone(),
            }
        } else {
            self.publish(result, intent).await
        };

        match &outcome {
            PushOutcome::Pushed { .. } => METRICS.inc_pushes_completed(),
            PushOutcome::Failed { .. } => METRICS.inc_pushes_failed(),
            _ => {}
        }
        self.timeline.record(PipelineEventKind::PushFinished {
            variant: outcome.variant().to_string(),
            tag: outcome.tag().to_string(),
            outcome: outcome.label().to_string(),
        });
        obs::emit_push_finished(&outcome);
        outcome
    }

    async fn publish(&self, result: &BuildResult, intent: &ReleaseIntent) -> PushOutcome {
        let variant = result.variant.clone();
        let tag = result.tag.clone();
        if self.cancel.is_cancelled() {
            return PushOutcome::Abandoned { variant, tag };
        }

        if let Err(error) = self.ensure_authenticated().await {
            return PushOutcome::Failed {
                variant,
                tag,
                error,
            };
        }

        let repository = intent
            .variants
            .iter()
            .find(|v| v.name == result.variant)
            .map(|v| v.repository.clone())
            .unwrap_or_else(|| result.variant.clone());
        let request = PushRequest {
            variant: variant.clone(),
            image_ref: result
                .image_ref
                .clone()
                .unwrap_or_else(|| format!("{}:{}", repository, tag)),
            registry: self.registry.clone(),
            repository,
            tag: tag.clone(),
        };

        self.timeline.record(PipelineEventKind::PushStarted {
            variant: variant.clone(),
            tag: tag.clone(),
        });
        let pushed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return PushOutcome::Abandoned { variant, tag },
            res = self.pusher.push_image(&request) => res,
        };

        match pushed {
            Ok(output) if output.success => PushOutcome::Pushed {
                variant,
                tag,
                reference: request.destination(),
            },
            Ok(output) => PushOutcome::Failed {
                variant,
                tag,
                error: ErrorDescriptor::new(ErrorKind::PushFailed, output.diagnostic),
            },
            Err(e) => PushOutcome::Failed {
                variant,
                tag,
                error: ErrorDescriptor::new(ErrorKind::PushFailed, e.to_string()),
            },
        }
    }

    /// Check the registry session at most once per run.
    async fn ensure_authenticated(&self) -> Result<(), ErrorDescriptor> {
        self.auth
            .get_or_init(|| async {
                match &self.login {
                    None => Ok(()),
                    Some(login) => login
                        .ensure_authenticated(&self.registry)
                        .await
                        .map_err(|e| {
                            ErrorDescriptor::new(
                                ErrorKind::PushFailed,
                                format!("registry authentication failed for {}: {}", self.registry, e),
                            )
                        }),
                }
            })
            .await
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::domain::{IntentReason, Variant};
    use crate::fakes::{FakeLogin, FakePusher};

    fn intent(push_eligible: bool) -> ReleaseIntent {
        ReleaseIntent {
            variants: vec![
                Variant::new("cpu", "Dockerfile").with_repository("nrdg/afq"),
                Variant::new("gpu", "Dockerfile.gpu").with_repository("nrdg/afq-gpu"),
            ],
            tag_candidates: vec!["v3.1.0".into()],
            push_eligible,
            reason: IntentReason::Tag {
                tag: "v3.1.0".into(),
            },
        }
    }

    fn gate(pusher: Arc<FakePusher>) -> PushGate {
        PushGate::new(
            pusher,
            "docker.io",
            CancelSignal::never(),
            Arc::new(Timeline::new()),
        )
    }

    #[tokio::test]
    async fn test_succeeded_and_eligible_is_pushed() {
        let pusher = Arc::new(FakePusher::new());
        let gate = gate(pusher.clone());
        let ok = BuildResult::succeeded("cpu", "v3.1.0", "nrdg/afq:v3.1.0", 1);

        let outcome = gate.push(&ok, &intent(true)).await;
        assert_eq!(
            outcome,
            PushOutcome::Pushed {
                variant: "cpu".into(),
                tag: "v3.1.0".into(),
                reference: "docker.io/nrdg/afq:v3.1.0".into(),
            }
        );
        assert!(pusher.was_pushed("cpu", "v3.1.0"));
    }

    #[tokio::test]
    async fn test_not_eligible_is_withheld() {
        let pusher = Arc::new(FakePusher::new());
        let gate = gate(pusher.clone());
        let ok = BuildResult::succeeded("cpu", "abc1234", "nrdg/afq:abc1234", 1);

        let outcome = gate.push(&ok, &intent(false)).await;
        assert_eq!(outcome.label(), "withheld");
        assert!(pusher.pushed().is_empty());
    }

    #[tokio::test]
    async fn test_failed_build_is_never_pushed() {
        let pusher = Arc::new(FakePusher::new());
        let gate = gate(pusher.clone());
        let failed = BuildResult::failed(
            "gpu",
            "v3.1.0",
            ErrorDescriptor::new(ErrorKind::BuildPrimitive, "exit 1"),
            1,
        );

        let outcome = gate.push(&failed, &intent(true)).await;
        assert_eq!(outcome.label(), "not_built");
        assert!(!outcome.is_failure());
        assert!(pusher.pushed().is_empty());
    }

    #[tokio::test]
    async fn test_push_failure_is_reported() {
        let pusher = Arc::new(FakePusher::new().failing("gpu"));
        let gate = gate(pusher);
        let ok = BuildResult::succeeded("gpu", "v3.1.0", "nrdg/afq-gpu:v3.1.0", 1);

        match gate.push(&ok, &intent(true)).await {
            PushOutcome::Failed { error, .. } => {
                assert_eq!(error.kind, ErrorKind::PushFailed);
                assert!(error.message.contains("denied"));
            }
            other => panic!("expected push failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login_checked_once() {
        let pusher = Arc::new(FakePusher::new());
        let login = Arc::new(FakeLogin::new());
        let gate = gate(pusher.clone()).with_login(login.clone());

        let intent = intent(true);
        gate.push(&BuildResult::succeeded("cpu", "v3.1.0", "a", 1), &intent)
            .await;
        gate.push(&BuildResult::succeeded("gpu", "v3.1.0", "b", 1), &intent)
            .await;
        assert_eq!(login.calls(), 1);
        assert_eq!(pusher.pushed().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_login_fails_every_eligible_push() {
        let pusher = Arc::new(FakePusher::new());
        let login = Arc::new(FakeLogin::unauthenticated());
        let gate = gate(pusher.clone()).with_login(login.clone());

        let intent = intent(true);
        let a = gate
            .push(&BuildResult::succeeded("cpu", "v3.1.0", "a", 1), &intent)
            .await;
        let b = gate
            .push(&BuildResult::succeeded("gpu", "v3.1.0", "b", 1), &intent)
            .await;
        assert!(a.is_failure() && b.is_failure());
        assert_eq!(login.calls(), 1);
        assert!(pusher.pushed().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_abandons_push() {
        let pusher = Arc::new(FakePusher::new());
        let (handle, signal) = cancel_pair();
        let gate = PushGate::new(pusher.clone(), "docker.io", signal, Arc::new(Timeline::new()));
        handle.cancel();

        let outcome = gate
            .push(&BuildResult::succeeded("cpu", "v3.1.0", "a", 1), &intent(true))
            .await;
        assert_eq!(outcome.label(), "abandoned");
        assert!(pusher.pushed().is_empty());
    }
}
