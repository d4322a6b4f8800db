//! Build coordination: one primitive invocation per (variant, tag) per run.
//!
//! The coordinator owns the worker pool, per-build timeouts, workspace
//! reservation and cancellation. Duplicate requests for a pair that is already
//! in flight (or finished) await the same shared future instead of invoking
//! the build primitive a second time.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::cancel::CancelSignal;
use crate::config::PipelineConfig;
use crate::domain::{
    BuildResult, DockyardError, ErrorDescriptor, ErrorKind, PipelineEventKind, Result, Variant,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::primitives::{BuildOutput, BuildPrimitive, BuildRequest};
use crate::timeline::Timeline;

type SharedBuild = Shared<BoxFuture<'static, BuildResult>>;

/// Execution limits for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum number of builds running concurrently (at least 1).
    pub worker_limit: usize,
    /// `None` disables the timeout.
    pub per_build_timeout: Option<Duration>,
    pub workspace_root: PathBuf,
    /// When false, every build shares `workspace_root` and builds are
    /// serialized on it.
    pub isolate_workspaces: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for CoordinatorConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            worker_limit: config.worker_limit.max(1),
            per_build_timeout: config.per_build_timeout(),
            workspace_root: config.workspace_root.clone(),
            isolate_workspaces: config.isolate_workspaces,
        }
    }
}

/// Per-path async locks so that builds sharing a workspace never overlap.
#[derive(Debug, Default)]
struct WorkspaceLocks {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl WorkspaceLocks {
    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(path.to_path_buf()).or_default().clone()
    }
}

struct Inner {
    builder: Arc<dyn BuildPrimitive>,
    config: CoordinatorConfig,
    permits: Arc<Semaphore>,
    workspaces: WorkspaceLocks,
    emulation_ready: AtomicBool,
    cancel: CancelSignal,
    timeline: Arc<Timeline>,
}

/// Outcome of racing the primitive against the timeout and cancellation.
enum Attempt {
    Finished(Result<BuildOutput>),
    TimedOut(Duration),
    Cancelled,
}

/// Deduplicating, bounded build scheduler for a single run.
pub struct BuildCoordinator {
    inner: Arc<Inner>,
    builds: Mutex<HashMap<(String, String), SharedBuild>>,
}

impl BuildCoordinator {
    pub fn new(
        builder: Arc<dyn BuildPrimitive>,
        config: CoordinatorConfig,
        cancel: CancelSignal,
        timeline: Arc<Timeline>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.worker_limit.max(1)));
        Self {
            inner: Arc::new(Inner {
                builder,
                config,
                permits,
                workspaces: WorkspaceLocks::default(),
                emulation_ready: AtomicBool::new(false),
                cancel,
                timeline,
            }),
            builds: Mutex::new(HashMap::new()),
        }
    }

    /// Record that the emulation collaborator initialized for this run.
    pub fn mark_emulation_ready(&self) {
        self.inner.emulation_ready.store(true, Ordering::SeqCst);
    }

    pub fn emulation_ready(&self) -> bool {
        self.inner.emulation_ready.load(Ordering::SeqCst)
    }

    /// Workspace reserved for a variant's builds.
    pub fn workspace_for(&self, variant: &Variant) -> PathBuf {
        self.inner.workspace_for(variant)
    }

    /// Build `variant` under `tag`, or await the build already started for
    /// that pair. Never returns an error: every failure is captured in the
    /// result.
    pub async fn build(&self, variant: &Variant, tag: &str) -> BuildResult {
        let key = (variant.name.clone(), tag.to_string());
        let shared = {
            let mut builds = self.builds.lock().unwrap_or_else(|e| e.into_inner());
            match builds.get(&key) {
                Some(existing) => {
                    METRICS.inc_builds_coalesced();
                    debug!(variant = %variant.name, tag = %tag, "build coalesced");
                    existing.clone()
                }
                None => {
                    let fut = Inner::run(self.inner.clone(), variant.clone(), tag.to_string())
                        .boxed()
                        .shared();
                    builds.insert(key, fut.clone());
                    fut
                }
            }
        };
        shared.await
    }

    /// Number of distinct (variant, tag) pairs requested so far.
    pub fn distinct_builds(&self) -> usize {
        self.builds.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Inner {
    fn workspace_for(&self, variant: &Variant) -> PathBuf {
        if self.config.isolate_workspaces {
            self.config.workspace_root.join(&variant.name)
        } else {
            self.config.workspace_root.clone()
        }
    }

    fn finish(&self, result: BuildResult) -> BuildResult {
        self.timeline.record(PipelineEventKind::BuildFinished {
            variant: result.variant.clone(),
            tag: result.tag.clone(),
            status: result.status,
        });
        obs::emit_build_finished(&result);
        result
    }

    fn cancelled_before_start(&self, variant: &Variant, tag: &str) -> BuildResult {
        self.finish(BuildResult::skipped(
            &variant.name,
            tag,
            DockyardError::Cancelled.descriptor(),
        ))
    }

    async fn run(self: Arc<Self>, variant: Variant, tag: String) -> BuildResult {
        if self.cancel.is_cancelled() {
            return self.cancelled_before_start(&variant, &tag);
        }

        if variant.requires_emulation && !self.emulation_ready.load(Ordering::SeqCst) {
            let err = DockyardError::Precondition(format!(
                "variant {} requires emulation for {} but emulation is not initialized",
                variant.name,
                variant.platforms.join(",")
            ));
            return self.finish(BuildResult::skipped(&variant.name, &tag, err.descriptor()));
        }

        // queued: wait for a worker slot
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.cancelled_before_start(&variant, &tag),
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return self.cancelled_before_start(&variant, &tag),
            },
        };

        let workspace = self.workspace_for(&variant);
        let workspace_lock = self.workspaces.lock_for(&workspace);
        let _workspace_guard = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.cancelled_before_start(&variant, &tag),
            guard = workspace_lock.lock_owned() => guard,
        };

        let start = Instant::now();
        if let Err(e) = tokio::fs::create_dir_all(&workspace).await {
            let err = DockyardError::BuildPrimitive(format!(
                "cannot prepare workspace {}: {}",
                workspace.display(),
                e
            ));
            return self.finish(BuildResult::failed(&variant.name, &tag, err.descriptor(), 0));
        }

        let request = BuildRequest {
            variant: variant.name.clone(),
            dockerfile_path: variant.dockerfile_path.clone(),
            context_dir: variant.context_dir.clone(),
            build_args: variant.build_args.clone(),
            tag: tag.clone(),
            platforms: variant.platforms.clone(),
            workspace,
            local_name: format!("{}:{}", variant.repository, tag),
        };

        self.timeline.record(PipelineEventKind::BuildStarted {
            variant: variant.name.clone(),
            tag: tag.clone(),
        });
        obs::emit_build_started(&variant.name, &tag);
        METRICS.inc_builds_invoked();

        // dropping the primitive's future stops its process
        let invocation = self.builder.build_image(&request);
        let bounded = async {
            match self.config.per_build_timeout {
                Some(limit) => match tokio::time::timeout(limit, invocation).await {
                    Ok(res) => Attempt::Finished(res),
                    Err(_) => Attempt::TimedOut(limit),
                },
                None => Attempt::Finished(invocation.await),
            }
        };
        let attempt = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Attempt::Cancelled,
            attempt = bounded => attempt,
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = match attempt {
            Attempt::Finished(Ok(output)) if output.success => {
                let image_ref = output
                    .image_ref
                    .unwrap_or_else(|| request.local_name.clone());
                BuildResult::succeeded(&variant.name, &tag, image_ref, duration_ms)
            }
            Attempt::Finished(Ok(output)) => BuildResult::failed(
                &variant.name,
                &tag,
                ErrorDescriptor::new(ErrorKind::BuildPrimitive, output.diagnostic),
                duration_ms,
            ),
            Attempt::Finished(Err(e)) => {
                BuildResult::failed(&variant.name, &tag, e.descriptor(), duration_ms)
            }
            Attempt::TimedOut(limit) => {
                let err = DockyardError::Timeout {
                    variant: variant.name.clone(),
                    tag: tag.clone(),
                    limit,
                };
                BuildResult::failed(&variant.name, &tag, err.descriptor(), duration_ms)
            }
            Attempt::Cancelled => BuildResult::failed(
                &variant.name,
                &tag,
                DockyardError::Cancelled.descriptor(),
                duration_ms,
            ),
        };
        self.finish(result)
    }
}
