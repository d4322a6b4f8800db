//! In-memory fakes for testing without docker or a registry.
//!
//! All fakes are cheap to construct, record every call, and can be scripted
//! to fail for selected variants.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::{DockyardError, Result};
use crate::primitives::{
    BuildOutput, BuildPrimitive, BuildRequest, EmulationSetup, PushOutput, PushPrimitive,
    PushRequest, RegistryLogin,
};

// ---------------------------------------------------------------------------
// FakeBuilder
// ---------------------------------------------------------------------------

/// Scriptable build primitive.
///
/// Succeeds by default after `delay`. Variants marked `failing` report a
/// failed build, `erroring` ones return `Err`, `hanging` ones never finish.
#[derive(Debug, Default)]
pub struct FakeBuilder {
    delay: Duration,
    failing: HashSet<String>,
    erroring: HashSet<String>,
    hanging: HashSet<String>,
    requests: Mutex<Vec<BuildRequest>>,
    active: Mutex<HashMap<PathBuf, usize>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    max_per_workspace: AtomicUsize,
}

impl FakeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, variant: &str) -> Self {
        self.failing.insert(variant.to_string());
        self
    }

    pub fn erroring(mut self, variant: &str) -> Self {
        self.erroring.insert(variant.to_string());
        self
    }

    pub fn hanging(mut self, variant: &str) -> Self {
        self.hanging.insert(variant.to_string());
        self
    }

    /// All requests received, in invocation order.
    pub fn requests(&self) -> Vec<BuildRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of primitive invocations for one (variant, tag) pair.
    pub fn invocations(&self, variant: &str, tag: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.variant == variant && r.tag == tag)
            .count()
    }

    pub fn total_invocations(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Highest number of builds observed running at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    /// Highest number of builds observed at once on a single workspace path.
    pub fn max_concurrent_per_workspace(&self) -> usize {
        self.max_per_workspace.load(Ordering::SeqCst)
    }

    fn enter(&self, workspace: &Path) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let mut active = self.active.lock().unwrap();
        let count = active.entry(workspace.to_path_buf()).or_insert(0);
        *count += 1;
        self.max_per_workspace.fetch_max(*count, Ordering::SeqCst);
    }

    fn leave(&self, workspace: &Path) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = self.active.lock().unwrap().get_mut(workspace) {
            *count -= 1;
        }
    }
}

/// Decrements the running counters even when the build future is dropped.
struct Running<'a> {
    builder: &'a FakeBuilder,
    workspace: PathBuf,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.builder.leave(&self.workspace);
    }
}

#[async_trait]
impl BuildPrimitive for FakeBuilder {
    async fn build_image(&self, request: &BuildRequest) -> Result<BuildOutput> {
        self.requests.lock().unwrap().push(request.clone());
        self.enter(&request.workspace);
        let _running = Running {
            builder: self,
            workspace: request.workspace.clone(),
        };

        if self.hanging.contains(&request.variant) {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.erroring.contains(&request.variant) {
            return Err(DockyardError::BuildPrimitive(format!(
                "failed to spawn builder for {}",
                request.variant
            )));
        }
        if self.failing.contains(&request.variant) {
            return Ok(BuildOutput::failed(format!(
                "RUN step failed while building {}",
                request.variant
            )));
        }
        Ok(BuildOutput::ok(request.local_name.clone()))
    }
}

// ---------------------------------------------------------------------------
// FakePusher
// ---------------------------------------------------------------------------

/// Records pushes; variants marked `failing` are rejected by the "registry".
#[derive(Debug, Default)]
pub struct FakePusher {
    failing: HashSet<String>,
    delay: Duration,
    pushed: Mutex<Vec<PushRequest>>,
}

impl FakePusher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, variant: &str) -> Self {
        self.failing.insert(variant.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Successfully pushed requests, in order.
    pub fn pushed(&self) -> Vec<PushRequest> {
        self.pushed.lock().unwrap().clone()
    }

    pub fn was_pushed(&self, variant: &str, tag: &str) -> bool {
        self.pushed
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.variant == variant && p.tag == tag)
    }
}

#[async_trait]
impl PushPrimitive for FakePusher {
    async fn push_image(&self, request: &PushRequest) -> Result<PushOutput> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(&request.variant) {
            return Ok(PushOutput::failed(format!(
                "denied: requested access to {} is denied",
                request.destination()
            )));
        }
        self.pushed.lock().unwrap().push(request.clone());
        Ok(PushOutput::ok())
    }
}

// ---------------------------------------------------------------------------
// FakeEmulation
// ---------------------------------------------------------------------------

/// Emulation setup that either succeeds or fails, counting calls.
#[derive(Debug, Default)]
pub struct FakeEmulation {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeEmulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broken() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmulationSetup for FakeEmulation {
    async fn initialize(&self, platforms: &[String]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DockyardError::Precondition(format!(
                "binfmt handlers unavailable for {}",
                platforms.join(",")
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeLogin
// ---------------------------------------------------------------------------

/// Registry login check that either succeeds or fails, counting calls.
#[derive(Debug, Default)]
pub struct FakeLogin {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeLogin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unauthenticated() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryLogin for FakeLogin {
    async fn ensure_authenticated(&self, registry: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DockyardError::PushFailed(format!(
                "no credentials for {}",
                registry
            )));
        }
        Ok(())
    }
}
