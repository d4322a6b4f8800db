//! Contracts for the external collaborators the core drives.
//!
//! The core never shells out itself. Building, pushing, emulation setup and
//! registry authentication are opaque primitives behind these traits;
//! `dockyard-ci` provides docker-backed implementations and
//! [`crate::fakes`] provides in-memory ones.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::domain::Result;

/// Everything the build primitive needs for one (variant, tag) build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildRequest {
    pub variant: String,
    pub dockerfile_path: PathBuf,
    pub context_dir: PathBuf,
    pub build_args: BTreeMap<String, String>,
    pub tag: String,
    /// More than one entry requests a multi-architecture build.
    pub platforms: Vec<String>,
    /// Workspace reserved for this build; no other variant writes here
    /// concurrently.
    pub workspace: PathBuf,
    /// Local image name to tag the result with (`<repository>:<tag>`).
    pub local_name: String,
}

impl BuildRequest {
    pub fn is_multi_platform(&self) -> bool {
        self.platforms.len() > 1
    }
}

/// Outcome reported by the build primitive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildOutput {
    pub success: bool,
    /// Reference to the built image (local tag or archive path).
    pub image_ref: Option<String>,
    /// Diagnostic text, typically the tail of the build log.
    pub diagnostic: String,
}

impl BuildOutput {
    pub fn ok(image_ref: impl Into<String>) -> Self {
        Self {
            success: true,
            image_ref: Some(image_ref.into()),
            diagnostic: String::new(),
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            image_ref: None,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Everything the push primitive needs to publish one image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushRequest {
    pub variant: String,
    pub image_ref: String,
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl PushRequest {
    /// Destination reference, e.g. `docker.io/nrdg/afq:v1.0.0`.
    pub fn destination(&self) -> String {
        crate::tag::image_reference(&self.registry, &self.repository, &self.tag)
    }
}

/// Outcome reported by the push primitive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushOutput {
    pub success: bool,
    pub diagnostic: String,
}

impl PushOutput {
    pub fn ok() -> Self {
        Self {
            success: true,
            diagnostic: String::new(),
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Builds an image from a Dockerfile.
///
/// An `Err` means the primitive could not be invoked at all; a reported
/// failure is `Ok(BuildOutput { success: false, .. })`. Implementations must
/// stop the external process when the returned future is dropped.
#[async_trait]
pub trait BuildPrimitive: Send + Sync {
    async fn build_image(&self, request: &BuildRequest) -> Result<BuildOutput>;
}

/// Pushes a built image to a registry. Authentication is established
/// beforehand by a [`RegistryLogin`] collaborator.
#[async_trait]
pub trait PushPrimitive: Send + Sync {
    async fn push_image(&self, request: &PushRequest) -> Result<PushOutput>;
}

/// Prepares foreign-architecture emulation for this run.
#[async_trait]
pub trait EmulationSetup: Send + Sync {
    async fn initialize(&self, platforms: &[String]) -> Result<()>;
}

/// Confirms the registry session exists before the first push.
#[async_trait]
pub trait RegistryLogin: Send + Sync {
    async fn ensure_authenticated(&self, registry: &str) -> Result<()>;
}
