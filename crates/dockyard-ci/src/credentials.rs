//! Registry session check against the docker client configuration.
//!
//! Credentials are provisioned outside dockyard (e.g. by a `docker login`
//! step). This only confirms that a session exists for the target registry.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dockyard_core::{DockyardError, RegistryLogin};

use crate::error::Result;

const DOCKER_HUB_KEYS: &[&str] = &[
    "https://index.docker.io/v1/",
    "index.docker.io",
    "docker.io",
    "registry-1.docker.io",
];

/// Subset of `~/.docker/config.json` relevant to authentication.
#[derive(Debug, Default, Deserialize)]
pub struct DockerConfigFile {
    #[serde(default)]
    pub auths: HashMap<String, serde_json::Value>,

    #[serde(default, rename = "credHelpers")]
    pub cred_helpers: HashMap<String, String>,

    #[serde(default, rename = "credsStore")]
    pub creds_store: Option<String>,
}

impl DockerConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Whether a credential source is configured for `registry`.
    pub fn has_credentials(&self, registry: &str) -> bool {
        if self.creds_store.as_deref().is_some_and(|s| !s.is_empty()) {
            return true;
        }
        let host = normalize_registry(registry);
        let candidates: Vec<&str> = if DOCKER_HUB_KEYS.contains(&host) {
            DOCKER_HUB_KEYS.to_vec()
        } else {
            vec![host]
        };
        self.auths
            .keys()
            .chain(self.cred_helpers.keys())
            .any(|key| candidates.contains(&normalize_registry(key)))
    }
}

/// `https://ghcr.io/v2/` → `ghcr.io`; Docker Hub's legacy URL is kept whole.
fn normalize_registry(registry: &str) -> &str {
    if DOCKER_HUB_KEYS.contains(&registry) {
        return registry;
    }
    let trimmed = registry
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    trimmed.split('/').next().unwrap_or(trimmed)
}

/// Confirms docker has credentials for the registry before the first push.
#[derive(Debug, Clone, Default)]
pub struct DockerConfigAuth {
    config_dir: Option<PathBuf>,
}

impl DockerConfigAuth {
    /// Resolve the config directory from `DOCKER_CONFIG` or `$HOME/.docker`.
    pub fn from_env() -> Self {
        let config_dir = std::env::var_os("DOCKER_CONFIG")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".docker")));
        Self { config_dir }
    }

    pub fn with_config_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: Some(dir.into()),
        }
    }

    pub fn config_path(&self) -> Option<PathBuf> {
        self.config_dir.as_ref().map(|d| d.join("config.json"))
    }
}

#[async_trait]
impl RegistryLogin for DockerConfigAuth {
    async fn ensure_authenticated(&self, registry: &str) -> dockyard_core::Result<()> {
        let path = self.config_path().ok_or_else(|| {
            DockyardError::PushFailed("cannot locate docker config directory".to_string())
        })?;
        let config = DockerConfigFile::load(&path).map_err(|e| {
            DockyardError::PushFailed(format!("cannot read {}: {}", path.display(), e))
        })?;
        if config.has_credentials(registry) {
            Ok(())
        } else {
            Err(DockyardError::PushFailed(format!(
                "no credentials for {} in {}",
                registry,
                path.display()
            )))
        }
    }
}
