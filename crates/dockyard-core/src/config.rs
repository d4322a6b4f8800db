//! Pipeline configuration.
//!
//! Loaded from a `dockyard.toml` file. Every setting is optional; missing
//! keys fall back to [`PipelineConfig::default`].
//!
//! ```toml
//! trunk_branch = "master"
//! worker_limit = 2
//! per_build_timeout_secs = 3600
//! registry = "docker.io"
//!
//! [[variant]]
//! name = "cpu"
//! dockerfile = "dockerfiles/cpu.Dockerfile"
//! repository = "nrdg/afq"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{DockyardError, Result};

pub const DEFAULT_TRUNK_BRANCH: &str = "master";
pub const DEFAULT_WORKER_LIMIT: usize = 2;
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Run-wide settings for the pipeline driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Branch whose pushes are treated as releases.
    pub trunk_branch: String,

    /// Maximum number of concurrent builds.
    pub worker_limit: usize,

    /// Per-build timeout in seconds (0 disables the timeout).
    pub per_build_timeout_secs: u64,

    /// Registry host (and optional namespace prefix) pushes go to.
    pub registry: String,

    /// Non-trunk branches that are built (never pushed) on push.
    pub branch_whitelist: Vec<String>,

    /// Also tag tag/release builds as `latest`.
    pub alias_latest: bool,

    /// Also tag trunk builds with the trunk branch name.
    pub alias_trunk: bool,

    /// Root directory for per-variant build workspaces.
    pub workspace_root: PathBuf,

    /// Give every variant its own workspace. When false all builds share
    /// `workspace_root` and are serialized.
    pub isolate_workspaces: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            trunk_branch: DEFAULT_TRUNK_BRANCH.to_string(),
            worker_limit: DEFAULT_WORKER_LIMIT,
            per_build_timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
            registry: DEFAULT_REGISTRY.to_string(),
            branch_whitelist: Vec::new(),
            alias_latest: false,
            alias_trunk: false,
            workspace_root: PathBuf::from(".dockyard/work"),
            isolate_workspaces: true,
        }
    }
}

impl PipelineConfig {
    /// Per-build timeout, `None` when disabled.
    pub fn per_build_timeout(&self) -> Option<Duration> {
        if self.per_build_timeout_secs > 0 {
            Some(Duration::from_secs(self.per_build_timeout_secs))
        } else {
            None
        }
    }

    pub fn is_whitelisted(&self, branch: &str) -> bool {
        self.branch_whitelist.iter().any(|b| b == branch)
    }

    pub fn validate(&self) -> Result<()> {
        if self.trunk_branch.trim().is_empty() {
            return Err(DockyardError::Config("trunk_branch is empty".to_string()));
        }
        if self.worker_limit == 0 {
            return Err(DockyardError::Config(
                "worker_limit must be at least 1".to_string(),
            ));
        }
        if self.registry.trim().is_empty() {
            return Err(DockyardError::Config("registry is empty".to_string()));
        }
        Ok(())
    }
}

/// A variant as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VariantDefinition {
    pub name: String,

    pub dockerfile: PathBuf,

    #[serde(default)]
    pub context: Option<PathBuf>,

    #[serde(default)]
    pub repository: Option<String>,

    #[serde(default)]
    pub build_args: BTreeMap<String, String>,

    #[serde(default)]
    pub platforms: Vec<String>,

    #[serde(default)]
    pub requires_emulation: bool,
}

/// Parsed `dockyard.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DockyardConfig {
    #[serde(flatten)]
    pub pipeline: PipelineConfig,

    #[serde(default, rename = "variant")]
    pub variants: Vec<VariantDefinition>,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,

    /// Top-level keys no setting claimed; rejected by [`DockyardConfig::parse`].
    #[serde(flatten)]
    unknown_keys: BTreeMap<String, toml::Value>,
}

impl DockyardConfig {
    /// Parse configuration text. Relative paths resolve against `base_dir`.
    pub fn parse(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config: DockyardConfig = toml::from_str(content)?;
        if !config.unknown_keys.is_empty() {
            let keys: Vec<&str> = config.unknown_keys.keys().map(String::as_str).collect();
            return Err(DockyardError::Config(format!(
                "unknown configuration key(s): {}",
                keys.join(", ")
            )));
        }
        config.base_dir = base_dir.into();
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DockyardError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self::parse(&content, base_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.trunk_branch, "master");
        assert_eq!(config.worker_limit, 2);
        assert_eq!(config.per_build_timeout(), Some(Duration::from_secs(3600)));
        assert!(config.isolate_workspaces);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config = PipelineConfig {
            per_build_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.per_build_timeout(), None);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = PipelineConfig {
            worker_limit: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DockyardError::Config(_))));
    }

    #[test]
    fn test_parse_full_file() {
        let content = r#"
trunk_branch = "main"
worker_limit = 3
per_build_timeout_secs = 600
registry = "ghcr.io/nrdg"
branch_whitelist = ["staging"]
alias_latest = true

[[variant]]
name = "cpu"
dockerfile = "docker/cpu.Dockerfile"

[[variant]]
name = "gpu-cuda12"
dockerfile = "docker/gpu.Dockerfile"
repository = "afq-gpu-cuda12"
platforms = ["linux/amd64", "linux/arm64"]

[variant.build_args]
CUDA_BASE = "nvidia/cuda:12.2.0-devel-ubuntu22.04"
CUDA_MAJOR = "12"
"#;
        let config = DockyardConfig::parse(content, "/repo").unwrap();
        assert_eq!(config.pipeline.trunk_branch, "main");
        assert_eq!(config.pipeline.worker_limit, 3);
        assert!(config.pipeline.alias_latest);
        assert!(config.pipeline.is_whitelisted("staging"));
        assert_eq!(config.base_dir, PathBuf::from("/repo"));
        assert_eq!(config.variants.len(), 2);
        assert_eq!(config.variants[1].build_args["CUDA_MAJOR"], "12");
        assert_eq!(config.variants[1].platforms.len(), 2);
    }

    #[test]
    fn test_parse_empty_file_uses_defaults() {
        let config = DockyardConfig::parse("", ".").unwrap();
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert!(config.variants.is_empty());
    }

    #[test]
    fn test_parse_invalid_toml() {
        let err = DockyardConfig::parse("worker_limit = \"many\"", ".").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        let err = DockyardConfig::parse("worker_limt = 4\n", ".").unwrap_err();
        assert!(matches!(err, DockyardError::Config(ref m) if m.contains("worker_limt")));
    }

    #[test]
    fn test_unknown_variant_key_rejected() {
        let content = r#"
[[variant]]
name = "arm"
dockerfile = "Dockerfile"
platform = ["linux/arm64"]
"#;
        let err = DockyardConfig::parse(content, ".").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("platform"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = DockyardConfig::from_path(Path::new("/nonexistent/dockyard.toml")).unwrap_err();
        assert!(matches!(err, DockyardError::Config(_)));
    }
}
