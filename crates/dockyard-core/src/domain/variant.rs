//! Image variant definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Platform used when a variant does not list any.
pub const DEFAULT_PLATFORM: &str = "linux/amd64";

/// One distinct flavor of the image (e.g. CPU, GPU+CUDA11, GPU+CUDA12).
///
/// Identity is `name`; two variants with the same name are the same variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// Unique variant name.
    pub name: String,

    /// Path to the Dockerfile.
    pub dockerfile_path: PathBuf,

    /// Build context directory.
    pub context_dir: PathBuf,

    /// Registry repository the variant is published to (e.g. `nrdg/afq-gpu`).
    pub repository: String,

    /// Named build parameters, passed as `--build-arg`.
    pub build_args: BTreeMap<String, String>,

    /// Target platforms in preference order.
    pub platforms: Vec<String>,

    /// Whether building needs foreign-architecture emulation.
    pub requires_emulation: bool,
}

impl Variant {
    /// Create a single-platform variant with the context set to the
    /// Dockerfile's directory and the repository set to the name.
    pub fn new(name: impl Into<String>, dockerfile_path: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let dockerfile_path = dockerfile_path.into();
        let context_dir = dockerfile_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            repository: name.clone(),
            name,
            dockerfile_path,
            context_dir,
            build_args: BTreeMap::new(),
            platforms: vec![DEFAULT_PLATFORM.to_string()],
            requires_emulation: false,
        }
    }

    /// Add a build argument.
    pub fn with_build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }

    /// Set the publish repository.
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }

    /// Set target platforms. More than one platform implies emulation.
    pub fn with_platforms(mut self, platforms: Vec<String>) -> Self {
        if platforms.len() > 1 {
            self.requires_emulation = true;
        }
        self.platforms = platforms;
        self
    }

    /// Mark the variant as requiring emulation.
    pub fn with_emulation(mut self) -> Self {
        self.requires_emulation = true;
        self
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Variant {}

impl std::hash::Hash for Variant {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_defaults() {
        let v = Variant::new("cpu", "docker/cpu/Dockerfile");
        assert_eq!(v.repository, "cpu");
        assert_eq!(v.context_dir, PathBuf::from("docker/cpu"));
        assert_eq!(v.platforms, vec![DEFAULT_PLATFORM.to_string()]);
        assert!(!v.requires_emulation);
    }

    #[test]
    fn test_bare_dockerfile_uses_current_dir_as_context() {
        let v = Variant::new("cpu", "Dockerfile");
        assert_eq!(v.context_dir, PathBuf::from("."));
    }

    #[test]
    fn test_multi_platform_implies_emulation() {
        let v = Variant::new("cpu", "Dockerfile")
            .with_platforms(vec!["linux/amd64".into(), "linux/arm64".into()]);
        assert!(v.requires_emulation);
    }

    #[test]
    fn test_identity_is_name() {
        let a = Variant::new("gpu", "a/Dockerfile").with_build_arg("CUDA", "11");
        let b = Variant::new("gpu", "b/Dockerfile");
        assert_eq!(a, b);
        assert_ne!(a, Variant::new("cpu", "a/Dockerfile"));
    }
}
