//! Variant registry: the static catalog of image variants.
//!
//! Built once at startup and never mutated. Loading fails fast with
//! [`DockyardError::Config`] on a missing Dockerfile or a duplicated name.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use crate::config::{DockyardConfig, VariantDefinition};
use crate::domain::{DockyardError, Result, Variant, DEFAULT_PLATFORM};

fn variant_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$").expect("variant name pattern is valid")
    })
}

/// Ordered, immutable catalog of variants.
#[derive(Debug, Clone)]
pub struct VariantRegistry {
    variants: Vec<Variant>,
    digest: String,
}

impl VariantRegistry {
    /// Validate and freeze a list of variants.
    pub fn new(variants: Vec<Variant>) -> Result<Self> {
        if variants.is_empty() {
            return Err(DockyardError::Config(
                "variant registry is empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for variant in &variants {
            if variant.name.trim().is_empty() {
                return Err(DockyardError::Config("variant name is empty".to_string()));
            }
            if !variant_name_pattern().is_match(&variant.name) {
                return Err(DockyardError::Config(format!(
                    "invalid variant name '{}' (allowed: letters, digits, '.', '_', '-')",
                    variant.name
                )));
            }
            if !seen.insert(variant.name.as_str()) {
                return Err(DockyardError::Config(format!(
                    "duplicate variant name: {}",
                    variant.name
                )));
            }
            if !variant.dockerfile_path.is_file() {
                return Err(DockyardError::Config(format!(
                    "Dockerfile for variant '{}' not found: {}",
                    variant.name,
                    variant.dockerfile_path.display()
                )));
            }
            if variant.platforms.is_empty() {
                return Err(DockyardError::Config(format!(
                    "variant '{}' has no target platforms",
                    variant.name
                )));
            }
        }

        let digest = compute_registry_digest(&variants);
        tracing::debug!(count = variants.len(), digest = %&digest[..12], "variant registry loaded");

        Ok(Self { variants, digest })
    }

    /// Build from configuration-file definitions; relative paths resolve
    /// against `base_dir`.
    pub fn from_definitions(definitions: &[VariantDefinition], base_dir: &Path) -> Result<Self> {
        let variants = definitions
            .iter()
            .map(|def| {
                let dockerfile_path = base_dir.join(&def.dockerfile);
                let mut variant = Variant::new(def.name.clone(), dockerfile_path);
                if let Some(context) = &def.context {
                    variant.context_dir = base_dir.join(context);
                }
                if let Some(repository) = &def.repository {
                    variant.repository = repository.clone();
                }
                variant.build_args = def.build_args.clone();
                let platforms = if def.platforms.is_empty() {
                    vec![DEFAULT_PLATFORM.to_string()]
                } else {
                    def.platforms.clone()
                };
                variant = variant.with_platforms(platforms);
                if def.requires_emulation {
                    variant = variant.with_emulation();
                }
                variant
            })
            .collect();
        Self::new(variants)
    }

    pub fn from_config(config: &DockyardConfig) -> Result<Self> {
        Self::from_definitions(&config.variants, &config.base_dir)
    }

    /// All variants in declaration order.
    pub fn list_variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn get(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// SHA-256 over the ordered catalog (hex).
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// Deterministic digest of the ordered variant catalog.
fn compute_registry_digest(variants: &[Variant]) -> String {
    let mut hasher = Sha256::new();
    for variant in variants {
        hasher.update(variant.name.as_bytes());
        hasher.update(b"\0");
        hasher.update(variant.dockerfile_path.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(variant.repository.as_bytes());
        hasher.update(b"\0");
        // BTreeMap iteration order is sorted
        for (key, value) in &variant.build_args {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        for platform in &variant.platforms {
            hasher.update(platform.as_bytes());
            hasher.update(b",");
        }
        hasher.update(if variant.requires_emulation { b"1" } else { b"0" });
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}
