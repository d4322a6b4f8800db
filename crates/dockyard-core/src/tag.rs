//! Tag resolution.
//!
//! Registry tag grammar: at most 128 characters from `[A-Za-z0-9_.-]`,
//! not starting with `.` or `-`.

use regex::Regex;
use std::sync::OnceLock;

use crate::domain::{DockyardError, ReleaseIntent, Result};

/// Length of the abbreviated commit SHA used as a tag.
pub const SHORT_SHA_LEN: usize = 7;

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("tag pattern is valid")
    })
}

/// Whether `tag` is a legal registry tag.
pub fn is_valid_tag(tag: &str) -> bool {
    tag_pattern().is_match(tag)
}

/// Abbreviate a commit SHA to its first seven characters.
pub fn short_sha(sha: &str) -> Result<String> {
    let sha = sha.trim();
    if sha.len() < SHORT_SHA_LEN || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DockyardError::TagResolution(format!(
            "'{}' is not a commit SHA (expected at least {} hex characters)",
            sha, SHORT_SHA_LEN
        )));
    }
    Ok(sha[..SHORT_SHA_LEN].to_string())
}

/// Compute the concrete tags for an intent, in preference order.
///
/// Pure: the same intent always yields the same sequence. Duplicate
/// candidates are dropped keeping the first occurrence.
pub fn resolve(intent: &ReleaseIntent) -> Result<Vec<String>> {
    let mut tags: Vec<String> = Vec::with_capacity(intent.tag_candidates.len());
    for candidate in &intent.tag_candidates {
        if !is_valid_tag(candidate) {
            return Err(DockyardError::TagResolution(format!(
                "'{}' is not a valid registry tag",
                candidate
            )));
        }
        if !tags.contains(candidate) {
            tags.push(candidate.clone());
        }
    }

    if tags.is_empty() {
        return Err(DockyardError::TagResolution(
            "no tag candidates for this trigger".to_string(),
        ));
    }
    Ok(tags)
}

/// Full image reference, e.g. `docker.io/nrdg/afq:v1.2.3`.
pub fn image_reference(registry: &str, repository: &str, tag: &str) -> String {
    let registry = registry.trim_end_matches('/');
    if registry.is_empty() {
        format!("{}:{}", repository, tag)
    } else {
        format!("{}/{}:{}", registry, repository, tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IntentReason;

    fn intent(candidates: &[&str]) -> ReleaseIntent {
        ReleaseIntent {
            variants: vec![],
            tag_candidates: candidates.iter().map(|s| s.to_string()).collect(),
            push_eligible: true,
            reason: IntentReason::Tag {
                tag: candidates.first().unwrap_or(&"").to_string(),
            },
        }
    }

    #[test]
    fn test_short_sha() {
        assert_eq!(short_sha("abc1234").unwrap(), "abc1234");
        assert_eq!(
            short_sha("abcdef1234567890abcdef1234567890abcdef12").unwrap(),
            "abcdef1"
        );
        assert!(short_sha("abc").is_err());
        assert!(short_sha("zzzzzzzz").is_err());
        assert!(short_sha("").is_err());
    }

    #[test]
    fn test_valid_tags() {
        assert!(is_valid_tag("v1.2.3"));
        assert!(is_valid_tag("abc1234"));
        assert!(is_valid_tag("latest"));
        assert!(is_valid_tag("1.0.0-rc.1"));
        assert!(is_valid_tag("_internal"));
    }

    #[test]
    fn test_invalid_tags() {
        assert!(!is_valid_tag(""));
        assert!(!is_valid_tag(".hidden"));
        assert!(!is_valid_tag("-dash"));
        assert!(!is_valid_tag("release/1.0"));
        assert!(!is_valid_tag("v1.0+build"));
        assert!(!is_valid_tag(&"a".repeat(129)));
        assert!(is_valid_tag(&"a".repeat(128)));
    }

    #[test]
    fn test_resolve_preserves_order() {
        let tags = resolve(&intent(&["v1.2.3", "latest"])).unwrap();
        assert_eq!(tags, vec!["v1.2.3", "latest"]);
    }

    #[test]
    fn test_resolve_dedups() {
        let tags = resolve(&intent(&["master", "master"])).unwrap();
        assert_eq!(tags, vec!["master"]);
    }

    #[test]
    fn test_resolve_rejects_illegal_characters() {
        let err = resolve(&intent(&["release/2024"])).unwrap_err();
        assert!(matches!(err, DockyardError::TagResolution(_)));
    }

    #[test]
    fn test_resolve_rejects_empty() {
        assert!(resolve(&intent(&[])).is_err());
    }

    #[test]
    fn test_resolve_deterministic() {
        let i = intent(&["v3.1.0", "latest"]);
        assert_eq!(resolve(&i).unwrap(), resolve(&i).unwrap());
    }

    #[test]
    fn test_image_reference() {
        assert_eq!(
            image_reference("docker.io", "nrdg/afq", "v1.0.0"),
            "docker.io/nrdg/afq:v1.0.0"
        );
        assert_eq!(
            image_reference("ghcr.io/org/", "afq", "abc1234"),
            "ghcr.io/org/afq:abc1234"
        );
        assert_eq!(image_reference("", "afq", "latest"), "afq:latest");
    }
}
