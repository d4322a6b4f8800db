//! Domain-level error taxonomy for dockyard.
//!
//! Fatal errors ([`DockyardError::Config`], [`DockyardError::TagResolution`])
//! abort a run before any build starts. Every other failure is isolated to a
//! single variant and is carried inside the report as an [`ErrorDescriptor`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Classification of an isolated, per-variant failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required collaborator (e.g. emulation) was not initialized.
    Precondition,
    /// The build primitive reported failure or could not be invoked.
    BuildPrimitive,
    /// The build exceeded the per-build timeout.
    Timeout,
    /// The push primitive or registry authentication failed.
    PushFailed,
    /// The run was cancelled externally.
    Cancelled,
    /// The release intent excluded this variant.
    Gated,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Precondition => write!(f, "precondition"),
            ErrorKind::BuildPrimitive => write!(f, "build_primitive"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::PushFailed => write!(f, "push_failed"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Gated => write!(f, "gated"),
        }
    }
}

/// Serializable description of an isolated failure, stored in results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDescriptor {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Category of an error that aborts a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FatalKind {
    Config,
    TagResolution,
    Trigger,
    Internal,
}

impl std::fmt::Display for FatalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FatalKind::Config => write!(f, "config"),
            FatalKind::TagResolution => write!(f, "tag_resolution"),
            FatalKind::Trigger => write!(f, "trigger"),
            FatalKind::Internal => write!(f, "internal"),
        }
    }
}

/// Structured record of a run that aborted before producing a report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FatalDiagnostic {
    pub kind: FatalKind,
    pub message: String,
}

impl FatalDiagnostic {
    pub fn new(kind: FatalKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&DockyardError> for FatalDiagnostic {
    fn from(err: &DockyardError) -> Self {
        Self::new(err.fatal_kind(), err.to_string())
    }
}

/// dockyard errors.
#[derive(Debug, thiserror::Error)]
pub enum DockyardError {
    #[error("config error: {0}")]
    Config(String),

    #[error("tag resolution error: {0}")]
    TagResolution(String),

    #[error("trigger error: {0}")]
    Trigger(String),

    #[error("precondition error: {0}")]
    Precondition(String),

    #[error("build primitive error: {0}")]
    BuildPrimitive(String),

    #[error("build timed out after {limit:?}: {variant}:{tag}")]
    Timeout {
        variant: String,
        tag: String,
        limit: Duration,
    },

    #[error("push failed: {0}")]
    PushFailed(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("invalid phase transition: {current} -> {requested}")]
    InvalidPhaseTransition { current: String, requested: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DockyardError {
    /// Whether this error aborts the whole run rather than a single variant.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DockyardError::Config(_)
                | DockyardError::ConfigParse(_)
                | DockyardError::TagResolution(_)
                | DockyardError::Trigger(_)
                | DockyardError::InvalidPhaseTransition { .. }
        )
    }

    /// Category reported when this error aborts a run.
    pub fn fatal_kind(&self) -> FatalKind {
        match self {
            DockyardError::Config(_) | DockyardError::ConfigParse(_) => FatalKind::Config,
            DockyardError::TagResolution(_) => FatalKind::TagResolution,
            DockyardError::Trigger(_) => FatalKind::Trigger,
            _ => FatalKind::Internal,
        }
    }

    /// Convert into the descriptor stored in a per-variant result.
    pub fn descriptor(&self) -> ErrorDescriptor {
        let kind = match self {
            DockyardError::Precondition(_) => ErrorKind::Precondition,
            DockyardError::Timeout { .. } => ErrorKind::Timeout,
            DockyardError::PushFailed(_) => ErrorKind::PushFailed,
            DockyardError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::BuildPrimitive,
        };
        ErrorDescriptor::new(kind, self.to_string())
    }
}

/// Result type for dockyard operations.
pub type Result<T> = std::result::Result<T, DockyardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DockyardError::Config("duplicate variant name: cpu".to_string());
        assert!(err.to_string().contains("config error"));
        assert!(err.to_string().contains("cpu"));

        let err = DockyardError::Timeout {
            variant: "gpu".to_string(),
            tag: "v1.0.0".to_string(),
            limit: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("gpu:v1.0.0"));
        assert!(err.to_string().contains("30s"));

        let err = DockyardError::Timeout {
            variant: "gpu".to_string(),
            tag: "v1.0.0".to_string(),
            limit: Duration::from_millis(250),
        };
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(DockyardError::Config("x".into()).is_fatal());
        assert!(DockyardError::TagResolution("x".into()).is_fatal());
        assert!(!DockyardError::Precondition("x".into()).is_fatal());
        assert!(!DockyardError::PushFailed("x".into()).is_fatal());
        assert!(!DockyardError::Cancelled.is_fatal());
    }

    #[test]
    fn test_fatal_diagnostic_kinds() {
        let diag = FatalDiagnostic::from(&DockyardError::Config("worker_limit".into()));
        assert_eq!(diag.kind, FatalKind::Config);
        assert!(diag.message.contains("worker_limit"));

        let diag = FatalDiagnostic::from(&DockyardError::Trigger("no sha".into()));
        assert_eq!(diag.kind, FatalKind::Trigger);
        assert!(DockyardError::Trigger("x".into()).is_fatal());

        let json = serde_json::to_value(FatalDiagnostic::from(&DockyardError::TagResolution(
            "bad tag".into(),
        )))
        .unwrap();
        assert_eq!(json["kind"], "tag_resolution");
        assert_eq!(json["message"], "tag resolution error: bad tag");
    }

    #[test]
    fn test_descriptor_kinds() {
        let d = DockyardError::Timeout {
            variant: "cpu".into(),
            tag: "abc1234".into(),
            limit: Duration::from_secs(1),
        }
        .descriptor();
        assert_eq!(d.kind, ErrorKind::Timeout);

        let d = DockyardError::BuildPrimitive("exit 1".into()).descriptor();
        assert_eq!(d.kind, ErrorKind::BuildPrimitive);
        assert!(d.message.contains("exit 1"));

        assert_eq!(
            DockyardError::Cancelled.descriptor().kind,
            ErrorKind::Cancelled
        );
    }

    #[test]
    fn test_descriptor_serializes_snake_case() {
        let d = ErrorDescriptor::new(ErrorKind::PushFailed, "denied");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], "push_failed");
        assert_eq!(json["message"], "denied");
    }
}
