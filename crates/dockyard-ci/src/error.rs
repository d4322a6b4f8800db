//! Errors raised by the shell-backed collaborators.

use dockyard_core::DockyardError;

#[derive(Debug, thiserror::Error)]
pub enum CiError {
    #[error("command is empty")]
    EmptyCommand,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("missing environment variable {0}")]
    MissingEnv(String),

    #[error("unsupported CI event: {0}")]
    UnsupportedEvent(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CiError>;

impl From<CiError> for DockyardError {
    fn from(err: CiError) -> Self {
        match err {
            CiError::MissingEnv(_) | CiError::UnsupportedEvent(_) => {
                DockyardError::Trigger(err.to_string())
            }
            other => DockyardError::BuildPrimitive(other.to_string()),
        }
    }
}
