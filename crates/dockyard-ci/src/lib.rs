//! Dockyard CI - shell-backed collaborators for the release pipeline
//!
//! Provides the concrete primitives the core drives:
//! - `docker buildx build` for building variants
//! - `docker push` / `skopeo copy` for publishing
//! - QEMU binfmt registration for multi-architecture builds
//! - registry session checks against the docker client config
//! - trigger detection from the GitHub Actions environment

pub mod buildx;
pub mod command;
pub mod credentials;
pub mod emulation;
pub mod error;
pub mod github;
pub mod pusher;

// Re-export key types
pub use buildx::BuildxBuilder;
pub use command::{run_command, CommandOutput, CommandSpec};
pub use credentials::{DockerConfigAuth, DockerConfigFile};
pub use emulation::QemuBinfmt;
pub use error::{CiError, Result};
pub use github::{step_summary_path, trigger_from_env, trigger_from_lookup};
pub use pusher::DockerPusher;
