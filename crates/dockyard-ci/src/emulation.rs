//! QEMU binfmt registration for foreign-architecture builds.

use async_trait::async_trait;
use tracing::info;

use dockyard_core::{DockyardError, EmulationSetup};

use crate::command::{run_command, CommandSpec};

pub const DEFAULT_BINFMT_IMAGE: &str = "tonistiigi/binfmt";

/// Registers QEMU handlers by running the binfmt installer image.
#[derive(Debug, Clone)]
pub struct QemuBinfmt {
    program: String,
    image: String,
    host_arch: String,
}

impl Default for QemuBinfmt {
    fn default() -> Self {
        Self::new()
    }
}

impl QemuBinfmt {
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
            image: DEFAULT_BINFMT_IMAGE.to_string(),
            host_arch: host_arch().to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_host_arch(mut self, arch: impl Into<String>) -> Self {
        self.host_arch = arch.into();
        self
    }

    /// binfmt architecture names needed for `platforms`, excluding the host.
    pub fn architectures(&self, platforms: &[String]) -> Vec<String> {
        let mut archs: Vec<String> = Vec::new();
        for platform in platforms {
            let arch = platform_arch(platform);
            if arch != self.host_arch && !archs.iter().any(|a| a == arch) {
                archs.push(arch.to_string());
            }
        }
        archs
    }

    /// The installer invocation, or `None` when nothing needs emulating.
    pub fn command_for(&self, platforms: &[String]) -> Option<CommandSpec> {
        let archs = self.architectures(platforms);
        if archs.is_empty() {
            return None;
        }
        Some(CommandSpec::new(&self.program).args([
            "run".to_string(),
            "--privileged".to_string(),
            "--rm".to_string(),
            self.image.clone(),
            "--install".to_string(),
            archs.join(","),
        ]))
    }
}

/// `linux/arm64` → `arm64`, `linux/arm/v7` → `arm`.
fn platform_arch(platform: &str) -> &str {
    platform.split('/').nth(1).unwrap_or(platform)
}

/// Host architecture in docker platform terms.
fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64le",
        other => other,
    }
}

#[async_trait]
impl EmulationSetup for QemuBinfmt {
    async fn initialize(&self, platforms: &[String]) -> dockyard_core::Result<()> {
        let Some(spec) = self.command_for(platforms) else {
            return Ok(());
        };
        info!(command = %spec.display(), "registering binfmt handlers");

        let output = run_command(&spec)
            .await
            .map_err(|e| DockyardError::Precondition(e.to_string()))?;
        if !output.passed() {
            return Err(DockyardError::Precondition(format!(
                "binfmt installation failed: {}",
                output.diagnostic()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platforms(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_host_architecture_is_not_emulated() {
        let qemu = QemuBinfmt::new().with_host_arch("amd64");
        assert_eq!(
            qemu.architectures(&platforms(&["linux/amd64", "linux/arm64", "linux/arm/v7"])),
            vec!["arm64", "arm"]
        );
        assert!(qemu.command_for(&platforms(&["linux/amd64"])).is_none());
    }

    #[test]
    fn test_install_command() {
        let spec = QemuBinfmt::new()
            .with_host_arch("amd64")
            .command_for(&platforms(&["linux/amd64", "linux/arm64"]))
            .unwrap();
        assert_eq!(
            spec.display(),
            "docker run --privileged --rm tonistiigi/binfmt --install arm64"
        );
    }

    #[tokio::test]
    async fn test_failed_install_is_precondition_error() {
        let qemu = QemuBinfmt::new().with_program("false").with_host_arch("amd64");
        let err = qemu
            .initialize(&platforms(&["linux/arm64"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DockyardError::Precondition(_)));
    }
}
