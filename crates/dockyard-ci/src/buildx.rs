//! `docker buildx` build primitive.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use dockyard_core::{BuildOutput, BuildPrimitive, BuildRequest};

use crate::command::{run_command, CommandSpec};

/// Prefix of image references that point at an OCI archive on disk.
pub const OCI_ARCHIVE_PREFIX: &str = "oci-archive:";

/// Builds images with `docker buildx build`.
///
/// Single-platform builds are loaded into the local image store under
/// `<repository>:<tag>`. Multi-platform builds cannot be loaded, so they are
/// written as an OCI archive in the variant workspace and referenced as
/// `oci-archive:<path>`.
#[derive(Debug, Clone)]
pub struct BuildxBuilder {
    program: String,
    builder: Option<String>,
}

impl Default for BuildxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildxBuilder {
    pub fn new() -> Self {
        Self::with_program("docker")
    }

    /// Use another docker-compatible executable.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            builder: None,
        }
    }

    /// Run builds on a named buildx builder instance.
    pub fn with_builder(mut self, builder: impl Into<String>) -> Self {
        self.builder = Some(builder.into());
        self
    }

    /// Archive written for a multi-platform build.
    pub fn archive_path(request: &BuildRequest) -> PathBuf {
        request
            .workspace
            .join(format!("{}-{}.oci.tar", request.variant, request.tag))
    }

    /// The command line for one build, plus the image reference it produces.
    pub fn command_for(&self, request: &BuildRequest) -> (CommandSpec, String) {
        let mut spec = CommandSpec::new(&self.program).args(["buildx", "build"]);
        if let Some(builder) = &self.builder {
            spec = spec.arg("--builder").arg(builder);
        }
        spec = spec
            .arg("--file")
            .arg(request.dockerfile_path.display().to_string())
            .arg("--platform")
            .arg(request.platforms.join(","));
        for (key, value) in &request.build_args {
            spec = spec.arg("--build-arg").arg(format!("{}={}", key, value));
        }
        spec = spec.arg("--tag").arg(&request.local_name);

        let image_ref = if request.is_multi_platform() {
            let archive = Self::archive_path(request);
            spec = spec
                .arg("--output")
                .arg(format!("type=oci,dest={}", archive.display()));
            format!("{}{}", OCI_ARCHIVE_PREFIX, archive.display())
        } else {
            spec = spec.arg("--load");
            request.local_name.clone()
        };

        let spec = spec
            .arg(request.context_dir.display().to_string())
            .current_dir(&request.workspace);
        (spec, image_ref)
    }
}

#[async_trait]
impl BuildPrimitive for BuildxBuilder {
    async fn build_image(&self, request: &BuildRequest) -> dockyard_core::Result<BuildOutput> {
        let (spec, image_ref) = self.command_for(request);
        info!(variant = %request.variant, tag = %request.tag, command = %spec.display(), "buildx build");

        let output = run_command(&spec).await?;
        if output.passed() {
            Ok(BuildOutput::ok(image_ref))
        } else {
            Ok(BuildOutput::failed(output.diagnostic()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn request(platforms: &[&str]) -> BuildRequest {
        let mut build_args = BTreeMap::new();
        build_args.insert("CUDA_VERSION".to_string(), "12.4".to_string());
        BuildRequest {
            variant: "gpu".into(),
            dockerfile_path: "/src/docker/gpu.Dockerfile".into(),
            context_dir: "/src".into(),
            build_args,
            tag: "v1.0.0".into(),
            platforms: platforms.iter().map(|p| p.to_string()).collect(),
            workspace: "/work/gpu".into(),
            local_name: "nrdg/afq-gpu:v1.0.0".into(),
        }
    }

    #[test]
    fn test_single_platform_loads_image() {
        let (spec, image_ref) = BuildxBuilder::new().command_for(&request(&["linux/amd64"]));
        assert_eq!(
            spec.display(),
            "docker buildx build --file /src/docker/gpu.Dockerfile --platform linux/amd64 \
             --build-arg CUDA_VERSION=12.4 --tag nrdg/afq-gpu:v1.0.0 --load /src"
        );
        assert_eq!(image_ref, "nrdg/afq-gpu:v1.0.0");
        assert_eq!(spec.cwd, Some(PathBuf::from("/work/gpu")));
    }

    #[test]
    fn test_multi_platform_writes_oci_archive() {
        let (spec, image_ref) = BuildxBuilder::new()
            .with_builder("multiarch")
            .command_for(&request(&["linux/amd64", "linux/arm64"]));
        let line = spec.display();
        assert!(line.contains("--builder multiarch"));
        assert!(line.contains("--platform linux/amd64,linux/arm64"));
        assert!(line.contains("--output type=oci,dest=/work/gpu/gpu-v1.0.0.oci.tar"));
        assert!(!line.contains("--load"));
        assert_eq!(image_ref, "oci-archive:/work/gpu/gpu-v1.0.0.oci.tar");
    }
}
