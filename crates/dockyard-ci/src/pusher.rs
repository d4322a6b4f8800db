//! Registry push primitive.

use async_trait::async_trait;
use tracing::info;

use dockyard_core::{PushOutput, PushPrimitive, PushRequest};

use crate::buildx::OCI_ARCHIVE_PREFIX;
use crate::command::{run_command, CommandSpec};

/// Publishes images with `docker tag` + `docker push`, or `skopeo copy` for
/// OCI archives produced by multi-platform builds.
#[derive(Debug, Clone)]
pub struct DockerPusher {
    docker: String,
    skopeo: String,
}

impl Default for DockerPusher {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerPusher {
    pub fn new() -> Self {
        Self::with_programs("docker", "skopeo")
    }

    pub fn with_programs(docker: impl Into<String>, skopeo: impl Into<String>) -> Self {
        Self {
            docker: docker.into(),
            skopeo: skopeo.into(),
        }
    }

    /// Commands to run, in order, for one push.
    pub fn commands_for(&self, request: &PushRequest) -> Vec<CommandSpec> {
        let destination = request.destination();
        match request.image_ref.strip_prefix(OCI_ARCHIVE_PREFIX) {
            Some(_) => vec![CommandSpec::new(&self.skopeo).args([
                "copy".to_string(),
                "--all".to_string(),
                request.image_ref.clone(),
                format!("docker://{}", destination),
            ])],
            None => vec![
                CommandSpec::new(&self.docker).args([
                    "tag".to_string(),
                    request.image_ref.clone(),
                    destination.clone(),
                ]),
                CommandSpec::new(&self.docker).args(["push".to_string(), destination]),
            ],
        }
    }
}

#[async_trait]
impl PushPrimitive for DockerPusher {
    async fn push_image(&self, request: &PushRequest) -> dockyard_core::Result<PushOutput> {
        for spec in self.commands_for(request) {
            info!(variant = %request.variant, tag = %request.tag, command = %spec.display(), "push");
            let output = run_command(&spec).await?;
            if !output.passed() {
                return Ok(PushOutput::failed(output.diagnostic()));
            }
        }
        Ok(PushOutput::ok())
    }
}
