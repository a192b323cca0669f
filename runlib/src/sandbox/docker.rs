use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    KillContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
    WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, warn};

use super::{OutputChunk, SandboxHandle, SandboxIo, SandboxRuntime, SandboxSpec};
use crate::error::{Error, Result};

/// Container-backed sandbox runtime.
///
/// Docker multiplexes stdout/stderr onto one framed stream; the framing
/// is stripped here, inside the adapter, so the engine only ever sees
/// two clean byte channels.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon via its default socket.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_socket_defaults()?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl SandboxRuntime for DockerRuntime {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle> {
        let host_config = HostConfig {
            memory: Some((spec.limits.memory_mib * 1024 * 1024) as i64),
            nano_cpus: Some((spec.limits.cpu_cores * 1_000_000_000.0) as i64),
            binds: Some(vec![format!("{}:/app", spec.workspace.display())]),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            network_disabled: Some(true),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            open_stdin: Some(true),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };
        let response = self.docker.create_container(Some(options), config).await?;
        debug!(container_id = %response.id, image = %spec.image, "created container");
        Ok(SandboxHandle(response.id))
    }

    async fn start(&self, handle: &SandboxHandle) -> Result<()> {
        self.docker
            .start_container(&handle.0, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn attach(&self, handle: &SandboxHandle) -> Result<SandboxIo> {
        let options = AttachContainerOptions::<String> {
            stdin: Some(true),
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            ..Default::default()
        };
        let AttachContainerResults { output, input } = self
            .docker
            .attach_container(&handle.0, Some(options))
            .await?;

        let output = output
            .filter_map(|item| async move {
                match item {
                    Ok(LogOutput::StdOut { message }) => Some(OutputChunk::Stdout(message)),
                    Ok(LogOutput::StdErr { message }) => Some(OutputChunk::Stderr(message)),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(error = %e, "container output stream error");
                        None
                    }
                }
            })
            .boxed();

        Ok(SandboxIo {
            output,
            stdin: input,
        })
    }

    async fn wait(&self, handle: &SandboxHandle) -> Result<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut wait = self.docker.wait_container(&handle.0, Some(options));
        match wait.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // non-zero exit codes surface as a wait error; they are
            // still a clean exit from the engine's point of view
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(Error::Sandbox(
                "wait stream ended without an exit status".into(),
            )),
        }
    }

    async fn kill(&self, handle: &SandboxHandle) -> Result<()> {
        match self
            .docker
            .kill_container(&handle.0, None::<KillContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            // already exited or already gone
            Err(BollardError::DockerResponseServerError {
                status_code: 404 | 409,
                ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, handle: &SandboxHandle) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(&handle.0, Some(options)).await {
            Ok(()) => Ok(()),
            // already removed
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ResourceLimits;

    #[tokio::test]
    #[ignore] // Requires Docker daemon
    async fn container_lifecycle() {
        let runtime = DockerRuntime::connect().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.sh"), "echo hi").unwrap();

        let spec = SandboxSpec {
            name: format!("sandbox-test-{}", uuid::Uuid::new_v4()),
            image: "alpine:3.19".into(),
            command: vec!["sh".into(), "/app/main.sh".into()],
            workspace: dir.path().to_path_buf(),
            limits: ResourceLimits::default(),
        };

        let handle = runtime.create(&spec).await.unwrap();
        runtime.start(&handle).await.unwrap();
        let code = runtime.wait(&handle).await.unwrap();
        assert_eq!(code, 0);

        // both idempotent, even after exit
        runtime.kill(&handle).await.unwrap();
        runtime.remove(&handle).await.unwrap();
        runtime.remove(&handle).await.unwrap();
    }
}
