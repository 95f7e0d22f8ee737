//! Docker implementation of EnvironmentRuntime.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{BuildImageOptions, CreateImageOptions};
use bollard::service::{HostConfig, Mount, MountTypeEnum};
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{debug, info};

use crate::config::InstanceSpec;
use crate::error::{RuntimeError, RuntimeResult};
use crate::lines::split_lines;
use crate::runner::{
    BuildRequest, Endpoint, EnvironmentRuntime, ExecOutput, ImageRef, InstanceHandle, LogSource,
    LogStream,
};

/// Seconds Docker waits before killing a stopping container.
const STOP_GRACE_SECONDS: i64 = 10;

/// Docker-based environment runtime.
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon.
    pub async fn new() -> RuntimeResult<Self> {
        let client = Docker::connect_with_local_defaults()?;

        // Verify connection
        client
            .ping()
            .await
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;

        Ok(Self { client })
    }

    /// Connect with a custom Docker host.
    pub async fn with_host(host: &str) -> RuntimeResult<Self> {
        let client = Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)?;
        client
            .ping()
            .await
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }

    async fn ensure_image(&self, image: &str) -> RuntimeResult<()> {
        match self.client.inspect_image(image).await {
            Ok(_) => return Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => return Err(e.into()),
        }

        info!("Pulling base image {}", image);
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut stream = self.client.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("Pull status: {}", status);
                    }
                }
                Err(e) => return Err(RuntimeError::ImagePullFailed(e.to_string())),
            }
        }
        Ok(())
    }
}

fn is_status(error: &bollard::errors::Error, code: u16) -> bool {
    matches!(
        error,
        bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == code
    )
}

#[async_trait]
impl EnvironmentRuntime for DockerRuntime {
    async fn build(&self, request: &BuildRequest) -> RuntimeResult<ImageRef> {
        self.ensure_image(&request.base_image).await?;

        let dockerfile_path = request.context_dir.join("Dockerfile");
        info!("Building image {} from {:?}", request.tag, dockerfile_path);

        let dockerfile_content = tokio::fs::read(&dockerfile_path).await?;

        let options = BuildImageOptions {
            dockerfile: "Dockerfile",
            t: request.tag.as_str(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut stream = self
            .client
            .build_image(options, None, Some(dockerfile_content.into()));

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(stream) = info.stream {
                        debug!("Build: {}", stream.trim());
                    }
                    if let Some(error) = info.error {
                        return Err(RuntimeError::BuildFailed(error));
                    }
                }
                Err(e) => {
                    return Err(RuntimeError::BuildFailed(e.to_string()));
                }
            }
        }

        Ok(ImageRef(request.tag.clone()))
    }

    async fn run(&self, image: &ImageRef, spec: &InstanceSpec) -> RuntimeResult<InstanceHandle> {
        let mounts: Vec<Mount> = spec
            .mounts
            .iter()
            .map(|m| Mount {
                target: Some(m.target.clone()),
                source: Some(m.source.to_string_lossy().to_string()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(spec.port_key(), HashMap::new());

        let host_config = HostConfig {
            mounts: Some(mounts),
            publish_all_ports: Some(true),
            auto_remove: Some(false),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(image.to_string()),
            env: Some(spec.env_pairs()),
            exposed_ports: Some(exposed_ports),
            working_dir: spec.workdir.clone(),
            host_config: Some(host_config),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let container = self
            .client
            .create_container(Some(create_options), container_config)
            .await?;

        debug!("Created container {} from {}", container.id, image);
        Ok(InstanceHandle {
            id: container.id,
            name: spec.name.clone(),
        })
    }

    async fn start(&self, handle: &InstanceHandle, spec: &InstanceSpec) -> RuntimeResult<Endpoint> {
        self.client
            .start_container(&handle.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::StartFailed(e.to_string()))?;

        let details = self
            .client
            .inspect_container(&handle.id, None::<InspectContainerOptions>)
            .await?;

        let host_port = details
            .network_settings
            .and_then(|settings| settings.ports)
            .and_then(|ports| ports.get(&spec.port_key()).cloned().flatten())
            .and_then(|bindings| bindings.into_iter().find_map(|b| b.host_port))
            .and_then(|port| port.parse::<u16>().ok())
            .ok_or(RuntimeError::PortNotBound(spec.container_port))?;

        info!("Container {} bound to port {}", handle, host_port);
        Ok(Endpoint::new(spec.host.clone(), host_port))
    }

    async fn exec(&self, handle: &InstanceHandle, command: &str) -> RuntimeResult<ExecOutput> {
        let exec = self
            .client
            .create_exec(
                &handle.id,
                CreateExecOptions {
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    cmd: Some(vec!["sh".to_string(), "-c".to_string(), command.to_string()]),
                    ..Default::default()
                },
            )
            .await?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        match self.client.start_exec(&exec.id, None).await? {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(result) = output.next().await {
                    match result? {
                        LogOutput::StdOut { message } => {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        LogOutput::StdErr { message } => {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        _ => {}
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(RuntimeError::ExecFailed(
                    "exec started detached, output unavailable".to_string(),
                ));
            }
        }

        let inspect = self.client.inspect_exec(&exec.id).await?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code.unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    async fn stream_logs(&self, handle: &InstanceHandle) -> RuntimeResult<LogStream> {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let chunks = self
            .client
            .logs(&handle.id, Some(options))
            .map(|result| match result {
                Ok(LogOutput::StdErr { message }) => Ok((LogSource::Stderr, message.to_vec())),
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    Ok((LogSource::Stdout, message.to_vec()))
                }
                Ok(LogOutput::StdIn { .. }) => Ok((LogSource::Stdout, Vec::new())),
                Err(e) => Err(RuntimeError::LogStream(e.to_string())),
            })
            .boxed();

        Ok(split_lines(chunks))
    }

    async fn stop(&self, handle: &InstanceHandle) -> RuntimeResult<()> {
        match self
            .client
            .stop_container(
                &handle.id,
                Some(StopContainerOptions {
                    t: STOP_GRACE_SECONDS,
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            // Already stopped
            Err(e) if is_status(&e, 304) => Ok(()),
            Err(e) if is_status(&e, 404) => Err(RuntimeError::InstanceNotFound(handle.id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, handle: &InstanceHandle) -> RuntimeResult<()> {
        match self
            .client
            .remove_container(
                &handle.id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_status(&e, 404) => Err(RuntimeError::InstanceNotFound(handle.id.clone())),
            Err(e) => Err(e.into()),
        }
    }
}
