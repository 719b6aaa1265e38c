//! Run-once Docker containers bound to a single host directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use uuid::Uuid;

use super::{SandboxExecutor, SandboxOutput};
use crate::error::SandboxError;

/// Image used when `SWE_IMAGE` is not set.
pub const DEFAULT_IMAGE: &str = "swebench-lite:py3.10";

/// Configuration for the sandbox environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Docker image to run every command in.
    pub image: String,
    /// Host directory mounted into each container.
    pub host_dir: PathBuf,
    /// Mount point and working directory inside the container.
    pub container_dir: String,
    /// Per-command wall-clock limit. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Docker CLI executable.
    pub docker_bin: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            host_dir: PathBuf::from("sandbox"),
            container_dir: "/workspace".to_string(),
            timeout: None,
            docker_bin: "docker".to_string(),
        }
    }
}

impl SandboxConfig {
    /// Creates a configuration for the given image with default paths.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Sets the host directory.
    pub fn with_host_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.host_dir = dir.into();
        self
    }

    /// Sets the per-command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the docker executable.
    pub fn with_docker_bin(mut self, bin: impl Into<String>) -> Self {
        self.docker_bin = bin.into();
        self
    }
}

/// Sandbox that starts one `docker run --rm` container per command.
pub struct DockerSandbox {
    config: SandboxConfig,
    /// Absolute form of `config.host_dir`.
    host_dir: PathBuf,
}

impl DockerSandbox {
    /// Creates the sandbox, creating the host directory if it is absent.
    pub fn new(config: SandboxConfig) -> Result<Self, SandboxError> {
        std::fs::create_dir_all(&config.host_dir)?;
        let host_dir = std::fs::canonicalize(&config.host_dir)?;
        Ok(Self { config, host_dir })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Absolute host directory shared by every container of this sandbox.
    pub fn host_dir(&self) -> &Path {
        &self.host_dir
    }

    /// Checks that the Docker daemon answers and the image exists locally.
    pub async fn preflight(&self) -> Result<(), SandboxError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::DaemonUnavailable(format!("Failed to connect: {e}")))?;

        docker
            .ping()
            .await
            .map_err(|e| SandboxError::DaemonUnavailable(format!("Ping failed: {e}")))?;

        docker
            .inspect_image(&self.config.image)
            .await
            .map_err(|e| SandboxError::ImageMissing {
                image: self.config.image.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(image = %self.config.image, host_dir = %self.host_dir.display(), "Docker sandbox ready");
        Ok(())
    }

    /// Argument vector for `docker`; the command is always one element.
    pub fn docker_args(&self, container_name: &str, cmd: &str) -> Vec<String> {
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container_name.to_string(),
            "-v".to_string(),
            format!("{}:{}", self.host_dir.display(), self.config.container_dir),
            "-w".to_string(),
            self.config.container_dir.clone(),
            self.config.image.clone(),
            "bash".to_string(),
            "-lc".to_string(),
            cmd.to_string(),
        ]
    }

    async fn force_remove(&self, container_name: &str) {
        if let Err(e) = Command::new(&self.config.docker_bin)
            .args(["rm", "-f", container_name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            tracing::debug!(container = %container_name, error = %e, "Failed to remove timed out container");
        }
    }
}

#[async_trait]
impl SandboxExecutor for DockerSandbox {
    async fn exec(&self, cmd: &str) -> SandboxOutput {
        let container_name = format!("swe-validate-{}", Uuid::new_v4().simple());
        let args = self.docker_args(&container_name, cmd);

        tracing::debug!(container = %container_name, image = %self.config.image, "Running sandbox command");

        let run = Command::new(&self.config.docker_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let result = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    self.force_remove(&container_name).await;
                    tracing::warn!(container = %container_name, timeout_secs = limit.as_secs(), "Sandbox command timed out");
                    return SandboxOutput::not_run(format!(
                        "Command timed out after {}s",
                        limit.as_secs()
                    ));
                }
            },
            None => run.await,
        };

        match result {
            Ok(output) => {
                let exit_code = output.status.code().unwrap_or(-1);
                tracing::debug!(container = %container_name, exit_code, "Sandbox command finished");
                SandboxOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    exit_code,
                }
            }
            Err(e) => {
                tracing::warn!(container = %container_name, error = %e, "Failed to spawn docker");
                SandboxOutput::not_run(format!("Docker run error: {}", e))
            }
        }
    }
}
