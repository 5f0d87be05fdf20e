use std::sync::Arc;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    InspectContainerOptions, ListContainersOptions, LogsOptions, StartContainerOptions,
    StopContainerOptions,
};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use idler_core::ContainerStatus;

/// Raw log bytes as they arrive from the runtime; chunks are not line
/// aligned and may split a UTF-8 sequence.
pub type LogChunks = BoxStream<'static, Result<Vec<u8>, BackendError>>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("container not found: {0}")]
    NotFound(String),
    #[error("container runtime unreachable: {0}")]
    Transport(String),
    #[error("container runtime error: {0}")]
    Fault(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub name: String,
    pub state: String,
}

/// Imperative operations on named containers.
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, BackendError>;
    async fn inspect(&self, name: &str) -> Result<ContainerInfo, BackendError>;
    async fn start(&self, name: &str) -> Result<(), BackendError>;
    async fn stop(&self, name: &str) -> Result<(), BackendError>;
    /// Follows stdout and stderr from `since` (unix seconds) onwards.
    fn logs(&self, name: &str, since: i64) -> LogChunks;
}

#[derive(Debug, Clone)]
pub struct DockerBackend {
    docker: Docker,
}

impl DockerBackend {
    pub fn connect() -> anyhow::Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }
}

fn map_docker_error(name: &str, err: bollard::errors::Error) -> BackendError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => BackendError::NotFound(name.to_string()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => BackendError::Fault(format!("{status_code}: {message}")),
        other => BackendError::Transport(other.to_string()),
    }
}

#[async_trait]
impl ContainerBackend for DockerBackend {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, BackendError> {
        let opts = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let rows = self
            .docker
            .list_containers(Some(opts))
            .await
            .map_err(|e| map_docker_error("", e))?;

        let mut out = Vec::new();
        for row in rows {
            let state = row.state.unwrap_or_default();
            for name in row.names.unwrap_or_default() {
                out.push(ContainerInfo {
                    name: name.trim_start_matches('/').to_string(),
                    state: state.clone(),
                });
            }
        }
        Ok(out)
    }

    async fn inspect(&self, name: &str) -> Result<ContainerInfo, BackendError> {
        let info = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_docker_error(name, e))?;

        let state = info.state.as_ref();
        let running = state.and_then(|s| s.running).unwrap_or(false);
        let status = match state.and_then(|s| s.status.as_ref()) {
            Some(s) => s.to_string(),
            None if running => "running".to_string(),
            None => "unknown".to_string(),
        };

        Ok(ContainerInfo {
            name: info
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| name.to_string()),
            state: status,
        })
    }

    async fn start(&self, name: &str) -> Result<(), BackendError> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_docker_error(name, e))
    }

    async fn stop(&self, name: &str) -> Result<(), BackendError> {
        self.docker
            .stop_container(name, None::<StopContainerOptions>)
            .await
            .map_err(|e| map_docker_error(name, e))
    }

    fn logs(&self, name: &str, since: i64) -> LogChunks {
        let opts = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            since,
            timestamps: false,
            tail: "all".to_string(),
            ..Default::default()
        };
        let owned = name.to_string();
        self.docker
            .logs(name, Some(opts))
            .map(move |chunk| match chunk {
                Ok(out) => Ok(out.into_bytes().to_vec()),
                Err(e) => Err(map_docker_error(&owned, e)),
            })
            .boxed()
    }
}

/// Result of an idempotent start or stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Issued,
    /// Nothing to do; carries the status that made the call a no-op.
    Skipped(ContainerStatus),
    Failed,
}

/// Start/stop/status for a named container on top of a [`ContainerBackend`].
///
/// Never returns an error: failures are logged and degrade to
/// [`ContainerStatus::Error`] or [`ControlOutcome::Failed`].
#[derive(Clone)]
pub struct RuntimeController {
    backend: Arc<dyn ContainerBackend>,
}

impl RuntimeController {
    pub fn new(backend: Arc<dyn ContainerBackend>) -> Self {
        Self { backend }
    }

    pub async fn status(&self, name: &str) -> ContainerStatus {
        match self.backend.inspect(name).await {
            Ok(info) => ContainerStatus::from_state(&info.state),
            Err(BackendError::NotFound(_)) => {
                tracing::error!(container = %name, "container not found");
                ContainerStatus::NotFound
            }
            Err(e) => {
                tracing::error!(container = %name, error = %e, "failed to inspect container");
                ContainerStatus::Error
            }
        }
    }

    pub async fn start(&self, name: &str) -> ControlOutcome {
        let status = self.status(name).await;
        match status {
            ContainerStatus::Running => {
                tracing::debug!(container = %name, "container already running");
                return ControlOutcome::Skipped(status);
            }
            ContainerStatus::NotFound | ContainerStatus::Error => {
                return ControlOutcome::Skipped(status);
            }
            ContainerStatus::Stopped => {}
        }

        match self.backend.start(name).await {
            Ok(()) => {
                tracing::info!(container = %name, "started container");
                ControlOutcome::Issued
            }
            Err(e) => {
                tracing::error!(container = %name, error = %e, "failed to start container");
                ControlOutcome::Failed
            }
        }
    }

    pub async fn stop(&self, name: &str) -> ControlOutcome {
        let status = self.status(name).await;
        if !status.is_running() {
            tracing::debug!(container = %name, %status, "container not running, nothing to stop");
            return ControlOutcome::Skipped(status);
        }

        match self.backend.stop(name).await {
            Ok(()) => {
                tracing::info!(container = %name, "stopped container");
                ControlOutcome::Issued
            }
            Err(e) => {
                tracing::error!(container = %name, error = %e, "failed to stop container");
                ControlOutcome::Failed
            }
        }
    }
}
