use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod config;
mod coordinator;
mod log_stream;
mod presence;
mod runtime;

use config::Config;
use coordinator::LifecycleCoordinator;
use presence::FikaClient;
use runtime::DockerBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(?config, "idler-agent starting");

    let backend = DockerBackend::connect().context("connect to docker")?;
    let presence = FikaClient::new(config.server_base_url(), config.http_timeout)
        .context("build server API client")?;

    let coordinator = Arc::new(LifecycleCoordinator::new(
        config,
        Arc::new(backend),
        Arc::new(presence),
    ));
    spawn_signal_listener(coordinator.shutdown_handle());

    coordinator.run().await?;
    Ok(())
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => tracing::info!(signal, "received signal, shutting down"),
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for shutdown signals");
                return;
            }
        }
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
        _ = term.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}
