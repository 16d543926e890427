//! Agent orchestrator.
//!
//! Loads configuration, wires the Docker client and the proxy manager
//! client into a [`LabelSync`] pipeline, serves the status dashboard and
//! handles the shutdown sequence.
//!
//! # Startup order
//!
//! 1. Metrics recorder (when enabled), so the first events are counted
//! 2. Status listener bind, so a bad address fails before any sync work
//! 3. Pipeline start (event source, then engine)
//!
//! # Shutdown
//!
//! `SIGTERM`/`SIGINT` or [`Orchestrator::shutdown_token`] stop the
//! dashboard and then the pipeline. In-flight proxy manager calls finish
//! before the pipeline reports stopped.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use labelsync_core::config::AgentConfig;
use labelsync_core::pipeline::{HealthStatus, Pipeline};
use labelsync_docker::{BollardDockerClient, DockerClient};
use labelsync_npm::{NpmClient, ProxyApi};
use labelsync_reconciler::{LabelSync, LabelSyncBuilder};

use crate::cli::DaemonCli;
use crate::metrics_server;
use crate::status_server::{self, StatusState};

/// Loads configuration from the optional file, environment and CLI flags.
///
/// Precedence: CLI flags > environment > file > defaults.
pub async fn load_config(cli: &DaemonCli) -> Result<AgentConfig> {
    let mut config = match &cli.config {
        Some(path) => AgentConfig::from_file(path).await?,
        None => AgentConfig::default(),
    };
    config.apply_env_overrides();

    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Owns the sync pipeline and the dashboard for the lifetime of the process.
pub struct Orchestrator<D: DockerClient, P: ProxyApi> {
    config: AgentConfig,
    sync: LabelSync<D, P>,
    shutdown: CancellationToken,
}

impl Orchestrator<BollardDockerClient, NpmClient> {
    /// Builds the production clients from configuration.
    ///
    /// Installs the Prometheus recorder first when `metrics.enabled` is set.
    pub fn build_from_config(config: AgentConfig) -> Result<Self> {
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let docker = BollardDockerClient::connect(&config.docker.endpoint)
            .map_err(|e| anyhow::anyhow!("failed to create docker client: {}", e))?;
        let api = NpmClient::from_config(&config.npm)
            .map_err(|e| anyhow::anyhow!("failed to create proxy manager client: {}", e))?;

        tracing::info!(
            npm = %api.base_url(),
            docker_endpoint = %display_endpoint(&config.docker.endpoint),
            "clients initialized"
        );

        Self::build(config, Arc::new(docker), Arc::new(api))
    }
}

impl<D: DockerClient, P: ProxyApi> Orchestrator<D, P> {
    /// Builds the pipeline over the given clients.
    pub fn build(config: AgentConfig, docker: Arc<D>, api: Arc<P>) -> Result<Self> {
        let sync = LabelSyncBuilder::new()
            .config(&config)
            .docker_client(docker)
            .proxy_api(api)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build label sync: {}", e))?;

        Ok(Self {
            config,
            sync,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that ends [`run`](Self::run) without an OS signal.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Current pipeline health.
    pub async fn health(&self) -> HealthStatus {
        self.sync.health_check().await
    }

    /// Starts everything and blocks until shutdown.
    pub async fn run(mut self) -> Result<()> {
        let listener = if self.config.status.enabled {
            let addr = &self.config.status.listen_addr;
            let listener = TcpListener::bind(addr.as_str())
                .await
                .map_err(|e| anyhow::anyhow!("failed to bind status server on {}: {}", addr, e))?;
            Some(listener)
        } else {
            None
        };

        self.sync.start().await?;

        let server_cancel = self.shutdown.child_token();
        let server_task = listener.map(|listener| {
            let state = StatusState {
                status: self.sync.status_handle(),
                runtime: self.sync.runtime_status(),
            };
            tokio::spawn(status_server::serve_on(
                listener,
                state,
                server_cancel.clone(),
            ))
        });

        tracing::info!("labelsync running");
        tokio::select! {
            signal = wait_for_shutdown_signal() => {
                let signal = signal?;
                tracing::info!(signal = signal, "shutdown signal received");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("shutdown requested");
            }
        }

        server_cancel.cancel();
        if let Some(task) = server_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "status server failed"),
                Err(e) => tracing::error!(error = %e, "status server task panicked"),
            }
        }

        self.sync.stop().await?;
        tracing::info!("labelsync shut down");
        Ok(())
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

fn display_endpoint(endpoint: &str) -> &str {
    if endpoint.trim().is_empty() {
        "local default"
    } else {
        endpoint
    }
}
