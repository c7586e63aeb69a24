//! `spx-launcher run`: the long-lived supervisor process

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::LauncherConfig;
use crate::control::{ControlContext, ControlError, ControlServer};
use crate::defaults::{DEFAULT_LOG_CAPACITY, PROBE_TIMEOUT};
use crate::logbus::LogBus;
use crate::port::{ArgPortSource, PortResolver};
use crate::process::{LocalProcessHost, ServerLocator};
use crate::readiness::{HttpStatusProbe, ProbeError};
use crate::supervisor::{Supervisor, SupervisorConfig};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("could not build status probe: {0}")]
    Probe(#[from] ProbeError),
}

#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    pub socket: PathBuf,
    /// Raw control port argument; parsed by the port resolver
    pub port: Option<String>,
    pub server_path: Option<PathBuf>,
    pub log_capacity: Option<usize>,
    /// Launch the server as soon as the daemon is up
    pub start: bool,
    /// Config file override (defaults to `<config dir>/SPX/config.json`)
    pub config_file: Option<PathBuf>,
}

/// Run until a client sends `shutdown` or the process gets Ctrl-C.
///
/// The server is stopped before returning.
pub async fn run(options: DaemonOptions) -> Result<(), DaemonError> {
    // bind first: a second launcher must not spawn a second server
    let server = ControlServer::bind(&options.socket).await?;

    let config_file = options.config_file.clone().or_else(crate::paths::config_file);
    let config = match &config_file {
        Some(path) => LauncherConfig::load_from(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring unreadable launcher config");
            LauncherConfig::default()
        }),
        None => LauncherConfig::default(),
    };
    let log_capacity = options
        .log_capacity
        .or(config.log_capacity)
        .unwrap_or(DEFAULT_LOG_CAPACITY);

    let bus = Arc::new(LogBus::default());
    let locator = ServerLocator {
        explicit: options.server_path.clone(),
        exe: std::env::current_exe().ok(),
        config_file,
    };
    let host = Arc::new(LocalProcessHost::new(locator, bus.clone()));
    let probe = Arc::new(HttpStatusProbe::new(PROBE_TIMEOUT)?);

    let supervisor = Supervisor::spawn(
        SupervisorConfig {
            log_capacity,
            ..Default::default()
        },
        host,
        probe,
        PortResolver::new(ArgPortSource::new(options.port.clone())),
        &bus,
    );
    let ctx = ControlContext::new(supervisor.clone(), std::env::current_exe().ok());

    if options.start {
        match supervisor.start().await {
            Ok(message) => tracing::info!("{}", message),
            Err(e) => tracing::error!(error = %e, "Initial start failed"),
        }
    }

    tokio::select! {
        _ = server.serve(ctx.clone()) => {}
        _ = ctx.shutdown_requested() => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
    }

    if let Err(e) = supervisor.stop().await {
        tracing::warn!(error = %e, "Server did not stop cleanly");
    }
    supervisor.shutdown().await;
    drop(server);

    Ok(())
}
