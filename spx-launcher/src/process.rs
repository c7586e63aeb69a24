//! Process host - launches and kills the SPX server binary
//!
//! The supervisor only sees the `ProcessHost` trait. `LocalProcessHost`
//! spawns `spx-server` from the install directory (or the path stored in the
//! launcher config) and publishes each stdout/stderr line on the log bus.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::{ConfigError, LauncherConfig};
use crate::defaults::{SERVER_BINARY_NAME, SERVER_LOG_CHANNEL};
use crate::logbus::LogBus;

pub const MSG_LAUNCHED: &str = "Server is running";
pub const MSG_ALREADY_RUNNING: &str = "Server is already running";
pub const MSG_STOPPED: &str = "Server stopped";
pub const MSG_NOT_RUNNING: &str = "Server was not running";

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Server binary not found (looked in: {})", display_paths(.0))]
    BinaryNotFound(Vec<PathBuf>),

    #[error("Failed to launch server at {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stop server: {0}")]
    Kill(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Rejected(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "nowhere".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Issues start/stop commands to whatever hosts the server process
#[async_trait]
pub trait ProcessHost: Send + Sync + 'static {
    async fn start(&self) -> Result<String, HostError>;
    async fn stop(&self) -> Result<String, HostError>;
}

/// Finds the `spx-server` binary
#[derive(Debug, Clone, Default)]
pub struct ServerLocator {
    /// Explicit `--server-path`; when set nothing else is tried
    pub explicit: Option<PathBuf>,
    /// The launcher's own executable
    pub exe: Option<PathBuf>,
    /// Launcher config holding `spxPath`
    pub config_file: Option<PathBuf>,
}

impl ServerLocator {
    pub fn locate(&self) -> Result<PathBuf, HostError> {
        if let Some(path) = &self.explicit {
            return resolve_binary(path)
                .ok_or_else(|| HostError::BinaryNotFound(vec![path.clone()]));
        }

        let mut tried = Vec::new();

        if let Some(exe) = &self.exe {
            let mut candidates = Vec::new();
            candidates.extend(crate::paths::server_binary_next_to_exe(exe));
            candidates.extend(
                crate::paths::repo_root_from_exe(exe).map(|root| root.join(SERVER_BINARY_NAME)),
            );
            for candidate in candidates {
                if candidate.is_file() {
                    return Ok(candidate);
                }
                tracing::debug!(path = %candidate.display(), "Server binary not found");
                tried.push(candidate);
            }
        }

        if let Some(config_file) = &self.config_file {
            let config = LauncherConfig::load_from(config_file)?;
            if let Some(spx_path) = config.spx_path {
                if let Some(found) = resolve_binary(&spx_path) {
                    return Ok(found);
                }
                tried.push(spx_path);
            }
        }

        Err(HostError::BinaryNotFound(tried))
    }
}

/// Record `path` as `spxPath` in the launcher config so later runs find the server.
///
/// The path must point at the binary or its folder; it is stored absolute.
pub fn remember_server_path(config_file: &Path, path: &Path) -> Result<PathBuf, HostError> {
    let binary =
        resolve_binary(path).ok_or_else(|| HostError::BinaryNotFound(vec![path.to_path_buf()]))?;
    let stored = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    let mut config = LauncherConfig::load_from(config_file)?;
    config.spx_path = Some(stored);
    config.save_to(config_file)?;
    tracing::info!(binary = %binary.display(), "Saved server path");
    Ok(binary)
}

/// A path may name the binary itself or the folder that contains it.
fn resolve_binary(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    let inside = path.join(SERVER_BINARY_NAME);
    inside.is_file().then_some(inside)
}

/// Runs `spx-server` as a child of the launcher
pub struct LocalProcessHost {
    locator: ServerLocator,
    bus: Arc<LogBus>,
    channel: String,
    child: Mutex<Option<Child>>,
}

impl LocalProcessHost {
    pub fn new(locator: ServerLocator, bus: Arc<LogBus>) -> Self {
        Self {
            locator,
            bus,
            channel: SERVER_LOG_CHANNEL.to_string(),
            child: Mutex::new(None),
        }
    }

    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(|c| c.id())
    }

    fn forward_lines<R>(&self, stream: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let bus = self.bus.clone();
        let channel = self.channel.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        bus.emit(&channel, line.trim_end_matches(['\r', '\n']));
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Server output stream ended");
                        break;
                    }
                }
            }
        });
    }
}

#[async_trait]
impl ProcessHost for LocalProcessHost {
    async fn start(&self) -> Result<String, HostError> {
        let mut slot = self.child.lock().await;

        if let Some(child) = slot.as_mut() {
            match child.try_wait() {
                Ok(None) => return Ok(MSG_ALREADY_RUNNING.to_string()),
                Ok(Some(status)) => {
                    tracing::info!(%status, "Previous server process has exited");
                    *slot = None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Could not query previous server process");
                    *slot = None;
                }
            }
        }

        let path = self.locator.locate()?;
        tracing::info!(path = %path.display(), "Launching server");

        let mut command = Command::new(&path);
        // the server resolves its data files relative to its own folder
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HostError::Spawn {
                path: path.clone(),
                source,
            })?;

        if let Some(stdout) = child.stdout.take() {
            self.forward_lines(stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.forward_lines(stderr);
        }

        tracing::info!(pid = ?child.id(), "Server process spawned");
        *slot = Some(child);
        Ok(MSG_LAUNCHED.to_string())
    }

    async fn stop(&self) -> Result<String, HostError> {
        let mut slot = self.child.lock().await;
        let Some(mut child) = slot.take() else {
            return Ok(MSG_NOT_RUNNING.to_string());
        };

        tracing::info!(pid = ?child.id(), "Killing server process");
        child.kill().await.map_err(HostError::Kill)?;
        Ok(MSG_STOPPED.to_string())
    }
}
