//! Control socket for driving the launcher from the CLI
//!
//! Commands:
//! - start / stop: launch or kill the SPX server
//! - get_port: control port the readiness probes target
//! - status: supervisor status report
//! - logs: captured server output
//! - open_logs_folder: show the server's LOG directory
//! - shutdown: stop supervising and exit

use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;

use spx_core::{Command, Response};

use crate::supervisor::SupervisorHandle;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("another launcher is already listening on {}", .0.display())]
    InUse(PathBuf),

    #[error("control socket {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ControlError + '_ {
    move |source| ControlError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Make `path` free to bind.
///
/// A socket file nobody answers on is left over from a launcher that died
/// and gets removed. One that still accepts connections belongs to a live
/// launcher and is never touched.
async fn claim_socket_path(path: &Path) -> Result<(), ControlError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    match std::fs::symlink_metadata(path) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_error(path)(e)),
    }

    if UnixStream::connect(path).await.is_ok() {
        return Err(ControlError::InUse(path.to_path_buf()));
    }
    tracing::info!(path = %path.display(), "Removing stale control socket");
    std::fs::remove_file(path).map_err(io_error(path))
}

/// Bound control socket. The socket file is removed when this is dropped.
pub struct ControlServer {
    path: PathBuf,
    listener: UnixListener,
}

impl ControlServer {
    /// Bind `path`, readable and writable by the current user only.
    pub async fn bind(path: impl Into<PathBuf>) -> Result<Self, ControlError> {
        let path = path.into();
        claim_socket_path(&path).await?;

        let listener = UnixListener::bind(&path).map_err(io_error(&path))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .map_err(io_error(&path))?;
        tracing::info!(path = %path.display(), "Control socket listening");

        Ok(Self { path, listener })
    }

    /// Answer clients until this future is dropped. Each connection may send
    /// any number of commands; a line that is not a command gets an error
    /// response and the connection stays open.
    pub async fn serve(&self, ctx: ControlContext) {
        loop {
            let stream = match self.listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    tracing::error!(error = %e, "Accept error");
                    continue;
                }
            };
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let result = spx_socket::serve(
                    stream,
                    move |cmd: Command| {
                        let ctx = ctx.clone();
                        async move {
                            tracing::debug!(?cmd, "Received command");
                            ctx.handle_command(cmd).await
                        }
                    },
                    |e| Response::error(format!("Invalid command: {e}")),
                )
                .await;
                if let Err(e) = result {
                    tracing::debug!(error = %e, "Control connection dropped");
                }
            });
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "Could not remove control socket");
        }
    }
}

/// What the control socket acts on
#[derive(Clone)]
pub struct ControlContext {
    supervisor: SupervisorHandle,
    exe: Option<PathBuf>,
    shutdown: Arc<Notify>,
}

impl ControlContext {
    pub fn new(supervisor: SupervisorHandle, exe: Option<PathBuf>) -> Self {
        Self {
            supervisor,
            exe,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Resolves once a client has sent `shutdown`.
    pub async fn shutdown_requested(&self) {
        self.shutdown.notified().await
    }

    pub async fn handle_command(&self, cmd: Command) -> Response {
        match cmd {
            Command::Start => match self.supervisor.start().await {
                Ok(message) => Response::ok(message),
                Err(e) => Response::error(e.to_string()),
            },
            Command::Stop => match self.supervisor.stop().await {
                Ok(message) => Response::ok(message),
                Err(e) => Response::error(e.to_string()),
            },
            Command::GetPort => Response::ok(self.supervisor.control_port().to_string()),
            Command::Status => Response::ok(self.supervisor.report()),
            Command::Logs { tail } => {
                let lines = match tail {
                    Some(n) => self.supervisor.logs_tail(n),
                    None => self.supervisor.snapshot().logs,
                };
                Response::ok(lines)
            }
            Command::OpenLogsFolder => {
                crate::desktop::open_logs_folder(self.exe.as_deref());
                Response::ok(serde_json::Value::Null)
            }
            Command::Shutdown => {
                tracing::info!("Shutdown requested over control socket");
                self.shutdown.notify_one();
                Response::ok("Launcher shutting down")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logbus::LogBus;
    use crate::port::{FixedPortSource, PortResolver};
    use crate::process::{HostError, ProcessHost};
    use crate::readiness::{ProbeError, StatusProbe};
    use crate::supervisor::{Supervisor, SupervisorConfig};
    use async_trait::async_trait;
    use spx_core::{RunState, StatusReport, VersionInfo};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    struct OkHost;

    #[async_trait]
    impl ProcessHost for OkHost {
        async fn start(&self) -> Result<String, HostError> {
            Ok("Server is running".to_string())
        }

        async fn stop(&self) -> Result<String, HostError> {
            Ok("Server stopped".to_string())
        }
    }

    struct BrokenHost;

    #[async_trait]
    impl ProcessHost for BrokenHost {
        async fn start(&self) -> Result<String, HostError> {
            Err(HostError::BinaryNotFound(vec![]))
        }

        async fn stop(&self) -> Result<String, HostError> {
            Ok("Server was not running".to_string())
        }
    }

    struct DownProbe;

    #[async_trait]
    impl StatusProbe for DownProbe {
        async fn probe(&self, _port: u16) -> Result<VersionInfo, ProbeError> {
            Err(ProbeError::Status(503))
        }
    }

    fn context(host: Arc<dyn ProcessHost>, bus: &LogBus) -> ControlContext {
        let supervisor = Supervisor::spawn(
            SupervisorConfig::default(),
            host,
            Arc::new(DownProbe),
            PortResolver::new(FixedPortSource(6123)),
            bus,
        );
        ControlContext::new(supervisor, None)
    }

    #[tokio::test]
    async fn leftover_socket_file_is_replaced() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run").join("spx.sock");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let server = ControlServer::bind(&path).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        drop(server);
        assert!(!path.exists(), "socket file should go with the server");
    }

    #[tokio::test]
    async fn live_launcher_socket_is_not_taken_over() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("spx.sock");

        let first = ControlServer::bind(&path).await.unwrap();
        match ControlServer::bind(&path).await {
            Err(ControlError::InUse(p)) => assert_eq!(p, path),
            Err(e) => panic!("expected InUse, got {e}"),
            Ok(_) => panic!("second bind should fail"),
        }
        assert!(path.exists(), "live socket must survive the failed bind");
        drop(first);
    }

    #[tokio::test]
    async fn connection_survives_garbage_and_keeps_answering() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("spx.sock");
        let bus = LogBus::default();
        let ctx = context(Arc::new(OkHost), &bus);

        let server = ControlServer::bind(&path).await.unwrap();
        let serving = tokio::spawn(async move { server.serve(ctx).await });

        let stream = UnixStream::connect(&path).await.unwrap();
        let (r, mut w) = stream.into_split();
        let mut lines = BufReader::new(r).lines();

        w.write_all(b"{\"command\":\"reboot\"}\n").await.unwrap();
        let reply = lines.next_line().await.unwrap().unwrap();
        assert!(reply.contains("\"status\":\"error\""), "{reply}");
        assert!(reply.contains("Invalid command"), "{reply}");

        w.write_all(b"{\"command\":\"get_port\"}\n").await.unwrap();
        let reply = lines.next_line().await.unwrap().unwrap();
        let resp: Response = serde_json::from_str(&reply).unwrap();
        assert_eq!(resp.data(), Some(&serde_json::json!("6123")));

        serving.abort();
        let _ = serving.await;
        assert!(!path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn get_port_and_status() {
        let bus = LogBus::default();
        let ctx = context(Arc::new(OkHost), &bus);

        let resp = ctx.handle_command(Command::GetPort).await;
        assert_eq!(resp.data(), Some(&serde_json::json!("6123")));

        let resp = ctx.handle_command(Command::Status).await;
        let report: StatusReport = serde_json::from_value(resp.data().unwrap().clone()).unwrap();
        assert_eq!(report.run_state, RunState::Stopped);
        assert_eq!(report.status_message, "Ready to launch");
        assert_eq!(report.control_port, 6123);
    }

    #[tokio::test(start_paused = true)]
    async fn start_stop_messages() {
        let bus = LogBus::default();
        let ctx = context(Arc::new(OkHost), &bus);

        let resp = ctx.handle_command(Command::Start).await;
        assert_eq!(resp.data(), Some(&serde_json::json!("Server is running")));
        let resp = ctx.handle_command(Command::Stop).await;
        assert_eq!(resp.data(), Some(&serde_json::json!("Server stopped")));
    }

    #[tokio::test(start_paused = true)]
    async fn start_failure_is_error_response() {
        let bus = LogBus::default();
        let ctx = context(Arc::new(BrokenHost), &bus);

        let resp = ctx.handle_command(Command::Start).await;
        assert!(!resp.is_ok());
        assert!(
            resp.error_message()
                .unwrap()
                .contains("Server binary not found")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn logs_tail() {
        let bus = LogBus::default();
        let ctx = context(Arc::new(OkHost), &bus);
        for line in ["a", "b", "c"] {
            bus.emit(crate::defaults::SERVER_LOG_CHANNEL, line);
        }
        ctx.supervisor
            .wait_until(|s| s.logs().len() == 3)
            .await
            .unwrap();

        let resp = ctx.handle_command(Command::Logs { tail: Some(2) }).await;
        assert_eq!(resp.data(), Some(&serde_json::json!(["b", "c"])));
        let resp = ctx.handle_command(Command::Logs { tail: None }).await;
        assert_eq!(resp.data(), Some(&serde_json::json!(["a", "b", "c"])));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_notifies_waiter() {
        let bus = LogBus::default();
        let ctx = context(Arc::new(OkHost), &bus);

        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.shutdown_requested().await })
        };
        let resp = ctx.handle_command(Command::Shutdown).await;
        assert!(resp.is_ok());
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
