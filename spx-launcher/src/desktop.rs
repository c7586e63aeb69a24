//! Hand paths and URLs to the desktop (file browser, web browser)

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("Cannot determine the launcher's install directory")]
    NoInstallDir,

    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Platform helper that opens a file, folder or URL with its default handler
pub fn opener_program() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "explorer"
    } else {
        "xdg-open"
    }
}

/// Spawn `program target` without waiting for it.
pub fn open_with(program: &'static str, target: impl AsRef<OsStr>) -> Result<(), OpenError> {
    let target = target.as_ref();
    tracing::debug!(program, target = ?target, "Opening");
    Command::new(program)
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(|source| OpenError::Launch { program, source })
}

pub fn open(target: impl AsRef<OsStr>) -> Result<(), OpenError> {
    open_with(opener_program(), target)
}

/// `<install dir>/LOG` for the launcher at `exe`
pub fn logs_folder(exe: &Path) -> Result<PathBuf, OpenError> {
    crate::paths::logs_dir_from_exe(exe).ok_or(OpenError::NoInstallDir)
}

/// Open the server's log folder. Failures are logged, never returned.
pub fn open_logs_folder(exe: Option<&Path>) {
    let result = match exe {
        Some(exe) => logs_folder(exe).and_then(|dir| open(&dir)),
        None => Err(OpenError::NoInstallDir),
    };
    if let Err(e) = result {
        tracing::warn!(error = %e, "Could not open logs folder");
    }
}
