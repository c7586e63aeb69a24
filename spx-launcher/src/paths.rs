use std::path::{Path, PathBuf};

use crate::defaults::{CONTROL_SOCKET_NAME, LOGS_DIR_NAME, SERVER_BINARY_NAME};

/// Strip a macOS app bundle suffix: `X/App.app/Contents/MacOS` -> `X`.
///
/// Directories that are not inside a bundle are returned unchanged.
pub fn bundle_root(dir: &Path) -> PathBuf {
    if dir.ends_with("Contents/MacOS")
        && let Some(outside) = dir.ancestors().nth(3)
    {
        return outside.to_path_buf();
    }
    dir.to_path_buf()
}

/// Directory the launcher was installed into (the folder that also holds
/// `spx-server` and `LOG/`).
pub fn install_dir_from_exe(exe_path: &Path) -> Option<PathBuf> {
    let dir = exe_path.parent()?;
    if cfg!(target_os = "macos") {
        Some(bundle_root(dir))
    } else {
        Some(dir.to_path_buf())
    }
}

/// If the launcher is being run from a path under a `target/` directory, return
/// the checkout root (the parent of `target/`).
pub fn repo_root_from_exe(exe_path: &Path) -> Option<PathBuf> {
    let target = exe_path
        .ancestors()
        .find(|p| p.file_name().is_some_and(|n| n == "target"))?;
    target.parent().map(Path::to_path_buf)
}

pub fn server_binary_next_to_exe(exe_path: &Path) -> Option<PathBuf> {
    install_dir_from_exe(exe_path).map(|dir| dir.join(SERVER_BINARY_NAME))
}

pub fn logs_dir_from_exe(exe_path: &Path) -> Option<PathBuf> {
    install_dir_from_exe(exe_path).map(|dir| dir.join(LOGS_DIR_NAME))
}

/// `<config dir>/SPX/config.json`
pub fn config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("SPX").join("config.json"))
}

/// Default control socket: the user runtime dir when the platform has one,
/// the temp dir otherwise.
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CONTROL_SOCKET_NAME)
}
