//! Filesystem locations shared by the daemon, the CLI and the guest agent.
//!
//! Each location can be overridden through an environment variable so
//! tests and multi-instance setups never touch the user's real files.

use std::env;
use std::path::PathBuf;

/// Default control socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/usbshare.sock";

/// Overrides [`DEFAULT_SOCKET_PATH`].
pub const SOCKET_ENV: &str = "USBSHARE_SOCKET";

/// Overrides the sharing tool executable.
pub const TOOL_ENV: &str = "USBSHARE_TOOL";

/// Overrides the directory holding `config.json` and `guest.json`.
pub const CONFIG_DIR_ENV: &str = "USBSHARE_CONFIG_DIR";

/// Host configuration file name.
pub const HOST_CONFIG_FILE: &str = "config.json";

/// Guest configuration file name.
pub const GUEST_CONFIG_FILE: &str = "guest.json";

const APP_DIR: &str = "usbshare";

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Control socket path.
pub fn socket_path() -> PathBuf {
    env_path(SOCKET_ENV).unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

/// Sharing tool executable, if overridden through the environment.
pub fn tool_override() -> Option<String> {
    env::var(TOOL_ENV).ok().filter(|v| !v.trim().is_empty())
}

/// Directory holding the JSON config files.
///
/// Falls back to `/tmp/usbshare` when the platform reports no config dir.
pub fn config_dir() -> PathBuf {
    env_path(CONFIG_DIR_ENV).unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(env::temp_dir)
            .join(APP_DIR)
    })
}

/// Directory for the PID file and the daemon log.
pub fn state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(env::temp_dir)
        .join(APP_DIR)
}

pub fn host_config_path() -> PathBuf {
    config_dir().join(HOST_CONFIG_FILE)
}

pub fn guest_config_path() -> PathBuf {
    config_dir().join(GUEST_CONFIG_FILE)
}
