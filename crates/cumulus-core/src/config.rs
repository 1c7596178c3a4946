use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::VirtualFileMode;

/// Top-level server configuration (loaded from cumulus.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CumulusConfig {
    pub daemon: DaemonConfig,
    pub sync: SyncConfig,
    pub vfs: VfsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// File the server writes its comm port to; clients read it at launch
    pub port_file: PathBuf,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    /// Restart the server automatically when a crash marker file exists
    pub restart_on_crash: bool,
    /// Crash marker file checked on client disconnect
    pub crash_marker: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub sync_db_id: i32,
    pub drive_id: i32,
    pub user_id: i32,
    /// Local sync folder root
    pub local_path: PathBuf,
    /// Remote drive root
    pub target_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Placeholder mode: "off", "suffix", "wincfapi", or "mac"
    pub mode: VirtualFileMode,
    /// Threads per hydration/dehydration queue
    pub workers_per_queue: usize,
    /// Shell-namespace CLSID registered for the sync root (Windows)
    pub namespace_clsid: String,
    /// Log every placeholder operation
    pub extended_log: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port_file: PathBuf::from("~/.local/share/cumulusd/comm.port"),
            log_level: "info".into(),
            log_format: "text".into(),
            restart_on_crash: true,
            crash_marker: PathBuf::from("~/.local/share/cumulusd/crashed"),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_db_id: -1,
            drive_id: -1,
            user_id: -1,
            local_path: PathBuf::new(),
            target_path: PathBuf::new(),
        }
    }
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            mode: VirtualFileMode::Off,
            workers_per_queue: 5,
            namespace_clsid: String::new(),
            extended_log: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[daemon]
port_file = "/tmp/cumulusd.port"
log_level = "debug"
log_format = "json"

[sync]
sync_db_id = 42
drive_id = 7
user_id = 3
local_path = "/home/user/Cumulus"
target_path = "/drive"

[vfs]
mode = "off"
workers_per_queue = 2
extended_log = true
"#;
        let config: CumulusConfig = toml::from_str(toml_str).expect("config should parse");
        assert_eq!(config.sync.sync_db_id, 42);
        assert_eq!(config.vfs.workers_per_queue, 2);
        assert!(config.vfs.extended_log);
        assert_eq!(config.daemon.log_format, "json");
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: CumulusConfig = toml::from_str("").expect("empty config should parse");
        assert_eq!(config.vfs.workers_per_queue, 5);
        assert_eq!(config.sync.sync_db_id, -1);
        assert!(config.daemon.restart_on_crash);
    }
}
