use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::registry::EvictionPolicy;

// =============================================================================
// File config (figment-deserialized from defaults / TOML file / env vars)
// =============================================================================
//
//   debug-relay.toml:  [relay]
//                      long_poll_timeout_secs = 60
//
//   env var:           RELAY_RELAY__LONG_POLL_TIMEOUT_SECS=60   (double underscore = nesting)

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "debug-relay.toml";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
    #[serde(default)]
    pub files: FilesFileConfig,
    #[serde(default)]
    pub ui: UiFileConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_body_kb")]
    pub max_body_kb: usize,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_kb: default_max_body_kb(),
        }
    }
}

/// Long-poll and session lifetime knobs (lives under `[relay]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    /// 0 holds long polls until a message arrives, however long that takes.
    #[serde(default = "default_long_poll_timeout_secs")]
    pub long_poll_timeout_secs: u64,
    /// 0 keeps every target for the life of the process.
    #[serde(default)]
    pub session_idle_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            long_poll_timeout_secs: default_long_poll_timeout_secs(),
            session_idle_secs: 0,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Debuggable source files (lives under `[files]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilesFileConfig {
    #[serde(default = "default_files_root")]
    pub root: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_breakpoints")]
    pub breakpoints: bool,
}

impl Default for FilesFileConfig {
    fn default() -> Self {
        Self {
            root: default_files_root(),
            extensions: default_extensions(),
            breakpoints: default_breakpoints(),
        }
    }
}

/// Debugger UI assets (lives under `[ui]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UiFileConfig {
    #[serde(default = "default_ui_root")]
    pub root: PathBuf,
}

impl Default for UiFileConfig {
    fn default() -> Self {
        Self {
            root: default_ui_root(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_max_body_kb() -> usize {
    1024
}
fn default_long_poll_timeout_secs() -> u64 {
    120
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_files_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_extensions() -> Vec<String> {
    vec!["js".to_string()]
}
fn default_breakpoints() -> bool {
    true
}
fn default_ui_root() -> PathBuf {
    PathBuf::from("ui")
}

/// Build a figment that layers: defaults → TOML file → RELAY_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `RELAY_SERVER__PORT=9000`  →  `server.port = 9000`
pub fn load_config(config_file: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let file = config_file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed("RELAY_").split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig, used throughout the server)
// =============================================================================

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    /// How long a long poll may be held (None = indefinitely)
    pub long_poll_timeout: Option<Duration>,
    /// Idle target eviction (None = never evict)
    pub eviction: Option<EvictionPolicy>,
    pub files_root: PathBuf,
    pub file_extensions: Vec<String>,
    pub breakpoints: bool,
    pub ui_root: PathBuf,
}

impl RelayConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            host: fc.server.host.clone(),
            port: fc.server.port,
            max_body_bytes: fc.server.max_body_kb * 1024,
            long_poll_timeout: secs_or_disabled(fc.relay.long_poll_timeout_secs),
            eviction: secs_or_disabled(fc.relay.session_idle_secs).map(|max_idle| {
                EvictionPolicy {
                    max_idle,
                    interval: Duration::from_secs(fc.relay.sweep_interval_secs.max(1)),
                }
            }),
            files_root: fc.files.root.clone(),
            file_extensions: fc.files.extensions.clone(),
            breakpoints: fc.files.breakpoints,
            ui_root: fc.ui.root.clone(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_file(&FileConfig::default())
    }
}

fn secs_or_disabled(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
