//! Central configuration constants and the on-disk settings file.

use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Address the camera uses on its own access point.
pub const DEFAULT_CAMERA_IP: &str = "192.168.42.1";

/// TCP port of the device-API bridge.
pub const DEFAULT_BRIDGE_PORT: u16 = 6666;

/// SSID prefixes camera hotspots advertise.
pub const DEFAULT_SSID_PREFIXES: &[&str] = &["Insta360", "X3", "X4", "ONE"];

/// Attempts made to open the device connection before giving up.
pub const DEFAULT_OPEN_ATTEMPTS: u32 = 5;

/// Pause between device connection attempts.
pub const DEFAULT_OPEN_BACKOFF: Duration = Duration::from_secs(2);

/// Bound on waiting for the file list.
pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on waiting for a delete acknowledgement.
pub const DEFAULT_DELETE_TIMEOUT: Duration = Duration::from_secs(30);

pub const BRIDGE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const HTTP_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Write buffer used while streaming a file body to disk.
pub const DOWNLOAD_BUFFER_BYTES: usize = 8192;

/// One-second polls while confirming a Wi-Fi join.
pub const WIFI_CONFIRM_POLLS: u32 = 10;
pub const WIFI_CONFIRM_POLLS_MACOS: u32 = 15;

pub const DEFAULT_LOG_FILE: &str = "camsync.log";
pub const DEFAULT_LOG_LEVEL: &str = "info";

const QUALIFIER: &str = "com";
const ORG: &str = "camsync";
const APP: &str = "camsync";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine a config directory for this platform")]
    NoConfigDir,
    #[error("settings file {0} does not exist")]
    NotFound(Utf8PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },
    #[error("no destination directory configured (set storage.destination_dir or pass --dest)")]
    MissingDestination,
    #[error("config path is not valid UTF-8")]
    NonUtf8Path,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub ip: String,
    pub bridge_port: u16,
    pub ssid_prefixes: Vec<String>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            ip: DEFAULT_CAMERA_IP.to_string(),
            bridge_port: DEFAULT_BRIDGE_PORT,
            ssid_prefixes: DEFAULT_SSID_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl CameraSettings {
    pub fn http_base_url(&self) -> String {
        format!("http://{}", self.ip)
    }

    pub fn bridge_addr(&self) -> String {
        format!("{}:{}", self.ip, self.bridge_port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub destination_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Remote copies are only ever removed once the local copy is verified.
    pub delete_after_download: bool,
    pub list_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            delete_after_download: false,
            list_timeout_secs: DEFAULT_LIST_TIMEOUT.as_secs(),
        }
    }
}

impl SyncSettings {
    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Relative paths are resolved against the config directory.
    pub log_file: Option<Utf8PathBuf>,
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_file: Some(Utf8PathBuf::from(DEFAULT_LOG_FILE)),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiSettings {
    /// Join the camera access point before syncing.
    pub enabled: bool,
}

impl Default for WifiSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub camera: CameraSettings,
    pub storage: StorageSettings,
    pub sync: SyncSettings,
    pub logging: LoggingSettings,
    pub wifi: WifiSettings,
}

impl Settings {
    /// Load from `path`, or from the platform config directory when `None`.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                Self::read(p)
            }
            None => {
                let p = default_settings_path()?;
                if !p.exists() {
                    return Ok(Self::default());
                }
                Self::read(&p)
            }
        }
    }

    fn read(path: &Utf8Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn destination_dir(&self) -> Result<&Utf8Path, ConfigError> {
        self.storage
            .destination_dir
            .as_deref()
            .ok_or(ConfigError::MissingDestination)
    }

    /// Absolute log file path, if file logging is on.
    pub fn log_file_path(&self) -> Result<Option<Utf8PathBuf>, ConfigError> {
        match &self.logging.log_file {
            None => Ok(None),
            Some(p) if p.is_absolute() => Ok(Some(p.clone())),
            Some(p) => Ok(Some(config_dir()?.join(p))),
        }
    }
}

pub fn config_dir() -> Result<Utf8PathBuf, ConfigError> {
    let dirs = ProjectDirs::from(QUALIFIER, ORG, APP).ok_or(ConfigError::NoConfigDir)?;
    Utf8PathBuf::from_path_buf(dirs.config_dir().to_path_buf())
        .map_err(|_| ConfigError::NonUtf8Path)
}

pub fn default_settings_path() -> Result<Utf8PathBuf, ConfigError> {
    Ok(config_dir()?.join(SETTINGS_FILE))
}
