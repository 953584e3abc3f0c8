//! Configuration loading and resolution
//!
//! Every setting is resolved in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or malformed TOML file never aborts startup. The resolver logs a
//! warning and continues with compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable overriding the backend base URL
pub const ENV_API_URL: &str = "CHLB_API_URL";

/// Environment variable overriding the local data directory
pub const ENV_DATA_DIR: &str = "CHLB_DATA_DIR";

/// Environment variable pointing at an explicit TOML config file
pub const ENV_CONFIG_FILE: &str = "CHLB_CONFIG";

const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 5;
const DEFAULT_RECONNECTION_DELAY_MS: u64 = 1000;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is not set
    pub level: String,
    /// Optional log file (stdout when absent)
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Real-time channel section of the TOML config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Connection attempts after the first failure before giving up
    pub reconnection_attempts: u32,
    /// Fixed delay between connection attempts
    pub reconnection_delay_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            reconnection_attempts: DEFAULT_RECONNECTION_ATTEMPTS,
            reconnection_delay_ms: DEFAULT_RECONNECTION_DELAY_MS,
        }
    }
}

impl RealtimeConfig {
    pub fn reconnection_delay(&self) -> Duration {
        Duration::from_millis(self.reconnection_delay_ms)
    }
}

/// On-disk TOML configuration
///
/// All fields are optional so that a partial file only overrides what it names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Backend base URL (e.g. `https://api.example.com`)
    pub api_url: Option<String>,
    /// Directory holding `identity.toml`
    pub data_dir: Option<PathBuf>,
    /// Timeout applied to the processing status probe
    pub probe_timeout_secs: Option<u64>,
    pub logging: LoggingConfig,
    pub realtime: RealtimeConfig,
}

/// OS-dependent compiled defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub api_url: String,
    pub data_dir: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub probe_timeout_secs: u64,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
            log_file: None,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
        }
    }
}

/// Fully resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL without a trailing slash
    pub api_url: String,
    pub data_dir: PathBuf,
    pub probe_timeout: Duration,
    pub logging: LoggingConfig,
    pub realtime: RealtimeConfig,
}

impl ClientConfig {
    /// Path of the persisted identity file inside the data directory
    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join(crate::identity::IDENTITY_FILE_NAME)
    }
}

/// Resolves a [`ClientConfig`] from CLI, environment, TOML and defaults
pub struct ConfigResolver {
    module_name: String,
    config_file: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            config_file: None,
        }
    }

    /// Use an explicit config file instead of the platform search path
    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path;
        self
    }

    /// Resolve every setting
    ///
    /// Only an invalid API URL is an error; everything else degrades to defaults.
    pub fn resolve(
        &self,
        cli_api_url: Option<&str>,
        cli_data_dir: Option<&Path>,
    ) -> Result<ClientConfig> {
        let defaults = CompiledDefaults::for_current_platform();
        let toml_config = self.load_toml();

        // Priority 1..4 for the API URL
        let api_url = if let Some(url) = cli_api_url {
            debug!(module = %self.module_name, "API URL from command line");
            url.to_string()
        } else if let Some(url) = non_blank_env(ENV_API_URL) {
            debug!(module = %self.module_name, "API URL from {}", ENV_API_URL);
            url
        } else if let Some(url) = toml_config.api_url.clone() {
            debug!(module = %self.module_name, "API URL from TOML config");
            url
        } else {
            defaults.api_url.clone()
        };
        let api_url = normalize_api_url(&api_url)?;

        let data_dir = if let Some(dir) = cli_data_dir {
            dir.to_path_buf()
        } else if let Some(dir) = non_blank_env(ENV_DATA_DIR) {
            PathBuf::from(dir)
        } else if let Some(dir) = toml_config.data_dir.clone() {
            dir
        } else {
            defaults.data_dir.clone()
        };

        let probe_timeout = Duration::from_secs(
            toml_config
                .probe_timeout_secs
                .unwrap_or(defaults.probe_timeout_secs),
        );

        info!(
            module = %self.module_name,
            api_url = %api_url,
            data_dir = %data_dir.display(),
            "Configuration resolved"
        );

        Ok(ClientConfig {
            api_url,
            data_dir,
            probe_timeout,
            logging: toml_config.logging,
            realtime: toml_config.realtime,
        })
    }

    /// Load the TOML config, falling back to defaults on any failure
    fn load_toml(&self) -> TomlConfig {
        let path = match self
            .config_file
            .clone()
            .or_else(|| non_blank_env(ENV_CONFIG_FILE).map(PathBuf::from))
            .or_else(find_config_file)
        {
            Some(path) => path,
            None => {
                debug!("No config file found, using compiled defaults");
                return TomlConfig::default();
            }
        };

        match load_toml_config(&path) {
            Ok(config) => {
                info!("Loaded config file: {}", path.display());
                config
            }
            Err(e) => {
                warn!(
                    "Ignoring config file {}: {}. Using compiled defaults.",
                    path.display(),
                    e
                );
                TomlConfig::default()
            }
        }
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Err(Error::NotFound(format!(
            "Config file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Validate and normalize a backend base URL
///
/// Only `http` and `https` are accepted. Trailing slashes are removed so that
/// endpoint paths can be appended with `format!("{}/api/...", url)`.
pub fn normalize_api_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let host = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .ok_or_else(|| {
            Error::Config(format!(
                "API URL must start with http:// or https://, got '{}'",
                url
            ))
        })?;
    if host.is_empty() {
        return Err(Error::Config(format!("API URL has no host: '{}'", url)));
    }
    Ok(trimmed.to_string())
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Search the platform config locations
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("chlb").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/chlb/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default data directory
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/chlb
        dirs::data_local_dir()
            .map(|d| d.join("chlb"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/chlb"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/chlb
        dirs::data_dir()
            .map(|d| d.join("chlb"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/chlb"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\chlb
        dirs::data_local_dir()
            .map(|d| d.join("chlb"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\chlb"))
    } else {
        PathBuf::from("./chlb_data")
    }
}

/// File name the game writes its score database to
pub const SCOREDATA_FILE_NAME: &str = "scoredata.bin";

/// Where the game keeps `scoredata.bin` on this platform
///
/// Returns `None` when the platform has no known location or the home
/// directory cannot be determined. The file is not required to exist.
pub fn default_scoredata_path() -> Option<PathBuf> {
    let game_dir = if cfg!(target_os = "windows") {
        // %USERPROFILE%\AppData\LocalLow\srylain Inc_\Clone Hero
        dirs::home_dir().map(|d| {
            d.join("AppData")
                .join("LocalLow")
                .join("srylain Inc_")
                .join("Clone Hero")
        })
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/com.srylain.CloneHero
        dirs::data_dir().map(|d| d.join("com.srylain.CloneHero"))
    } else if cfg!(target_os = "linux") {
        // ~/.config/unity3d/srylain Inc_/Clone Hero
        dirs::config_dir().map(|d| d.join("unity3d").join("srylain Inc_").join("Clone Hero"))
    } else {
        None
    };
    game_dir.map(|d| d.join(SCOREDATA_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_api_url_strips_trailing_slash() {
        assert_eq!(
            normalize_api_url("https://api.example.com/").unwrap(),
            "https://api.example.com"
        );
        assert_eq!(
            normalize_api_url("  http://localhost:5000// ").unwrap(),
            "http://localhost:5000"
        );
    }

    #[test]
    fn test_normalize_api_url_rejects_other_schemes() {
        assert!(normalize_api_url("ws://localhost:5000").is_err());
        assert!(normalize_api_url("localhost:5000").is_err());
        assert!(normalize_api_url("http://").is_err());
        assert!(normalize_api_url("https://").is_err());
    }

    #[test]
    fn test_partial_toml_keeps_section_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            api_url = "https://chlb.example"

            [realtime]
            reconnection_attempts = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.api_url.as_deref(), Some("https://chlb.example"));
        assert_eq!(config.realtime.reconnection_attempts, 2);
        assert_eq!(config.realtime.reconnection_delay_ms, 1000);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_realtime_defaults() {
        let realtime = RealtimeConfig::default();
        assert_eq!(realtime.reconnection_attempts, 5);
        assert_eq!(realtime.reconnection_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_default_scoredata_path_names_the_game_file() {
        if let Some(path) = default_scoredata_path() {
            assert_eq!(path.file_name().unwrap(), SCOREDATA_FILE_NAME);
        }
    }
}
