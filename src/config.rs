use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use banner_harness::retry::RetryPolicy;
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::options::LoggingSettings;
use crate::scenario::{ClientScenario, ServerScenario};

const DEFAULT_RAW_STR: &str = include_str!("config.toml");

/// User-specific configuration file, when a home directory can be determined
pub static USER_CONFIG_FILE_PATH: Lazy<Option<PathBuf>> = Lazy::new(|| {
    ProjectDirs::from("", "", "banner-interop").map(|dirs| dirs.config_dir().join("config.toml"))
});

/// Represents configuration settings for both scenarios
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingSettings,
    pub client: ClientSettings,
    pub server: ServerSettings,
}

/// Settings for the scenario where our client talks to a foreign daemon
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ClientSettings {
    pub banner: String,
    pub user: String,
    pub sshd_bin: Option<PathBuf>,
    pub retry: RetrySettings,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RetrySettings {
    pub attempts: usize,
    pub interval_ms: u64,
}

/// Settings for the scenario where a foreign client talks to our server
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    pub banner: String,
    pub user: String,
    pub accepted_user: String,
    pub ssh_bin: Option<PathBuf>,
    pub completion_timeout_ms: u64,
}

impl Config {
    /// Returns a reference to the default config file as a raw str.
    pub const fn default_raw_str() -> &'static str {
        DEFAULT_RAW_STR
    }

    /// Loads the configuration in a blocking fashion
    ///
    /// 1. If `custom` is provided, it is used by itself as the source for configuration
    /// 2. Otherwise, the user config file is loaded if it exists
    /// 3. Otherwise the default configuration is returned
    pub fn load_multi(custom: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = match custom {
            Some(path) => path,
            None => match USER_CONFIG_FILE_PATH.as_deref() {
                Some(path) if path.exists() => path.to_path_buf(),
                _ => return Ok(Self::default()),
            },
        };

        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read config file {path:?}"))?;
        toml_edit::de::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {path:?}"))
    }
}

impl Default for Config {
    fn default() -> Self {
        static DEFAULT_CONFIG: Lazy<Config> = Lazy::new(|| {
            toml_edit::de::from_str(Config::default_raw_str())
                .expect("Default config failed to parse")
        });

        DEFAULT_CONFIG.clone()
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        RetryPolicy::new(
            settings.attempts,
            Duration::from_millis(settings.interval_ms),
        )
    }
}

impl ClientSettings {
    pub fn to_scenario(&self) -> ClientScenario {
        ClientScenario {
            banner: self.banner.clone(),
            user: self.user.clone(),
            sshd_bin: self.sshd_bin.clone(),
            retry: self.retry.into(),
        }
    }
}

impl ServerSettings {
    pub fn to_scenario(&self) -> ServerScenario {
        ServerScenario {
            banner: self.banner.clone(),
            user: self.user.clone(),
            accepted_user: self.accepted_user.clone(),
            ssh_bin: self.ssh_bin.clone(),
            completion_timeout: Duration::from_millis(self.completion_timeout_ms),
            ..Default::default()
        }
    }
}
