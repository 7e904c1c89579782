use std::path::PathBuf;

use clap::{Args, ValueEnum};
use log::LevelFilter;
use serde::Deserialize;

/// Logging flags, also readable from the `[logging]` table of the config file
#[derive(Args, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// Log level to use throughout the application
    #[clap(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Path to file to use for logging instead of stderr
    #[clap(long, global = true)]
    pub log_file: Option<PathBuf>,
}

impl LoggingSettings {
    /// Filter applied to our crates, `info` unless a level was given
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.unwrap_or_default().into()
    }

    /// Fills in anything not given on the command line from `other`
    pub fn merge(&mut self, other: LoggingSettings) {
        self.log_level = self.log_level.or(other.log_level);
        self.log_file = self.log_file.take().or(other.log_file);
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[clap(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => Self::Off,
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}
