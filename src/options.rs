use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};
use derive_more::{Display, Error, From, IsVariant};

use crate::config::{ClientSettings, Config, ServerSettings};

mod logging;

pub use logging::*;

/// Primary entrypoint into options & subcommands for the CLI.
#[derive(Debug, PartialEq, Parser)]
#[clap(author, version, about)]
#[clap(name = "banner-interop")]
pub struct Options {
    #[clap(flatten)]
    pub logging: LoggingSettings,

    /// Configuration file to load instead of the default paths
    #[clap(long = "config", global = true, value_hint = ValueHint::FilePath)]
    config_path: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: InteropSubcommand,

    /// Scenario settings, filled in from the configuration and overridden by the command line
    #[clap(skip)]
    pub client: Option<ClientSettings>,

    #[clap(skip)]
    pub server: Option<ServerSettings>,
}

/// Represents an error associated with parsing options.
#[derive(Debug, Display, From, Error)]
pub enum OptionsError {
    // When configuration file fails to load
    #[display("{_0:#}")]
    Config(#[error(not(source))] anyhow::Error),

    // When parsing options fails (or is something like --version or --help)
    Options(#[error(not(source))] clap::Error),
}

impl Options {
    /// Creates a new CLI instance by parsing providing arguments
    pub fn load_from<I, T>(args: I) -> Result<Self, OptionsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let mut this = Self::try_parse_from(args)?;
        let config = Config::load_multi(this.config_path.take())?;
        this.merge(config);
        Ok(this)
    }

    /// Updates options based on configuration values.
    fn merge(&mut self, config: Config) {
        self.logging.merge(config.logging);

        let mut client = config.client;
        let mut server = config.server;
        match &self.command {
            InteropSubcommand::Client(opts) => {
                opts.apply(&mut client);
                self.client = Some(client);
            }
            InteropSubcommand::Server(opts) => {
                opts.apply(&mut server);
                self.server = Some(server);
            }
            InteropSubcommand::All => {
                self.client = Some(client);
                self.server = Some(server);
            }
        }
    }
}

/// Scenarios that can be run
#[derive(Debug, PartialEq, Subcommand, IsVariant)]
pub enum InteropSubcommand {
    /// Run our client against a foreign sshd serving a banner file
    Client(ClientOpts),

    /// Run a foreign ssh client against our server producing a banner
    Server(ServerOpts),

    /// Run both scenarios concurrently using configured settings
    All,
}

#[derive(Args, Debug, Default, PartialEq)]
pub struct ClientOpts {
    /// Banner written to the daemon's banner file
    #[clap(long)]
    pub banner: Option<String>,

    /// User to attempt authentication as
    #[clap(long)]
    pub user: Option<String>,

    /// Path to the sshd binary instead of searching the PATH
    #[clap(long, value_hint = ValueHint::ExecutablePath)]
    pub sshd_bin: Option<PathBuf>,

    /// Connection attempts made while the daemon starts
    #[clap(long)]
    pub attempts: Option<usize>,

    /// Milliseconds slept before each connection attempt
    #[clap(long)]
    pub interval_ms: Option<u64>,
}

impl ClientOpts {
    fn apply(&self, settings: &mut ClientSettings) {
        if let Some(banner) = self.banner.as_ref() {
            settings.banner = banner.clone();
        }
        if let Some(user) = self.user.as_ref() {
            settings.user = user.clone();
        }
        if let Some(bin) = self.sshd_bin.as_ref() {
            settings.sshd_bin = Some(bin.clone());
        }
        if let Some(attempts) = self.attempts {
            settings.retry.attempts = attempts;
        }
        if let Some(interval_ms) = self.interval_ms {
            settings.retry.interval_ms = interval_ms;
        }
    }
}

#[derive(Args, Debug, Default, PartialEq)]
pub struct ServerOpts {
    /// Banner produced by our server
    #[clap(long)]
    pub banner: Option<String>,

    /// User the foreign client logs in as
    #[clap(long)]
    pub user: Option<String>,

    /// Only user allowed to authenticate with a public key
    #[clap(long)]
    pub accepted_user: Option<String>,

    /// Path to the ssh binary instead of searching the PATH
    #[clap(long, value_hint = ValueHint::ExecutablePath)]
    pub ssh_bin: Option<PathBuf>,

    /// Milliseconds to wait for our server after the client exits
    #[clap(long)]
    pub completion_timeout_ms: Option<u64>,
}

impl ServerOpts {
    fn apply(&self, settings: &mut ServerSettings) {
        if let Some(banner) = self.banner.as_ref() {
            settings.banner = banner.clone();
        }
        if let Some(user) = self.user.as_ref() {
            settings.user = user.clone();
        }
        if let Some(accepted_user) = self.accepted_user.as_ref() {
            settings.accepted_user = accepted_user.clone();
        }
        if let Some(bin) = self.ssh_bin.as_ref() {
            settings.ssh_bin = Some(bin.clone());
        }
        if let Some(timeout) = self.completion_timeout_ms {
            settings.completion_timeout_ms = timeout;
        }
    }
}
