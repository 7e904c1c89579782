use std::ffi::OsString;
use std::io::Write;

use flexi_logger::{
    FileSpec, FlexiLoggerError, LevelFilter, LogSpecification, Logger, LoggerHandle,
};
use log::*;

use crate::Options;
use crate::options::{InteropSubcommand, OptionsError};
use crate::scenario::Outcome;

mod error;

pub use error::{CliError, CliResult};

/// Represents the primary CLI entrypoint
#[derive(Debug)]
pub struct Cli {
    pub options: Options,
}

impl Cli {
    /// Creates a new CLI instance by parsing command-line arguments
    pub fn initialize() -> Result<Self, OptionsError> {
        Self::initialize_from(std::env::args_os())
    }

    /// Creates a new CLI instance by parsing providing arguments
    pub fn initialize_from<I, T>(args: I) -> Result<Self, OptionsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Ok(Cli {
            options: Options::load_from(args)?,
        })
    }

    /// Initializes a logger for the CLI, returning a handle to the logger
    pub fn init_logger(&self) -> Result<LoggerHandle, FlexiLoggerError> {
        let modules = &["ssh_banner_interop", "banner_ssh", "banner_harness"];

        // Disable logging for everything but our crates, which is based on verbosity
        let mut builder = LogSpecification::builder();
        builder.default(LevelFilter::Off);

        let level = self.options.logging.level_filter();
        for module in modules {
            builder.module(module, level);
        }

        // Create our logger, but don't initialize yet
        let logger = Logger::with(builder.build()).format_for_files(flexi_logger::opt_format);

        // If provided, log to file instead of stderr
        let logger = match self.options.logging.log_file.as_ref() {
            Some(path) => logger.log_to_file(FileSpec::try_from(path)?),
            None => logger,
        };

        logger.start()
    }

    /// Runs the selected scenarios, printing one line per scenario to stdout
    pub fn run(self) -> CliResult<()> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        let client = self
            .options
            .client
            .map(|settings| settings.to_scenario())
            .unwrap_or_default();
        let server = self
            .options
            .server
            .map(|settings| settings.to_scenario())
            .unwrap_or_default();

        let command = self.options.command;

        let results = rt.block_on(async move {
            match command {
                InteropSubcommand::Client(_) => vec![("client", client.run().await)],
                InteropSubcommand::Server(_) => vec![("server", server.run().await)],
                InteropSubcommand::All => {
                    let (client, server) = tokio::join!(client.run(), server.run());
                    vec![("client", client), ("server", server)]
                }
            }
        });

        let mut stdout = std::io::stdout().lock();
        let mut errors = Vec::new();
        for (role, result) in results {
            match result {
                Ok(Outcome::Passed { observed }) => {
                    writeln!(stdout, "PASS {role}: {observed:?}")?
                }
                Ok(Outcome::Skipped(reason)) => writeln!(stdout, "SKIP {role}: {reason}")?,
                Err(x) => {
                    error!("{role} scenario failed: {x}");
                    writeln!(stdout, "FAIL {role}: {x}")?;
                    errors.push(CliError::scenario(role, x));
                }
            }
        }
        stdout.flush()?;

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(CliError::Many(errors)),
        }
    }
}
