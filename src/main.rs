//! # banner-interop
//!
//! ### Exit codes
//!
//! * EX_USAGE (64) - being used when arguments missing or bad arguments provided to CLI
//! * EX_UNAVAILABLE (69) - being used when the peer never accepted a connection
//! * EX_SOFTWARE (70) - being used when a banner was not delivered as expected
//! * EX_IOERR (74) - being used when temporary files, keys or peer processes could not be set up
//! * EX_TEMPFAIL (75) - being used when connecting to the peer timed out
//! * EX_PROTOCOL (76) - being used when a handshake failed before a banner arrived
//! * EX_CONFIG (78) - being used when the configuration or logger could not be loaded
use log::*;
use ssh_banner_interop::options::OptionsError;
use ssh_banner_interop::{Cli, ExitCode, ExitCodeError};

fn main() {
    match Cli::initialize() {
        Ok(cli) => {
            let logger = match cli.init_logger() {
                Ok(logger) => logger,
                Err(x) => {
                    eprintln!("Failed to initialize logger: {x}");
                    std::process::exit(ExitCode::Config.to_i32());
                }
            };

            if let Err(x) = cli.run() {
                error!("{}", x);
                eprintln!("{}", x);
                logger.flush();
                logger.shutdown();

                std::process::exit(x.to_i32());
            }
        }

        Err(OptionsError::Options(x)) if x.use_stderr() => {
            let _ = x.print();
            std::process::exit(ExitCode::Usage.to_i32());
        }

        // Help and version requests exit successfully
        Err(OptionsError::Options(x)) => x.exit(),
        Err(OptionsError::Config(x)) => {
            eprintln!("{x:#}");
            std::process::exit(ExitCode::Config.to_i32());
        }
    }
}
