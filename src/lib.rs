//! Checks that SSH pre-authentication banners survive the trip between our SSH stack and
//! OpenSSH, in both directions.

mod cli;
pub mod config;
mod error;
pub mod options;
pub mod scenario;

pub use cli::{Cli, CliError, CliResult};
pub use error::{ExitCode, ExitCodeError};
pub use options::Options;
