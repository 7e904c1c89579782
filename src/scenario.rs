//! The two banner interop scenarios and the assertions they end with.
//!
//! * [`ClientScenario`]: our client connects to a foreign `sshd` loaded with a banner file and
//!   must capture that banner exactly.
//! * [`ServerScenario`]: a foreign `ssh` client connects to our server, whose banner callback
//!   produces the banner, and must print it somewhere in its output.

use std::io;

use banner_harness::env::Unsupported;
use banner_harness::ssh::CombinedOutput;
use derive_more::{Display, Error, IsVariant};

use crate::{ExitCode, ExitCodeError};

mod client;
mod server;

pub use client::*;
pub use server::*;

/// Banner text used when none is configured
pub const DEFAULT_BANNER: &str = "Hello World";

/// How a scenario that did not fail ended
#[derive(Clone, Debug, PartialEq, Eq, IsVariant)]
pub enum Outcome {
    /// The peer delivered the banner; `observed` is what was captured
    Passed { observed: String },

    /// The environment cannot run the scenario
    Skipped(Unsupported),
}

/// Reasons a scenario fails
#[derive(Debug, Display, Error, IsVariant)]
pub enum ScenarioError {
    /// Temporary files, keys, ports or peer processes could not be prepared
    #[display("setup failed: {_0}")]
    Setup(#[error(not(source))] String),

    /// No connection could be made to the peer within the retry budget
    #[display("failed to connect: {_0}")]
    Transport(io::Error),

    /// The handshake failed before any banner was captured
    #[display("handshake failed before a banner arrived: {_0}")]
    Handshake(banner_ssh::Error),

    #[display("expected banner {expected:?}, got {actual:?}")]
    BannerMismatch { expected: String, actual: String },

    #[display("banner {expected:?} missing from client output: {output:?}")]
    BannerMissing { expected: String, output: String },

    /// Our server's side of the exchange failed or never finished
    #[display("server side failed: {_0}")]
    Server(#[error(not(source))] String),
}

impl ScenarioError {
    /// Wraps a setup failure, keeping its whole context chain in the message
    pub fn setup(x: impl Into<anyhow::Error>) -> Self {
        Self::Setup(format!("{:#}", x.into()))
    }
}

impl ExitCodeError for ScenarioError {
    fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Setup(_) => ExitCode::IoError,
            Self::Transport(x) => x.to_exit_code(),
            Self::Handshake(_) | Self::Server(_) => ExitCode::Protocol,
            Self::BannerMismatch { .. } | Self::BannerMissing { .. } => ExitCode::Software,
        }
    }
}

/// Passes only if `observed` is exactly `expected`
pub fn assert_exact(expected: &str, observed: &str) -> Result<(), ScenarioError> {
    if observed == expected {
        Ok(())
    } else {
        Err(ScenarioError::BannerMismatch {
            expected: expected.to_string(),
            actual: observed.to_string(),
        })
    }
}

/// Passes if `expected` appears anywhere in the client's combined output
pub fn assert_contains(expected: &str, output: &CombinedOutput) -> Result<(), ScenarioError> {
    if output.contains(expected) {
        Ok(())
    } else {
        Err(ScenarioError::BannerMissing {
            expected: expected.to_string(),
            output: output.text.clone(),
        })
    }
}
