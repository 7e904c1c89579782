use derive_more::{Display, Error, From};

use crate::scenario::ScenarioError;
use crate::{ExitCode, ExitCodeError};

pub type CliResult<T> = Result<T, CliError>;

/// Error encountered during operating the CLI
#[derive(Debug, Display, Error, From)]
pub enum CliError {
    Io(std::io::Error),

    #[display("{role} scenario failed: {error}")]
    #[from(ignore)]
    Scenario {
        role: &'static str,
        error: ScenarioError,
    },

    /// Several scenarios failed; carries the code of the first failure
    #[display("{} scenarios failed", _0.len())]
    #[from(ignore)]
    Many(#[error(not(source))] Vec<CliError>),
}

impl CliError {
    pub fn scenario(role: &'static str, error: ScenarioError) -> Self {
        Self::Scenario { role, error }
    }
}

impl ExitCodeError for CliError {
    fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Io(x) => x.to_exit_code(),
            Self::Scenario { error, .. } => error.to_exit_code(),
            Self::Many(errors) => errors
                .first()
                .map(|x| x.to_exit_code())
                .unwrap_or(ExitCode::Software),
        }
    }
}
