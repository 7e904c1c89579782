use std::path::PathBuf;

use derive_more::{Display, Error};
use log::*;

/// Environment variable that, when set to anything but `0`/`false`/empty, marks the run as a
/// short one where interop scenarios are skipped
pub const SHORT_MODE_VAR: &str = "BANNER_INTEROP_SHORT";

/// Why a scenario cannot run in the current environment. This is a skip, never a failure.
#[derive(Clone, Debug, Display, Error, PartialEq, Eq)]
pub enum Unsupported {
    #[display("could not find {_0}")]
    MissingBinary(#[error(not(source))] String),

    #[display("skipping due to BANNER_INTEROP_SHORT")]
    ShortMode,
}

/// Looks up `name` on the executable search path
pub fn find_binary(name: &str) -> Option<PathBuf> {
    match which::which(name) {
        Ok(path) => {
            debug!("Found {name} at {path:?}");
            Some(path)
        }
        Err(x) => {
            debug!("Did not find {name}: {x}");
            None
        }
    }
}

/// Resolves the binary to use for a scenario: `explicit` if given, otherwise `name` looked up on
/// the search path.
pub fn require_binary(explicit: Option<PathBuf>, name: &str) -> Result<PathBuf, Unsupported> {
    if short_mode() {
        return Err(Unsupported::ShortMode);
    }

    match explicit {
        Some(path) if path.is_file() => Ok(path),
        Some(path) => {
            warn!("Configured {name} binary {path:?} does not exist");
            Err(Unsupported::MissingBinary(path.display().to_string()))
        }
        None => find_binary(name).ok_or_else(|| Unsupported::MissingBinary(name.to_string())),
    }
}

/// True if [`SHORT_MODE_VAR`] requests a short run
pub fn short_mode() -> bool {
    std::env::var(SHORT_MODE_VAR).is_ok_and(|value| is_truthy(&value))
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no"
    )
}
