use derive_more::Display;

/// Exit codes following https://www.freebsd.org/cgi/man.cgi?query=sysexits&sektion=3
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash)]
pub enum ExitCode {
    /// `EX_USAGE` (64) - command was used incorrectly
    Usage,

    /// `EX_UNAVAILABLE` (69) - service is unavailable (e.g. peer never accepted a connection)
    Unavailable,

    /// `EX_SOFTWARE` (70) - internal software error has been detected (e.g. banner mismatch)
    Software,

    /// `EX_IOERR` (74) - error occurred while doing I/O
    IoError,

    /// `EX_TEMPFAIL` (75) - temporary failure, indicating something that can be retried later
    TempFail,

    /// `EX_PROTOCOL` (76) - remote system returned something that was "not possible" during a
    /// protocol exchange
    Protocol,

    /// `EX_CONFIG` (78) - something was found in an unconfigured or misconfigured state
    Config,
}

impl ExitCode {
    /// Convert into numeric exit code
    pub fn to_i32(self) -> i32 {
        match self {
            Self::Usage => 64,
            Self::Unavailable => 69,
            Self::Software => 70,
            Self::IoError => 74,
            Self::TempFail => 75,
            Self::Protocol => 76,
            Self::Config => 78,
        }
    }
}

/// Represents an error that can be converted into an exit code
pub trait ExitCodeError: std::error::Error {
    fn to_exit_code(&self) -> ExitCode;

    fn to_i32(&self) -> i32 {
        self.to_exit_code().to_i32()
    }
}

impl ExitCodeError for std::io::Error {
    fn to_exit_code(&self) -> ExitCode {
        use std::io::ErrorKind;
        match self.kind() {
            ErrorKind::AddrInUse
            | ErrorKind::AddrNotAvailable
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::NotConnected => ExitCode::Unavailable,
            ErrorKind::TimedOut => ExitCode::TempFail,
            _ => ExitCode::IoError,
        }
    }
}
