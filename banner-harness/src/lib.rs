//! OS-level plumbing shared by the banner interop scenarios: ephemeral ports, restricted
//! artifact files, foreign peer processes and a bounded connect retry.

pub mod env;
pub mod files;
pub mod port;
pub mod retry;
pub mod ssh;
pub mod sshd;

pub use assert_fs::TempDir;

/// Returns early from a test when the environment cannot run it.
///
/// Takes a `Result<T, Unsupported>`; on `Err` prints the reason and returns from the enclosing
/// function, otherwise evaluates to the `Ok` value.
///
/// # Examples
///
/// ```ignore
/// let sshd_bin = skip_if_unsupported!(banner_harness::env::require_binary(None, "sshd"));
/// ```
#[macro_export]
macro_rules! skip_if_unsupported {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(reason) => {
                eprintln!("Skipping test: {reason}");
                return;
            }
        }
    };
}
