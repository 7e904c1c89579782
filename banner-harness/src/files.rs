use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// Mode for a private host key: owner may read, nobody else may do anything. sshd silently
/// ignores private keys that are readable by others.
pub const HOST_KEY_MODE: u32 = 0o400;

/// Mode for the banner file read by the daemon
pub const BANNER_MODE: u32 = 0o444;

/// Creates `path` with `mode` already applied and writes `contents` to it.
///
/// The permission bits are set when the file is created rather than afterwards, so the
/// contents are never readable under broader permissions. Fails if `path` already exists.
pub fn write_restricted(path: impl AsRef<Path>, contents: &[u8], mode: u32) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }

    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path.as_ref())?;
    file.write_all(contents)?;
    file.sync_all()
}
