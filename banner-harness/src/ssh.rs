use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

use log::*;

/// Non-interactive invocation of a foreign `ssh` client against a loopback port.
///
/// Host key checking and known hosts persistence are disabled so the client never prompts and
/// never touches the user's files.
#[derive(Clone, Debug)]
pub struct SshCommand {
    bin: PathBuf,
    user: String,
    port: u16,
    options: Vec<(String, String)>,
}

impl SshCommand {
    pub fn new(bin: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            bin: bin.into(),
            user: "user".to_string(),
            port,
            options: vec![
                ("UserKnownHostsFile".to_string(), "/dev/null".to_string()),
                ("StrictHostKeyChecking".to_string(), "no".to_string()),
                ("BatchMode".to_string(), "yes".to_string()),
                // Banners are printed at INFO and above
                ("LogLevel".to_string(), "INFO".to_string()),
            ],
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Arguments passed to the client
    pub fn args(&self) -> Vec<String> {
        // Skip user and system ssh_config so their LogLevel or host rules cannot hide the banner
        let mut args = vec!["-F".to_string(), "/dev/null".to_string()];
        for (key, value) in self.options.iter() {
            args.push("-o".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push("-p".to_string());
        args.push(self.port.to_string());
        args.push(format!("{}@{}", self.user, Ipv4Addr::LOCALHOST));
        args
    }

    /// Runs the client to completion, blocking the current thread. There is no timeout: a client
    /// that never exits blocks forever.
    pub fn run(&self) -> io::Result<CombinedOutput> {
        let args = self.args();
        debug!("Running {:?} {:?}", self.bin, args);

        let output = Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::null())
            .output()?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!("ssh exited with {}", output.status);
        trace!("ssh output: {text}");

        Ok(CombinedOutput {
            status: output.status,
            text,
        })
    }
}

/// Standard output followed by standard error of a finished client
#[derive(Clone, Debug)]
pub struct CombinedOutput {
    pub status: ExitStatus,
    pub text: String,
}

impl CombinedOutput {
    pub fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }
}
