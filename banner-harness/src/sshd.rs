use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use std::thread;

use anyhow::Context;
use log::*;

/// Time to wait after spawning sshd before checking that it is still alive
const WAIT_AFTER_SPAWN: Duration = Duration::from_millis(300);

const MAX_DROP_WAIT_TIME: Duration = Duration::from_millis(500);

/// Keyword/value pairs rendered into an `sshd_config(5)` file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshdConfig(BTreeMap<String, Vec<String>>);

impl Default for SshdConfig {
    fn default() -> Self {
        let mut config = Self::new();

        // PAM needs root and StrictModes would reject a temporary directory
        config.set_use_pam(false);
        config.set_strict_modes(false);
        config.set_max_startups(500, None);
        config.set("LogLevel", vec!["DEBUG".to_string()]);

        config
    }
}

impl SshdConfig {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets an arbitrary keyword, replacing any earlier values
    pub fn set(&mut self, keyword: impl Into<String>, values: Vec<String>) {
        self.0.insert(keyword.into(), values);
    }

    pub fn get(&self, keyword: &str) -> Option<&[String]> {
        self.0.get(keyword).map(Vec::as_slice)
    }

    pub fn set_pid_file(&mut self, path: impl AsRef<Path>) {
        self.set("PidFile", vec![path_to_string(path.as_ref())]);
    }

    pub fn set_use_pam(&mut self, yes: bool) {
        self.set("UsePAM", Self::yes_value(yes));
    }

    pub fn set_max_startups(&mut self, start: u16, rate_full: Option<(u16, u16)>) {
        let value = format!(
            "{}{}",
            start,
            rate_full
                .map(|(r, f)| format!(":{}:{}", r, f))
                .unwrap_or_default(),
        );

        self.set("MaxStartups", vec![value]);
    }

    pub fn set_strict_modes(&mut self, yes: bool) {
        self.set("StrictModes", Self::yes_value(yes));
    }

    fn yes_value(yes: bool) -> Vec<String> {
        vec![if yes { "yes" } else { "no" }.to_string()]
    }
}

impl fmt::Display for SshdConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (keyword, values) in self.0.iter() {
            writeln!(
                f,
                "{} {}",
                keyword,
                values
                    .iter()
                    .map(|v| {
                        let v = v.trim();
                        if v.contains(|c: char| c.is_whitespace()) {
                            format!("\"{}\"", v)
                        } else {
                            v.to_string()
                        }
                    })
                    .collect::<Vec<String>>()
                    .join(" ")
            )?;
        }
        Ok(())
    }
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// What to launch and how
#[derive(Clone, Debug)]
pub struct SshdOpts {
    /// Absolute path to the daemon; sshd refuses to re-exec itself from a relative path
    pub bin: PathBuf,

    pub port: u16,

    /// Private host key, passed with `-h`
    pub host_key: PathBuf,

    /// File whose contents are sent as the pre-authentication banner, passed with `-o Banner`
    pub banner: Option<PathBuf>,

    /// Written to `sshd_config` in the working directory and passed with `-f`
    pub config: SshdConfig,
}

impl SshdOpts {
    /// Arguments passed to the daemon, given where its config and log files live
    pub fn args(&self, config_file: &Path, log_file: &Path) -> Vec<String> {
        let mut args = vec![
            "-D".to_string(),
            "-p".to_string(),
            self.port.to_string(),
            "-h".to_string(),
            path_to_string(&self.host_key),
        ];

        if let Some(banner) = self.banner.as_ref() {
            args.push("-o".to_string());
            args.push(format!("Banner {}", path_to_string(banner)));
        }

        args.extend([
            "-f".to_string(),
            path_to_string(config_file),
            "-E".to_string(),
            path_to_string(log_file),
        ]);
        args
    }
}

/// A running sshd child process, killed when dropped
#[derive(Debug)]
pub struct Sshd {
    child: Mutex<Option<Child>>,

    /// Port that sshd was told to listen on
    pub port: u16,

    /// Path to config file to print out when failures happen
    pub config_file: PathBuf,

    /// Path to log file to print out when failures happen
    pub log_file: PathBuf,
}

impl Sshd {
    /// Writes the daemon's config into `dir` and starts it in the foreground.
    ///
    /// Fails if the process cannot be started or exits straight away, in which case the daemon
    /// log is included in the error.
    pub fn spawn(opts: SshdOpts, dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let config_file = dir.join("sshd_config");
        let log_file = dir.join("sshd.log");

        let mut config = opts.config.clone();
        config.set_pid_file(dir.join("sshd.pid"));
        std::fs::write(&config_file, config.to_string())
            .context("Failed to write sshd config to file")?;

        let args = opts.args(&config_file, &log_file);
        debug!("Spawning {:?} {:?}", opts.bin, args);

        let mut child = Command::new(&opts.bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn {:?}", opts.bin))?;

        // Catch instant failures like permission or config errors
        thread::sleep(WAIT_AFTER_SPAWN);
        if let Some(status) = child.try_wait().context("Failed to check sshd after spawn")? {
            anyhow::bail!(
                "sshd exited immediately with {status}\nlog: {}",
                std::fs::read_to_string(&log_file).unwrap_or_default(),
            );
        }

        info!("Started sshd (pid {}) on port {}", child.id(), opts.port);
        Ok(Self {
            child: Mutex::new(Some(child)),
            port: opts.port,
            config_file,
            log_file,
        })
    }

    /// Checks whether the process is still running, reporting how it died if it is not
    pub fn is_alive(&self) -> bool {
        let mut child_lock = self.child.lock().unwrap_or_else(|x| x.into_inner());
        match child_lock.as_mut().map(|child| child.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                error!("sshd died with {status}");
                child_lock.take();
                false
            }
            Some(Err(x)) => {
                error!("Failed to check status of sshd: {x}");
                false
            }
            None => false,
        }
    }

    /// Contents of the daemon log, if it has written one
    pub fn log_contents(&self) -> Option<String> {
        std::fs::read_to_string(&self.log_file)
            .ok()
            .filter(|log| !log.trim().is_empty())
    }

    /// Dumps the daemon config and log at error level, to explain a failed scenario
    pub fn print_diagnostics(&self) {
        if let Ok(contents) = std::fs::read_to_string(&self.config_file) {
            error!("sshd config file {:?}:\n{contents}", self.config_file);
        }

        match self.log_contents() {
            Some(log) => error!("sshd log file {:?}:\n{log}", self.log_file),
            None => error!("sshd log file {:?} is empty or missing", self.log_file),
        }
    }
}

impl Drop for Sshd {
    /// Kills server upon drop
    fn drop(&mut self) {
        debug!("Dropping sshd");
        let child = self
            .child
            .lock()
            .unwrap_or_else(|x| x.into_inner())
            .take();

        if let Some(mut child) = child {
            let _ = child.kill();

            // Wait for a maximum period of time
            let start = Instant::now();
            while start.elapsed() < MAX_DROP_WAIT_TIME {
                match child.try_wait() {
                    Ok(Some(_)) => {
                        debug!("Sshd finished");
                        return;
                    }
                    Err(x) => {
                        error!("Failed to wait for sshd to quit: {x}");
                        return;
                    }
                    _ => thread::sleep(MAX_DROP_WAIT_TIME / 10),
                }
            }

            error!("Timed out waiting for sshd to quit");
        }
    }
}
