use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use banner_harness::TempDir;
use banner_harness::env;
use banner_harness::files::{self, BANNER_MODE, HOST_KEY_MODE};
use banner_harness::port::find_free_port;
use banner_harness::retry::{RetryPolicy, connect_with_retry};
use banner_harness::sshd::{Sshd, SshdConfig, SshdOpts};
use banner_ssh::keys::{encode_openssh, signing_key_from_seed};
use banner_ssh::{ClientConfig, ClientConn, capture_banner};
use log::*;

use super::{DEFAULT_BANNER, Outcome, ScenarioError, assert_exact};

/// Seed of the host key handed to the foreign daemon
const DAEMON_HOST_KEY_SEED: [u8; 32] = *b"banner-interop daemon host key!!";

/// Our client against a foreign `sshd` that serves a banner file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientScenario {
    /// Contents of the daemon's banner file, expected back verbatim
    pub banner: String,

    /// User our client asks to authenticate as; it does not need to exist
    pub user: String,

    /// Daemon to launch instead of the `sshd` found on the search path
    pub sshd_bin: Option<PathBuf>,

    pub retry: RetryPolicy,
}

impl Default for ClientScenario {
    fn default() -> Self {
        Self {
            banner: DEFAULT_BANNER.to_string(),
            user: "user".to_string(),
            sshd_bin: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientScenario {
    pub async fn run(&self) -> Result<Outcome, ScenarioError> {
        let sshd_bin = match env::require_binary(self.sshd_bin.clone(), "sshd") {
            Ok(path) => path,
            Err(reason) => {
                info!("Skipping client scenario: {reason}");
                return Ok(Outcome::Skipped(reason));
            }
        };

        // Declared before the daemon so that it is removed after the daemon is killed
        let tmp = TempDir::new()
            .context("Failed to create temporary directory")
            .map_err(ScenarioError::setup)?;

        let host_key = tmp.path().join("host_key");
        let pem = encode_openssh(&signing_key_from_seed(&DAEMON_HOST_KEY_SEED))
            .context("Failed to encode host key")
            .map_err(ScenarioError::setup)?;
        files::write_restricted(&host_key, pem.as_bytes(), HOST_KEY_MODE)
            .context("Failed to write host key")
            .map_err(ScenarioError::setup)?;

        let banner = tmp.path().join("banner");
        files::write_restricted(&banner, self.banner.as_bytes(), BANNER_MODE)
            .context("Failed to write banner file")
            .map_err(ScenarioError::setup)?;

        let port = find_free_port()
            .context("Failed to find an unused port")
            .map_err(ScenarioError::setup)?;

        let opts = SshdOpts {
            bin: sshd_bin,
            port,
            host_key,
            banner: Some(banner),
            config: SshdConfig::default(),
        };
        let dir = tmp.path().to_path_buf();
        let sshd = tokio::task::spawn_blocking(move || Sshd::spawn(opts, dir))
            .await
            .map_err(ScenarioError::setup)?
            .map_err(ScenarioError::setup)?;

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let result = Self::exchange(addr, &self.user, self.retry)
            .await
            .and_then(|observed| assert_exact(&self.banner, &observed).map(|_| observed));

        match result {
            Ok(observed) => Ok(Outcome::Passed { observed }),
            Err(x) => {
                if !sshd.is_alive() {
                    error!("sshd is no longer running");
                }
                sshd.print_diagnostics();
                Err(x)
            }
        }
    }

    /// Connects to `addr` and performs the client handshake as `user`, returning whatever banner
    /// the server sent.
    ///
    /// A failed handshake is only an error when no banner was captured: servers commonly refuse
    /// the authentication attempt right after sending their banner. A successful handshake with
    /// no banner returns an empty string.
    pub async fn exchange(
        addr: SocketAddr,
        user: &str,
        retry: RetryPolicy,
    ) -> Result<String, ScenarioError> {
        let stream = connect_with_retry(addr, retry)
            .await
            .map_err(ScenarioError::Transport)?;

        let (callback, captured) = capture_banner();
        let config = ClientConfig::new(user).with_banner_callback(callback);

        match ClientConn::handshake(stream, addr.to_string(), config).await {
            Ok(conn) => {
                if let Err(x) = conn.close().await {
                    debug!("[{addr}] close after handshake failed: {x}");
                }
            }
            Err(x) if captured.is_empty() => return Err(ScenarioError::Handshake(x)),
            Err(x) => debug!("[{addr}] ignoring handshake error after banner arrived: {x}"),
        }

        let observed = captured.text();
        info!("[{addr}] captured banner {observed:?}");
        Ok(observed)
    }
}
