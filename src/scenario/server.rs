use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use banner_harness::env;
use banner_harness::retry::RetryPolicy;
use banner_harness::ssh::SshCommand;
use banner_ssh::keys::{fingerprint, signing_key_from_seed};
use banner_ssh::{BoxError, ConnMeta, PrivateKey, PublicKey, ServerConfig, ServerConn};
use log::*;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use super::{ClientScenario, DEFAULT_BANNER, Outcome, ScenarioError, assert_contains};

/// Seed of the host key our server presents
const SERVER_HOST_KEY_SEED: [u8; 32] = *b"banner-interop server host key!!";

/// How long to wait for our server to finish once the foreign client has exited
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(5);

/// A foreign `ssh` client against our server, whose banner callback produces the banner
#[derive(Clone, Debug)]
pub struct ServerScenario {
    /// Text returned by the banner callback, expected somewhere in the client's output
    pub banner: String,

    /// User the foreign client logs in as
    pub user: String,

    /// Only user whose public keys are accepted; every other user gets in with no credentials
    pub accepted_user: String,

    /// Client to run instead of the `ssh` found on the search path
    pub ssh_bin: Option<PathBuf>,

    pub signing_key: PrivateKey,

    /// Bound on waiting for the server side after the client exits
    pub completion_timeout: Duration,
}

impl Default for ServerScenario {
    fn default() -> Self {
        Self {
            banner: DEFAULT_BANNER.to_string(),
            user: "user".to_string(),
            accepted_user: "testuser".to_string(),
            ssh_bin: None,
            signing_key: signing_key_from_seed(&SERVER_HOST_KEY_SEED),
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
        }
    }
}

impl ServerScenario {
    pub async fn run(&self) -> Result<Outcome, ScenarioError> {
        let ssh_bin = match env::require_binary(self.ssh_bin.clone(), "ssh") {
            Ok(path) => path,
            Err(reason) => {
                info!("Skipping server scenario: {reason}");
                return Ok(Outcome::Skipped(reason));
            }
        };

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .context("Failed to bind listener")
            .map_err(ScenarioError::setup)?;
        let port = listener
            .local_addr()
            .context("Failed to read listener address")
            .map_err(ScenarioError::setup)?
            .port();

        let server = self.spawn_server(listener);

        let command = SshCommand::new(ssh_bin, port).user(self.user.clone());
        let output = tokio::task::spawn_blocking(move || command.run())
            .await
            .context("ssh task panicked")
            .map_err(ScenarioError::setup)?
            .context("Failed to run ssh")
            .map_err(ScenarioError::setup)?;
        debug!("ssh exited with {}", output.status);

        trace!("ssh output: {:?}", output.text);
        assert_contains(&self.banner, &output)?;
        self.await_server(server).await?;

        Ok(Outcome::Passed {
            observed: self.banner.clone(),
        })
    }

    /// Runs the scenario with our own client in place of the foreign one, returning the banner
    /// it captured
    pub async fn loopback(&self, retry: RetryPolicy) -> Result<String, ScenarioError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .context("Failed to bind listener")
            .map_err(ScenarioError::setup)?;
        let addr: SocketAddr = listener
            .local_addr()
            .context("Failed to read listener address")
            .map_err(ScenarioError::setup)?;

        let server = self.spawn_server(listener);
        let observed = ClientScenario::exchange(addr, &self.user, retry).await?;
        self.await_server(server).await?;
        Ok(observed)
    }

    /// Server configuration for the scenario: no credentials required, `accepted_user` may use
    /// any public key, and every client is greeted with `banner`
    pub fn server_config(&self) -> ServerConfig {
        let banner = self.banner.clone();
        let accepted_user = self.accepted_user.clone();

        ServerConfig {
            no_client_auth: true,
            public_key_callback: Some(Arc::new(
                move |meta: &ConnMeta, _: &PublicKey| -> Result<(), BoxError> {
                    match meta.user.as_deref() {
                        Some(user) if user == accepted_user => Ok(()),
                        user => Err(format!("public keys not accepted for {user:?}").into()),
                    }
                },
            )),
            banner_callback: Some(Arc::new(move |_: &ConnMeta| -> Option<String> {
                Some(banner.clone())
            })),
            host_keys: vec![self.signing_key.clone()],
        }
    }

    /// Accepts one connection on a background task, which reports the authenticated user or its
    /// failure through the returned receiver
    fn spawn_server(
        &self,
        listener: TcpListener,
    ) -> oneshot::Receiver<Result<String, banner_ssh::Error>> {
        let config = Arc::new(self.server_config());
        info!(
            "Serving on {:?} with host key {}",
            listener.local_addr(),
            fingerprint(self.signing_key.public_key())
        );

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = serve_one(listener, config).await;
            if tx.send(result).is_err() {
                debug!("Scenario stopped waiting for the server");
            }
        });
        rx
    }

    async fn await_server(
        &self,
        server: oneshot::Receiver<Result<String, banner_ssh::Error>>,
    ) -> Result<(), ScenarioError> {
        match tokio::time::timeout(self.completion_timeout, server).await {
            Ok(Ok(Ok(user))) => {
                info!("Server handshake completed for {user:?}");
                Ok(())
            }
            Ok(Ok(Err(x))) => Err(ScenarioError::Server(x.to_string())),
            Ok(Err(_)) => Err(ScenarioError::Server(
                "server task ended without reporting".to_string(),
            )),
            Err(_) => Err(ScenarioError::Server(format!(
                "server did not finish within {:?}",
                self.completion_timeout
            ))),
        }
    }
}

/// Accepts a single client, completes its handshake and disconnects it
async fn serve_one(
    listener: TcpListener,
    config: Arc<ServerConfig>,
) -> Result<String, banner_ssh::Error> {
    let (stream, peer_addr) = listener.accept().await?;
    debug!("Accepted {peer_addr}");

    let conn = ServerConn::handshake(stream, Some(peer_addr), config).await?;
    let user = conn.user().to_string();
    conn.close().await?;
    Ok(user)
}
