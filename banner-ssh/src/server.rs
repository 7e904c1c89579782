use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::*;
use russh::keys::{PrivateKey, PublicKey};
use russh::server::{self, Auth, Handle};
use russh::{Disconnect, MethodKind, MethodSet};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};

use crate::{BoxError, Error, keys};

/// Maximum time to wait for a session to wind down after disconnecting the client
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Information about the connecting client available to server callbacks
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnMeta {
    /// User named in the most recent authentication request, if one has arrived
    pub user: Option<String>,

    pub peer_addr: Option<SocketAddr>,
}

/// Produces the banner to send to a connecting client, or `None` to send no banner
pub type BannerProducer = Arc<dyn Fn(&ConnMeta) -> Option<String> + Send + Sync>;

/// Decides whether a client may authenticate with the given public key
pub type PublicKeyCallback =
    Arc<dyn Fn(&ConnMeta, &PublicKey) -> Result<(), BoxError> + Send + Sync>;

/// Configuration used to accept a [`ServerConn`]
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// If true, clients are accepted without presenting any credentials. Takes precedence over
    /// `public_key_callback`.
    pub no_client_auth: bool,

    /// Consulted for public key authentication; absent means every key is refused
    pub public_key_callback: Option<PublicKeyCallback>,

    pub banner_callback: Option<BannerProducer>,

    /// Keys the server uses to prove its identity; at least one is required
    pub host_keys: Vec<PrivateKey>,
}

impl ServerConfig {
    fn to_russh(&self) -> Result<server::Config, Error> {
        if self.host_keys.is_empty() {
            return Err(Error::NoHostKeys);
        }

        let mut methods = vec![MethodKind::PublicKey];
        if self.no_client_auth {
            methods.insert(0, MethodKind::None);
        }

        Ok(server::Config {
            keys: self.host_keys.clone(),
            methods: MethodSet::from(methods.as_slice()),
            auth_rejection_time: Duration::ZERO,
            auth_rejection_time_initial: Some(Duration::ZERO),
            ..Default::default()
        })
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("no_client_auth", &self.no_client_auth)
            .field("public_key_callback", &self.public_key_callback.is_some())
            .field("banner_callback", &self.banner_callback.is_some())
            .field(
                "host_keys",
                &self
                    .host_keys
                    .iter()
                    .map(|key| keys::fingerprint(key.public_key()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Handles russh server events for a single connection
struct ServerHandler {
    config: Arc<ServerConfig>,
    meta: ConnMeta,

    /// Fired with the user name once authentication succeeds
    authenticated: Option<oneshot::Sender<String>>,
}

impl ServerHandler {
    fn label(&self) -> String {
        match self.meta.peer_addr {
            Some(addr) => addr.to_string(),
            None => "stream".to_string(),
        }
    }

    fn check_public_key(&self, key: &PublicKey) -> bool {
        match self.config.public_key_callback.as_ref() {
            Some(callback) => match callback(&self.meta, key) {
                Ok(()) => true,
                Err(x) => {
                    debug!("[{}] public key refused: {x}", self.label());
                    false
                }
            },
            None => false,
        }
    }

    fn accept(&mut self, user: &str) -> Auth {
        info!("[{}] authenticated {user:?}", self.label());
        if let Some(tx) = self.authenticated.take() {
            let _ = tx.send(user.to_string());
        }
        Auth::Accept
    }
}

impl server::Handler for ServerHandler {
    type Error = Error;

    fn authentication_banner(
        &mut self,
    ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send {
        let banner = self
            .config
            .banner_callback
            .as_ref()
            .and_then(|callback| callback(&self.meta));
        debug!("[{}] sending banner {banner:?}", self.label());
        async move { Ok(banner) }
    }

    fn auth_none(&mut self, user: &str) -> impl Future<Output = Result<Auth, Self::Error>> + Send {
        self.meta.user = Some(user.to_string());
        let auth = if self.config.no_client_auth {
            self.accept(user)
        } else {
            Auth::reject()
        };
        async move { Ok(auth) }
    }

    fn auth_publickey_offered(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> impl Future<Output = Result<Auth, Self::Error>> + Send {
        self.meta.user = Some(user.to_string());
        let auth = if self.check_public_key(public_key) {
            Auth::Accept
        } else {
            Auth::reject()
        };
        async move { Ok(auth) }
    }

    fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> impl Future<Output = Result<Auth, Self::Error>> + Send {
        self.meta.user = Some(user.to_string());
        let auth = if self.check_public_key(public_key) {
            self.accept(user)
        } else {
            Auth::reject()
        };
        async move { Ok(auth) }
    }
}

/// Whichever happened first while waiting on a handshake
enum HandshakeEvent {
    Authenticated(Result<String, oneshot::error::RecvError>),
    Ended(Result<Result<(), Error>, JoinError>),
}

/// Server side of an SSH connection whose client has authenticated
pub struct ServerConn {
    meta: ConnMeta,
    user: String,
    handle: Handle,
    session: JoinHandle<Result<(), Error>>,
}

impl ServerConn {
    /// Serves the SSH session on `stream` until a client authenticates.
    ///
    /// The session keeps running in the background afterwards; [`ServerConn::close`] ends it.
    pub async fn handshake<S>(
        stream: S,
        peer_addr: Option<SocketAddr>,
        config: Arc<ServerConfig>,
    ) -> Result<Self, Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let russh_config = Arc::new(config.to_russh()?);
        let (tx, rx) = oneshot::channel();
        let handler = ServerHandler {
            config,
            meta: ConnMeta {
                user: None,
                peer_addr,
            },
            authenticated: Some(tx),
        };
        let label = handler.label();

        debug!("[{label}] starting server handshake");
        let running = server::run_stream(russh_config, stream, handler).await?;
        let handle = running.handle();
        let mut session = tokio::spawn(running);

        let event = tokio::select! {
            biased;
            user = rx => HandshakeEvent::Authenticated(user),
            result = &mut session => HandshakeEvent::Ended(result),
        };

        match event {
            HandshakeEvent::Authenticated(Ok(user)) => Ok(Self {
                meta: ConnMeta {
                    user: Some(user.clone()),
                    peer_addr,
                },
                user,
                handle,
                session,
            }),

            // Handler dropped without authenticating anyone, so the session is over
            HandshakeEvent::Authenticated(Err(_)) => match session.await {
                Ok(Err(x)) => Err(x),
                Ok(Ok(())) => Err(Error::HandshakeIncomplete),
                Err(x) => Err(Error::Task(x)),
            },
            HandshakeEvent::Ended(Ok(Err(x))) => Err(x),
            HandshakeEvent::Ended(Ok(Ok(()))) => Err(Error::HandshakeIncomplete),
            HandshakeEvent::Ended(Err(x)) => Err(Error::Task(x)),
        }
    }

    /// Name of the authenticated user
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn meta(&self) -> &ConnMeta {
        &self.meta
    }

    /// Disconnects the client and waits for the session to end
    pub async fn close(mut self) -> Result<(), Error> {
        if let Err(x) = self
            .handle
            .disconnect(
                Disconnect::ByApplication,
                "handshake complete".to_string(),
                "en".to_string(),
            )
            .await
        {
            debug!("[{}] disconnect failed: {x:?}", self.user);
        }

        match tokio::time::timeout(CLOSE_TIMEOUT, &mut self.session).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(x))) => {
                debug!("[{}] session ended with error after handshake: {x}", self.user);
                Ok(())
            }
            Ok(Err(x)) => Err(Error::Task(x)),
            Err(_) => {
                warn!("[{}] session did not end within {CLOSE_TIMEOUT:?}", self.user);
                self.session.abort();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::client::{ClientConfig, ClientConn, HostKeyPolicy, capture_banner};
    use crate::keys::signing_key_from_seed;

    const HOST_SEED: [u8; 32] = [42; 32];

    fn banner_server(no_client_auth: bool, banner: &'static str) -> ServerConfig {
        ServerConfig {
            no_client_auth,
            banner_callback: Some(Arc::new(move |_: &ConnMeta| Some(banner.to_string()))),
            host_keys: vec![signing_key_from_seed(&HOST_SEED)],
            ..Default::default()
        }
    }

    /// Runs a handshake between our own client and server over an in-memory pipe
    async fn handshake_pair(
        server_config: ServerConfig,
        client_config: ClientConfig,
    ) -> (Result<ClientConn, Error>, Result<ServerConn, Error>) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let server = tokio::spawn(async move {
            ServerConn::handshake(server_io, None, Arc::new(server_config)).await
        });
        let client = ClientConn::handshake(client_io, "duplex", client_config).await;
        let server = server.await.expect("server task panicked");
        (client, server)
    }

    #[test(tokio::test)]
    async fn handshake_should_deliver_banner_when_no_client_auth() {
        let (callback, captured) = capture_banner();
        let client_config = ClientConfig::new("user").with_banner_callback(callback);

        let (client, server) =
            handshake_pair(banner_server(true, "Hello World"), client_config).await;

        let client = client.expect("client handshake failed");
        let server = server.expect("server handshake failed");
        assert_eq!(captured.text(), "Hello World");
        assert_eq!(client.user(), "user");
        assert_eq!(server.user(), "user");
        assert_eq!(server.meta().user.as_deref(), Some("user"));

        server.close().await.unwrap();
    }

    #[test(tokio::test)]
    async fn handshake_should_deliver_banner_even_when_authentication_fails() {
        let (callback, captured) = capture_banner();
        let client_config = ClientConfig::new("user").with_banner_callback(callback);

        let (client, server) =
            handshake_pair(banner_server(false, "Hello World"), client_config).await;

        match client {
            Err(Error::AuthenticationFailed { user, .. }) => assert_eq!(user, "user"),
            Err(x) => panic!("unexpected client error: {x}"),
            Ok(_) => panic!("client unexpectedly authenticated"),
        }
        assert!(server.is_err(), "server should not report a completed handshake");
        assert_eq!(captured.text(), "Hello World");
    }

    #[test(tokio::test)]
    async fn handshake_should_send_no_banner_when_producer_returns_none() {
        let server_config = ServerConfig {
            no_client_auth: true,
            banner_callback: Some(Arc::new(|_: &ConnMeta| -> Option<String> { None })),
            host_keys: vec![signing_key_from_seed(&HOST_SEED)],
            ..Default::default()
        };
        let (callback, captured) = capture_banner();
        let client_config = ClientConfig::new("user").with_banner_callback(callback);

        let (client, server) = handshake_pair(server_config, client_config).await;

        assert!(client.is_ok());
        assert!(captured.is_empty());
        server.unwrap().close().await.unwrap();
    }

    #[test(tokio::test)]
    async fn handshake_should_abort_when_banner_callback_fails() {
        let client_config = ClientConfig::new("user")
            .with_banner_callback(Arc::new(|_: &str| -> Result<(), BoxError> {
                Err("unwelcome banner".into())
            }));

        let (client, _server) =
            handshake_pair(banner_server(true, "Hello World"), client_config).await;

        match client {
            Err(Error::Banner(msg)) => assert_eq!(msg, "unwelcome banner"),
            Err(x) => panic!("unexpected client error: {x}"),
            Ok(_) => panic!("client unexpectedly authenticated"),
        }
    }

    #[test(tokio::test)]
    async fn handshake_should_abort_when_banner_callback_fails_and_auth_is_refused() {
        let client_config = ClientConfig::new("user")
            .with_banner_callback(Arc::new(|_: &str| -> Result<(), BoxError> {
                Err("unwelcome banner".into())
            }));

        let (client, _server) =
            handshake_pair(banner_server(false, "Hello World"), client_config).await;

        match client {
            Err(Error::Banner(msg)) => assert_eq!(msg, "unwelcome banner"),
            Err(x) => panic!("unexpected client error: {x}"),
            Ok(_) => panic!("client unexpectedly authenticated"),
        }
    }

    #[test(tokio::test)]
    async fn handshake_should_fail_when_host_key_does_not_match_policy() {
        let (callback, captured) = capture_banner();
        let other = signing_key_from_seed(&[9; 32]);
        let client_config = ClientConfig::new("user")
            .with_host_key_policy(HostKeyPolicy::Fixed(other.public_key().clone()))
            .with_banner_callback(callback);

        let (client, server) =
            handshake_pair(banner_server(true, "Hello World"), client_config).await;

        assert!(client.is_err());
        assert!(server.is_err());
        assert!(captured.is_empty());
    }

    #[test(tokio::test)]
    async fn handshake_should_accept_matching_fixed_host_key() {
        let host = signing_key_from_seed(&HOST_SEED);
        let client_config = ClientConfig::new("user")
            .with_host_key_policy(HostKeyPolicy::Fixed(host.public_key().clone()));

        let (client, server) =
            handshake_pair(banner_server(true, "Hello World"), client_config).await;

        assert!(client.is_ok());
        server.unwrap().close().await.unwrap();
    }

    #[test(tokio::test)]
    async fn handshake_should_fail_without_host_keys() {
        let (_client_io, server_io) = tokio::io::duplex(1024);
        let result = ServerConn::handshake(
            server_io,
            None,
            Arc::new(ServerConfig {
                no_client_auth: true,
                ..Default::default()
            }),
        )
        .await;
        assert!(matches!(result, Err(Error::NoHostKeys)));
    }

    #[test(tokio::test)]
    async fn handshake_should_report_incomplete_when_client_hangs_up() {
        let (client_io, server_io) = tokio::io::duplex(1024);
        drop(client_io);
        let result =
            ServerConn::handshake(server_io, None, Arc::new(banner_server(true, "Hello World")))
                .await;
        assert!(result.is_err());
    }

    #[test]
    fn to_russh_should_advertise_none_only_without_client_auth() {
        let open = banner_server(true, "x").to_russh().unwrap();
        assert!(open.methods.contains(&MethodKind::None));
        assert!(open.methods.contains(&MethodKind::PublicKey));

        let closed = banner_server(false, "x").to_russh().unwrap();
        assert!(!closed.methods.contains(&MethodKind::None));
        assert!(closed.methods.contains(&MethodKind::PublicKey));
    }

    #[test]
    fn check_public_key_should_defer_to_callback() {
        let allowed = signing_key_from_seed(&[3; 32]);
        let mut config = banner_server(false, "x");
        config.public_key_callback = Some(Arc::new(
            |meta: &ConnMeta, _: &PublicKey| -> Result<(), BoxError> {
                if meta.user.as_deref() == Some("testuser") {
                    Ok(())
                } else {
                    Err("auth failed".into())
                }
            },
        ));
        let mut handler = ServerHandler {
            config: Arc::new(config),
            meta: ConnMeta::default(),
            authenticated: None,
        };

        handler.meta.user = Some("testuser".to_string());
        assert!(handler.check_public_key(allowed.public_key()));

        handler.meta.user = Some("someone".to_string());
        assert!(!handler.check_public_key(allowed.public_key()));
    }

    #[test]
    fn check_public_key_should_refuse_without_callback() {
        let key = signing_key_from_seed(&[3; 32]);
        let handler = ServerHandler {
            config: Arc::new(banner_server(false, "x")),
            meta: ConnMeta::default(),
            authenticated: None,
        };
        assert!(!handler.check_public_key(key.public_key()));
    }
}
