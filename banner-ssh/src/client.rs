use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use log::*;
use russh::Disconnect;
use russh::client::{self, AuthResult, Handle};
use russh::keys::PublicKey;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{BoxError, Error, format_methods, keys};

/// Invoked with the text of every banner the server sends before authentication completes.
/// Returning an error aborts the handshake.
pub type BannerCallback = Arc<dyn Fn(&str) -> Result<(), BoxError> + Send + Sync>;

/// Decides whether the server's host key is acceptable
#[derive(Clone, Debug, Default)]
pub enum HostKeyPolicy {
    /// Accept whatever key the server presents
    #[default]
    InsecureIgnore,

    /// Accept only this key
    Fixed(PublicKey),
}

impl HostKeyPolicy {
    pub fn verify(&self, key: &PublicKey) -> bool {
        match self {
            Self::InsecureIgnore => true,
            Self::Fixed(expected) => expected.key_data() == key.key_data(),
        }
    }
}

/// Configuration used to establish a [`ClientConn`]
#[derive(Clone)]
pub struct ClientConfig {
    /// User to authenticate as
    pub user: String,

    pub host_key_policy: HostKeyPolicy,

    pub banner_callback: Option<BannerCallback>,
}

impl ClientConfig {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host_key_policy: HostKeyPolicy::default(),
            banner_callback: None,
        }
    }

    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    pub fn with_banner_callback(mut self, callback: BannerCallback) -> Self {
        self.banner_callback = Some(callback);
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("user", &self.user)
            .field("host_key_policy", &self.host_key_policy)
            .field("banner_callback", &self.banner_callback.is_some())
            .finish()
    }
}

/// Slot filled in by the callback returned from [`capture_banner`]
#[derive(Clone, Debug, Default)]
pub struct CapturedBanner(Arc<Mutex<Option<String>>>);

impl CapturedBanner {
    /// Most recent banner received, if any arrived
    pub fn get(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(|x| x.into_inner()).clone()
    }

    /// Most recent banner received, or an empty string if none arrived
    pub fn text(&self) -> String {
        self.get().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.get().is_none_or(|text| text.is_empty())
    }

    fn set(&self, text: &str) {
        *self.0.lock().unwrap_or_else(|x| x.into_inner()) = Some(text.to_string());
    }
}

/// Creates a banner callback that records the banner text and always succeeds, paired with the
/// slot it records into
pub fn capture_banner() -> (BannerCallback, CapturedBanner) {
    let captured = CapturedBanner::default();
    let slot = captured.clone();
    let callback: BannerCallback = Arc::new(move |text: &str| -> Result<(), BoxError> {
        slot.set(text);
        Ok(())
    });
    (callback, captured)
}

/// Handles russh client events, delegating to the injected policy and callbacks
struct ClientHandler {
    target: String,
    host_key_policy: HostKeyPolicy,
    banner_callback: Option<BannerCallback>,

    /// Failure reported by the banner callback, kept so that it can be surfaced after russh
    /// tears the session down
    banner_error: Arc<Mutex<Option<String>>>,
}

impl client::Handler for ClientHandler {
    type Error = Error;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let accepted = self.host_key_policy.verify(server_public_key);
        debug!(
            "[{}] server host key {} {}",
            self.target,
            keys::fingerprint(server_public_key),
            if accepted { "accepted" } else { "rejected" }
        );
        async move { Ok(accepted) }
    }

    fn auth_banner(
        &mut self,
        banner: &str,
        _session: &mut client::Session,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        debug!("[{}] received banner {banner:?}", self.target);
        let result = match self.banner_callback.as_ref() {
            Some(callback) => callback(banner).map_err(|x| {
                let msg = x.to_string();
                *self.banner_error.lock().unwrap_or_else(|x| x.into_inner()) = Some(msg.clone());
                Error::Banner(msg)
            }),
            None => Ok(()),
        };
        async move { result }
    }
}

/// Client side of an SSH connection that completed authentication
pub struct ClientConn {
    handle: Handle<ClientHandler>,
    target: String,
    user: String,
}

impl ClientConn {
    /// Performs the SSH handshake over `stream` and attempts "none" authentication as
    /// `config.user`.
    ///
    /// `target` names the remote side in logs. Banners arriving before the server answers the
    /// authentication request are handed to `config.banner_callback`, so they are observed even
    /// when this returns [`Error::AuthenticationFailed`].
    pub async fn handshake<S>(
        stream: S,
        target: impl Into<String>,
        config: ClientConfig,
    ) -> Result<Self, Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let target = target.into();
        let banner_error = Arc::new(Mutex::new(None));
        let handler = ClientHandler {
            target: target.clone(),
            host_key_policy: config.host_key_policy,
            banner_callback: config.banner_callback,
            banner_error: Arc::clone(&banner_error),
        };

        debug!("[{target}] starting handshake as {:?}", config.user);
        let russh_config = Arc::new(client::Config::default());
        let mut handle = client::connect_stream(russh_config, stream, handler)
            .await
            .map_err(|x| match x {
                Error::Ssh(russh::Error::UnknownKey) => Error::HostKeyRejected,
                x => x,
            })?;

        let result = handle.authenticate_none(&config.user).await;

        // russh drops the callback's error and reports a plain refusal
        let banner_error = banner_error.lock().unwrap_or_else(|x| x.into_inner()).take();
        if let Some(msg) = banner_error {
            debug!("[{target}] banner callback failed: {msg}");
            if let Err(x) = handle
                .disconnect(Disconnect::ByApplication, "banner rejected", "en")
                .await
            {
                trace!("[{target}] disconnect after rejected banner: {x}");
            }
            return Err(Error::Banner(msg));
        }
        let result = result?;

        if result.success() {
            info!("[{target}] authenticated as {:?}", config.user);
            return Ok(Self {
                handle,
                target,
                user: config.user,
            });
        }

        let remaining = match result {
            AuthResult::Failure {
                remaining_methods, ..
            } => format_methods(&remaining_methods),
            _ => "none".to_string(),
        };
        debug!("[{target}] authentication refused, server offers: {remaining}");

        if let Err(x) = handle
            .disconnect(Disconnect::ByApplication, "authentication failed", "en")
            .await
        {
            trace!("[{target}] disconnect after failed authentication: {x}");
        }

        Err(Error::AuthenticationFailed {
            user: config.user,
            remaining,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Disconnects from the server
    pub async fn close(self) -> Result<(), Error> {
        debug!("[{}] closing connection", self.target);
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::signing_key_from_seed;

    #[test]
    fn host_key_policy_insecure_ignore_should_accept_any_key() {
        let key = signing_key_from_seed(&[1; 32]);
        assert!(HostKeyPolicy::InsecureIgnore.verify(key.public_key()));
    }

    #[test]
    fn host_key_policy_fixed_should_accept_only_matching_key() {
        let expected = signing_key_from_seed(&[1; 32]);
        let other = signing_key_from_seed(&[2; 32]);
        let policy = HostKeyPolicy::Fixed(expected.public_key().clone());
        assert!(policy.verify(expected.public_key()));
        assert!(!policy.verify(other.public_key()));
    }

    #[test]
    fn captured_banner_should_be_empty_until_callback_fires() {
        let (callback, captured) = capture_banner();
        assert!(captured.is_empty());
        assert_eq!(captured.get(), None);
        assert_eq!(captured.text(), "");

        callback("Hello World").unwrap();
        assert!(!captured.is_empty());
        assert_eq!(captured.text(), "Hello World");
    }

    #[test]
    fn captured_banner_should_keep_latest_banner() {
        let (callback, captured) = capture_banner();
        callback("first").unwrap();
        callback("second").unwrap();
        assert_eq!(captured.get().as_deref(), Some("second"));
    }

    #[test]
    fn client_config_debug_should_not_require_callback_debug() {
        let (callback, _) = capture_banner();
        let config = ClientConfig::new("user").with_banner_callback(callback);
        let debug = format!("{config:?}");
        assert!(debug.contains("\"user\""), "{debug}");
        assert!(debug.contains("banner_callback: true"), "{debug}");
    }
}
