//! Thin client and server connection types over [`russh`] where every protocol hook that matters
//! for banner delivery (banner reception, banner production, host key verification and client
//! authentication) is an injected closure.

use std::io;

use derive_more::{Display, Error};

pub mod client;
pub mod keys;
pub mod server;

pub use client::{
    BannerCallback, CapturedBanner, ClientConfig, ClientConn, HostKeyPolicy, capture_banner,
};
pub use russh::keys::{PrivateKey, PublicKey};
pub use server::{BannerProducer, ConnMeta, PublicKeyCallback, ServerConfig, ServerConn};

/// Boxed error returned by user-supplied callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while establishing or tearing down a connection
#[derive(Debug, Display, Error)]
pub enum Error {
    #[display("ssh protocol error: {_0}")]
    Ssh(russh::Error),

    #[display("i/o error: {_0}")]
    Io(io::Error),

    /// Banner callback refused the banner text, aborting the handshake
    #[display("banner callback failed: {_0}")]
    Banner(#[error(not(source))] String),

    #[display("server host key rejected by host key policy")]
    HostKeyRejected,

    #[display("authentication as {user:?} failed (remaining methods: {remaining})")]
    AuthenticationFailed { user: String, remaining: String },

    #[display("server has no host keys configured")]
    NoHostKeys,

    #[display("session ended before any client authenticated")]
    HandshakeIncomplete,

    #[display("failed to encode key: {_0}")]
    KeyEncoding(#[error(not(source))] String),

    #[display("session task failed: {_0}")]
    Task(tokio::task::JoinError),
}

impl From<russh::Error> for Error {
    fn from(x: russh::Error) -> Self {
        Self::Ssh(x)
    }
}

impl From<io::Error> for Error {
    fn from(x: io::Error) -> Self {
        Self::Io(x)
    }
}

/// Format a `MethodSet` as a comma-separated string of method names.
fn format_methods(methods: &russh::MethodSet) -> String {
    if methods.is_empty() {
        return "none".to_string();
    }
    methods
        .iter()
        .map(<&str>::from)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use russh::{MethodKind, MethodSet};

    use super::*;

    #[test]
    fn format_methods_should_return_none_for_empty_set() {
        let kinds: [MethodKind; 0] = [];
        let methods = MethodSet::from(kinds.as_slice());
        assert_eq!(format_methods(&methods), "none");
    }

    #[test]
    fn format_methods_should_join_method_names() {
        let methods = MethodSet::from([MethodKind::PublicKey, MethodKind::Password].as_slice());
        let formatted = format_methods(&methods);
        assert!(formatted.contains("publickey"), "{formatted}");
        assert!(formatted.contains("password"), "{formatted}");
    }

    #[test]
    fn banner_error_should_render_callback_message() {
        let err = Error::Banner("not today".to_string());
        assert_eq!(err.to_string(), "banner callback failed: not today");
    }

    #[test]
    fn authentication_failed_should_render_user_and_methods() {
        let err = Error::AuthenticationFailed {
            user: "user".to_string(),
            remaining: "publickey".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "authentication as \"user\" failed (remaining methods: publickey)"
        );
    }
}
