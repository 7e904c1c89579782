use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use log::*;
use tokio::net::TcpStream;

/// How many times to try connecting and how long to wait before each attempt.
///
/// There is no backoff growth or jitter: the default 50 attempts 100ms apart simply give a
/// freshly spawned daemon about five seconds to start listening.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub interval: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_ATTEMPTS: usize = 50;
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

    pub const fn new(attempts: usize, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Upper bound on the time spent waiting between attempts
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.attempts as u32)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATTEMPTS, Self::DEFAULT_INTERVAL)
    }
}

/// Connects to `addr`, sleeping `policy.interval` before every attempt, until a connection is
/// accepted or `policy.attempts` have been made. Returns the error of the last attempt when the
/// budget runs out.
pub async fn connect_with_retry(addr: SocketAddr, policy: RetryPolicy) -> io::Result<TcpStream> {
    let mut last_error = None;

    for attempt in 1..=policy.attempts {
        tokio::time::sleep(policy.interval).await;
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                debug!("Connected to {addr} on attempt {attempt}");
                return Ok(stream);
            }
            Err(x) => {
                trace!("Attempt {attempt}/{} to {addr} failed: {x}", policy.attempts);
                last_error = Some(x);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no connection attempts made to {addr}"),
        )
    }))
}
