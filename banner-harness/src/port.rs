use std::io;
use std::net::{Ipv4Addr, TcpListener};

/// Finds a TCP port on the loopback address that nothing is listening on right now.
///
/// The listener used to discover the port is closed before returning, so the port is not
/// reserved: another process may claim it before the caller binds it.
pub fn find_free_port() -> io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}
