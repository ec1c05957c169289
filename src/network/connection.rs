//! Connection setup and the duplex handle shared by both session activities.
//!
//! A `Transport` is split with `try_clone`: one handle writes, one reads.
//! Sockets guarantee one concurrent reader plus one concurrent writer
//! without extra locking, so no mutex guards the halves.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

use crate::error::{Error, Result};

/// Well-known chat port.
pub const DEFAULT_PORT: u16 = 12345;

/// A byte stream that can be split into independent reader/writer handles.
pub trait Transport: Read + Write + Send + Sized {
    /// Another handle to the same connection.
    fn try_clone(&self) -> io::Result<Self>;

    fn shutdown(&self, how: Shutdown) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn try_clone(&self) -> io::Result<Self> {
        TcpStream::try_clone(self)
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        TcpStream::shutdown(self, how)
    }
}

#[cfg(unix)]
impl Transport for std::os::unix::net::UnixStream {
    fn try_clone(&self) -> io::Result<Self> {
        std::os::unix::net::UnixStream::try_clone(self)
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        std::os::unix::net::UnixStream::shutdown(self, how)
    }
}

/// Socket options applied at connect time.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub port: u16,
    pub nodelay: bool,
    /// SO_RCVBUF in bytes; platform default when `None`.
    pub recv_buffer: Option<usize>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            nodelay: true,
            recv_buffer: None,
        }
    }
}

/// Resolve `destination`, appending `default_port` when it names no port.
pub fn resolve(destination: &str, default_port: u16) -> Result<Vec<SocketAddr>> {
    let connect_err = |source| Error::Connect {
        destination: destination.to_string(),
        source,
    };

    let addrs: Vec<SocketAddr> = match destination.parse::<SocketAddr>() {
        Ok(addr) => vec![addr],
        Err(_) => match destination.to_socket_addrs() {
            Ok(addrs) => addrs.collect(),
            Err(_) => (destination, default_port)
                .to_socket_addrs()
                .map_err(connect_err)?
                .collect(),
        },
    };

    if addrs.is_empty() {
        return Err(Error::Resolve(destination.to_string()));
    }
    Ok(addrs)
}

/// Connect to `destination` and tune the socket for interactive chat.
pub fn connect(destination: &str, options: &ConnectOptions) -> Result<TcpStream> {
    let addrs = resolve(destination, options.port)?;

    let stream = TcpStream::connect(&addrs[..]).map_err(|source| Error::Connect {
        destination: destination.to_string(),
        source,
    })?;

    stream.set_nodelay(options.nodelay)?;
    if let Some(size) = options.recv_buffer {
        set_recv_buffer(&stream, size);
    }

    tracing::info!(peer = ?stream.peer_addr().ok(), "connected to server");
    Ok(stream)
}

/// Best effort; not every platform honors the request.
#[cfg(unix)]
fn set_recv_buffer(stream: &TcpStream, size: usize) {
    use std::os::unix::io::AsRawFd;

    let optval = libc::c_int::try_from(size).unwrap_or(libc::c_int::MAX);
    let rc = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        tracing::warn!(size, error = %io::Error::last_os_error(), "SO_RCVBUF not applied");
    }
}

#[cfg(not(unix))]
fn set_recv_buffer(_stream: &TcpStream, size: usize) {
    tracing::warn!(size, "SO_RCVBUF tuning is unsupported on this platform");
}
