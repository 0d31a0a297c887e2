//! TCP transport layer for data block sessions.
//!
//! This module provides the [`TcpTransport`] struct which carries frames
//! between a client and a server. The transport only knows about sockets and
//! frames; what a frame means is decided by the client and server layers.
//!
//! # Design
//!
//! - **Session based** - one TCP connection per client session
//! - **Synchronous** - blocking send/receive with configurable timeout
//! - **Paired** - one request, one response; the stream is locked for the
//!   whole exchange so concurrent callers never interleave frames
//!
//! # Constants
//!
//! - [`DEFAULT_PORT`] - Default listen/connect port (102)
//! - [`DEFAULT_TIMEOUT`] - Default timeout (2 seconds)

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{DbError, Result};
use crate::header::{FrameHeader, FRAME_HEADER_SIZE};

/// Default TCP port for data block sessions.
pub const DEFAULT_PORT: u16 = 102;

/// Default timeout for connect, send and receive.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Reads one frame from `reader`.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly between frames.
pub(crate) fn read_frame<R: Read>(reader: &mut R) -> Result<Option<(FrameHeader, Vec<u8>)>> {
    let mut head = [0u8; FRAME_HEADER_SIZE];
    loop {
        match reader.read(&mut head[..1]) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DbError::from_session_io(e)),
        }
    }
    reader
        .read_exact(&mut head[1..])
        .map_err(DbError::from_session_io)?;

    let header = FrameHeader::from_bytes(&head)?;
    let mut payload = vec![0u8; header.length as usize];
    reader
        .read_exact(&mut payload)
        .map_err(DbError::from_session_io)?;
    Ok(Some((header, payload)))
}

/// Writes one complete frame to `writer`.
pub(crate) fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(frame).map_err(DbError::from_session_io)?;
    writer.flush().map_err(DbError::from_session_io)
}

/// TCP transport for one client session.
pub struct TcpTransport {
    stream: Mutex<TcpStream>,
    remote_addr: SocketAddr,
}

impl TcpTransport {
    /// Opens a TCP connection to `host:port`.
    ///
    /// Every resolved address is tried in turn until one accepts.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Communication` if the host cannot be resolved or no
    /// address accepts the connection.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| DbError::communication(format!("cannot resolve {}: {}", host, e)))?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Self::from_stream(stream, addr, timeout),
                Err(e) => last_err = Some(e),
            }
        }

        Err(DbError::communication(match last_err {
            Some(e) => format!("cannot connect to {}:{}: {}", host, port, e),
            None => format!("no address found for {}", host),
        }))
    }

    fn from_stream(stream: TcpStream, remote_addr: SocketAddr, timeout: Duration) -> Result<Self> {
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream: Mutex::new(stream),
            remote_addr,
        })
    }

    /// Sends a request frame and receives the matching response frame.
    ///
    /// # Errors
    ///
    /// - `DbError::Timeout` if no response arrives in time
    /// - `DbError::Communication` if the connection fails or is closed
    /// - `DbError::InvalidFrame` if the response header is malformed
    pub fn send_receive(&self, frame: &[u8]) -> Result<(FrameHeader, Vec<u8>)> {
        let mut stream = self.stream.lock();
        write_frame(&mut *stream, frame)?;
        read_frame(&mut *stream)?
            .ok_or_else(|| DbError::communication("connection closed by server"))
    }

    /// Closes both directions of the connection.
    pub fn shutdown(&self) {
        // The peer may already be gone; nothing to report then.
        let _ = self.stream.lock().shutdown(Shutdown::Both);
    }

    /// Returns the remote server address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}
