//! The byte-stream seam underneath a [`Link`][crate::link::Link].
//!
//! The link never touches sockets directly; it talks to a [`Transport`].
//! [`TcpTransport`] is the production implementation. Tests drive the link
//! through in-memory doubles.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use teleop_types::LinkError;
use tracing::{debug, info};

use crate::framer::FRAME_DELIMITER;

/// Socket parameters for reaching the control module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for each connection attempt.
    pub connect_timeout: Duration,
    /// Upper bound for a single outbound write; `None` blocks until done.
    pub write_timeout: Option<Duration>,
    /// Size of each `read` call inside [`Transport::read_available`].
    pub read_chunk: usize,
    /// Stop draining the socket after this many bytes in one tick so a
    /// chatty peer cannot starve the host loop.
    pub max_read_per_poll: usize,
}

impl LinkConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// `host:port` as shown in logs.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            connect_timeout: Duration::from_secs(1),
            write_timeout: Some(Duration::from_millis(500)),
            read_chunk: 1024,
            max_read_per_poll: 1 << 20,
        }
    }
}

/// A bidirectional byte stream to one peer.
///
/// # Contract
///
/// * `connect` – opens the stream. Failure leaves the transport closed and is
///   returned to the caller; it must never be fatal.
/// * `write_frame` – writes one already-delimited frame in a single call.
///   A failed write does not change the open flag. If a failed write left
///   part of a frame on the wire, the next write must terminate that
///   fragment first so the peer's framer stays aligned.
/// * `read_available` – returns every byte currently available without
///   blocking. "Nothing to read" and transient errors both yield an empty
///   chunk.
/// * `close` – idempotent; failures are logged, never returned.
pub trait Transport {
    fn connect(&mut self) -> Result<(), LinkError>;

    fn is_open(&self) -> bool;

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), LinkError>;

    fn read_available(&mut self) -> Vec<u8>;

    fn close(&mut self);

    /// Append the frame delimiter to `payload` and write it.
    ///
    /// # Errors
    ///
    /// [`LinkError::NotConnected`] when closed, otherwise whatever
    /// [`Transport::write_frame`] reports.
    fn send(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        if !self.is_open() {
            return Err(LinkError::NotConnected);
        }
        let mut frame = Vec::with_capacity(payload.len() + FRAME_DELIMITER.len());
        frame.extend_from_slice(payload);
        frame.extend_from_slice(FRAME_DELIMITER);
        self.write_frame(&frame)
    }
}

/// [`Transport`] over a single TCP connection.
///
/// The stream stays in blocking mode (bounded by the write timeout) for
/// writes and is switched to non-blocking mode only while draining reads.
#[derive(Debug)]
pub struct TcpTransport {
    config: LinkConfig,
    stream: Option<TcpStream>,
    /// A write failed part-way through a frame on the current stream.
    torn: bool,
}

impl TcpTransport {
    /// A closed transport that will dial `config.host:config.port`.
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            stream: None,
            torn: false,
        }
    }

    /// Wrap a stream that is already connected (e.g. one accepted by a
    /// listener).
    pub fn from_stream(stream: TcpStream, config: LinkConfig) -> Result<Self, LinkError> {
        stream
            .set_nonblocking(false)
            .and_then(|()| stream.set_write_timeout(config.write_timeout))
            .map_err(|source| LinkError::Io {
                op: "configure",
                source,
            })?;
        Ok(Self {
            config,
            stream: Some(stream),
            torn: false,
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Address of the connected peer, if any.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    fn dial(&self) -> Result<TcpStream, LinkError> {
        let addr = self.config.addr();
        let connect_err = |source: io::Error| LinkError::Connect {
            addr: addr.clone(),
            source,
        };
        let candidates = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()
            .map_err(connect_err)?;

        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, self.config.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(%candidate, error = %e, "connection attempt failed");
                    last_err = e;
                }
            }
        }
        Err(connect_err(last_err))
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> Result<(), LinkError> {
        if self.stream.is_some() {
            debug!(addr = %self.config.addr(), "already connected");
            return Ok(());
        }
        let stream = self.dial()?;
        stream
            .set_write_timeout(self.config.write_timeout)
            .map_err(|source| LinkError::Io {
                op: "configure",
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "could not disable Nagle's algorithm");
        }
        self.stream = Some(stream);
        self.torn = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let stream = self.stream.as_mut().ok_or(LinkError::NotConnected)?;
        write_resync(stream, &mut self.torn, frame)
            .map_err(|source| LinkError::Io { op: "send", source })
    }

    fn read_available(&mut self) -> Vec<u8> {
        let read_chunk = self.config.read_chunk.max(1);
        let max_read = self.config.max_read_per_poll;
        let Some(stream) = self.stream.as_mut() else {
            return Vec::new();
        };
        if let Err(e) = stream.set_nonblocking(true) {
            debug!(error = %e, "could not switch socket to non-blocking mode");
            return Vec::new();
        }

        let mut chunk = Vec::new();
        let mut buf = vec![0u8; read_chunk];
        let mut peer_closed = false;
        loop {
            match stream.read(&mut buf) {
                Ok(0) => {
                    peer_closed = true;
                    break;
                }
                Ok(n) => {
                    chunk.extend_from_slice(&buf[..n]);
                    if chunk.len() >= max_read {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(error = %e, "socket read failed");
                    break;
                }
            }
        }

        if let Err(e) = stream.set_nonblocking(false) {
            debug!(error = %e, "could not restore blocking mode");
        }
        if peer_closed {
            info!(addr = %self.config.addr(), "peer closed the connection");
            self.close();
        }
        chunk
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take()
            && let Err(e) = stream.shutdown(Shutdown::Both)
        {
            debug!(error = %e, "socket shutdown failed");
        }
    }
}

/// Write `frame` in full. A fragment left by an earlier failed write is
/// closed off with a bare delimiter first; the peer drops it as malformed
/// and decodes `frame` normally.
fn write_resync<W: Write>(w: &mut W, torn: &mut bool, frame: &[u8]) -> io::Result<()> {
    if *torn {
        w.write_all(FRAME_DELIMITER)?;
        *torn = false;
        debug!("terminated fragment of an interrupted frame");
    }
    let mut written = 0;
    while written < frame.len() {
        match w.write(&frame[written..]) {
            Ok(0) => {
                *torn = written > 0;
                return Err(io::ErrorKind::WriteZero.into());
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                *torn = written > 0;
                return Err(e);
            }
        }
    }
    w.flush()
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}
