//! Transport seams: the stream contract, the socket-factory contract,
//! and the default plaintext TCP factory.
//!
//! TLS, proxying and keylogging belong to the factory implementation a
//! caller supplies; the client core only consumes the byte stream and
//! the peer metadata exposed here.

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::error::{Error, Result};

/// How long to wait for a response after writing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Block until the message completes or the peer closes.
    Forever,
    /// Fire and forget: write the request and do not read a response.
    NoResponse,
    /// Envelope deadline over the entire response read.
    For(Duration),
}

impl Wait {
    /// Scanner convention: negative means unbounded, zero means skip the
    /// read, positive is an envelope in seconds.
    pub fn from_secs(t: i64) -> Self {
        match t {
            t if t < 0 => Self::Forever,
            0 => Self::NoResponse,
            t => Self::For(Duration::from_secs(t as u64)),
        }
    }
}

/// A connected byte stream plus the peer metadata the client core needs.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {
    /// Resolved peer address of the live stream.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// DER bytes of the TLS peer certificate, when TLS is active.
    fn peer_certificate(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Everything a socket factory needs to open a stream to the target.
#[derive(Debug, Clone, Default)]
pub struct SocketParams {
    /// Address (or name) to connect to.
    pub peer_host: String,
    /// TLS server name indication, when it differs from `peer_host`.
    pub peer_hostname: Option<String>,
    pub peer_port: u16,
    pub local_host: Option<String>,
    pub local_port: Option<u16>,
    pub ssl: bool,
    pub ssl_version: Option<String>,
    pub ssl_key_log_file: Option<String>,
    /// Proxy chain specification, passed through verbatim.
    pub proxies: Option<String>,
    pub connect_timeout: Option<Duration>,
}

/// Opens transports. Implementations supply TCP, TLS, proxied or
/// in-memory streams; the client core treats them all the same.
#[async_trait]
pub trait SocketFactory: Send + Sync {
    async fn open(&self, params: &SocketParams) -> Result<Box<dyn Transport>>;
}

/// Default factory: direct plaintext TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpFactory;

#[async_trait]
impl SocketFactory for TcpFactory {
    async fn open(&self, params: &SocketParams) -> Result<Box<dyn Transport>> {
        if params.ssl {
            return Err(Error::connect("TcpFactory cannot open TLS streams"));
        }
        let addr = format!("{}:{}", params.peer_host, params.peer_port);
        let connect = TcpStream::connect(addr.clone());
        let stream = match params.connect_timeout {
            Some(t) => tokio::time::timeout(t, connect)
                .await
                .map_err(|_| Error::connect(format!("connect to {addr} timed out")))?,
            None => connect.await,
        }
        .map_err(|e| Error::connect(format!("{addr}: {e}")))?;
        // Request bytes are written in one buffer; latency matters more
        // than coalescing here.
        stream.set_nodelay(true).ok();
        Ok(Box::new(TcpTransport(stream)))
    }
}

/// Plaintext TCP stream.
pub struct TcpTransport(TcpStream);

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self(stream)
    }
}

impl AsyncRead for TcpTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().0).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_shutdown(cx)
    }
}

impl Transport for TcpTransport {
    fn peer_addr(&self) -> Option<SocketAddr> {
        self.0.peer_addr().ok()
    }
}
