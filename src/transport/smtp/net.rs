//! The transport byte-duplex: plain TCP, or TLS either from the start
//! (implicit) or layered in place over an existing plain socket (STARTTLS).

use std::net::{Shutdown, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_native_tls::{TlsConnector, TlsStream};

use super::error::{self, Error};

/// Explicit trust material for TLS. Empty uses the platform default trust
/// store; otherwise the peer certificate MUST validate or `connect`/
/// `upgrade_tls` fails with `ConnectionAuth`.
#[derive(Clone, Debug, Default)]
pub struct TlsParameters {
    pub domain: String,
    pub accept_invalid_certs: bool,
    pub accept_invalid_hostnames: bool,
}

impl TlsParameters {
    pub fn new(domain: impl Into<String>) -> Self {
        TlsParameters { domain: domain.into(), ..Default::default() }
    }

    fn connector(&self) -> Result<TlsConnector, Error> {
        let mut builder = native_tls::TlsConnector::builder();
        builder.danger_accept_invalid_certs(self.accept_invalid_certs);
        builder.danger_accept_invalid_hostnames(self.accept_invalid_hostnames);
        Ok(TlsConnector::from(builder.build()?))
    }
}

/// The transport's current flavor. Never constructed directly by callers;
/// `connect` and `upgrade_tls` are the only entry points.
pub enum NetworkStream {
    Plain(TcpStream),
    Tls(TlsStream<TcpStream>),
}

impl NetworkStream {
    /// Opens a plain TCP connection to `host:port`. `host` is trimmed first,
    /// matching the constructor contract.
    pub async fn connect_plain(host: &str, port: u16) -> Result<Self, Error> {
        let stream = TcpStream::connect((host.trim(), port)).await.map_err(error::network)?;
        Ok(NetworkStream::Plain(stream))
    }

    /// Opens a connection and immediately performs the TLS handshake
    /// (implicit TLS, e.g. SMTPS on port 465).
    pub async fn connect_tls(host: &str, port: u16, tls: &TlsParameters) -> Result<Self, Error> {
        let stream = TcpStream::connect((host.trim(), port)).await.map_err(error::network)?;
        let connector = tls.connector()?;
        let domain = if tls.domain.is_empty() { host.trim() } else { &tls.domain };
        let tls_stream = connector.connect(domain, stream).await?;
        Ok(NetworkStream::Tls(tls_stream))
    }

    /// Wraps an already-connected plain stream with TLS in place (STARTTLS).
    /// Consumes `self`; the caller replaces its stored transport with the
    /// result atomically.
    pub async fn upgrade_tls(self, tls: &TlsParameters) -> Result<Self, Error> {
        match self {
            NetworkStream::Plain(stream) => {
                let connector = tls.connector()?;
                let domain = if tls.domain.is_empty() {
                    // caller is expected to have set `domain` for STARTTLS; an
                    // empty value here would validate against an empty SNI name.
                    return Err(error::client("TLS domain must be set before upgrading"));
                } else {
                    &tls.domain
                };
                let tls_stream = connector.connect(domain, stream).await?;
                Ok(NetworkStream::Tls(tls_stream))
            }
            NetworkStream::Tls(_) => Err(error::client("connection is already encrypted")),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, NetworkStream::Tls(_))
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            NetworkStream::Plain(s) => s.peer_addr().ok(),
            NetworkStream::Tls(s) => s.get_ref().get_ref().peer_addr().ok(),
        }
    }

    /// `force=true` drops the socket immediately; `force=false` performs an
    /// orderly shutdown of the write half.
    pub fn close(&self, force: bool) -> std::io::Result<()> {
        let tcp = match self {
            NetworkStream::Plain(s) => s,
            NetworkStream::Tls(s) => s.get_ref().get_ref(),
        };
        if force {
            tcp.shutdown(Shutdown::Both)
        } else {
            tcp.shutdown(Shutdown::Write)
        }
    }
}

impl AsyncRead for NetworkStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            NetworkStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            NetworkStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for NetworkStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            NetworkStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            NetworkStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            NetworkStream::Plain(s) => Pin::new(s).poll_flush(cx),
            NetworkStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            NetworkStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            NetworkStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
