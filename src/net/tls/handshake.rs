//! TLS handshake
//!
//! Negotiates a secure stream over an already connected socket using
//! `tokio-openssl`.

use super::config::{TlsConfig, TlsError};
use openssl::ssl::{Ssl, SslContextRef};
use std::net::IpAddr;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_openssl::SslStream;

/// Perform the client side of a TLS handshake on `stream`.
///
/// `host` is the remote host the connection was opened to; the configured
/// servername overrides it for SNI and certificate verification. SNI is not
/// sent for IP literals.
pub async fn connect<S>(
    ctx: &SslContextRef,
    config: &TlsConfig,
    host: &str,
    stream: S,
) -> Result<SslStream<S>, TlsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut ssl = Ssl::new(ctx)?;
    let name = config.servername().unwrap_or(host);
    let ip = name.parse::<IpAddr>().ok();

    if ip.is_none() {
        ssl.set_hostname(name)?;
    }

    if config.verify_peer() {
        let param = ssl.param_mut();
        match ip {
            Some(ip) => param.set_ip(ip)?,
            None => param.set_host(name)?,
        }
    }

    let mut ssl_stream = SslStream::new(ssl, stream)?;
    Pin::new(&mut ssl_stream)
        .connect()
        .await
        .map_err(|e| TlsError::HandshakeFailed(format!("Connection failed: {}", e)))?;

    Ok(ssl_stream)
}
