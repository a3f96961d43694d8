//! Packet-oriented transport layer
//!
//! This module lets an application exchange discrete packets over a TCP
//! (optionally TLS) or UDP socket without hand-rolling buffer management.
//!
//! # Architecture
//!
//! Incoming bytes flow bottom-up and outgoing packets top-down:
//!
//! - [`packet`] defines the `Packet` contract and its two framing strategies
//! - [`PacketConnection`] owns one socket and drives resolve, bind, connect,
//!   the optional TLS handshake, and the send/receive loops
//! - [`PacketStream`] owns every packet queued for sending and republishes
//!   connection events to any number of [`StreamObserver`]s
//!
//! All socket operations run on Tokio tasks; their completions are delivered
//! back to the owner one at a time through [`PacketConnection::next_event`],
//! so the owner never needs locking. Closing a connection invalidates every
//! completion that was scheduled but not yet delivered.
//!
//! # Examples
//!
//! ```no_run
//! use pktstream::net::{ConnectionConfig, Family, PacketStream, StringPacket};
//!
//! # async fn demo() -> pktstream::net::Result<()> {
//! let mut stream = PacketStream::new(ConnectionConfig::default(), Box::new(StringPacket::new()));
//! stream.open("localhost", 7, false, Family::V4)?;
//! stream.send_packet(&StringPacket::from_str("ping\n"))?;
//! stream.run().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
mod link;
pub mod packet;
mod socket;
pub mod stream;
pub mod tls;

pub use config::{ConnectionConfig, ConnectionConfigBuilder, Family, Transport};
pub use connection::{ConnectionOwner, ConnectionState, PacketConnection, PacketId};
pub use packet::{BinaryPacket, Fill, Packet, PacketError, StringPacket};
pub use stream::{PacketStream, StreamControl, StreamObserver};
pub use tls::{TlsConfig, TlsError, TlsSessionInfo, TlsVersion};

use std::io;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection is already open")]
    AlreadyOpen,

    #[error("stream was destroyed")]
    Destroyed,

    #[error("bind failed: {0}")]
    Bind(#[source] io::Error),

    #[error("resolve failed: {0}")]
    Resolve(#[source] io::Error),

    #[error("no {family} address found for {host}")]
    NoAddress { host: String, family: Family },

    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<Error> for io::Error {
    /// Keep the OS error where there is one, so owners can inspect
    /// `raw_os_error()` on any failure they are handed.
    fn from(err: Error) -> io::Error {
        match err {
            Error::Bind(e) | Error::Resolve(e) | Error::Connect(e) | Error::Io(e) => e,
            Error::NoAddress { .. } => io::Error::new(io::ErrorKind::AddrNotAvailable, err),
            Error::Packet(_) => io::Error::new(io::ErrorKind::InvalidData, err),
            Error::Unsupported(_) => io::Error::new(io::ErrorKind::Unsupported, err),
            Error::Tls(_) => io::Error::new(io::ErrorKind::ConnectionAborted, err),
            Error::AlreadyOpen | Error::Destroyed => io::Error::new(io::ErrorKind::Other, err),
        }
    }
}

/// Default receive buffer size in bytes
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 8192;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_keeps_os_code() {
        let err = Error::Connect(io::Error::from_raw_os_error(111));
        let io_err: io::Error = err.into();
        assert_eq!(io_err.raw_os_error(), Some(111));
    }

    #[test]
    fn test_io_error_kind_mapping() {
        let err = Error::NoAddress {
            host: "example.invalid".to_string(),
            family: Family::V6,
        };
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::AddrNotAvailable);
        assert!(io_err.to_string().contains("example.invalid"));
    }
}
