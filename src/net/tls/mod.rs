//! TLS support for packet connections
//!
//! A secure open wraps the connected TCP socket in an OpenSSL stream before
//! any packet is exchanged.
//!
//! # Architecture
//!
//! 1. `TlsConfig` describes the client settings (versions, ciphers, ALPN,
//!    peer verification, certificates)
//! 2. The connection lazily builds one `SslContext` from it on its first
//!    secure open and reuses that context for later opens
//! 3. `handshake::connect` negotiates the secure stream asynchronously
//! 4. `TlsSessionInfo` records what was negotiated
//!
//! # Examples
//!
//! ```
//! use pktstream::net::tls::{TlsConfig, TlsVersion};
//!
//! let tls_config = TlsConfig::client()
//!     .version_range(TlsVersion::Tls12, TlsVersion::Tls13)
//!     .servername("example.com")
//!     .alpn(&["http/1.1"])
//!     .build();
//! assert!(tls_config.verify_peer());
//! ```

pub mod config;
pub mod handshake;
pub mod session;

pub use config::{TlsConfig, TlsConfigBuilder, TlsError, TlsVersion};
pub use session::TlsSessionInfo;

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
