//! HTTP/1.1 client over a packet stream
//!
//! The client sends one request per exchange and reads the response until
//! the server closes the connection (it always asks for `Connection: close`
//! unless told otherwise).
//!
//! # Architecture
//!
//! - [`url`] turns `http://` / `https://` URLs into a connection target
//! - [`request`] serializes the request line, headers and body
//! - [`parser`] is the response state machine, fed one character at a time
//! - [`chunked`] decodes a `Transfer-Encoding: chunked` body once complete
//! - [`session`] observes the packet stream and drives the parser
//! - [`client`] ties a stream and a session together behind one API
//!
//! # Examples
//!
//! ```no_run
//! use pktstream::http::{HttpClient, Method};
//! use pktstream::net::ConnectionConfig;
//!
//! # async fn demo() -> pktstream::http::Result<()> {
//! let mut client = HttpClient::new(ConnectionConfig::default());
//! client.request("http://example.com/", Method::Get, &[], None)?;
//! client.fetch().await;
//!
//! if client.ok() {
//!     println!("{}", client.body_as_string());
//! }
//! # Ok(())
//! # }
//! ```

pub mod chunked;
pub mod client;
pub mod headers;
pub mod parser;
pub mod request;
pub mod session;
pub mod url;

pub use client::HttpClient;
pub use headers::Headers;
pub use parser::{ParseState, ResponseParser};
pub use request::{HttpRequest, Method};
pub use session::{HttpObserver, HttpSession};
pub use self::url::Target;

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid status line: {0}")]
    InvalidStatusLine(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("Expected CRLF after chunk data")]
    MissingCrlf,

    #[error("Chunk of {size} bytes truncated after {available}")]
    TruncatedChunk { size: usize, available: usize },

    #[error("Chunked body ended without a last chunk")]
    MissingLastChunk,

    #[error("Body length {actual} does not match Content-Length {declared}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Incomplete response")]
    Incomplete,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Network error: {0}")]
    Net(#[from] crate::net::Error),
}

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default HTTPS port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// CRLF line ending
pub const CRLF: &str = "\r\n";
