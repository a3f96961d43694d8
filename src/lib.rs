//! pktstream - packet-oriented transport with an HTTP/1.1 client
//!
//! This crate lets an application exchange discrete packets over TCP
//! (optionally TLS) or UDP without hand-rolling buffer management, and
//! builds an HTTP/1.1 client with chunked-transfer decoding on top of it.
//!
//! - [`net`] - packets, the packet connection and the packet stream
//! - [`http`] - URL targets, request serialization, response parsing
//! - [`observer`] - the multi-subscriber notification used by both

pub mod http;
pub mod net;
pub mod observer;
