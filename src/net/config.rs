//! Connection configuration
//!
//! This module provides the configuration builder for packet connections.

use super::tls::TlsConfig;
use super::DEFAULT_RECV_BUFFER_SIZE;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

/// Socket transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Stream socket, optionally wrapped in TLS
    #[default]
    Tcp,
    /// Datagram socket; one datagram per packet write
    Udp,
}

/// Protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Family {
    #[default]
    V4,
    V6,
}

impl Family {
    /// Check if an address belongs to this family
    pub fn matches(self, addr: &SocketAddr) -> bool {
        match self {
            Family::V4 => addr.is_ipv4(),
            Family::V6 => addr.is_ipv6(),
        }
    }

    /// The unspecified address of this family
    pub fn unspecified(self) -> IpAddr {
        match self {
            Family::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Family::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => f.write_str("IPv4"),
            Family::V6 => f.write_str("IPv6"),
        }
    }
}

/// Connection configuration (immutable after building)
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub(crate) transport: Transport,
    pub(crate) local_host: Option<String>,
    pub(crate) local_port: u16,
    pub(crate) recv_buffer_size: usize,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) nodelay: bool,
    pub(crate) tls: TlsConfig,
}

impl ConnectionConfig {
    /// Create a new configuration builder
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Socket transport
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Local host name or address to bind, if any
    pub fn local_host(&self) -> Option<&str> {
        self.local_host.as_deref()
    }

    /// Local port to bind (0 = any)
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Receive buffer size in bytes
    pub fn recv_buffer_size(&self) -> usize {
        self.recv_buffer_size
    }

    /// Timeout covering resolve, connect and handshake
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// TLS settings used for secure opens
    pub fn tls(&self) -> &TlsConfig {
        &self.tls
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfigBuilder::default().build()
    }
}

/// Connection configuration builder
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    transport: Transport,
    local_host: Option<String>,
    local_port: u16,
    recv_buffer_size: usize,
    connect_timeout: Option<Duration>,
    nodelay: bool,
    tls: TlsConfig,
}

impl Default for ConnectionConfigBuilder {
    fn default() -> Self {
        ConnectionConfigBuilder {
            transport: Transport::Tcp,
            local_host: None,
            local_port: 0,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            connect_timeout: Some(Duration::from_secs(10)),
            nodelay: true,
            tls: TlsConfig::default(),
        }
    }
}

impl ConnectionConfigBuilder {
    /// Set the socket transport
    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Bind to this local host name or address before connecting
    pub fn local_host(mut self, host: impl Into<String>) -> Self {
        self.local_host = Some(host.into());
        self
    }

    /// Bind to this local port before connecting
    pub fn local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    /// Set the receive buffer size (minimum 1 byte)
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size.max(1);
        self
    }

    /// Set the connect timeout; `None` waits forever
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable/disable TCP_NODELAY
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Set the TLS configuration
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConnectionConfig {
        ConnectionConfig {
            transport: self.transport,
            local_host: self.local_host,
            local_port: self.local_port,
            recv_buffer_size: self.recv_buffer_size,
            connect_timeout: self.connect_timeout,
            nodelay: self.nodelay,
            tls: self.tls,
        }
    }
}
