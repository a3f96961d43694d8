//! Socket creation and local binding
//!
//! Sockets are created and bound synchronously with `socket2` so that a bind
//! failure can be reported before any asynchronous work starts.

use super::config::{ConnectionConfig, Family, Transport};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use tokio::net::TcpSocket;

/// A bound, not yet connected socket
pub(crate) enum BoundSocket {
    Tcp(TcpSocket),
    Udp(std::net::UdpSocket),
}

impl BoundSocket {
    /// Address the socket is bound to
    pub(crate) fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            BoundSocket::Tcp(socket) => socket.local_addr(),
            BoundSocket::Udp(socket) => socket.local_addr(),
        }
    }
}

/// Create a socket for `family` and bind it to the configured local endpoint
pub(crate) fn bind(config: &ConnectionConfig, family: Family) -> io::Result<BoundSocket> {
    let local = local_endpoint(config, family)?;
    let domain = match family {
        Family::V4 => Domain::IPV4,
        Family::V6 => Domain::IPV6,
    };

    match config.transport {
        Transport::Tcp => {
            let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
            socket.set_nodelay(config.nodelay)?;
            prepare(&socket, local)?;
            let stream: std::net::TcpStream = socket.into();
            Ok(BoundSocket::Tcp(TcpSocket::from_std_stream(stream)))
        }
        Transport::Udp => {
            let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
            prepare(&socket, local)?;
            Ok(BoundSocket::Udp(socket.into()))
        }
    }
}

fn prepare(socket: &Socket, local: SocketAddr) -> io::Result<()> {
    if local.port() != 0 {
        socket.set_reuse_address(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&SockAddr::from(local))
}

/// Resolve the configured local host, or fall back to the unspecified address
fn local_endpoint(config: &ConnectionConfig, family: Family) -> io::Result<SocketAddr> {
    let Some(host) = config.local_host.as_deref() else {
        return Ok(SocketAddr::new(family.unspecified(), config.local_port));
    };

    (host, config.local_port)
        .to_socket_addrs()?
        .find(|addr| family.matches(addr))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no {family} address for local host {host}"),
            )
        })
}
