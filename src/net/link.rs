//! Asynchronous socket tasks
//!
//! A connection runs at most three tasks: the open task (resolve, connect,
//! optional handshake), and once connected one receive loop and one send
//! loop. Every task reports back through an event channel, tagging each
//! event with the generation it was started under so that a closed (or
//! reopened) connection can recognise and drop stale completions.

use super::config::Family;
use super::packet::{Fill, Packet, PacketError};
use super::socket::BoundSocket;
use super::tls::{handshake, TlsConfig, TlsSessionInfo};
use super::Error;
use bytes::Bytes;
use openssl::ssl::SslContext;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_openssl::SslStream;
use tracing::{debug, trace};

/// Events reported by the socket tasks
pub(crate) enum LinkEvent {
    Resolved(SocketAddr),
    Handshaking,
    Established(Link),
    ConnectFailed(Error),
    Arrived(Box<dyn Packet>),
    Written,
    WriteFailed(io::Error),
    ReadFailed(io::Error),
    Eof,
}

pub(crate) type EventSender = mpsc::UnboundedSender<(u64, LinkEvent)>;

/// An open socket: plain, TLS-wrapped, or datagram
pub(crate) enum Link {
    Plain(TcpStream),
    Secure(SslStream<TcpStream>),
    Datagram(UdpSocket),
}

impl Link {
    pub(crate) fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Link::Plain(stream) => stream.local_addr(),
            Link::Secure(stream) => stream.get_ref().local_addr(),
            Link::Datagram(socket) => socket.local_addr(),
        }
    }

    pub(crate) fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Link::Plain(stream) => stream.peer_addr(),
            Link::Secure(stream) => stream.get_ref().peer_addr(),
            Link::Datagram(socket) => socket.peer_addr(),
        }
    }

    pub(crate) fn tls_info(&self) -> Option<TlsSessionInfo> {
        match self {
            Link::Secure(stream) => Some(TlsSessionInfo::from_ssl(stream.ssl())),
            _ => None,
        }
    }

    fn split(self) -> (ReadHalf, WriteHalf) {
        match self {
            Link::Plain(stream) => {
                let (reader, writer) = stream.into_split();
                (ReadHalf::Stream(Box::new(reader)), WriteHalf::Stream(Box::new(writer)))
            }
            Link::Secure(stream) => {
                let (reader, writer) = tokio::io::split(stream);
                (ReadHalf::Stream(Box::new(reader)), WriteHalf::Stream(Box::new(writer)))
            }
            Link::Datagram(socket) => {
                let socket = Arc::new(socket);
                (ReadHalf::Datagram(socket.clone()), WriteHalf::Datagram(socket))
            }
        }
    }
}

enum ReadHalf {
    Stream(Box<dyn AsyncRead + Send + Unpin>),
    Datagram(Arc<UdpSocket>),
}

impl ReadHalf {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ReadHalf::Stream(reader) => reader.read(buf).await,
            ReadHalf::Datagram(socket) => socket.recv(buf).await,
        }
    }

    fn is_datagram(&self) -> bool {
        matches!(self, ReadHalf::Datagram(_))
    }
}

enum WriteHalf {
    Stream(Box<dyn AsyncWrite + Send + Unpin>),
    Datagram(Arc<UdpSocket>),
}

impl WriteHalf {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            WriteHalf::Stream(writer) => {
                writer.write_all(bytes).await?;
                writer.flush().await
            }
            WriteHalf::Datagram(socket) => {
                let n = socket.send(bytes).await?;
                if n != bytes.len() {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!("datagram truncated: sent {} of {} bytes", n, bytes.len()),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Everything the open task needs
pub(crate) struct OpenRequest {
    pub(crate) socket: BoundSocket,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) family: Family,
    pub(crate) tls: Option<(SslContext, TlsConfig)>,
    pub(crate) timeout: Option<Duration>,
}

/// Spawn the open task
pub(crate) fn spawn_open(request: OpenRequest, generation: u64, events: EventSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        let timeout = request.timeout;
        let establish = establish(request, generation, &events);
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, establish)
                .await
                .unwrap_or_else(|_| {
                    Err(Error::Connect(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect timed out after {:?}", limit),
                    )))
                }),
            None => establish.await,
        };

        let event = match result {
            Ok(link) => LinkEvent::Established(link),
            Err(e) => LinkEvent::ConnectFailed(e),
        };
        let _ = events.send((generation, event));
    })
}

async fn establish(request: OpenRequest, generation: u64, events: &EventSender) -> Result<Link, Error> {
    let OpenRequest {
        socket,
        host,
        port,
        family,
        tls,
        ..
    } = request;

    let addr = resolve(&host, port, family).await?;
    let _ = events.send((generation, LinkEvent::Resolved(addr)));

    match socket {
        BoundSocket::Tcp(socket) => {
            let stream = socket.connect(addr).await.map_err(Error::Connect)?;
            let Some((ctx, config)) = tls else {
                return Ok(Link::Plain(stream));
            };

            let _ = events.send((generation, LinkEvent::Handshaking));
            let stream = handshake::connect(&ctx, &config, &host, stream).await?;
            Ok(Link::Secure(stream))
        }
        BoundSocket::Udp(socket) => {
            let socket = UdpSocket::from_std(socket)?;
            socket.connect(addr).await.map_err(Error::Connect)?;
            Ok(Link::Datagram(socket))
        }
    }
}

/// Resolve `host` and pick the first address of the requested family
async fn resolve(host: &str, port: u16, family: Family) -> Result<SocketAddr, Error> {
    let mut addrs = lookup_host((host, port)).await.map_err(Error::Resolve)?;
    addrs.find(|addr| family.matches(addr)).ok_or_else(|| Error::NoAddress {
        host: host.to_string(),
        family,
    })
}

/// Spawn the receive and send loops for an established link.
///
/// Returns the task handles and the channel feeding the send loop.
pub(crate) fn spawn_io(
    link: Link,
    packet: Box<dyn Packet>,
    buffer_size: usize,
    generation: u64,
    events: EventSender,
) -> ([JoinHandle<()>; 2], mpsc::UnboundedSender<Bytes>) {
    let (reader, writer) = link.split();
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

    let receive = tokio::spawn(receive_loop(reader, packet, buffer_size, generation, events.clone()));
    let send = tokio::spawn(send_loop(writer, outgoing_rx, generation, events));

    ([receive, send], outgoing_tx)
}

async fn receive_loop(
    mut reader: ReadHalf,
    mut packet: Box<dyn Packet>,
    buffer_size: usize,
    generation: u64,
    events: EventSender,
) {
    let mut buf = vec![0u8; buffer_size];
    let mut cursor = 0;

    loop {
        let n = match reader.read(&mut buf[cursor..]).await {
            Ok(0) if reader.is_datagram() => continue,
            Ok(0) => {
                debug!("peer closed the connection");
                // An unterminated trailing record is still data
                if !packet.is_empty() {
                    let _ = events.send((generation, LinkEvent::Arrived(packet)));
                }
                let _ = events.send((generation, LinkEvent::Eof));
                return;
            }
            Ok(n) => n,
            Err(e) => {
                let _ = events.send((generation, LinkEvent::ReadFailed(e)));
                return;
            }
        };
        trace!(bytes = n, "received");

        let filled = cursor + n;
        let consumed = match frame(&mut packet, &buf[..filled], generation, &events) {
            Ok(consumed) => consumed,
            Err(e) => {
                let err = io::Error::new(io::ErrorKind::InvalidData, e);
                let _ = events.send((generation, LinkEvent::ReadFailed(err)));
                return;
            }
        };

        // Shift leftover bytes to the front for the next read
        buf.copy_within(consumed..filled, 0);
        cursor = filled - consumed;

        if cursor == buf.len() {
            let err = io::Error::new(
                io::ErrorKind::InvalidData,
                format!("receive buffer of {} bytes full without packet progress", buf.len()),
            );
            let _ = events.send((generation, LinkEvent::ReadFailed(err)));
            return;
        }
    }
}

/// Feed `window` to the current receive packet until it stops completing.
///
/// A completed packet is replaced by a fresh empty one before any further
/// byte is consumed. Returns the number of bytes consumed.
fn frame(
    packet: &mut Box<dyn Packet>,
    window: &[u8],
    generation: u64,
    events: &EventSender,
) -> Result<usize, PacketError> {
    let mut input = window;

    while !input.is_empty() {
        match packet.take_some(&mut input)? {
            Fill::Complete => {
                let next = packet.empty_clone();
                let done = mem::replace(packet, next);
                trace!(len = done.len(), "packet arrived");
                let _ = events.send((generation, LinkEvent::Arrived(done)));
            }
            Fill::Partial => break,
        }
    }

    Ok(window.len() - input.len())
}

async fn send_loop(
    mut writer: WriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<Bytes>,
    generation: u64,
    events: EventSender,
) {
    while let Some(bytes) = outgoing.recv().await {
        match writer.write(&bytes).await {
            Ok(()) => {
                trace!(bytes = bytes.len(), "sent");
                let _ = events.send((generation, LinkEvent::Written));
            }
            Err(e) => {
                let _ = events.send((generation, LinkEvent::WriteFailed(e)));
                return;
            }
        }
    }
}
