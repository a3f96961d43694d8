//! Packet connection
//!
//! A `PacketConnection` owns exactly one socket and drives its state machine:
//!
//! ```text
//! Closed -> Resolving -> Connecting -> (Handshaking) -> Connected -> Closed
//! ```
//!
//! Any failure reports to the owner and returns straight to `Closed`. The
//! connection never interprets payload bytes: it feeds whatever arrives to
//! the current receive packet and hands completed packets to its owner.
//!
//! Socket work happens on Tokio tasks. Their completions queue up on an
//! internal channel and are delivered to the owner, one per call, by
//! [`PacketConnection::next_event`]. Closing bumps the connection's
//! generation and aborts the tasks, so completions already queued by the old
//! tasks are dropped instead of delivered.

use super::config::{ConnectionConfig, Family, Transport};
use super::link::{self, EventSender, Link, LinkEvent, OpenRequest};
use super::packet::Packet;
use super::socket;
use super::tls::TlsSessionInfo;
use super::{Error, Result};
use bytes::Bytes;
use openssl::ssl::SslContext;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Identity of a packet accepted by [`PacketConnection::send_packet`]
pub type PacketId = u64;

/// Owner callbacks
///
/// Implemented by whatever owns the connection (normally a
/// [`PacketStream`](super::PacketStream)). Every callback is invoked from
/// the owner's own call into the connection, never concurrently.
pub trait ConnectionOwner {
    /// Create the empty packet that receives the next arriving bytes
    fn handle_create_empty_packet(&mut self) -> Box<dyn Packet>;

    /// The connection reached `Connected`
    fn handle_connection_established(&mut self);

    /// Bind, resolve, connect or handshake failed
    fn handle_connection_failure(&mut self, error: &io::Error);

    /// A queued packet was written in full; ownership returns to the owner
    fn handle_packet_sent(&mut self, id: PacketId, packet: Box<dyn Packet>);

    /// A receive packet completed
    fn handle_packet_arrived(&mut self, packet: Box<dyn Packet>);

    /// A read or write failed; carries the packet being written, if any
    fn handle_transfer_failure(&mut self, packet: Option<(PacketId, Box<dyn Packet>)>, error: &io::Error);

    /// A connected connection closed
    fn handle_connection_closed(&mut self);
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Resolving,
    Connecting,
    Handshaking,
    Connected,
}

struct Outbound {
    id: PacketId,
    packet: Box<dyn Packet>,
}

/// Packet connection
pub struct PacketConnection {
    config: ConnectionConfig,
    state: ConnectionState,
    generation: u64,
    events_tx: EventSender,
    events_rx: mpsc::UnboundedReceiver<(u64, LinkEvent)>,
    tasks: Vec<JoinHandle<()>>,
    outgoing: Option<mpsc::UnboundedSender<Bytes>>,
    queue: VecDeque<Outbound>,
    in_flight: Option<Outbound>,
    next_id: PacketId,
    tls_context: Option<SslContext>,
    secure: bool,
    remote: Option<(String, u16)>,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    tls_info: Option<TlsSessionInfo>,
}

impl PacketConnection {
    /// Create a closed connection
    pub fn new(config: ConnectionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        PacketConnection {
            config,
            state: ConnectionState::Closed,
            generation: 0,
            events_tx,
            events_rx,
            tasks: Vec::new(),
            outgoing: None,
            queue: VecDeque::new(),
            in_flight: None,
            next_id: 1,
            tls_context: None,
            secure: false,
            remote: None,
            local_addr: None,
            peer_addr: None,
            tls_info: None,
        }
    }

    /// Start opening the connection.
    ///
    /// Binds the local endpoint synchronously and, only if that succeeds,
    /// starts resolving and connecting in the background. A bind failure is
    /// reported to the owner as a connection failure and also returned.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(
        &mut self,
        owner: &mut dyn ConnectionOwner,
        remote_host: &str,
        remote_port: u16,
        secure: bool,
        family: Family,
    ) -> Result<()> {
        if self.state != ConnectionState::Closed {
            return Err(Error::AlreadyOpen);
        }
        if secure && self.config.transport == Transport::Udp {
            return Err(Error::Unsupported("TLS over UDP"));
        }

        let tls = if secure {
            Some((self.tls_context()?.clone(), self.config.tls.clone()))
        } else {
            None
        };

        let socket = match socket::bind(&self.config, family) {
            Ok(socket) => socket,
            Err(e) => {
                warn!(error = %e, "bind failed");
                owner.handle_connection_failure(&e);
                return Err(Error::Bind(e));
            }
        };

        self.generation += 1;
        self.state = ConnectionState::Resolving;
        self.secure = secure;
        self.remote = Some((remote_host.to_string(), remote_port));
        debug!(host = remote_host, port = remote_port, secure, %family, "opening connection");

        let request = OpenRequest {
            socket,
            host: remote_host.to_string(),
            port: remote_port,
            family,
            tls,
            timeout: self.config.connect_timeout,
        };
        let task = link::spawn_open(request, self.generation, self.events_tx.clone());
        self.tasks.push(task);
        Ok(())
    }

    /// The shared TLS context, built on first use
    fn tls_context(&mut self) -> Result<&SslContext> {
        if self.tls_context.is_none() {
            self.tls_context = Some(self.config.tls.build_context()?);
        }
        match self.tls_context {
            Some(ref ctx) => Ok(ctx),
            None => Err(Error::Unsupported("TLS context unavailable")),
        }
    }

    /// Queue a packet for sending.
    ///
    /// A high priority packet jumps to the front of the queue but never
    /// interrupts a write already in flight. Only one write is outstanding
    /// at a time; packets queued while closed go out once connected.
    pub fn send_packet(&mut self, packet: Box<dyn Packet>, high_priority: bool) -> PacketId {
        let id = self.next_id;
        self.next_id += 1;

        let outbound = Outbound { id, packet };
        if high_priority {
            self.queue.push_front(outbound);
        } else {
            self.queue.push_back(outbound);
        }

        self.start_write();
        id
    }

    fn start_write(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(ref outgoing) = self.outgoing else {
            return;
        };
        let Some(next) = self.queue.pop_front() else {
            return;
        };

        let bytes = Bytes::copy_from_slice(next.packet.contents());
        if outgoing.send(bytes).is_err() {
            // Send loop already gone; its failure event is on the way
            self.queue.push_front(next);
            return;
        }
        self.in_flight = Some(next);
    }

    /// Wait for the next socket completion and deliver it to `owner`.
    ///
    /// Returns `false` once the connection is closed and nothing more can
    /// arrive. Cancel safe: dropping the future loses no event.
    pub async fn next_event(&mut self, owner: &mut dyn ConnectionOwner) -> bool {
        while self.state != ConnectionState::Closed {
            let Some((generation, event)) = self.events_rx.recv().await else {
                return false;
            };
            if generation != self.generation {
                continue;
            }
            self.handle_event(owner, event);
            return true;
        }
        false
    }

    fn handle_event(&mut self, owner: &mut dyn ConnectionOwner, event: LinkEvent) {
        match event {
            LinkEvent::Resolved(addr) => {
                debug!(%addr, "resolved");
                self.state = ConnectionState::Connecting;
            }
            LinkEvent::Handshaking => {
                debug!("starting TLS handshake");
                self.state = ConnectionState::Handshaking;
            }
            LinkEvent::Established(link) => self.establish(owner, link),
            LinkEvent::ConnectFailed(e) => {
                let err = io::Error::from(e);
                warn!(error = %err, "connection failed");
                owner.handle_connection_failure(&err);
                self.close(owner);
            }
            LinkEvent::Arrived(packet) => owner.handle_packet_arrived(packet),
            LinkEvent::Written => {
                if let Some(done) = self.in_flight.take() {
                    owner.handle_packet_sent(done.id, done.packet);
                }
                self.start_write();
            }
            LinkEvent::WriteFailed(err) => {
                warn!(error = %err, "write failed");
                let packet = self.in_flight.take().map(|o| (o.id, o.packet));
                owner.handle_transfer_failure(packet, &err);
                self.close(owner);
            }
            LinkEvent::ReadFailed(err) => {
                warn!(error = %err, "read failed");
                owner.handle_transfer_failure(None, &err);
                self.close(owner);
            }
            LinkEvent::Eof => self.close(owner),
        }
    }

    fn establish(&mut self, owner: &mut dyn ConnectionOwner, link: Link) {
        self.local_addr = link.local_addr().ok();
        self.peer_addr = link.peer_addr().ok();
        self.tls_info = link.tls_info();

        let packet = owner.handle_create_empty_packet();
        let (tasks, outgoing) = link::spawn_io(
            link,
            packet,
            self.config.recv_buffer_size,
            self.generation,
            self.events_tx.clone(),
        );
        self.tasks.extend(tasks);
        self.outgoing = Some(outgoing);
        self.state = ConnectionState::Connected;
        debug!(local = ?self.local_addr, peer = ?self.peer_addr, "connected");

        owner.handle_connection_established();
        self.start_write();
    }

    /// Close the connection.
    ///
    /// Cancels all socket work in flight; completions it already produced are
    /// never delivered. The packet being written goes back to the front of
    /// the queue. The owner hears `connection_closed` only if the connection
    /// had reached `Connected`. Closing a closed connection does nothing.
    pub fn close(&mut self, owner: &mut dyn ConnectionOwner) {
        if self.state == ConnectionState::Closed {
            return;
        }
        let was_connected = self.state == ConnectionState::Connected;

        self.generation += 1;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.outgoing = None;
        if let Some(outbound) = self.in_flight.take() {
            self.queue.push_front(outbound);
        }

        self.state = ConnectionState::Closed;
        self.local_addr = None;
        self.peer_addr = None;
        self.tls_info = None;
        debug!(was_connected, "connection closed");

        if was_connected {
            owner.handle_connection_closed();
        }
    }

    /// Drop every queued packet that is not being written; returns how many
    pub fn clear_queue(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    /// Id of the packet currently being written
    pub(crate) fn in_flight_id(&self) -> Option<PacketId> {
        self.in_flight.as_ref().map(|outbound| outbound.id)
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the connection is anywhere but `Closed`
    pub fn is_open(&self) -> bool {
        self.state != ConnectionState::Closed
    }

    /// Check if the last open was secure
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Remote host and port of the last open
    pub fn remote(&self) -> Option<(&str, u16)> {
        self.remote.as_ref().map(|(host, port)| (host.as_str(), *port))
    }

    /// Local socket address while connected
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Peer socket address while connected
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Negotiated TLS details while securely connected
    pub fn tls_info(&self) -> Option<&TlsSessionInfo> {
        self.tls_info.as_ref()
    }

    /// Number of packets waiting to be written, including the one in flight
    pub fn queued(&self) -> usize {
        self.queue.len() + usize::from(self.in_flight.is_some())
    }

    /// The configuration this connection was created with
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl Drop for PacketConnection {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::packet::{BinaryPacket, StringPacket};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    enum Seen {
        Established,
        Failure(io::ErrorKind),
        Sent(PacketId, Vec<u8>),
        Arrived(Vec<u8>),
        TransferFailure(Option<PacketId>),
        Closed,
    }

    #[derive(Default)]
    struct Recorder {
        seen: Vec<Seen>,
    }

    impl ConnectionOwner for Recorder {
        fn handle_create_empty_packet(&mut self) -> Box<dyn Packet> {
            Box::new(StringPacket::new())
        }

        fn handle_connection_established(&mut self) {
            self.seen.push(Seen::Established);
        }

        fn handle_connection_failure(&mut self, error: &io::Error) {
            self.seen.push(Seen::Failure(error.kind()));
        }

        fn handle_packet_sent(&mut self, id: PacketId, packet: Box<dyn Packet>) {
            self.seen.push(Seen::Sent(id, packet.contents().to_vec()));
        }

        fn handle_packet_arrived(&mut self, packet: Box<dyn Packet>) {
            self.seen.push(Seen::Arrived(packet.contents().to_vec()));
        }

        fn handle_transfer_failure(&mut self, packet: Option<(PacketId, Box<dyn Packet>)>, _error: &io::Error) {
            self.seen.push(Seen::TransferFailure(packet.map(|(id, _)| id)));
        }

        fn handle_connection_closed(&mut self) {
            self.seen.push(Seen::Closed);
        }
    }

    async fn drive(conn: &mut PacketConnection, owner: &mut Recorder) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while conn.next_event(owner).await {}
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_echo_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = vec![0u8; 64];
            let mut received = Vec::new();
            while !received.ends_with(b"two\n") {
                let n = stream.read(&mut buf).unwrap();
                received.extend_from_slice(&buf[..n]);
            }
            stream.write_all(b"alpha\r\nbeta\r\n").unwrap();
            received
        });

        let mut conn = PacketConnection::new(ConnectionConfig::default());
        let mut owner = Recorder::default();
        let first = conn.send_packet(Box::new(StringPacket::from_str("one\n")), false);
        let second = conn.send_packet(Box::new(StringPacket::from_str("two\n")), false);
        assert_eq!(conn.queued(), 2);

        conn.open(&mut owner, "127.0.0.1", port, false, Family::V4).unwrap();
        assert_eq!(conn.state(), ConnectionState::Resolving);
        drive(&mut conn, &mut owner).await;

        assert_eq!(handle.join().unwrap(), b"one\ntwo\n");
        assert_eq!(
            owner.seen,
            vec![
                Seen::Established,
                Seen::Sent(first, b"one\n".to_vec()),
                Seen::Sent(second, b"two\n".to_vec()),
                Seen::Arrived(b"alpha\r\n".to_vec()),
                Seen::Arrived(b"beta\r\n".to_vec()),
                Seen::Closed,
            ]
        );
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_open_twice() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut conn = PacketConnection::new(ConnectionConfig::default());
        let mut owner = Recorder::default();
        conn.open(&mut owner, "127.0.0.1", port, false, Family::V4).unwrap();

        let err = conn.open(&mut owner, "127.0.0.1", port, false, Family::V4).unwrap_err();
        assert!(matches!(err, Error::AlreadyOpen));
        assert!(owner.seen.is_empty());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut conn = PacketConnection::new(ConnectionConfig::default());
        let mut owner = Recorder::default();
        conn.open(&mut owner, "127.0.0.1", port, false, Family::V4).unwrap();
        drive(&mut conn, &mut owner).await;

        assert_eq!(owner.seen, vec![Seen::Failure(io::ErrorKind::ConnectionRefused)]);
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_bind_failure_reported() {
        let config = ConnectionConfig::builder().local_host("203.0.113.1").build();
        let mut conn = PacketConnection::new(config);
        let mut owner = Recorder::default();

        let err = conn.open(&mut owner, "127.0.0.1", 9, false, Family::V4).unwrap_err();
        assert!(matches!(err, Error::Bind(_)));
        assert_eq!(owner.seen.len(), 1);
        assert!(matches!(owner.seen[0], Seen::Failure(_)));
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_tls_over_udp_rejected() {
        let config = ConnectionConfig::builder().transport(Transport::Udp).build();
        let mut conn = PacketConnection::new(config);
        let mut owner = Recorder::default();

        let err = conn.open(&mut owner, "127.0.0.1", 9, true, Family::V4).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_close_drops_pending_completions() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf);
        });

        let mut conn = PacketConnection::new(ConnectionConfig::default());
        let mut owner = Recorder::default();
        conn.open(&mut owner, "127.0.0.1", port, false, Family::V4).unwrap();
        while conn.state() != ConnectionState::Connected {
            assert!(conn.next_event(&mut owner).await);
        }

        conn.send_packet(Box::new(BinaryPacket::from_slice(b"payload")), false);
        // Let the send loop finish the write so its completion is queued
        tokio::time::sleep(Duration::from_millis(50)).await;
        conn.close(&mut owner);
        conn.close(&mut owner);

        assert!(!conn.next_event(&mut owner).await);
        assert_eq!(owner.seen, vec![Seen::Established, Seen::Closed]);
        // The unacknowledged packet is back in the queue
        assert_eq!(conn.queued(), 1);

        // Give the runtime a turn to drop the aborted tasks and their sockets
        drop(conn);
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn test_high_priority_jumps_queue() {
        let mut conn = PacketConnection::new(ConnectionConfig::default());
        conn.send_packet(Box::new(BinaryPacket::from_slice(b"a")), false);
        conn.send_packet(Box::new(BinaryPacket::from_slice(b"b")), false);
        let urgent = conn.send_packet(Box::new(BinaryPacket::from_slice(b"c")), true);

        assert_eq!(conn.queue.front().map(|o| o.id), Some(urgent));
        assert_eq!(conn.clear_queue(), 3);
        assert_eq!(conn.queued(), 0);
    }
}
