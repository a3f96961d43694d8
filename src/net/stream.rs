//! Packet stream
//!
//! A `PacketStream` wraps one [`PacketConnection`] for its whole lifetime.
//! It takes ownership of a copy of every packet it is asked to send, keeps
//! track of it until the connection reports it sent or failed, and
//! republishes every connection event to its subscribed observers.
//!
//! Observers get a [`StreamControl`] with each callback. Whatever they ask
//! for through it (send, close, destroy) is applied once the fan-out is
//! over, so an observer never re-enters the stream while it is notifying.

use super::config::{ConnectionConfig, Family};
use super::connection::{ConnectionOwner, ConnectionState, PacketConnection, PacketId};
use super::packet::{Packet, PacketError};
use super::{Error, Result};
use crate::observer::{Subscribers, SubscriptionId};
use std::cell::RefCell;
use std::io;
use std::mem;
use std::rc::Rc;
use tracing::debug;

/// Stream event observer
///
/// All methods default to doing nothing.
pub trait StreamObserver {
    fn connection_established(&mut self, _stream: &mut StreamControl) {}

    fn connection_failure(&mut self, _stream: &mut StreamControl, _error: &io::Error) {}

    fn packet_sent(&mut self, _stream: &mut StreamControl, _packet: &dyn Packet) {}

    fn packet_arrived(&mut self, _stream: &mut StreamControl, _packet: &dyn Packet) {}

    fn transfer_failure(&mut self, _stream: &mut StreamControl, _error: &io::Error) {}

    fn connection_closed(&mut self, _stream: &mut StreamControl) {}
}

enum StreamAction {
    Send { packet: Box<dyn Packet>, high_priority: bool },
    Close,
}

/// Requests an observer makes of the stream that is notifying it
#[derive(Default)]
pub struct StreamControl {
    actions: Vec<StreamAction>,
    destroyed: bool,
}

impl StreamControl {
    /// Queue a copy of `packet` for sending
    pub fn send_packet(&mut self, packet: &dyn Packet) -> std::result::Result<(), PacketError> {
        self.push_send(packet, false)
    }

    /// Queue a copy of `packet` ahead of everything not yet being written
    pub fn send_packet_priority(&mut self, packet: &dyn Packet) -> std::result::Result<(), PacketError> {
        self.push_send(packet, true)
    }

    fn push_send(&mut self, packet: &dyn Packet, high_priority: bool) -> std::result::Result<(), PacketError> {
        let mut copy = packet.empty_clone();
        copy.copy_from(packet)?;
        self.actions.push(StreamAction::Send { packet: copy, high_priority });
        Ok(())
    }

    /// Close the connection once the current notification is over
    pub fn close(&mut self) {
        self.actions.push(StreamAction::Close);
    }

    /// Tear the stream down: no other observer hears the current event,
    /// queued packets are released and every subscription is dropped.
    pub fn destroy(&mut self) {
        self.destroyed = true;
    }

    /// Check if an observer destroyed the stream
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    #[cfg(test)]
    pub(crate) fn queued_contents(&self) -> Vec<Vec<u8>> {
        self.actions
            .iter()
            .filter_map(|action| match action {
                StreamAction::Send { packet, .. } => Some(packet.contents().to_vec()),
                StreamAction::Close => None,
            })
            .collect()
    }
}

/// The stream's half that the connection reports to
struct StreamCore {
    prototype: Box<dyn Packet>,
    queued: Vec<PacketId>,
    observers: Subscribers<dyn StreamObserver>,
    control: StreamControl,
}

impl StreamCore {
    fn publish<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut dyn StreamObserver, &mut StreamControl),
    {
        if self.control.destroyed {
            return;
        }
        let control = &mut self.control;
        self.observers.notify(|observer| {
            f(observer, &mut *control);
            !control.destroyed
        });
    }

    fn forget(&mut self, id: PacketId) {
        if let Some(pos) = self.queued.iter().position(|queued| *queued == id) {
            self.queued.remove(pos);
        }
    }
}

impl ConnectionOwner for StreamCore {
    fn handle_create_empty_packet(&mut self) -> Box<dyn Packet> {
        self.prototype.empty_clone()
    }

    fn handle_connection_established(&mut self) {
        self.publish(|observer, control| observer.connection_established(control));
    }

    fn handle_connection_failure(&mut self, error: &io::Error) {
        self.publish(|observer, control| observer.connection_failure(control, error));
    }

    fn handle_packet_sent(&mut self, id: PacketId, packet: Box<dyn Packet>) {
        self.forget(id);
        self.publish(|observer, control| observer.packet_sent(control, packet.as_ref()));
    }

    fn handle_packet_arrived(&mut self, packet: Box<dyn Packet>) {
        self.publish(|observer, control| observer.packet_arrived(control, packet.as_ref()));
    }

    fn handle_transfer_failure(&mut self, packet: Option<(PacketId, Box<dyn Packet>)>, error: &io::Error) {
        if let Some((id, _)) = packet {
            self.forget(id);
        }
        self.publish(|observer, control| observer.transfer_failure(control, error));
    }

    fn handle_connection_closed(&mut self) {
        self.publish(|observer, control| observer.connection_closed(control));
    }
}

/// Packet stream
pub struct PacketStream {
    connection: PacketConnection,
    core: StreamCore,
}

impl PacketStream {
    /// Create a closed stream; arriving bytes are framed into empty clones
    /// of `prototype`
    pub fn new(config: ConnectionConfig, prototype: Box<dyn Packet>) -> Self {
        PacketStream {
            connection: PacketConnection::new(config),
            core: StreamCore {
                prototype,
                queued: Vec::new(),
                observers: Subscribers::new(),
                control: StreamControl::default(),
            },
        }
    }

    /// Subscribe an observer. The stream only holds a weak handle to it.
    pub fn subscribe<O>(&mut self, observer: &Rc<RefCell<O>>) -> SubscriptionId
    where
        O: StreamObserver + 'static,
    {
        let observer: Rc<RefCell<dyn StreamObserver>> = observer.clone();
        self.core.observers.subscribe(&observer)
    }

    /// Remove a subscription
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.core.observers.unsubscribe(id)
    }

    /// Open the underlying connection
    pub fn open(&mut self, host: &str, port: u16, secure: bool, family: Family) -> Result<()> {
        if self.core.control.destroyed {
            return Err(Error::Destroyed);
        }
        let result = self.connection.open(&mut self.core, host, port, secure, family);
        self.apply_actions();
        result
    }

    /// Queue a copy of `packet` for sending
    pub fn send_packet(&mut self, packet: &dyn Packet) -> Result<PacketId> {
        self.enqueue(packet, false)
    }

    /// Queue a copy of `packet` ahead of everything not yet being written
    pub fn send_packet_priority(&mut self, packet: &dyn Packet) -> Result<PacketId> {
        self.enqueue(packet, true)
    }

    fn enqueue(&mut self, packet: &dyn Packet, high_priority: bool) -> Result<PacketId> {
        if self.core.control.destroyed {
            return Err(Error::Destroyed);
        }
        let mut copy = packet.empty_clone();
        copy.copy_from(packet)?;
        Ok(self.enqueue_owned(copy, high_priority))
    }

    fn enqueue_owned(&mut self, packet: Box<dyn Packet>, high_priority: bool) -> PacketId {
        let id = self.connection.send_packet(packet, high_priority);
        self.core.queued.push(id);
        id
    }

    /// Release every accepted packet that is not being written.
    ///
    /// Returns how many were released. After a `close` nothing is being
    /// written, so the stream is left with no pending packets at all.
    pub fn clear_queue(&mut self) -> usize {
        let released = self.connection.clear_queue();
        match self.connection.in_flight_id() {
            Some(id) => self.core.queued.retain(|queued| *queued == id),
            None => self.core.queued.clear(),
        }
        released
    }

    /// Close the underlying connection
    pub fn close(&mut self) {
        self.connection.close(&mut self.core);
        self.apply_actions();
    }

    /// Wait for the next connection event and publish it.
    ///
    /// Returns `false` once the stream is closed and idle.
    pub async fn next_event(&mut self) -> bool {
        let delivered = self.connection.next_event(&mut self.core).await;
        self.apply_actions();
        delivered
    }

    /// Publish events until the connection closes
    pub async fn run(&mut self) {
        while self.next_event().await {}
    }

    fn apply_actions(&mut self) {
        loop {
            if self.core.control.destroyed {
                self.teardown();
                return;
            }
            let actions = mem::take(&mut self.core.control.actions);
            if actions.is_empty() {
                return;
            }
            for action in actions {
                match action {
                    StreamAction::Send { packet, high_priority } => {
                        self.enqueue_owned(packet, high_priority);
                    }
                    StreamAction::Close => self.connection.close(&mut self.core),
                }
            }
        }
    }

    fn teardown(&mut self) {
        self.core.control.actions.clear();
        self.core.observers.clear();
        self.connection.close(&mut self.core);
        let released = self.clear_queue();
        debug!(released, "stream destroyed");
    }

    /// Check if the underlying connection is open
    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// Lifecycle state of the underlying connection
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Number of accepted packets not yet reported sent or failed
    pub fn pending(&self) -> usize {
        self.core.queued.len()
    }

    /// Check if an observer destroyed the stream
    pub fn is_destroyed(&self) -> bool {
        self.core.control.destroyed
    }

    /// The underlying connection, for introspection
    pub fn connection(&self) -> &PacketConnection {
        &self.connection
    }
}

impl Drop for PacketStream {
    fn drop(&mut self) {
        if !self.core.queued.is_empty() {
            debug!(released = self.core.queued.len(), "dropping stream with queued packets");
        }
    }
}
