//! Packet abstraction
//!
//! A packet is a container of bytes that knows how to consume more bytes
//! from an arriving stream and when it is logically complete. Packets carry
//! no I/O knowledge; the connection hands them an opaque byte window and
//! asks them to take what belongs to them.
//!
//! Two framing strategies are provided:
//!
//! - [`BinaryPacket`] accumulates raw bytes; one feed is one packet.
//! - [`StringPacket`] is delimited by a line terminator (LF, with CR
//!   treated as a delimiter too).

mod binary;
mod string;

pub use binary::BinaryPacket;
pub use string::StringPacket;

use std::any::Any;
use std::fmt;

/// Result type for packet operations
pub type Result<T> = std::result::Result<T, PacketError>;

/// Packet contract violations
///
/// These are local programming faults rather than transport failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("packet is empty")]
    Empty,

    #[error("packet too big: {len} bytes exceeds maximum of {max}")]
    TooBig { len: usize, max: usize },
}

/// Outcome of feeding bytes to a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// More bytes are needed before the packet is complete
    Partial,
    /// The packet is complete; any bytes left in the input belong to the next one
    Complete,
}

impl Fill {
    /// Check if the packet reported completion
    pub fn is_complete(self) -> bool {
        self == Fill::Complete
    }
}

/// Packet contract
///
/// Implementations must be `Send` because a packet being filled lives on the
/// connection's receive task until it is handed to the owner.
pub trait Packet: fmt::Debug + Send + 'static {
    /// Consume a prefix of `input` into this packet.
    ///
    /// `input` is advanced past whatever was consumed. Returns
    /// [`Fill::Complete`] exactly once the packet has everything it needs.
    fn take_some(&mut self, input: &mut &[u8]) -> Result<Fill>;

    /// Create an empty packet of the same concrete type and limits
    fn empty_clone(&self) -> Box<dyn Packet>;

    /// Raw bytes held by this packet, as they go on the wire
    fn contents(&self) -> &[u8];

    /// Replace the contents with `bytes`
    fn set_contents(&mut self, bytes: &[u8]) -> Result<()>;

    /// Discard the contents
    fn clear(&mut self);

    /// Declared maximum length, if any
    fn max_len(&self) -> Option<usize>;

    /// Downcasting support for observers that know the concrete type
    fn as_any(&self) -> &dyn Any;

    /// Number of bytes held
    fn len(&self) -> usize {
        self.contents().len()
    }

    /// Check if the packet holds no bytes
    fn is_empty(&self) -> bool {
        self.contents().is_empty()
    }

    /// Access the data, failing on an empty packet
    fn data(&self) -> Result<&[u8]> {
        if self.is_empty() {
            return Err(PacketError::Empty);
        }
        Ok(self.contents())
    }

    /// Replace the contents with another packet's bytes
    fn copy_from(&mut self, other: &dyn Packet) -> Result<()> {
        self.set_contents(other.contents())
    }
}

impl dyn Packet {
    /// Downcast to a concrete packet type
    pub fn downcast_ref<T: Packet>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Fail with [`PacketError::TooBig`] if `len` exceeds `max`
pub(crate) fn check_len(len: usize, max: Option<usize>) -> Result<()> {
    match max {
        Some(max) if len > max => Err(PacketError::TooBig { len, max }),
        _ => Ok(()),
    }
}
