//! Raw binary packets

use super::{check_len, Fill, Packet, Result};
use bytes::BytesMut;
use std::any::Any;

/// Binary packet
///
/// Has no delimiters: every feed consumes the whole input and completes the
/// packet, so one read (or one send) is one packet.
#[derive(Debug, Clone, Default)]
pub struct BinaryPacket {
    contents: BytesMut,
    max_len: Option<usize>,
}

impl BinaryPacket {
    /// Create a new empty binary packet
    pub fn new() -> Self {
        BinaryPacket::default()
    }

    /// Create an empty packet that refuses to grow beyond `max_len` bytes
    pub fn with_max_len(max_len: usize) -> Self {
        BinaryPacket {
            contents: BytesMut::new(),
            max_len: Some(max_len),
        }
    }

    /// Create a packet holding a copy of `bytes`
    pub fn from_slice(bytes: &[u8]) -> Self {
        BinaryPacket {
            contents: BytesMut::from(bytes),
            max_len: None,
        }
    }

    /// Append bytes to the packet
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<()> {
        check_len(self.contents.len() + bytes.len(), self.max_len)?;
        self.contents.extend_from_slice(bytes);
        Ok(())
    }
}

impl Packet for BinaryPacket {
    fn take_some(&mut self, input: &mut &[u8]) -> Result<Fill> {
        if input.is_empty() {
            return Ok(Fill::Partial);
        }

        self.extend_from_slice(input)?;
        *input = &input[input.len()..];
        Ok(Fill::Complete)
    }

    fn empty_clone(&self) -> Box<dyn Packet> {
        Box::new(BinaryPacket {
            contents: BytesMut::new(),
            max_len: self.max_len,
        })
    }

    fn contents(&self) -> &[u8] {
        &self.contents
    }

    fn set_contents(&mut self, bytes: &[u8]) -> Result<()> {
        check_len(bytes.len(), self.max_len)?;
        self.contents.clear();
        self.contents.extend_from_slice(bytes);
        Ok(())
    }

    fn clear(&mut self) {
        self.contents.clear();
    }

    fn max_len(&self) -> Option<usize> {
        self.max_len
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
