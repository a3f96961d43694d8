//! Line-delimited text packets

use super::{check_len, Fill, Packet, Result};
use bytes::BytesMut;
use std::any::Any;
use std::borrow::Cow;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

fn is_delimiter(b: &u8) -> bool {
    *b == CR || *b == LF
}

/// String packet
///
/// One record per line. LF terminates a record and CR is treated as a
/// delimiter, so both `\n` and `\r\n` endings are accepted. The packet keeps
/// the raw bytes it consumed (terminator included) in [`contents`], while
/// [`line`] gives the record without delimiters.
///
/// By default records made only of delimiters are skipped, so repeated
/// CR/LF never produce an empty record. A verbatim packet delivers those
/// blank records too, which line-oriented protocols such as HTTP need to
/// find the end of a header block.
///
/// [`contents`]: Packet::contents
/// [`line`]: StringPacket::line
#[derive(Debug, Clone)]
pub struct StringPacket {
    raw: BytesMut,
    max_len: Option<usize>,
    keep_blank: bool,
}

impl StringPacket {
    /// Create an empty packet that skips blank records
    pub fn new() -> Self {
        StringPacket {
            raw: BytesMut::new(),
            max_len: None,
            keep_blank: false,
        }
    }

    /// Create an empty packet that delivers blank records
    pub fn verbatim() -> Self {
        StringPacket {
            keep_blank: true,
            ..StringPacket::new()
        }
    }

    /// Limit the packet to `max_len` raw bytes
    pub fn limit(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    /// Create a packet holding `text` as-is
    pub fn from_str(text: &str) -> Self {
        StringPacket {
            raw: BytesMut::from(text.as_bytes()),
            ..StringPacket::new()
        }
    }

    /// Check if blank records are delivered
    pub fn keeps_blank_lines(&self) -> bool {
        self.keep_blank
    }

    /// The record without its CR/LF delimiters
    pub fn line(&self) -> &[u8] {
        let start = self
            .raw
            .iter()
            .position(|b| !is_delimiter(b))
            .unwrap_or(self.raw.len());
        let end = self
            .raw
            .iter()
            .rposition(|b| !is_delimiter(b))
            .map_or(start, |p| p + 1);
        &self.raw[start..end]
    }

    /// The record as text, lossily decoded
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.line())
    }

    /// Check if the packet has consumed its terminator
    pub fn is_terminated(&self) -> bool {
        self.raw.last() == Some(&LF)
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        check_len(self.raw.len() + bytes.len(), self.max_len)?;
        self.raw.extend_from_slice(bytes);
        Ok(())
    }
}

impl Default for StringPacket {
    fn default() -> Self {
        Self::new()
    }
}

impl Packet for StringPacket {
    fn take_some(&mut self, input: &mut &[u8]) -> Result<Fill> {
        loop {
            if input.is_empty() {
                return Ok(Fill::Partial);
            }

            let Some(pos) = input.iter().position(|&b| b == LF) else {
                self.append(input)?;
                *input = &input[input.len()..];
                return Ok(Fill::Partial);
            };

            let (record, rest) = input.split_at(pos + 1);
            if !self.keep_blank && self.raw.iter().chain(record).all(is_delimiter) {
                self.raw.clear();
                *input = rest;
                continue;
            }

            self.append(record)?;
            *input = rest;
            return Ok(Fill::Complete);
        }
    }

    fn empty_clone(&self) -> Box<dyn Packet> {
        Box::new(StringPacket {
            raw: BytesMut::new(),
            max_len: self.max_len,
            keep_blank: self.keep_blank,
        })
    }

    fn contents(&self) -> &[u8] {
        &self.raw
    }

    fn set_contents(&mut self, bytes: &[u8]) -> Result<()> {
        check_len(bytes.len(), self.max_len)?;
        self.raw.clear();
        self.raw.extend_from_slice(bytes);
        Ok(())
    }

    fn clear(&mut self) {
        self.raw.clear();
    }

    fn max_len(&self) -> Option<usize> {
        self.max_len
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::packet::PacketError;

    /// Feed `input` in pieces of `step` bytes and collect completed lines
    fn collect_lines(template: &StringPacket, input: &[u8], step: usize) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        let mut current = template.clone();

        for piece in input.chunks(step) {
            let mut window = piece;
            while !window.is_empty() {
                if current.take_some(&mut window).unwrap().is_complete() {
                    lines.push(current.line().to_vec());
                    current = template.clone();
                }
            }
        }
        lines
    }

    #[test]
    fn test_single_line() {
        let mut packet = StringPacket::new();
        let mut input: &[u8] = b"hello\r\nworld";

        assert_eq!(packet.take_some(&mut input).unwrap(), Fill::Complete);
        assert_eq!(packet.line(), b"hello");
        assert_eq!(packet.contents(), b"hello\r\n");
        assert_eq!(input, b"world");
    }

    #[test]
    fn test_partial_line() {
        let mut packet = StringPacket::new();
        let mut input: &[u8] = b"hel";

        assert_eq!(packet.take_some(&mut input).unwrap(), Fill::Partial);
        assert!(input.is_empty());

        let mut input: &[u8] = b"lo\n";
        assert_eq!(packet.take_some(&mut input).unwrap(), Fill::Complete);
        assert_eq!(packet.text(), "hello");
        assert!(packet.is_terminated());
    }

    #[test]
    fn test_blank_records_skipped() {
        let lines = collect_lines(&StringPacket::new(), b"\r\n\r\none\r\n\n\ntwo\n", 64);
        assert_eq!(lines, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn test_verbatim_keeps_blank_records() {
        let lines = collect_lines(&StringPacket::verbatim(), b"one\r\n\r\nbody", 64);
        assert_eq!(lines, vec![b"one".to_vec(), b"".to_vec()]);
    }

    #[test]
    fn test_incremental_feed_equivalence() {
        let input: &[u8] =
            b"HTTP/1.1 200 OK\r\nA: 1\r\n\r\n\r\nx\ny\r\r\n\n\nlast without end";

        for template in [StringPacket::new(), StringPacket::verbatim()] {
            let all_at_once = collect_lines(&template, input, input.len());
            for step in 1..8 {
                assert_eq!(collect_lines(&template, input, step), all_at_once);
            }
        }
    }

    #[test]
    fn test_max_len() {
        let mut packet = StringPacket::new().limit(4);
        let mut input: &[u8] = b"toolong\n";
        assert!(matches!(
            packet.take_some(&mut input),
            Err(PacketError::TooBig { max: 4, .. })
        ));
    }

    #[test]
    fn test_empty_clone_keeps_mode() {
        let packet = StringPacket::verbatim().limit(10);
        let clone = packet.empty_clone();
        let clone = clone.downcast_ref::<StringPacket>().unwrap();
        assert!(clone.keeps_blank_lines());
        assert_eq!(Packet::max_len(clone), Some(10));
        assert!(clone.is_empty());
    }
}
