//! HTTP response parsing
//!
//! The response parser is an explicit state machine fed one character at a
//! time as bytes arrive:
//!
//! ```text
//! ResponseStatus -> ResponseHeaders -> Body -> Finished
//! ```
//!
//! CR bytes are dropped and LF ends a line while in the status and header
//! states. The blank line ending the headers switches to `Body`; from there
//! every byte is appended to the body verbatim. The body is only decoded
//! (chunked transfer coding, length check) by [`ResponseParser::finish`],
//! once the server has closed the connection.

use super::chunked::{decode_chunked_body, is_chunked};
use super::{Error, Headers, Result};
use tracing::trace;

/// Response parser states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    ResponseStatus,
    ResponseHeaders,
    Body,
    Finished,
}

/// HTTP response parser
#[derive(Debug)]
pub struct ResponseParser {
    state: ParseState,
    line: Vec<u8>,
    status_line: String,
    status_code: u16,
    headers: Headers,
    content_length: Option<usize>,
    body: Vec<u8>,
    trailers: Headers,
    body_expected: bool,
}

impl ResponseParser {
    /// Create a new response parser
    pub fn new() -> Self {
        ResponseParser {
            state: ParseState::ResponseStatus,
            line: Vec::new(),
            status_line: String::new(),
            status_code: 0,
            headers: Headers::new(),
            content_length: None,
            body: Vec::new(),
            trailers: Headers::new(),
            body_expected: true,
        }
    }

    /// Reset for a new response
    pub fn reset(&mut self) {
        *self = ResponseParser::new();
    }

    /// Declare whether the response carries a body.
    ///
    /// Responses to `HEAD` advertise a `Content-Length` they never send, so
    /// the length check is skipped for them.
    pub fn set_body_expected(&mut self, expected: bool) {
        self.body_expected = expected;
    }

    /// Feed received bytes
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        for (i, &byte) in data.iter().enumerate() {
            match self.state {
                ParseState::Body => {
                    self.body.extend_from_slice(&data[i..]);
                    break;
                }
                ParseState::Finished => {
                    trace!(bytes = data.len() - i, "ignoring bytes after finished response");
                    break;
                }
                ParseState::ResponseStatus | ParseState::ResponseHeaders => match byte {
                    b'\r' => {}
                    b'\n' => self.end_line()?,
                    _ => self.line.push(byte),
                },
            }
        }
        Ok(())
    }

    fn end_line(&mut self) -> Result<()> {
        let line = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();

        match self.state {
            ParseState::ResponseStatus => {
                // Tolerate blank lines ahead of the status line
                if line.is_empty() {
                    return Ok(());
                }
                self.status_code = parse_status_line(&line)?;
                self.status_line = line;
                self.state = ParseState::ResponseHeaders;
            }
            ParseState::ResponseHeaders => {
                if line.is_empty() {
                    self.state = ParseState::Body;
                } else if line.starts_with([' ', '\t']) {
                    if !self.headers.fold(&line) {
                        return Err(Error::InvalidHeader(format!(
                            "Continuation without header: {}",
                            line
                        )));
                    }
                } else {
                    let (name, value) = Headers::parse_header_line(&line)?;
                    if name.eq_ignore_ascii_case("Content-Length") {
                        self.content_length = Some(parse_content_length(&value)?);
                    }
                    self.headers.merge(name, value);
                }
            }
            ParseState::Body | ParseState::Finished => {}
        }
        Ok(())
    }

    /// Finalize the response after the connection closed.
    ///
    /// Decodes a chunked body (its trailers are kept apart from the
    /// headers) and checks the body length against `Content-Length`.
    pub fn finish(&mut self) -> Result<()> {
        if self.state != ParseState::Body {
            return Err(Error::Incomplete);
        }
        self.state = ParseState::Finished;

        if is_chunked(&self.headers) {
            let decoded = decode_chunked_body(&self.body)?;
            self.body = decoded.body;
            self.trailers = decoded.trailers;
        }

        if let Some(declared) = self.content_length {
            if self.body_expected && declared != self.body.len() {
                return Err(Error::LengthMismatch {
                    declared,
                    actual: self.body.len(),
                });
            }
        }
        Ok(())
    }

    /// Discard the body (and trailers) after a failure
    pub fn clear_body(&mut self) {
        self.body.clear();
        self.trailers.clear();
    }

    /// Current state
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Check if the headers have been read completely
    pub fn headers_complete(&self) -> bool {
        matches!(self.state, ParseState::Body | ParseState::Finished)
    }

    /// Raw status line
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// Numeric status code; 0 before the status line arrived
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Check if the status code is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Response headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Declared `Content-Length`
    pub fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    /// Body bytes: raw while receiving, decoded once finished
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Chunked trailers, available once finished
    pub fn trailers(&self) -> &Headers {
        &self.trailers
    }

    /// Progress against the declared length, in percent
    pub fn percent_done(&self) -> usize {
        match self.content_length {
            None => 0,
            Some(0) => 100,
            Some(len) => self.body.len().saturating_mul(100) / len,
        }
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a status line into its status code
///
/// Format: VERSION STATUS [REASON]
fn parse_status_line(line: &str) -> Result<u16> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or("");
    let code = parts.next().unwrap_or("");

    if !version.starts_with("HTTP/") {
        return Err(Error::InvalidStatusLine(line.to_string()));
    }
    code.parse::<u16>()
        .ok()
        .filter(|code| (100..1000).contains(code))
        .ok_or_else(|| Error::InvalidStatusLine(line.to_string()))
}

fn parse_content_length(value: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| Error::InvalidHeader(format!("Invalid Content-Length: {}", value)))
}
