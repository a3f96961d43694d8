//! Chunked transfer encoding support
//!
//! The response body is collected verbatim while it arrives and decoded in
//! one pass once the connection has closed.

use super::{Error, Headers, Result};

/// A decoded chunked body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkedBody {
    /// Concatenated chunk data
    pub body: Vec<u8>,

    /// Trailer headers following the last chunk
    pub trailers: Headers,
}

/// Check if `Transfer-Encoding` ends with the `chunked` coding
pub fn is_chunked(headers: &Headers) -> bool {
    headers
        .get("Transfer-Encoding")
        .and_then(|te| te.rsplit(',').next())
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

/// Decode a complete chunked body
///
/// Reads hex chunk-size lines (chunk extensions after `;` are ignored),
/// copies each chunk's data, and expects CRLF after it. Decoding stops at
/// the zero-size chunk; the lines that follow, up to a blank line, are
/// trailer headers.
pub fn decode_chunked_body(input: &[u8]) -> Result<ChunkedBody> {
    let mut rest = input;
    let mut body = Vec::new();

    loop {
        let Some(line) = take_line(&mut rest) else {
            return Err(Error::MissingLastChunk);
        };
        let size = parse_chunk_size(line)?;
        if size == 0 {
            break;
        }

        if rest.len() < size {
            return Err(Error::TruncatedChunk {
                size,
                available: rest.len(),
            });
        }
        body.extend_from_slice(&rest[..size]);
        rest = rest[size..].strip_prefix(b"\r\n").ok_or(Error::MissingCrlf)?;
    }

    let mut trailers = Headers::new();
    while let Some(line) = take_line(&mut rest) {
        if line.is_empty() {
            break;
        }
        let line = String::from_utf8_lossy(line);
        if line.starts_with([' ', '\t']) {
            if !trailers.fold(&line) {
                return Err(Error::InvalidHeader(format!("Continuation without trailer: {}", line)));
            }
            continue;
        }
        let (name, value) = Headers::parse_header_line(&line)?;
        trailers.merge(name, value);
    }

    Ok(ChunkedBody { body, trailers })
}

/// Split off the next LF-terminated line, without its CR/LF
fn take_line<'a>(rest: &mut &'a [u8]) -> Option<&'a [u8]> {
    let input: &'a [u8] = *rest;
    let lf = input.iter().position(|&b| b == b'\n')?;
    *rest = &input[lf + 1..];

    let line = &input[..lf];
    Some(line.strip_suffix(b"\r").unwrap_or(line))
}

fn parse_chunk_size(line: &[u8]) -> Result<usize> {
    let line = std::str::from_utf8(line)
        .map_err(|_| Error::InvalidChunkSize(String::from_utf8_lossy(line).to_string()))?;
    let size_str = line.split(';').next().unwrap_or("").trim();

    usize::from_str_radix(size_str, 16).map_err(|_| Error::InvalidChunkSize(size_str.to_string()))
}
