//! Shared helpers for the integration tests
//!
//! The servers run on plain std threads bound to 127.0.0.1:0 and serve a
//! single connection each. The client side runs inside `#[tokio::test]`.

#![allow(dead_code)]

use openssl::pkey::PKey;
use openssl::ssl::{SslAcceptor, SslMethod, SslStream};
use openssl::x509::X509;
use std::future::Future;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const TEST_CERT_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/example.com.pem");

/// Fail the test instead of hanging forever
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("test timed out")
}

/// Let aborted socket tasks run once so their sockets actually close.
///
/// Call this before joining a server thread that waits for the client to
/// hang up: joining blocks the runtime thread.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Bind a listener on an ephemeral local port
pub fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// A port nothing listens on
pub fn closed_port() -> u16 {
    let (_listener, port) = listener();
    port
}

/// Read one HTTP request (headers plus any Content-Length body)
pub fn read_request<S: Read>(stream: &mut S) -> Vec<u8> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];

    loop {
        if let Some(end) = find(&request, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&request[..end]).to_string();
            let body_len = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if request.len() >= end + 4 + body_len {
                return request;
            }
        }

        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            return request;
        }
        request.extend_from_slice(&buf[..n]);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Serve one plain HTTP exchange: read the request, write `pieces` with a
/// short pause between them, then close. Returns the request bytes.
pub fn serve_http(pieces: Vec<Vec<u8>>) -> (u16, JoinHandle<Vec<u8>>) {
    let (listener, port) = listener();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        write_pieces(&mut stream, &pieces);
        request
    });
    (port, handle)
}

/// Serve one plain HTTP exchange with a single response write
pub fn serve_response(response: &[u8]) -> (u16, JoinHandle<Vec<u8>>) {
    serve_http(vec![response.to_vec()])
}

/// Write `response` and then wait for the client to hang up.
/// Returns the request bytes.
pub fn serve_until_client_closes(response: &[u8]) -> (u16, JoinHandle<Vec<u8>>) {
    let (listener, port) = listener();
    let response = response.to_vec();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        stream.write_all(&response).unwrap();

        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
        request
    });
    (port, handle)
}

fn write_pieces<W: Write>(stream: &mut W, pieces: &[Vec<u8>]) {
    for (i, piece) in pieces.iter().enumerate() {
        if i > 0 {
            thread::sleep(Duration::from_millis(20));
        }
        stream.write_all(piece).unwrap();
        stream.flush().unwrap();
    }
}

fn tls_acceptor() -> SslAcceptor {
    let pem = std::fs::read(TEST_CERT_PATH).unwrap();
    let cert = X509::from_pem(&pem).unwrap();
    let key = PKey::private_key_from_pem(&pem).unwrap();

    let mut builder = SslAcceptor::mozilla_intermediate(SslMethod::tls()).unwrap();
    builder.set_certificate(&cert).unwrap();
    builder.set_private_key(&key).unwrap();
    builder.build()
}

/// Serve one HTTPS exchange with the in-tree example.com certificate.
///
/// Returns the request bytes, or `None` if the handshake failed.
pub fn serve_https(response: &[u8]) -> (u16, JoinHandle<Option<Vec<u8>>>) {
    let (listener, port) = listener();
    let acceptor = tls_acceptor();
    let response = response.to_vec();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut stream: SslStream<TcpStream> = acceptor.accept(stream).ok()?;
        let request = read_request(&mut stream);
        stream.write_all(&response).unwrap();
        let _ = stream.shutdown();
        Some(request)
    });
    (port, handle)
}

/// Accept one TCP connection and never answer; returns once the client
/// hangs up
pub fn serve_silent() -> (u16, JoinHandle<()>) {
    let (listener, port) = listener();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });
    (port, handle)
}

/// Accept one TLS connection and hold it open until the client hangs up
pub fn serve_tls_idle() -> (u16, JoinHandle<()>) {
    let (listener, port) = listener();
    let acceptor = tls_acceptor();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        if let Ok(mut stream) = acceptor.accept(stream) {
            let mut buf = [0u8; 256];
            while matches!(stream.read(&mut buf), Ok(n) if n > 0) {}
        }
    });
    (port, handle)
}
