//! Negotiated TLS session details

use openssl::nid::Nid;
use openssl::ssl::{NameType, SslRef};
use openssl::x509::X509NameRef;

/// TLS parameters available after a successful handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSessionInfo {
    /// Negotiated TLS version (e.g., "TLSv1.3")
    pub version: String,

    /// Negotiated cipher suite
    pub cipher: String,

    /// SNI servername sent by the client
    pub servername: Option<String>,

    /// Negotiated ALPN protocol
    pub alpn: Option<String>,

    /// Common Name of the peer certificate
    pub peer_subject: Option<String>,

    /// Whether the session was resumed
    pub sess_reused: bool,
}

impl TlsSessionInfo {
    /// Capture session details from an SSL connection
    pub fn from_ssl(ssl: &SslRef) -> Self {
        TlsSessionInfo {
            version: ssl.version_str().to_string(),
            cipher: ssl
                .current_cipher()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "<undef>".to_string()),
            servername: ssl.servername(NameType::HOST_NAME).map(|s| s.to_string()),
            alpn: ssl
                .selected_alpn_protocol()
                .map(|p| String::from_utf8_lossy(p).to_string()),
            peer_subject: ssl
                .peer_certificate()
                .and_then(|cert| common_name(cert.subject_name())),
            sess_reused: ssl.session_reused(),
        }
    }
}

fn common_name(name: &X509NameRef) -> Option<String> {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .map(|entry| String::from_utf8_lossy(entry.data().as_slice()).into_owned())
}
