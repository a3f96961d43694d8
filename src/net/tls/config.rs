//! TLS configuration
//!
//! This module provides the client TLS configuration builder and turns the
//! configuration into an OpenSSL context.

use openssl::pkey::PKey;
use openssl::ssl::{SslContext, SslContextBuilder, SslMethod, SslVerifyMode};
use openssl::x509::X509;
use std::fs;
use std::path::{Path, PathBuf};

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Parse TLS version from string (case-insensitive)
    pub fn from_str(s: &str) -> Result<Self, TlsError> {
        match s.to_uppercase().as_str() {
            "TLSV1.0" | "TLS1.0" | "TLSV1" | "TLS1" => Ok(TlsVersion::Tls10),
            "TLSV1.1" | "TLS1.1" => Ok(TlsVersion::Tls11),
            "TLSV1.2" | "TLS1.2" => Ok(TlsVersion::Tls12),
            "TLSV1.3" | "TLS1.3" => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::InvalidVersion(s.to_string())),
        }
    }

    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(&self) -> openssl::ssl::SslVersion {
        use openssl::ssl::SslVersion;
        match self {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    /// Get version as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls10 => "TLSv1.0",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TLS version: {0}")]
    InvalidVersion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Client TLS configuration
///
/// Plain settings; the OpenSSL context is only built when a connection
/// first needs it, so building a configuration never fails.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub(crate) min_version: Option<TlsVersion>,
    pub(crate) max_version: Option<TlsVersion>,
    pub(crate) cipher_list: Option<String>,
    pub(crate) ciphersuites: Option<String>,
    pub(crate) alpn: Vec<String>,
    pub(crate) servername: Option<String>,
    pub(crate) verify_peer: bool,
    pub(crate) ca_file: Option<PathBuf>,
    pub(crate) cert_file: Option<PathBuf>,
}

impl TlsConfig {
    /// Create a new client configuration builder
    pub fn client() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// SNI / verification name overriding the connection's remote host
    pub fn servername(&self) -> Option<&str> {
        self.servername.as_deref()
    }

    /// Whether the peer certificate and host name are verified
    pub fn verify_peer(&self) -> bool {
        self.verify_peer
    }

    /// Build the OpenSSL context for these settings
    pub fn build_context(&self) -> Result<SslContext, TlsError> {
        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_client())?;

        if let Some(min) = self.min_version {
            ctx_builder.set_min_proto_version(Some(min.to_openssl_version()))?;
        }
        if let Some(max) = self.max_version {
            ctx_builder.set_max_proto_version(Some(max.to_openssl_version()))?;
        }
        if let Some(ref ciphers) = self.cipher_list {
            ctx_builder.set_cipher_list(ciphers)?;
        }
        if let Some(ref ciphers) = self.ciphersuites {
            ctx_builder.set_ciphersuites(ciphers)?;
        }

        if !self.alpn.is_empty() {
            ctx_builder.set_alpn_protos(&encode_alpn(&self.alpn)?)?;
        }

        if self.verify_peer {
            ctx_builder.set_verify(SslVerifyMode::PEER);
            match self.ca_file {
                Some(ref path) => ctx_builder.set_ca_file(path)?,
                None => ctx_builder.set_default_verify_paths()?,
            }
        } else {
            ctx_builder.set_verify(SslVerifyMode::NONE);
        }

        if let Some(ref path) = self.cert_file {
            load_cert_and_key(&mut ctx_builder, path)?;
        }

        Ok(ctx_builder.build())
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfigBuilder::default().build()
    }
}

/// Encode ALPN protocols (length-prefixed)
fn encode_alpn(protocols: &[String]) -> Result<Vec<u8>, TlsError> {
    let mut alpn_bytes = Vec::new();
    for proto in protocols {
        let len = u8::try_from(proto.len())
            .ok()
            .filter(|len| *len > 0)
            .ok_or_else(|| TlsError::InvalidConfig(format!("Invalid ALPN protocol: {:?}", proto)))?;
        alpn_bytes.push(len);
        alpn_bytes.extend_from_slice(proto.as_bytes());
    }
    Ok(alpn_bytes)
}

/// Load a certificate and its private key from one PEM file
fn load_cert_and_key(ctx_builder: &mut SslContextBuilder, path: &Path) -> Result<(), TlsError> {
    let cert_pem = fs::read(path)?;

    let cert = X509::from_pem(&cert_pem)
        .map_err(|e| TlsError::Certificate(format!("Failed to load certificate: {}", e)))?;
    ctx_builder.set_certificate(&cert)?;

    let key = PKey::private_key_from_pem(&cert_pem)
        .map_err(|e| TlsError::Certificate(format!("Failed to load private key: {}", e)))?;
    ctx_builder.set_private_key(&key)?;

    Ok(())
}

/// Client configuration builder
#[derive(Debug, Clone)]
pub struct TlsConfigBuilder {
    min_version: Option<TlsVersion>,
    max_version: Option<TlsVersion>,
    cipher_list: Option<String>,
    ciphersuites: Option<String>,
    alpn: Vec<String>,
    servername: Option<String>,
    verify_peer: bool,
    ca_file: Option<PathBuf>,
    cert_file: Option<PathBuf>,
}

impl Default for TlsConfigBuilder {
    fn default() -> Self {
        TlsConfigBuilder {
            min_version: None,
            max_version: None,
            cipher_list: None,
            ciphersuites: None,
            alpn: Vec::new(),
            servername: None,
            verify_peer: true,
            ca_file: None,
            cert_file: None,
        }
    }
}

impl TlsConfigBuilder {
    /// Set TLS version (both min and max)
    pub fn version(self, version: TlsVersion) -> Self {
        self.version_range(version, version)
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.min_version = Some(min);
        self.max_version = Some(max);
        self
    }

    /// Set cipher list (for TLS <= 1.2)
    pub fn cipher_list(mut self, ciphers: impl Into<String>) -> Self {
        self.cipher_list = Some(ciphers.into());
        self
    }

    /// Set cipher suites (for TLS 1.3)
    pub fn ciphersuites(mut self, ciphers: impl Into<String>) -> Self {
        self.ciphersuites = Some(ciphers.into());
        self
    }

    /// Set ALPN protocols
    pub fn alpn(mut self, protocols: &[&str]) -> Self {
        self.alpn = protocols.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Set SNI servername
    pub fn servername(mut self, name: impl Into<String>) -> Self {
        self.servername = Some(name.into());
        self
    }

    /// Enable/disable peer certificate verification
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    /// Trust the certificates in this PEM file instead of the system store
    pub fn ca_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.ca_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load client certificate and key from one PEM file
    pub fn cert_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cert_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Build the TLS configuration
    pub fn build(self) -> TlsConfig {
        TlsConfig {
            min_version: self.min_version,
            max_version: self.max_version,
            cipher_list: self.cipher_list,
            ciphersuites: self.ciphersuites,
            alpn: self.alpn,
            servername: self.servername,
            verify_peer: self.verify_peer,
            ca_file: self.ca_file,
            cert_file: self.cert_file,
        }
    }
}
