//! HTTP request types
//!
//! This module defines the request method and the request itself, and
//! serializes requests into their HTTP/1.1 wire form.

use super::url::Target;
use super::{Error, Headers, Result, CRLF, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT};
use std::borrow::Cow;
use std::fmt;

/// HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    /// Parse method from string (case-insensitive)
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "CONNECT" => Ok(Method::Connect),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            "PATCH" => Ok(Method::Patch),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }

    /// Convert method to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: Method,
    host: String,
    port: u16,
    secure: bool,
    resource: String,
    headers: Headers,
    body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Create a builder for constructing requests
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    /// Start a builder aimed at a parsed URL target
    pub fn for_target(target: Target) -> HttpRequestBuilder {
        HttpRequestBuilder::default()
            .host(target.host)
            .port(target.port)
            .secure(target.secure)
            .resource(target.resource)
    }

    /// Get the request method
    pub fn method(&self) -> Method {
        self.method
    }

    /// Get the remote host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the remote port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Check if the request goes over TLS
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Get the resource (path and query)
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Get the caller's headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get the request body
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// The host as written in a `Host` header; IPv6 literals get brackets
    fn host_authority(&self) -> Cow<'_, str> {
        if self.host.contains(':') && !self.host.starts_with('[') {
            Cow::Owned(format!("[{}]", self.host))
        } else {
            Cow::Borrowed(&self.host)
        }
    }

    /// Serialize the request to wire format
    ///
    /// `Host` comes first unless the caller supplied one, and
    /// `Connection: close` is injected unless the caller supplied a
    /// `Connection` header. A body without a caller-supplied
    /// `Content-Length` gets one.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut wire = Vec::new();

        wire.extend_from_slice(format!("{} {} HTTP/1.1{}", self.method, self.resource, CRLF).as_bytes());

        if !self.headers.contains("Host") {
            wire.extend_from_slice(format!("Host: {}{}", self.host_authority(), CRLF).as_bytes());
        }
        if !self.headers.contains("Connection") {
            wire.extend_from_slice(format!("Connection: close{}", CRLF).as_bytes());
        }

        for (name, value) in self.headers.iter() {
            wire.extend_from_slice(format!("{}: {}{}", name, value, CRLF).as_bytes());
        }

        if let Some(ref body) = self.body {
            if !self.headers.contains("Content-Length") {
                wire.extend_from_slice(format!("Content-Length: {}{}", body.len(), CRLF).as_bytes());
            }
        }

        wire.extend_from_slice(CRLF.as_bytes());

        if let Some(ref body) = self.body {
            wire.extend_from_slice(body);
        }

        wire
    }
}

/// HTTP request builder
#[derive(Debug, Clone, Default)]
pub struct HttpRequestBuilder {
    method: Method,
    host: String,
    port: Option<u16>,
    secure: bool,
    resource: Option<String>,
    headers: Headers,
    body: Option<Vec<u8>>,
}

impl HttpRequestBuilder {
    /// Set the method
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the remote host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the remote port; defaults to 80, or 443 when secure
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Send over TLS
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the resource; defaults to `/`
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl AsRef<str>) -> Self {
        self.headers.merge(name, value);
        self
    }

    /// Add several headers
    pub fn headers<N: AsRef<str>, V: AsRef<str>>(mut self, headers: &[(N, V)]) -> Self {
        for (name, value) in headers {
            self.headers.merge(name.as_ref(), value);
        }
        self
    }

    /// Set the body
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Build the request
    pub fn build(self) -> HttpRequest {
        let default_port = if self.secure { DEFAULT_HTTPS_PORT } else { DEFAULT_HTTP_PORT };
        HttpRequest {
            method: self.method,
            host: self.host,
            port: self.port.unwrap_or(default_port),
            secure: self.secure,
            resource: self.resource.unwrap_or_else(|| "/".to_string()),
            headers: self.headers,
            body: self.body,
        }
    }
}
