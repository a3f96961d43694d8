//! Request targets
//!
//! Turns an absolute `http://` or `https://` URL into the host, port,
//! security flag and resource a request needs.

use super::{Error, Result, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT};
use url::{Host, Url};

/// Where a request goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    /// Path plus query, as sent on the request line
    pub resource: String,
}

impl Target {
    /// Parse `scheme://host[:port][/path][?query]`
    ///
    /// Only `http` and `https` are accepted. Without an explicit port the
    /// scheme's default (80 or 443) is used.
    pub fn parse(input: &str) -> Result<Target> {
        let url = Url::parse(input).map_err(|e| Error::InvalidUrl(format!("{}: {}", input, e)))?;

        let secure = match url.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(Error::UnsupportedScheme(other.to_string())),
        };

        let host = match url.host() {
            Some(Host::Domain(name)) => name.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            // Brackets are URL syntax, not part of the address
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(Error::InvalidUrl(format!("{}: missing host", input))),
        };

        let default_port = if secure { DEFAULT_HTTPS_PORT } else { DEFAULT_HTTP_PORT };
        let port = url.port().unwrap_or(default_port);

        let mut resource = url.path().to_string();
        if let Some(query) = url.query() {
            resource.push('?');
            resource.push_str(query);
        }

        Ok(Target {
            host,
            port,
            secure,
            resource,
        })
    }
}
