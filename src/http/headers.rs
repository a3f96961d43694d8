//! HTTP headers handling
//!
//! Headers keep their insertion order. Names compare case-insensitively,
//! and a repeated name is merged into the existing entry by joining the
//! values with a comma.

use super::{Error, Result};
use std::fmt;

/// HTTP headers collection
#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: Vec<(String, String)>,
    /// Index of the entry the most recent header line went into
    last: Option<usize>,
}

impl Headers {
    /// Create a new empty headers collection
    pub fn new() -> Self {
        Headers {
            headers: Vec::new(),
            last: None,
        }
    }

    /// Merge a header
    ///
    /// If a header with the same name (case-insensitive) already exists,
    /// the value is appended to it, comma-separated.
    pub fn merge(&mut self, name: impl Into<String>, value: impl AsRef<str>) {
        let name = name.into();
        let value = value.as_ref();

        match self.position(&name) {
            Some(index) => {
                let existing = &mut self.headers[index].1;
                existing.push_str(", ");
                existing.push_str(value);
                self.last = Some(index);
            }
            None => {
                self.headers.push((name, value.to_string()));
                self.last = Some(self.headers.len() - 1);
            }
        }
    }

    /// Set a header, replacing any existing value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.position(&name) {
            Some(index) => self.headers[index].1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Append a folded continuation line to the header merged last.
    ///
    /// The fragment is appended as is, leading whitespace included.
    /// Returns `false` if there is no header to continue.
    pub fn fold(&mut self, fragment: &str) -> bool {
        match self.last.and_then(|index| self.headers.get_mut(index)) {
            Some((_, value)) => {
                value.push_str(fragment);
                true
            }
            None => false,
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Get the value of a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check if a header exists
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove a header (case-insensitive); returns its value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self.position(name)?;
        self.last = match self.last {
            Some(last) if last == pos => None,
            Some(last) if last > pos => Some(last - 1),
            other => other,
        };
        Some(self.headers.remove(pos).1)
    }

    /// Get the number of headers
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Check if there are no headers
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Clear all headers
    pub fn clear(&mut self) {
        self.headers.clear();
        self.last = None;
    }

    /// Iterate over all headers
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Parse a header line into name and value
    ///
    /// Splits on the first colon and strips one leading space from the
    /// value; anything else is kept verbatim.
    pub fn parse_header_line(line: &str) -> Result<(String, String)> {
        let Some(colon_pos) = line.find(':') else {
            return Err(Error::InvalidHeader(format!("No colon in header: {}", line)));
        };

        let name = line[..colon_pos].trim();
        if name.is_empty() {
            return Err(Error::InvalidHeader("Empty header name".to_string()));
        }

        let value = &line[colon_pos + 1..];
        let value = value.strip_prefix(' ').unwrap_or(value);
        Ok((name.to_string(), value.to_string()))
    }
}

impl PartialEq for Headers {
    fn eq(&self, other: &Self) -> bool {
        self.headers == other.headers
    }
}

impl Eq for Headers {}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            writeln!(f, "{}: {}", name, value)?;
        }
        Ok(())
    }
}

impl<N: Into<String>, V: AsRef<str>> FromIterator<(N, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.merge(name, value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_and_get() {
        let mut headers = Headers::new();
        headers.merge("Server", "nginx");
        headers.merge("Content-Length", "1256");

        assert_eq!(headers.get("Server"), Some("nginx"));
        assert_eq!(headers.get("Content-Length"), Some("1256"));
        assert_eq!(headers.get("Date"), None);
    }

    #[test]
    fn test_case_insensitive() {
        let mut headers = Headers::new();
        headers.merge("transfer-encoding", "chunked");

        assert_eq!(headers.get("Transfer-Encoding"), Some("chunked"));
        assert!(headers.contains("TRANSFER-ENCODING"));
    }

    #[test]
    fn test_repeated_names_comma_joined() {
        let mut headers = Headers::new();
        headers.merge("Set-Cookie", "a=1");
        headers.merge("set-cookie", "b=2");
        headers.merge("SET-COOKIE", "c=3");

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Set-Cookie"), Some("a=1, b=2, c=3"));
    }

    #[test]
    fn test_set_replaces() {
        let mut headers = Headers::new();
        headers.merge("X-Custom", "first");
        headers.set("x-custom", "second");

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-Custom"), Some("second"));
    }

    #[test]
    fn test_fold() {
        let mut headers = Headers::new();
        assert!(!headers.fold(" orphan"));

        headers.merge("X-Long", "part one");
        headers.merge("X-Other", "x");
        assert!(headers.fold("\tpart two"));
        assert_eq!(headers.get("X-Other"), Some("x\tpart two"));
        assert_eq!(headers.get("X-Long"), Some("part one"));
    }

    #[test]
    fn test_remove() {
        let mut headers = Headers::new();
        headers.merge("Connection", "close");
        headers.merge("Host", "example.com");

        assert_eq!(headers.remove("connection").as_deref(), Some("close"));
        assert_eq!(headers.remove("Connection"), None);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_iter_keeps_order() {
        let headers: Headers = [("A", "1"), ("B", "2"), ("C", "3")].into_iter().collect();

        let collected: Vec<_> = headers.iter().collect();
        assert_eq!(collected, vec![("A", "1"), ("B", "2"), ("C", "3")]);
    }

    #[test]
    fn test_parse_header_line() {
        let (name, value) = Headers::parse_header_line("Content-Type: text/html").unwrap();
        assert_eq!(name, "Content-Type");
        assert_eq!(value, "text/html");

        // Only one leading space is stripped
        let (name, value) = Headers::parse_header_line("X-Custom:  value ").unwrap();
        assert_eq!(name, "X-Custom");
        assert_eq!(value, " value ");

        let (_, value) = Headers::parse_header_line("Location: http://example.com:8080/").unwrap();
        assert_eq!(value, "http://example.com:8080/");

        assert!(Headers::parse_header_line("Invalid").is_err());
        assert!(Headers::parse_header_line(": value").is_err());
    }

    #[test]
    fn test_no_header_cap() {
        let mut headers = Headers::new();
        for i in 0..100 {
            headers.merge(format!("Header-{}", i), "value");
        }
        headers.set("X-Set", "1");
        assert_eq!(headers.len(), 101);
        assert_eq!(headers.get("Header-99"), Some("value"));
        assert_eq!(headers.get("X-Set"), Some("1"));
    }

    #[test]
    fn test_fold_follows_merged_entry() {
        let mut headers = Headers::new();
        headers.merge("Via", "a");
        headers.merge("X-Other", "x");
        headers.merge("via", "b");
        assert!(headers.fold(" c"));

        assert_eq!(headers.get("Via"), Some("a, b c"));
        assert_eq!(headers.get("X-Other"), Some("x"));
    }

    #[test]
    fn test_fold_after_remove() {
        let mut headers = Headers::new();
        headers.merge("A", "1");
        headers.merge("B", "2");
        headers.remove("A");
        assert!(headers.fold(" more"));
        assert_eq!(headers.get("B"), Some("2 more"));

        headers.remove("B");
        assert!(!headers.fold(" orphan"));
    }
}
