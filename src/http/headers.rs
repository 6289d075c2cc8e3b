//! Header map with case-insensitive name lookup.

use std::fmt;

/// Well-known header names used by the cache layer and the REST resource.
pub mod names {
    pub const ALLOW: &str = "Allow";
    pub const CACHE_CONTROL: &str = "Cache-Control";
    pub const CONNECTION: &str = "Connection";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const ETAG: &str = "ETag";
    pub const HOST: &str = "Host";
    pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
    pub const IF_NONE_MATCH: &str = "If-None-Match";
    pub const LAST_MODIFIED: &str = "Last-Modified";
    pub const LOCATION: &str = "Location";

    /// Local-cache-status, stamped by the client cache layer on every response.
    pub const CLIENT_CACHE: &str = "x-cachelens-client";
    /// Origin-cache-status, present only when the server evaluated validators.
    pub const SERVER_CACHE: &str = "x-cachelens-server";
}

/// A case-insensitive, multi-value header map.
///
/// Insertion order is preserved and a name may carry several values, the way
/// HTTP/1.1 header fields behave on the wire.
///
/// ```
/// use cachelens::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("ETag", "W/\"1-100\"");
/// headers.set("etag", "W/\"1-200\"");
///
/// assert_eq!(headers.get("ETAG"), Some("W/\"1-200\""));
/// assert_eq!(headers.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects parsed header fields, skipping values that are not UTF-8.
    pub(crate) fn from_wire(fields: &[httparse::Header<'_>]) -> Self {
        Self {
            inner: fields
                .iter()
                .filter_map(|h| {
                    let value = std::str::from_utf8(h.value).ok()?;
                    Some((h.name.to_owned(), value.to_owned()))
                })
                .collect(),
        }
    }

    /// Appends a header entry. Multiple values for the same name are preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces every value of `name` with a single `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.inner.push((name, value.into()));
    }

    /// Returns the first value for the given header name, or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for the given header name.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all entries with the given name. Returns `true` if any were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns the total number of entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copies every value of `name` from `other`, replacing what was here.
    pub fn copy_from(&mut self, other: &Headers, name: &str) {
        let values: Vec<String> = other.get_all(name).map(str::to_owned).collect();
        if values.is_empty() {
            return;
        }
        self.remove(name);
        for value in values {
            self.inner.push((name.to_owned(), value));
        }
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.insert("Last-Modified", "Tue, 01 Jan 2030 00:00:00 GMT");
        assert!(h.get("last-modified").is_some());
        assert!(h.contains("LAST-MODIFIED"));
        assert!(!h.contains("etag"));
    }

    #[test]
    fn set_replaces_all_previous_values() {
        let mut h = Headers::new();
        h.insert("x-cachelens-client", "miss");
        h.insert("X-Cachelens-Client", "miss");
        h.set("x-cachelens-client", "hit");
        let vals: Vec<_> = h.get_all("x-cachelens-client").collect();
        assert_eq!(vals, vec!["hit"]);
    }

    #[test]
    fn copy_from_keeps_existing_when_source_lacks_header() {
        let mut target = Headers::new();
        target.insert("ETag", "W/\"a\"");
        let source = Headers::new();
        target.copy_from(&source, "ETag");
        assert_eq!(target.get("etag"), Some("W/\"a\""));

        let mut source = Headers::new();
        source.insert("etag", "W/\"b\"");
        target.copy_from(&source, "ETag");
        assert_eq!(target.get("etag"), Some("W/\"b\""));
        assert_eq!(target.len(), 1);
    }

    #[test]
    fn display_is_wire_format() {
        let mut h = Headers::new();
        h.insert("Host", "localhost");
        assert_eq!(h.to_string(), "Host: localhost\r\n");
    }
}
