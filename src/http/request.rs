//! The in-memory request object handed to handlers.

use crate::http::{cookie, parse::HeaderMap};

/// Connection facts delivered out-of-band by an upstream terminator.
///
/// A TLS-terminating proxy in front of the server knows things the plain
/// socket cannot: whether the outer connection used TLS, the address it
/// came from, and possibly a client certificate. When such a terminator
/// hands a connection over (see [`Server::adopt_stream`]) it may attach
/// this bag, and the request surfaces it to handlers. Without a terminator
/// every accessor reports nothing and the protocol stays `"http"`.
///
/// [`Server::adopt_stream`]: crate::Server::adopt_stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerMetadata {
    /// Whether the outer connection was TLS.
    pub tls: bool,
    /// Address the connection originated from, as seen by the terminator.
    pub origin_ip: Option<String>,
    /// PEM client certificate presented to the terminator, if any.
    pub client_certificate: Option<String>,
}

/// A single parsed HTTP request.
///
/// Built by the connection pipeline once the request head has been fully
/// received and validated, then broadcast to the registered handlers.
///
/// The target string is never mutated: `path()` and `query()` are views
/// into it, tracked by offsets. `path()` starts after the server's
/// configured URL root, so with a root of `/app` a request for
/// `/app/index` reports the path `/index`.
#[derive(Debug)]
pub struct Request {
    method: String,
    target: String,
    path_start: usize,
    query_start: Option<usize>,
    headers: HeaderMap,
    host: Option<String>,
    protocol: &'static str,
    origin: Option<String>,
    metadata: Option<PeerMetadata>,
    buffer: Vec<u8>,
}

impl Request {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        method: String,
        target: String,
        path_start: usize,
        headers: HeaderMap,
        host: Option<String>,
        protocol: &'static str,
        origin: Option<String>,
        metadata: Option<PeerMetadata>,
        buffer: Vec<u8>,
    ) -> Self {
        Self {
            method,
            target,
            path_start,
            query_start: None,
            headers,
            host,
            protocol,
            origin,
            metadata,
            buffer,
        }
    }

    /// Splits the target at the first `?`, after which `path()` stops
    /// before it and `query()` reports the remainder.
    pub(crate) fn split_query(&mut self) {
        if self.query_start.is_none() {
            if let Some(pos) = self.target.find('?') {
                self.query_start = Some(pos + 1);
            }
        }
    }
}

// Public API
impl Request {
    /// Request method, `GET` or `HEAD`.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The full request target as received, including the URL root and any
    /// query string.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The target with the server's URL root stripped.
    ///
    /// Until the default resource dispatch splits the query off, this still
    /// includes the `?query` suffix.
    pub fn path(&self) -> &str {
        match self.query_start {
            Some(query) => &self.target[self.path_start..query - 1],
            None => &self.target[self.path_start..],
        }
    }

    /// The query string after the first `?`, once split.
    pub fn query(&self) -> Option<&str> {
        self.query_start.map(|query| &self.target[query..])
    }

    /// All request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Case-insensitive single header lookup.
    pub fn lookup_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The `Host` header value, when present and non-empty.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// `"https"` when the upstream terminator reported TLS, else `"http"`.
    pub fn protocol(&self) -> &str {
        self.protocol
    }

    /// `"<protocol>://<host>"`, when the request carried a host.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Metadata attached by an upstream terminator, if any.
    pub fn metadata(&self) -> Option<&PeerMetadata> {
        self.metadata.as_ref()
    }

    /// The connection's origin address as reported by the terminator.
    pub fn origin_ip(&self) -> Option<&str> {
        self.metadata.as_ref()?.origin_ip.as_deref()
    }

    /// The client certificate captured by the terminator.
    pub fn client_certificate(&self) -> Option<&str> {
        self.metadata.as_ref()?.client_certificate.as_deref()
    }

    /// Extracts a named cookie from the request headers.
    pub fn parse_cookie(&self, name: &str) -> Option<String> {
        cookie::parse_cookie(&self.headers, name)
    }

    /// Input bytes received after this request's head.
    ///
    /// Normally empty; on a pipelined connection it holds the next
    /// request's bytes. A handler that takes over the stream reads the
    /// remainder from here first.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Takes ownership of the unconsumed input bytes.
    pub fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(target: &str, path_start: usize) -> Request {
        Request::new(
            "GET".to_owned(),
            target.to_owned(),
            path_start,
            HeaderMap::new(),
            Some("example.com".to_owned()),
            "http",
            Some("http://example.com".to_owned()),
            None,
            Vec::new(),
        )
    }

    #[test]
    fn path_view_strips_url_root() {
        let req = request("/app/index", "/app".len());
        assert_eq!(req.path(), "/index");
        assert_eq!(req.target(), "/app/index");
        assert_eq!(req.target().len(), "/app".len() + req.path().len());
    }

    #[test]
    fn query_split_preserves_target() {
        let mut req = request("/index?a=1&b=2", 0);
        assert_eq!(req.path(), "/index?a=1&b=2");
        assert_eq!(req.query(), None);

        req.split_query();
        assert_eq!(req.path(), "/index");
        assert_eq!(req.query(), Some("a=1&b=2"));
        assert_eq!(req.target(), "/index?a=1&b=2");
    }

    #[test]
    fn split_without_query_is_noop() {
        let mut req = request("/plain", 0);
        req.split_query();
        assert_eq!(req.path(), "/plain");
        assert_eq!(req.query(), None);
    }

    #[test]
    fn metadata_accessors() {
        let mut req = request("/", 0);
        assert_eq!(req.origin_ip(), None);
        assert_eq!(req.client_certificate(), None);

        req.metadata = Some(PeerMetadata {
            tls: true,
            origin_ip: Some("192.0.2.7".to_owned()),
            client_certificate: None,
        });
        assert_eq!(req.origin_ip(), Some("192.0.2.7"));
        assert_eq!(req.client_certificate(), None);
    }

    #[test]
    fn buffer_hand_off() {
        let mut req = request("/", 0);
        req.buffer = b"GET /next HTTP/1.1\r\n".to_vec();

        assert!(!req.buffer().is_empty());
        let taken = req.take_buffer();
        assert_eq!(taken, b"GET /next HTTP/1.1\r\n");
        assert!(req.buffer().is_empty());
    }
}
