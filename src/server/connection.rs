//! The per-connection request pipeline.
//!
//! One task per connection drives a small state machine: read into a
//! bounded buffer, advance the incremental parser, validate, dispatch, and
//! wait for the response to report whether the stream can carry another
//! request. Validation failures are remembered as a delayed reply so a
//! single error response goes out once the framing has been consumed.

use crate::{
    errors::should_suppress_read_error,
    http::{
        parse::{self, HeaderMap, Status},
        request::{PeerMetadata, Request},
        response::{Done, Response},
    },
    limits::{self, REQUEST_MAXIMUM},
    server::{dispatch, server_impl::ServerShared},
    stream::Stream,
};
use log::{debug, error, warn};
use std::{io, sync::Weak};
use tokio::{
    io::{split, AsyncReadExt, ReadHalf, WriteHalf},
    sync::oneshot,
    time::timeout,
};

/// A fully received and validated request head.
pub(crate) struct Head {
    pub(crate) method: String,
    pub(crate) target: String,
    pub(crate) headers: HeaderMap,
    /// First validation failure, or 0. Reported once dispatch runs.
    pub(crate) delayed: u16,
}

/// Result of one attempt to advance the parser over the buffered input.
pub(crate) enum Progress {
    /// Keep reading.
    NeedsMore,
    /// Buffer exceeded twice the request maximum: close without a response.
    Oversize,
    /// Unrecoverable framing error: respond with this status and close.
    Reject(u16),
    /// Head (and any declared body) consumed from the buffer.
    Complete(Head),
}

/// Runs the parser and the validation ladder over `buffer`.
///
/// Stateless: each call re-parses from the buffer start, so it can be
/// retried after every read. On `Complete` the request head and any
/// declared body have been drained from the buffer; trailing bytes stay
/// put for the next request on a reused connection.
pub(crate) fn advance(buffer: &mut Vec<u8>) -> Progress {
    // The hard input limit, the connection is simply terminated.
    if buffer.len() > 2 * REQUEST_MAXIMUM {
        return Progress::Oversize;
    }

    let (line_consumed, method, target) = match parse::parse_request_line(buffer) {
        Status::NeedsMore => return Progress::NeedsMore,
        Status::Invalid => {
            warn!("received invalid HTTP request line");
            return Progress::Reject(400);
        }
        Status::Done {
            consumed,
            value: (method, target),
        } => (consumed, method, target),
    };

    if !target.starts_with('/') {
        warn!("received invalid HTTP path");
        return Progress::Reject(400);
    }

    let (header_consumed, headers) = match parse::parse_headers(&buffer[line_consumed..]) {
        Status::NeedsMore => return Progress::NeedsMore,
        Status::Invalid => {
            warn!("received invalid HTTP request headers");
            return Progress::Reject(400);
        }
        Status::Done { consumed, value } => (consumed, value),
    };

    let mut delayed = 0;
    let mut body_length = 0;
    if let Some(value) = headers.get("Content-Length") {
        match value.parse::<usize>() {
            Ok(0) => {}
            Ok(length) => {
                // Bodies are not supported; the 413 waits until the body is
                // drained so the framing survives on a reused connection.
                debug!("received non-zero Content-Length");
                delayed = 413;
                body_length = length;
            }
            Err(_) => {
                warn!("received invalid Content-Length");
                return Progress::Reject(400);
            }
        }
    }

    if buffer.len() < line_consumed + header_consumed + body_length {
        return Progress::NeedsMore;
    }

    if method != "GET" && method != "HEAD" {
        warn!("received unsupported HTTP method");
        if delayed == 0 {
            delayed = 405;
        }
    }

    match headers.get("Host") {
        Some(host) if !host.is_empty() => {}
        _ => {
            warn!("received HTTP request without Host header");
            if delayed == 0 {
                delayed = 400;
            }
        }
    }

    buffer.drain(..line_consumed + header_consumed + body_length);

    Progress::Complete(Head {
        method,
        target,
        headers,
        delayed,
    })
}

/// True when `path` begins with the non-empty `prefix` followed by `/` or
/// the end of the string.
pub(crate) fn path_has_prefix(path: &str, prefix: &str) -> bool {
    !prefix.is_empty()
        && path.starts_with(prefix)
        && matches!(path.as_bytes().get(prefix.len()).copied(), None | Some(b'/'))
}

enum Next {
    Again,
    Close,
}

enum ReadOutcome {
    Head(Head),
    Reject(u16),
    Close,
}

/// One live connection and its request loop.
pub(crate) struct Connection {
    server: Weak<ServerShared>,
    reader: ReadHalf<Stream>,
    writer: Option<WriteHalf<Stream>>,
    buffer: Vec<u8>,
    metadata: Option<PeerMetadata>,
}

impl Connection {
    pub(crate) fn new(
        server: Weak<ServerShared>,
        stream: Stream,
        metadata: Option<PeerMetadata>,
    ) -> Self {
        let (reader, writer) = split(stream);
        Self {
            server,
            reader,
            writer: Some(writer),
            buffer: Vec::new(),
            metadata,
        }
    }

    pub(crate) async fn run(mut self) {
        while let Next::Again = self.serve_request().await {}
        // Dropping the halves closes the stream; close failures have
        // nowhere to go and are discarded.
    }

    /// Serves one request on the connection: returns `Again` only when the
    /// response reported the stream reusable.
    async fn serve_request(&mut self) -> Next {
        let mut eof_okay = true;

        let outcome = match timeout(
            limits::request_timeout(),
            self.read_head(&mut eof_okay),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                if eof_okay {
                    debug!("request timed out, closing");
                } else {
                    warn!("request timed out, closing");
                }
                return Next::Close;
            }
        };

        match outcome {
            ReadOutcome::Head(head) => self.dispatch(head).await,
            ReadOutcome::Reject(code) => {
                if let Some((response, done)) = self.make_response("", None) {
                    if let Err(error) = response.error(code).await {
                        debug!("error response failed: {error}");
                    }
                    let _ = done.await;
                }
                Next::Close
            }
            ReadOutcome::Close => Next::Close,
        }
    }

    /// Drives reads and the parser until a head completes or the
    /// connection is done for.
    async fn read_head(&mut self, eof_okay: &mut bool) -> ReadOutcome {
        loop {
            match advance(&mut self.buffer) {
                Progress::Complete(head) => return ReadOutcome::Head(head),
                Progress::Reject(code) => return ReadOutcome::Reject(code),
                Progress::Oversize => {
                    warn!("received HTTP request that was too large");
                    return ReadOutcome::Close;
                }
                Progress::NeedsMore => {}
            }

            let received = !*eof_okay;
            let read = match self.fill_buffer().await {
                Ok(read) => read,
                Err(error) => {
                    if should_suppress_read_error(&error, received) {
                        debug!("request error: {error}");
                    } else {
                        warn!("couldn't read from socket: {error}");
                    }
                    return ReadOutcome::Close;
                }
            };

            if read == 0 {
                if received {
                    debug!("caller closed connection early");
                }
                return ReadOutcome::Close;
            }

            // Once we receive data EOF is unexpected (until a possible next
            // request).
            *eof_okay = false;
        }
    }

    /// Appends up to `REQUEST_MAXIMUM + 1` bytes to the buffer tail.
    async fn fill_buffer(&mut self) -> io::Result<usize> {
        let length = self.buffer.len();
        self.buffer.resize(length + REQUEST_MAXIMUM + 1, 0);

        let result = self.reader.read(&mut self.buffer[length..]).await;
        self.buffer
            .truncate(length + result.as_ref().copied().unwrap_or(0));
        result
    }

    async fn dispatch(&mut self, head: Head) -> Next {
        let Some(server) = self.server.upgrade() else {
            return Next::Close;
        };

        let url_root = server.url_root_raw();
        let mut delayed = head.delayed;
        if delayed == 0 && !url_root.is_empty() && !path_has_prefix(&head.target, &url_root) {
            delayed = 404;
        }

        let host = head
            .headers
            .get("Host")
            .filter(|host| !host.is_empty())
            .map(str::to_owned);
        let protocol = match &self.metadata {
            Some(metadata) if metadata.tls => "https",
            _ => "http",
        };
        let origin = host.as_ref().map(|host| format!("{protocol}://{host}"));

        let Some((response, done)) = self.make_response(&head.method, origin.as_deref()) else {
            return Next::Close;
        };

        if delayed != 0 {
            debug_assert!(delayed >= 300);
            if let Err(error) = response.error(delayed).await {
                debug!("error response failed: {error}");
            }
            return self.wait_done(done).await;
        }

        let mut request = Request::new(
            head.method,
            head.target,
            url_root.len(),
            head.headers,
            host,
            protocol,
            origin,
            self.metadata.clone(),
            self.buffer.clone(),
        );

        // See if we have any takers...
        let claimed = match dispatch::broadcast_stream(
            &server.stream_handlers(),
            &mut request,
            response,
        ) {
            Ok(()) => true,
            Err(response) => {
                self.default_handle_stream(&server, &mut request, response)
                    .await
            }
        };

        if !claimed {
            error!("no handler responded to request: {}", request.path());
        }

        self.wait_done(done).await
    }

    /// The built-in stream handler: resource dispatch keyed on the first
    /// path component, then a 404 for whatever is left.
    async fn default_handle_stream(
        &self,
        server: &ServerShared,
        request: &mut Request,
        response: Response,
    ) -> bool {
        request.split_query();

        let detail = dispatch::detail_token(request.path());
        let response = match dispatch::broadcast_resource(
            &server.resource_handlers(&detail),
            request.path(),
            request.headers(),
            response,
        ) {
            Ok(()) => return true,
            Err(response) => response,
        };

        if let Err(error) = response.error(404).await {
            debug!("error response failed: {error}");
        }
        true
    }

    /// Parks until the response completes, then re-arms or closes.
    async fn wait_done(&mut self, done: oneshot::Receiver<Done>) -> Next {
        match done.await {
            Ok(Done {
                stream: Some(writer),
                reusable: true,
            }) => {
                self.writer = Some(writer);
                Next::Again
            }
            _ => Next::Close,
        }
    }

    fn make_response(
        &mut self,
        method: &str,
        origin: Option<&str>,
    ) -> Option<(Response, oneshot::Receiver<Done>)> {
        let writer = self.writer.take()?;
        let (done_tx, done_rx) = oneshot::channel();
        Some((Response::new(writer, done_tx, method, origin), done_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(bytes: &[u8]) -> Vec<u8> {
        bytes.to_vec()
    }

    fn complete(progress: Progress) -> Head {
        match progress {
            Progress::Complete(head) => head,
            Progress::NeedsMore => panic!("unexpected NeedsMore"),
            Progress::Oversize => panic!("unexpected Oversize"),
            Progress::Reject(code) => panic!("unexpected Reject({code})"),
        }
    }

    #[test]
    fn complete_head_is_consumed() {
        let mut buf = buffer(b"GET /index HTTP/1.1\r\nHost: x\r\n\r\n");
        let head = complete(advance(&mut buf));

        assert_eq!(head.method, "GET");
        assert_eq!(head.target, "/index");
        assert_eq!(head.headers.get("Host"), Some("x"));
        assert_eq!(head.delayed, 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn trailing_bytes_stay_in_buffer() {
        let mut buf = buffer(b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /b HTTP/1.1\r\n");
        let head = complete(advance(&mut buf));

        assert_eq!(head.target, "/a");
        assert_eq!(buf, b"GET /b HTTP/1.1\r\n");
    }

    #[test]
    fn partial_head_needs_more() {
        let mut buf = buffer(b"GET /index HTTP/1.1\r\nHost: x\r\n");
        assert!(matches!(advance(&mut buf), Progress::NeedsMore));
        assert_eq!(buf.len(), b"GET /index HTTP/1.1\r\nHost: x\r\n".len());

        buf.extend_from_slice(b"\r\n");
        complete(advance(&mut buf));
    }

    #[test]
    fn invalid_request_line_rejects() {
        let mut buf = buffer(b"NOT A REQUEST LINE\r\n\r\n");
        assert!(matches!(advance(&mut buf), Progress::Reject(400)));
    }

    #[test]
    fn relative_target_rejects() {
        let mut buf = buffer(b"GET index HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(matches!(advance(&mut buf), Progress::Reject(400)));
    }

    #[test]
    fn invalid_content_length_rejects() {
        let mut buf = buffer(b"GET / HTTP/1.1\r\nHost: x\r\nContent-Length: ten\r\n\r\n");
        assert!(matches!(advance(&mut buf), Progress::Reject(400)));
    }

    #[test]
    fn body_is_drained_before_the_413() {
        let mut buf = buffer(b"GET /x HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\n");
        // Body not here yet: keep the framing open.
        assert!(matches!(advance(&mut buf), Progress::NeedsMore));

        buf.extend_from_slice(b"HELLO");
        let head = complete(advance(&mut buf));
        assert_eq!(head.delayed, 413);
        assert!(buf.is_empty(), "body bytes must be consumed");
    }

    #[test]
    fn zero_content_length_is_fine() {
        let mut buf = buffer(b"GET /x HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(complete(advance(&mut buf)).delayed, 0);
    }

    #[test]
    fn unsupported_method_after_length_check() {
        let mut buf = buffer(b"POST /x HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(complete(advance(&mut buf)).delayed, 405);

        // A declared body outranks the method error: first code wins.
        let mut buf = buffer(b"POST /x HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nHELLO");
        assert_eq!(complete(advance(&mut buf)).delayed, 413);
    }

    #[test]
    fn missing_host_is_delayed_400() {
        let mut buf = buffer(b"GET /x HTTP/1.1\r\n\r\n");
        assert_eq!(complete(advance(&mut buf)).delayed, 400);

        let mut buf = buffer(b"GET /x HTTP/1.1\r\nHost:\r\n\r\n");
        assert_eq!(complete(advance(&mut buf)).delayed, 400);
    }

    #[test]
    fn oversized_buffer_terminates() {
        let mut buf = vec![b'a'; 2 * REQUEST_MAXIMUM + 1];
        assert!(matches!(advance(&mut buf), Progress::Oversize));
    }

    #[test]
    fn url_root_prefix_rule() {
        #[rustfmt::skip]
        let cases = [
            ("/app/index", "/app", true),
            ("/app",       "/app", true),
            ("/app?q=1",   "/app", false),
            ("/appendix",  "/app", false),
            ("/other",     "/app", false),
            ("/app/index", "",     false),
        ];

        for (path, prefix, expected) in cases {
            assert_eq!(path_has_prefix(path, prefix), expected, "{path} vs {prefix}");
        }
    }
}
