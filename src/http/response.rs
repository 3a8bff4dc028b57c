//! The response half of a request, and its reuse contract.
//!
//! A `Response` owns the connection's write half for the lifetime of one
//! request. Whichever way it completes, it reports back to the pipeline
//! whether the stream can carry another request; the pipeline either
//! re-arms on the same stream or closes it.

use crate::{errors::reason_phrase, stream::Stream};
use std::io;
use tokio::{
    io::{AsyncWriteExt, WriteHalf},
    sync::oneshot,
};

/// What a finished response reports back to the connection pipeline.
pub(crate) struct Done {
    pub(crate) stream: Option<WriteHalf<Stream>>,
    pub(crate) reusable: bool,
}

/// An in-flight response bound to one request's connection.
///
/// Handlers receive a `Response` when a request is dispatched. A handler
/// claims the request by keeping the response, either finishing it in
/// place or moving it into a spawned task to finish later; the connection
/// reads no further request until the response completes. Returning the
/// response from the handler declines the request and passes it on.
///
/// Dropping an unfinished response closes the connection.
pub struct Response {
    stream: Option<WriteHalf<Stream>>,
    done: Option<oneshot::Sender<Done>>,
    method: String,
    origin: Option<String>,
}

impl Response {
    pub(crate) fn new(
        stream: WriteHalf<Stream>,
        done: oneshot::Sender<Done>,
        method: &str,
        origin: Option<&str>,
    ) -> Self {
        Self {
            stream: Some(stream),
            done: Some(done),
            method: method.to_owned(),
            origin: origin.map(str::to_owned),
        }
    }

    /// Method of the request being answered. A `HEAD` response carries
    /// headers only; [`reply`](Self::reply) suppresses the body.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Origin of the request being answered, as `"<protocol>://<host>"`.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Writes a complete response and keeps the connection reusable.
    ///
    /// `Content-Length` and `Connection: keep-alive` are added
    /// automatically. For a `HEAD` request the body is measured but not
    /// written.
    pub async fn reply(
        mut self,
        status: u16,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> io::Result<()> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", status, reason_phrase(status));
        for (name, value) in headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        head.push_str("Connection: keep-alive\r\n\r\n");

        let mut bytes = head.into_bytes();
        if self.method != "HEAD" {
            bytes.extend_from_slice(body);
        }

        let result = self.write(&bytes).await;
        self.complete(result.is_ok());
        result
    }

    /// Writes a bare error response and closes the connection.
    pub async fn error(mut self, status: u16) -> io::Result<()> {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            status,
            reason_phrase(status)
        );

        let result = self.write(head.as_bytes()).await;
        self.complete(false);
        result
    }

    /// Detaches the connection's write half for protocols that take over
    /// the stream. The connection is no longer reusable for HTTP.
    pub fn take_stream(mut self) -> Option<WriteHalf<Stream>> {
        let stream = self.stream.take();
        self.complete(false);
        stream
    }

    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        };
        stream.write_all(bytes).await?;
        stream.flush().await
    }

    fn complete(&mut self, reusable: bool) {
        if let Some(done) = self.done.take() {
            let _ = done.send(Done {
                stream: self.stream.take(),
                reusable,
            });
        }
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        // A response abandoned without completing closes its connection.
        self.complete(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, split, AsyncReadExt};

    fn response(method: &str) -> (Response, oneshot::Receiver<Done>, tokio::io::DuplexStream) {
        let (server, client) = duplex(4096);
        let (_, writer) = split(Stream::Memory(server));
        let (tx, rx) = oneshot::channel();
        (
            Response::new(writer, tx, method, Some("http://example.com")),
            rx,
            client,
        )
    }

    async fn read_all(client: &mut tokio::io::DuplexStream) -> String {
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn reply_is_reusable() {
        let (response, done, mut client) = response("GET");

        response
            .reply(200, &[("Content-Type", "text/plain")], b"hello")
            .await
            .unwrap();

        let done = done.await.unwrap();
        assert!(done.reusable);
        assert!(done.stream.is_some());
        drop(done);

        let written = read_all(&mut client).await;
        assert!(written.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(written.contains("Content-Type: text/plain\r\n"));
        assert!(written.contains("Content-Length: 5\r\n"));
        assert!(written.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn head_reply_omits_body() {
        let (response, done, mut client) = response("HEAD");

        response.reply(200, &[], b"hello").await.unwrap();
        drop(done.await.unwrap());

        let written = read_all(&mut client).await;
        assert!(written.contains("Content-Length: 5\r\n"));
        assert!(written.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn error_closes() {
        let (response, done, mut client) = response("GET");

        response.error(404).await.unwrap();

        let done = done.await.unwrap();
        assert!(!done.reusable);
        drop(done);

        let written = read_all(&mut client).await;
        assert!(written.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(written.contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn dropped_response_completes_unreusable() {
        let (response, done, _client) = response("GET");

        drop(response);

        let done = done.await.unwrap();
        assert!(!done.reusable);
        assert!(done.stream.is_some());
    }

    #[tokio::test]
    async fn take_stream_detaches() {
        let (response, done, _client) = response("GET");

        let stream = response.take_stream();
        assert!(stream.is_some());

        let done = done.await.unwrap();
        assert!(!done.reusable);
        assert!(done.stream.is_none());
    }
}
