//! webfront - embeddable HTTP/1.x front-end with first-claim handler dispatch
//!
//! A small server core for services that sit behind their own edge: it
//! accepts TCP (or pre-bound file-descriptor) connections, parses GET/HEAD
//! requests into an in-memory [`Request`], and broadcasts each one to
//! registered handlers. There is no router: handlers claim requests, and
//! whatever nobody claims is answered with 404.
//!
//! # What it does
//!
//! - **Bounded, incremental parsing** - requests are read non-blocking into
//!   a buffer capped at twice the request maximum; a head that never
//!   completes costs the client its connection, not the server its memory.
//! - **Delayed error replies** - validation failures are remembered while
//!   the framing is consumed, then answered with a single error response.
//! - **Connection reuse** - each [`Response`] reports whether its stream
//!   can carry another request; pipelined requests are served in order.
//! - **URL-root stripping** - a configured prefix is removed from every
//!   target before dispatch; requests outside the root get a 404.
//! - **Terminator hand-off** - a TLS-terminating front can pass
//!   connections in with [`PeerMetadata`] (TLS flag, origin address,
//!   client certificate), surfaced to handlers on the request.
//!
//! Deliberately out of scope: TLS itself, request bodies, HTTP/2, virtual
//! hosting, static files, and authentication.
//!
//! # Usage example
//!
//! ```no_run
//! use webfront::{HeaderMap, Response, Server};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::new();
//!
//!     server.on_resource(
//!         Some("/ping/"),
//!         |_path: &str, _: &HeaderMap, response: Response| -> Result<(), Response> {
//!             tokio::spawn(async move {
//!                 let _ = response.reply(200, &[], b"pong").await;
//!             });
//!             Ok(())
//!         },
//!     );
//!
//!     let port = server.add_inet_listener(None, 0)?;
//!     eprintln!("listening on port {port}");
//!     server.start();
//!
//!     std::future::pending::<()>().await;
//!     Ok(())
//! }
//! ```
pub(crate) mod http {
    pub(crate) mod accept;
    pub(crate) mod cookie;
    pub(crate) mod parse;
    pub(crate) mod request;
    pub(crate) mod response;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod dispatch;
    pub(crate) mod server_impl;
}
pub(crate) mod errors;
pub mod limits;
pub(crate) mod stream;

pub use crate::{
    http::{
        accept::parse_accept_list,
        cookie::parse_cookie,
        parse::HeaderMap,
        request::{PeerMetadata, Request},
        response::Response,
    },
    server::{
        dispatch::{ResourceHandler, StreamHandler},
        server_impl::Server,
    },
    stream::Stream,
};
