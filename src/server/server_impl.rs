//! The server: listeners, configuration, and the live-request set.

use crate::{
    http::request::PeerMetadata,
    limits::REQUEST_MAXIMUM,
    server::{
        connection::Connection,
        dispatch::{HandlerRegistry, ResourceHandler, StreamHandler},
    },
    stream::Stream,
};
use log::debug;
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    future::Future,
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};
use tokio::{
    io::{duplex, DuplexStream},
    net::{TcpListener, TcpStream},
    task::JoinSet,
};

#[cfg(unix)]
use std::os::fd::OwnedFd;

/// An embeddable HTTP/1.x front-end.
///
/// The server owns its listeners and every live request; handlers are
/// registered with [`on_stream`](Self::on_stream) and
/// [`on_resource`](Self::on_resource) and receive requests by first-claim
/// broadcast. It is constructed stopped: add listeners, register handlers,
/// then call [`start`](Self::start).
///
/// `Server` is a cheap handle; clones share the same state. Methods that
/// create listeners or connections must run inside a tokio runtime.
///
/// # Examples
///
/// ```no_run
/// use webfront::{HeaderMap, Response, Server};
///
/// #[tokio::main]
/// async fn main() -> std::io::Result<()> {
///     let server = Server::new();
///     server.on_resource(
///         Some("/status/"),
///         |_path: &str, _: &HeaderMap, response: Response| -> Result<(), Response> {
///             tokio::spawn(async move {
///                 let _ = response.reply(200, &[], b"ok").await;
///             });
///             Ok(())
///         },
///     );
///
///     let port = server.add_inet_listener(None, 0)?;
///     println!("listening on {port}");
///     server.start();
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Server {
    shared: Arc<ServerShared>,
}

pub(crate) struct ServerShared {
    url_root: RwLock<String>,
    forwarded_host_header: RwLock<Option<String>>,
    forwarded_protocol_header: RwLock<Option<String>>,
    forwarded_for_header: RwLock<Option<String>>,
    registry: RwLock<HandlerRegistry>,
    pending_listeners: Mutex<Vec<TcpListener>>,
    started: AtomicBool,
    tasks: Mutex<JoinSet<()>>,
}

// Every critical section below is a plain field read or write, so the data
// behind a poisoned lock is still coherent. Keep serving with it instead of
// letting one panicked holder take down every later request.
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Server {
    /// Constructs a stopped server with an empty URL root.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ServerShared {
                url_root: RwLock::new(String::new()),
                forwarded_host_header: RwLock::new(None),
                forwarded_protocol_header: RwLock::new(None),
                forwarded_for_header: RwLock::new(None),
                registry: RwLock::new(HandlerRegistry::default()),
                pending_listeners: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
                tasks: Mutex::new(JoinSet::new()),
            }),
        }
    }

    /// Sets the prefix stripped from every request target before dispatch.
    ///
    /// The stored form is normalized: surrounding slashes are removed and,
    /// when anything remains, a single `/` is prepended. Requests whose
    /// target does not begin with the root followed by `/` or end-of-string
    /// are answered with 404.
    pub fn set_url_root(&self, url_root: &str) {
        let trimmed = url_root.trim_matches('/');
        let normalized = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        *write_lock(&self.shared.url_root) = normalized;
    }

    /// The normalized URL root, or `None` when unset.
    pub fn url_root(&self) -> Option<String> {
        let url_root = read_lock(&self.shared.url_root);
        if url_root.is_empty() {
            None
        } else {
            Some(url_root.clone())
        }
    }

    /// Records the header carrying the original host behind a proxy.
    pub fn set_forwarded_host_header(&self, name: &str) {
        *write_lock(&self.shared.forwarded_host_header) = Some(name.to_owned());
    }

    /// Records the header carrying the original protocol behind a proxy.
    pub fn set_forwarded_protocol_header(&self, name: &str) {
        *write_lock(&self.shared.forwarded_protocol_header) = Some(name.to_owned());
    }

    /// Records the header carrying the original peer address behind a proxy.
    pub fn set_forwarded_for_header(&self, name: &str) {
        *write_lock(&self.shared.forwarded_for_header) = Some(name.to_owned());
    }

    pub fn forwarded_host_header(&self) -> Option<String> {
        read_lock(&self.shared.forwarded_host_header).clone()
    }

    pub fn forwarded_protocol_header(&self) -> Option<String> {
        read_lock(&self.shared.forwarded_protocol_header).clone()
    }

    pub fn forwarded_for_header(&self) -> Option<String> {
        read_lock(&self.shared.forwarded_for_header).clone()
    }

    /// Registers a handler broadcast every request before resource
    /// dispatch.
    pub fn on_stream(&self, handler: impl StreamHandler) {
        write_lock(&self.shared.registry).add_stream(Arc::new(handler));
    }

    /// Registers a resource handler.
    ///
    /// With `detail` of `Some("/component/")` the handler only sees
    /// requests whose first path component matches; `None` subscribes to
    /// every resource dispatch.
    pub fn on_resource(&self, detail: Option<&str>, handler: impl ResourceHandler) {
        write_lock(&self.shared.registry).add_resource(detail.map(str::to_owned), Arc::new(handler));
    }

    /// Binds a TCP listener and returns the bound port.
    ///
    /// With an address, binds exactly there (`port` may be 0 for an
    /// ephemeral port). With only a non-zero port, binds every address on
    /// that port. With neither, binds every address on an ephemeral port.
    pub fn add_inet_listener(&self, address: Option<IpAddr>, port: u16) -> io::Result<u16> {
        let address = SocketAddr::new(
            address.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port,
        );

        let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&address.into())?;
        socket.listen(128)?;
        socket.set_nonblocking(true)?;

        let listener = TcpListener::from_std(socket.into())?;
        let port = listener.local_addr()?.port();

        self.install_listener(listener);
        Ok(port)
    }

    /// Adopts a pre-bound, listening socket, e.g. one passed in by a
    /// service manager.
    #[cfg(unix)]
    pub fn add_fd_listener(&self, fd: OwnedFd) -> io::Result<()> {
        let socket = Socket::from(fd);
        socket.set_nonblocking(true)?;

        let listener = TcpListener::from_std(socket.into())?;
        self.install_listener(listener);
        Ok(())
    }

    /// Begins accepting on every listener added so far; listeners added
    /// later accept immediately.
    pub fn start(&self) {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let pending = std::mem::take(&mut *lock(&self.shared.pending_listeners));
        for listener in pending {
            self.shared.spawn_accept(listener);
        }
    }

    /// Synthesizes an in-memory connection to the server and returns the
    /// client side. Works whether or not the server is started; used for
    /// testing.
    pub fn connect(&self) -> DuplexStream {
        let (client, server) = duplex(4 * REQUEST_MAXIMUM);
        self.shared.start_request(Stream::Memory(server), None);
        client
    }

    /// Like [`connect`](Self::connect), with terminator metadata attached
    /// to the connection.
    pub fn connect_with_metadata(&self, metadata: PeerMetadata) -> DuplexStream {
        let (client, server) = duplex(4 * REQUEST_MAXIMUM);
        self.shared.start_request(Stream::Memory(server), Some(metadata));
        client
    }

    /// Adopts an established connection, optionally with the metadata an
    /// upstream terminator delivered for it.
    pub fn adopt_stream(&self, stream: TcpStream, metadata: Option<PeerMetadata>) {
        self.shared.start_request(Stream::Tcp(stream), metadata);
    }

    /// Tears down every live request and accept loop. Their streams are
    /// dropped with them.
    pub fn shutdown(&self) {
        lock(&self.shared.tasks).abort_all();
    }

    fn install_listener(&self, listener: TcpListener) {
        if self.shared.started.load(Ordering::SeqCst) {
            self.shared.spawn_accept(listener);
        } else {
            lock(&self.shared.pending_listeners).push(listener);
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerShared {
    pub(crate) fn url_root_raw(&self) -> String {
        read_lock(&self.url_root).clone()
    }

    pub(crate) fn stream_handlers(&self) -> Vec<Arc<dyn StreamHandler>> {
        read_lock(&self.registry).stream_handlers()
    }

    pub(crate) fn resource_handlers(&self, detail: &str) -> Vec<Arc<dyn ResourceHandler>> {
        read_lock(&self.registry).resource_handlers(detail)
    }

    fn spawn_accept(self: &Arc<Self>, listener: TcpListener) {
        let server = Arc::downgrade(self);
        self.spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let Some(server) = server.upgrade() else { return };
                        server.start_request(Stream::Tcp(stream), None);
                    }
                    Err(error) => debug!("accept failed: {error}"),
                }
            }
        });
    }

    fn start_request(self: &Arc<Self>, stream: Stream, metadata: Option<PeerMetadata>) {
        let connection = Connection::new(Arc::downgrade(self), stream, metadata);
        self.spawn(connection.run());
    }

    fn spawn(&self, future: impl Future<Output = ()> + Send + 'static) {
        let mut tasks = lock(&self.tasks);
        // Reap finished requests so the set stays bounded by live ones.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(future);
    }
}
