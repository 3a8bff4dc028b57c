//! Handler registration and first-claim broadcast dispatch.
//!
//! The server does no routing of its own. Each parsed request is broadcast
//! to the stream handlers in registration order; the first one to claim it
//! stops the broadcast. Unclaimed requests fall through to the resource
//! handlers, keyed by the first path component, and finally to a built-in
//! 404 reply.

use crate::http::{parse::HeaderMap, request::Request, response::Response};
use std::sync::Arc;

/// A handler broadcast every request before resource dispatch.
///
/// Claim the request by keeping the `response` (complete it in place or
/// move it into a spawned task) and returning `Ok(())`. Return
/// `Err(response)` to decline and pass the request on.
pub trait StreamHandler: Send + Sync + 'static {
    fn handle_stream(&self, request: &mut Request, response: Response) -> Result<(), Response>;
}

impl<F> StreamHandler for F
where
    F: Fn(&mut Request, Response) -> Result<(), Response> + Send + Sync + 'static,
{
    fn handle_stream(&self, request: &mut Request, response: Response) -> Result<(), Response> {
        self(request, response)
    }
}

/// A handler for requests that no stream handler claimed.
///
/// Receives the path with the URL root stripped and the query split off.
/// The claim protocol is the same as for [`StreamHandler`].
pub trait ResourceHandler: Send + Sync + 'static {
    fn handle_resource(
        &self,
        path: &str,
        headers: &HeaderMap,
        response: Response,
    ) -> Result<(), Response>;
}

impl<F> ResourceHandler for F
where
    F: Fn(&str, &HeaderMap, Response) -> Result<(), Response> + Send + Sync + 'static,
{
    fn handle_resource(
        &self,
        path: &str,
        headers: &HeaderMap,
        response: Response,
    ) -> Result<(), Response> {
        self(path, headers, response)
    }
}

/// The registered handlers of one server.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    stream: Vec<Arc<dyn StreamHandler>>,
    resource: Vec<(Option<String>, Arc<dyn ResourceHandler>)>,
}

impl HandlerRegistry {
    pub(crate) fn add_stream(&mut self, handler: Arc<dyn StreamHandler>) {
        self.stream.push(handler);
    }

    /// `detail` of `None` subscribes to every request; `Some` only to
    /// requests whose detail token matches exactly.
    pub(crate) fn add_resource(&mut self, detail: Option<String>, handler: Arc<dyn ResourceHandler>) {
        self.resource.push((detail, handler));
    }

    pub(crate) fn stream_handlers(&self) -> Vec<Arc<dyn StreamHandler>> {
        self.stream.clone()
    }

    pub(crate) fn resource_handlers(&self, detail: &str) -> Vec<Arc<dyn ResourceHandler>> {
        self.resource
            .iter()
            .filter(|(key, _)| match key {
                Some(key) => key == detail,
                None => true,
            })
            .map(|(_, handler)| handler.clone())
            .collect()
    }
}

/// Broadcasts until a handler claims the response; returns it when nobody
/// does.
pub(crate) fn broadcast_stream(
    handlers: &[Arc<dyn StreamHandler>],
    request: &mut Request,
    mut response: Response,
) -> Result<(), Response> {
    for handler in handlers {
        match handler.handle_stream(request, response) {
            Ok(()) => return Ok(()),
            Err(declined) => response = declined,
        }
    }
    Err(response)
}

pub(crate) fn broadcast_resource(
    handlers: &[Arc<dyn ResourceHandler>],
    path: &str,
    headers: &HeaderMap,
    mut response: Response,
) -> Result<(), Response> {
    for handler in handlers {
        match handler.handle_resource(path, headers, response) {
            Ok(()) => return Ok(()),
            Err(declined) => response = declined,
        }
    }
    Err(response)
}

/// The registration key derived from a request path.
///
/// `/component/rest` yields `/component/` (trailing slash kept) so that all
/// requests below one component share a key; a single-component path is its
/// own key.
pub(crate) fn detail_token(path: &str) -> String {
    if !path.is_empty() {
        if let Some(slash) = path[1..].find('/') {
            return path[..slash + 2].to_owned();
        }
    }
    path.to_owned()
}
