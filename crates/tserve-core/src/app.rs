//! Route registration and per-request dispatch
//!
//! The connection layer parses the request head, hands it to
//! [`App::dispatch`] together with the connection reader, and writes out the
//! returned [`Response`].

use crate::handler::{BoxedHandler, Handler};
use crate::request::RequestHead;
use crate::stream::BufferedSeekableStream;
use crate::{Request, Response, Result, StreamConfig};
use std::any::Any;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, debug_span, warn};
use tserve_router::Router;

/// Ordered routes plus the body configuration applied to every request
pub struct App {
    router: Router<BoxedHandler>,
    config: StreamConfig,
}

impl App {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            router: Router::new(),
            config,
        }
    }

    /// Register a closure handler; `method` may be `*` for any method
    ///
    /// Routes are tried in registration order.
    pub fn route<F, T>(&mut self, method: &str, pattern: &str, handler: F) -> Result<&mut Self>
    where
        F: Fn(&mut Request) -> Result<T> + Send + Sync + 'static,
        T: Into<Response>,
    {
        self.handler(method, pattern, handler)
    }

    /// Register any [`Handler`] implementation
    pub fn handler<H>(&mut self, method: &str, pattern: &str, handler: H) -> Result<&mut Self>
    where
        H: Handler + 'static,
    {
        self.router.register(method, pattern, Box::new(handler))?;
        debug!(method, pattern, "registered route");
        Ok(self)
    }

    pub fn router(&self) -> &Router<BoxedHandler> {
        &self.router
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Route one request and run its handler
    ///
    /// Unmatched requests get 404, a bad `Content-Length` gets 400 and
    /// handler errors or panics become 500. The body stream, including any
    /// overflow file, is released before this returns.
    pub fn dispatch<R>(&self, head: RequestHead, body: R) -> Response
    where
        R: Read + Send + 'static,
    {
        let span = debug_span!("dispatch", method = %head.method, path = %head.path);
        let _enter = span.enter();

        let content_length = match head.content_length() {
            Ok(length) => length,
            Err(e) => {
                warn!(error = %e, "rejecting request");
                return Response::bad_request(&e.to_string());
            }
        };

        let Some(found) = self.router.find(head.method.as_str(), &head.path) else {
            debug!("no route matched");
            return Response::not_found();
        };
        debug!(pattern = found.pattern, "route matched");

        let input = BufferedSeekableStream::from_body(body, content_length, self.config.clone());
        let mut request = Request::new(head, found.captures, Box::new(input));

        match panic::catch_unwind(AssertUnwindSafe(|| found.value.call(&mut request))) {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(error = %e, "handler failed");
                Response::internal_error(&e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(panic = message, "handler panicked");
                Response::internal_error("Handler panicked")
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new(StreamConfig::default())
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.router.len())
            .field("config", &self.config)
            .finish()
    }
}
