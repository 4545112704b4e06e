//! Request head and the request object handed to handlers

use crate::auth::AuthInfo;
use crate::input::RawInput;
use crate::{Error, Result};
use bytes::Bytes;
use http::Method;
use smallvec::SmallVec;
use std::fmt;
use tserve_router::RouteMatch;

/// Parse a method token (case-sensitive, extension methods allowed)
pub fn parse_method(s: &str) -> Result<Method> {
    Method::from_bytes(s.as_bytes()).map_err(|_| Error::InvalidMethod(s.to_string()))
}

/// Request line and headers, as parsed by the connection layer
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// HTTP method
    pub method: Method,
    /// Request path (without query string)
    pub path: String,
    /// Query string (without leading ?)
    pub query: Option<String>,
    /// Request headers (stack-allocated for small header counts)
    pub headers: SmallVec<[(String, String); 16]>,
}

impl RequestHead {
    /// Create a head from a method and a request target such as `/a?b=c`
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (target, None),
        };
        Self {
            method,
            path: path.to_string(),
            query,
            headers: SmallVec::new(),
        }
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Declared body length; an unparseable value is an error
    pub fn content_length(&self) -> Result<Option<u64>> {
        self.header("content-length")
            .map(|v| {
                v.trim()
                    .parse()
                    .map_err(|_| Error::InvalidHeader(format!("content-length: {v}")))
            })
            .transpose()
    }
}

/// Builder for constructing request heads
#[derive(Debug)]
pub struct RequestBuilder {
    head: RequestHead,
}

impl RequestBuilder {
    pub fn new(method: Method, target: &str) -> Self {
        Self {
            head: RequestHead::new(method, target),
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.head.headers.push((name.into(), value.into()));
        self
    }

    /// Set basic auth credentials
    pub fn basic_auth(self, username: &str, password: &str) -> Self {
        let value = AuthInfo::new(username, password).encode();
        self.header("Authorization", value)
    }

    pub fn build(self) -> RequestHead {
        self.head
    }
}

/// Request passed to a handler
///
/// The body is only reachable through [`RawInput`]; it is pulled from the
/// connection as the handler reads it.
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Request path (without query string)
    pub path: String,
    /// Query string (without leading ?)
    pub query: Option<String>,
    /// Request headers
    pub headers: SmallVec<[(String, String); 16]>,
    /// Values captured by the router
    pub route_match: RouteMatch,
    /// Basic auth credentials, empty when absent
    pub auth: AuthInfo,
    /// File-like access to the body
    pub raw_input: Box<dyn RawInput + Send>,
    body: Option<Bytes>,
}

impl Request {
    pub fn new(
        head: RequestHead,
        route_match: RouteMatch,
        raw_input: Box<dyn RawInput + Send>,
    ) -> Self {
        let auth = AuthInfo::parse(head.header("authorization"));
        Self {
            method: head.method,
            path: head.path,
            query: head.query,
            headers: head.headers,
            route_match,
            auth,
            raw_input,
            body: None,
        }
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get content-type header
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Get a route capture; `*` is the wildcard
    pub fn param(&self, name: &str) -> Option<&str> {
        self.route_match.get(name)
    }

    /// The whole body, independent of the `raw_input` cursor
    ///
    /// The cursor is restored afterwards, also when reading fails, and the
    /// result is cached.
    pub fn body(&mut self) -> Result<Bytes> {
        if let Some(body) = &self.body {
            return Ok(body.clone());
        }

        let position = self.raw_input.tell();
        let body = self
            .raw_input
            .seek_to(0)
            .and_then(|_| self.raw_input.read_remaining());
        self.raw_input.seek_to(position)?;
        let body = body?;

        self.body = Some(body.clone());
        Ok(body)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("route_match", &self.route_match)
            .field("auth", &self.auth)
            .field("position", &self.raw_input.tell())
            .finish_non_exhaustive()
    }
}
