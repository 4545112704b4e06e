//! Handler responses
//!
//! Writing the response to the connection is left to the caller.

use bytes::Bytes;
use http::StatusCode;
use smallvec::SmallVec;

/// Response content returned by a handler
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Response headers (stack-allocated for small header counts)
    pub headers: SmallVec<[(String, String); 8]>,
    /// Response body
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: SmallVec::new(),
            body: Bytes::new(),
        }
    }

    /// Create a 200 OK response
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Create a plain text 200 response
    pub fn text(body: impl Into<Bytes>) -> Self {
        ResponseBuilder::new(StatusCode::OK)
            .header("content-type", "text/plain; charset=utf-8")
            .body(body)
            .build()
    }

    /// Create a 404 Not Found response
    pub fn not_found() -> Self {
        ResponseBuilder::new(StatusCode::NOT_FOUND)
            .header("content-type", "text/plain")
            .body("Not Found")
            .build()
    }

    /// Create a 400 Bad Request response
    pub fn bad_request(message: &str) -> Self {
        ResponseBuilder::new(StatusCode::BAD_REQUEST)
            .header("content-type", "text/plain")
            .body(message.to_string())
            .build()
    }

    /// Create a 500 Internal Server Error response
    pub fn internal_error(message: &str) -> Self {
        ResponseBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
            .header("content-type", "text/plain")
            .body(message.to_string())
            .build()
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8, if it is valid
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}

impl From<String> for Response {
    fn from(body: String) -> Self {
        Response::text(body)
    }
}

impl From<&'static str> for Response {
    fn from(body: &'static str) -> Self {
        Response::text(body)
    }
}

impl From<Bytes> for Response {
    fn from(body: Bytes) -> Self {
        ResponseBuilder::new(StatusCode::OK).body(body).build()
    }
}

/// Builder for constructing responses
#[derive(Debug)]
pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            response: Response::new(status),
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response.headers.push((name.into(), value.into()));
        self
    }

    /// Set body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.response.body = body.into();
        self
    }

    pub fn build(self) -> Response {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text() {
        let res = Response::text("hello");
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.header("Content-Type"), Some("text/plain; charset=utf-8"));
        assert_eq!(res.body_str(), Some("hello"));
    }

    #[test]
    fn test_not_found() {
        let res = Response::not_found();
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert_eq!(res.body_str(), Some("Not Found"));
    }

    #[test]
    fn test_from_conversions() {
        let res: Response = String::from("a b").into();
        assert_eq!(res.body_str(), Some("a b"));

        let res: Response = Bytes::from_static(b"\xff").into();
        assert!(res.body_str().is_none());
        assert!(res.header("content-type").is_none());
    }
}
