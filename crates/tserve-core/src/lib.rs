//! tserve-core: Request body handling for a protocol test server
//!
//! Handlers get random, file-like access to request bodies that arrive as a
//! one-shot network stream. Bodies are buffered in memory up to a configured
//! threshold and spill to a temporary file beyond it.
//!
//! ## Modules
//! - `stream` - seekable body over a forward-only source
//! - `input` - the file-like contract handlers depend on
//! - `auth` - Basic auth credentials
//! - `app` - route registration and per-request dispatch
//!
//! Accepting connections, parsing request heads and writing responses are
//! left to the embedding server.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod input;
pub mod request;
pub mod response;
pub mod source;
pub mod stream;

// Re-exports
pub use app::App;
pub use auth::AuthInfo;
pub use config::StreamConfig;
pub use error::{Error, Result};
pub use handler::{BoxedHandler, Handler};
pub use input::{Lines, RawInput};
pub use request::{parse_method, Request, RequestBuilder, RequestHead};
pub use response::{Response, ResponseBuilder};
pub use source::BodySource;
pub use stream::BufferedSeekableStream;

pub use tserve_router::{Router, RouteMatch, ANY_METHOD};
