//! Request handlers

use crate::{Request, Response, Result};

/// Something that turns a request into a response
pub trait Handler: Send + Sync {
    fn call(&self, req: &mut Request) -> Result<Response>;
}

impl<F, T> Handler for F
where
    F: Fn(&mut Request) -> Result<T> + Send + Sync,
    T: Into<Response>,
{
    fn call(&self, req: &mut Request) -> Result<Response> {
        self(req).map(Into::into)
    }
}

/// Type-erased handler as stored in the router
pub type BoxedHandler = Box<dyn Handler>;
