//! Handler trait and closure adapter

use bytes::Bytes;
use std::fmt;
use transcode_core::{BufferedResponse, Result};
use transcode_gzip::{GzippedRequest, GzippedResponse};

/// Request type handlers receive
pub type Request = GzippedRequest<http::Request<Bytes>>;

/// Response type handlers write to
pub type Response = GzippedResponse<BufferedResponse>;

/// Target of a dispatched request
pub trait Handler: Send + Sync + fmt::Debug {
    /// Read from `req` and write output through `resp`
    ///
    /// The pipeline finishes `resp` after this returns; handlers do not.
    fn handle(&self, req: &Request, resp: &mut Response) -> Result<()>;

    /// Name used in logs
    fn name(&self) -> &str {
        "handler"
    }
}

/// [`Handler`] backed by a closure
pub struct FnHandler<F> {
    name: String,
    func: F,
}

/// Build a named handler from a closure
pub fn handler_fn<F>(name: impl Into<String>, func: F) -> FnHandler<F>
where
    F: Fn(&Request, &mut Response) -> Result<()> + Send + Sync,
{
    FnHandler {
        name: name.into(),
        func,
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Request, &mut Response) -> Result<()> + Send + Sync,
{
    fn handle(&self, req: &Request, resp: &mut Response) -> Result<()> {
        (self.func)(req, resp)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}
