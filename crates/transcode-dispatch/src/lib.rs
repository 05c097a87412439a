//! # Transcode Dispatch
//!
//! The collaborator that drives the gzip wrappers:
//! - [`Dispatcher`] turns a request path into a handler, or reports that it
//!   is not ready
//! - [`PatternDispatcher`] implements it over `/static`, `/:param` and
//!   `/*wildcard` patterns
//! - [`Pipeline`] strips the context path, dispatches, wraps the request and
//!   response, invokes the handler and finishes the response exactly once

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod dispatcher;
pub mod handler;
pub mod matcher;
pub mod pipeline;

pub use dispatcher::{Dispatcher, PatternDispatcher};
pub use handler::{handler_fn, FnHandler, Handler, Request, Response};
pub use matcher::PathMatcher;
pub use pipeline::{error_response, Pipeline};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::dispatcher::{Dispatcher, PatternDispatcher};
    pub use crate::handler::{handler_fn, Handler, Request, Response};
    pub use crate::pipeline::Pipeline;
    pub use transcode_core::prelude::*;
}
