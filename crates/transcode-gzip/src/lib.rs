//! Gzip transcoding wrappers
//!
//! Two independent wrappers around framework-supplied request/response
//! primitives:
//! - [`GzippedRequest`] decompresses a gzip request body up front and serves
//!   a merged view of query-string and form-body parameters
//! - [`GzippedResponse`] compresses whatever the handler writes, through
//!   either a byte stream or a text writer
//!
//! Both are scoped to a single request and driven by one thread.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod compressor;
pub mod params;
pub mod request;
pub mod response;

pub use compressor::{Compressor, GZIP_ENCODING};
pub use params::{FormDecoder, ParamError, ParameterMap, Parameters, PercentDecoder};
pub use request::{GzippedRequest, FORM_URLENCODED};
pub use response::{CloseFlag, GzipSink, GzippedResponse, ResponseStream, ResponseWriter};
