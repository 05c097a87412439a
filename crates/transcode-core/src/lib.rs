//! # Transcode Core
//!
//! Core types, traits, and error handling for the gzip transcoding layer.
//!
//! This crate provides the foundational abstractions the wrappers build on:
//! - Raw request/response primitives supplied by the hosting framework
//! - Error types
//! - Configuration
//! - Charset lookup

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod charset;
pub mod config;
pub mod error;
pub mod exchange;

pub use config::{load_from_file, load_from_str, ConfigFormat, TranscodeConfig};
pub use error::{Error, Result};
pub use exchange::{BufferedResponse, RawRequest, RawResponse};

// Re-export commonly used HTTP types
pub use bytes::Bytes;
pub use http::{Method, Request, Response, StatusCode};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::TranscodeConfig;
    pub use crate::error::{Error, Result};
    pub use crate::exchange::{BufferedResponse, RawRequest, RawResponse};
}
