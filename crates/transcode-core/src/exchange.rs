//! Request/response primitives supplied by the hosting framework
//!
//! The transcoding wrappers only need raw byte access plus a little header
//! metadata. [`RawRequest`] and [`RawResponse`] describe exactly that, and
//! this module ships implementations for `http::Request<Bytes>` and an
//! in-memory [`BufferedResponse`].

use crate::charset::charset_param;
use crate::Result;
use bytes::{Buf, Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use std::io::{self, Read, Write};

/// Default size of the [`BufferedResponse`] buffer before it commits
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Raw view of an incoming request
pub trait RawRequest {
    /// Readable stream over the body exactly as received (still compressed)
    fn body_reader(&mut self) -> io::Result<Box<dyn Read + '_>>;

    /// Declared character encoding, if any
    fn character_encoding(&self) -> Option<&str>;

    /// Query string without the leading `?`
    fn query_string(&self) -> Option<&str>;

    /// HTTP method
    fn method(&self) -> &Method;

    /// Declared content type, verbatim
    fn content_type(&self) -> Option<&str>;
}

/// Raw view of an outgoing response
///
/// The [`Write`] implementation is the native byte sink of the response.
pub trait RawResponse: Write {
    /// Whether bytes have already been handed to the transport
    fn is_committed(&self) -> bool;

    /// Declared character encoding, if any
    fn character_encoding(&self) -> Option<&str>;

    /// Declare the character encoding of the body
    fn set_character_encoding(&mut self, charset: &str);

    /// Set a header, replacing any previous value
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Push buffered bytes to the transport, committing the response
    fn flush_buffer(&mut self) -> io::Result<()>;

    /// Close the native byte sink
    fn close_output(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl RawRequest for http::Request<Bytes> {
    fn body_reader(&mut self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.body().clone().reader()))
    }

    fn character_encoding(&self) -> Option<&str> {
        RawRequest::content_type(self).and_then(charset_param)
    }

    fn query_string(&self) -> Option<&str> {
        self.uri().query()
    }

    fn method(&self) -> &Method {
        http::Request::method(self)
    }

    fn content_type(&self) -> Option<&str> {
        self.headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// In-memory response with servlet-style buffering
///
/// Writes accumulate in a buffer; once the buffer is flushed (explicitly or
/// because it reached `buffer_size`) the response is committed and header
/// changes are ignored.
#[derive(Debug)]
pub struct BufferedResponse {
    status: StatusCode,
    headers: HeaderMap,
    charset: Option<String>,
    buffer: Vec<u8>,
    buffer_size: usize,
    sent: BytesMut,
    committed: bool,
    closed: bool,
    close_count: usize,
}

impl BufferedResponse {
    /// Create an empty `200 OK` response
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a response whose buffer commits after `buffer_size` bytes
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            charset: None,
            buffer: Vec::new(),
            buffer_size: buffer_size.max(1),
            sent: BytesMut::new(),
            committed: false,
            closed: false,
            close_count: 0,
        }
    }

    /// Set the status code (ignored once committed)
    pub fn set_status(&mut self, status: StatusCode) {
        if !self.committed {
            self.status = status;
        }
    }

    /// Status code
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Bytes already handed to the transport
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// Bytes still held in the buffer
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// How many times the native sink has been closed
    pub fn close_count(&self) -> usize {
        self.close_count
    }

    /// Convert into an `http::Response`, flushing anything still buffered
    pub fn into_response(mut self) -> Result<http::Response<Bytes>> {
        self.sent.extend_from_slice(&self.buffer);

        let mut builder = http::Response::builder().status(self.status);
        for (name, value) in self.headers.iter() {
            builder = builder.header(name, value);
        }

        Ok(builder.body(self.sent.freeze())?)
    }
}

impl Default for BufferedResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for BufferedResponse {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "response output closed",
            ));
        }

        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= self.buffer_size {
            self.flush_buffer()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer()
    }
}

impl RawResponse for BufferedResponse {
    fn is_committed(&self) -> bool {
        self.committed
    }

    fn character_encoding(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    fn set_character_encoding(&mut self, charset: &str) {
        if !self.committed {
            self.charset = Some(charset.to_string());
        }
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.committed {
            tracing::debug!(header = %name, "Response committed, header ignored");
            return;
        }
        self.headers.insert(name, value);
    }

    fn flush_buffer(&mut self) -> io::Result<()> {
        self.committed = true;
        self.sent.extend_from_slice(&self.buffer);
        self.buffer.clear();
        Ok(())
    }

    fn close_output(&mut self) -> io::Result<()> {
        self.flush_buffer()?;
        self.closed = true;
        self.close_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accessors() {
        let mut req = http::Request::builder()
            .method(Method::POST)
            .uri("/maps/tiles?z=3&x=1")
            .header(header::CONTENT_TYPE, "text/plain; charset=ISO-8859-1")
            .body(Bytes::from_static(b"payload"))
            .unwrap();

        assert_eq!(*RawRequest::method(&req), Method::POST);
        assert_eq!(req.query_string(), Some("z=3&x=1"));
        assert_eq!(
            RawRequest::content_type(&req),
            Some("text/plain; charset=ISO-8859-1")
        );
        assert_eq!(req.character_encoding(), Some("ISO-8859-1"));

        let mut body = Vec::new();
        req.body_reader().unwrap().read_to_end(&mut body).unwrap();
        assert_eq!(body, b"payload");
    }

    #[test]
    fn test_request_without_query() {
        let req = http::Request::builder()
            .uri("/plain")
            .body(Bytes::new())
            .unwrap();
        assert_eq!(req.query_string(), None);
        assert_eq!(req.character_encoding(), None);
    }

    #[test]
    fn test_buffered_response_commits_on_flush() {
        let mut resp = BufferedResponse::new();
        resp.write_all(b"hello").unwrap();
        assert!(!resp.is_committed());
        assert_eq!(resp.pending(), b"hello");

        resp.flush_buffer().unwrap();
        assert!(resp.is_committed());
        assert_eq!(resp.sent(), b"hello");
        assert!(resp.pending().is_empty());
    }

    #[test]
    fn test_buffered_response_commits_when_full() {
        let mut resp = BufferedResponse::with_buffer_size(4);
        resp.write_all(b"abcdef").unwrap();
        assert!(resp.is_committed());
        assert_eq!(resp.sent(), b"abcdef");
    }

    #[test]
    fn test_headers_ignored_after_commit() {
        let mut resp = BufferedResponse::new();
        resp.set_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        resp.flush_buffer().unwrap();
        resp.set_header(header::CONTENT_LANGUAGE, HeaderValue::from_static("zh"));

        assert!(resp.headers().contains_key(header::CONTENT_TYPE));
        assert!(!resp.headers().contains_key(header::CONTENT_LANGUAGE));
    }

    #[test]
    fn test_write_after_close_fails() {
        let mut resp = BufferedResponse::new();
        resp.close_output().unwrap();
        assert_eq!(resp.close_count(), 1);
        assert!(resp.write_all(b"late").is_err());
    }

    #[test]
    fn test_into_response() {
        let mut resp = BufferedResponse::new();
        resp.set_status(StatusCode::CREATED);
        resp.set_header(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        resp.write_all(b"body").unwrap();

        let resp = resp.into_response().unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(resp.body().as_ref(), b"body");
    }
}
