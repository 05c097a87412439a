//! Inbound transcoding: gzip request bodies and merged parameters

use crate::compressor::Compressor;
use crate::params::{FormDecoder, ParamError, Parameters, PercentDecoder};
use bytes::Bytes;
use encoding_rs::Encoding;
use http::Method;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use tracing::debug;
use transcode_core::charset::DEFAULT_CHARSET;
use transcode_core::{RawRequest, Result, TranscodeConfig};

/// Media type whose POST bodies contribute parameters
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// A request whose gzip body has been decompressed into memory
///
/// The body is drained once, at construction. Parameters are parsed on the
/// first call to any parameter accessor and cached for the lifetime of the
/// wrapper.
pub struct GzippedRequest<R, D = PercentDecoder> {
    inner: R,
    body: Bytes,
    decoder: D,
    platform_charset: &'static Encoding,
    params: OnceCell<Parameters>,
}

impl<R: RawRequest> GzippedRequest<R> {
    /// Wrap `request`, decompressing its body
    ///
    /// Fails with [`Error::Io`](transcode_core::Error::Io) if the body is not
    /// valid gzip or cannot be read; the request should then be rejected.
    pub fn new(request: R, config: &TranscodeConfig) -> Result<Self> {
        Self::with_decoder(request, config, PercentDecoder)
    }
}

impl<R: RawRequest, D: FormDecoder> GzippedRequest<R, D> {
    /// Wrap `request` using a custom parameter decoder
    pub fn with_decoder(mut request: R, config: &TranscodeConfig, decoder: D) -> Result<Self> {
        let body = {
            let reader = request.body_reader()?;
            Compressor::decompress(reader)?
        };
        debug!(bytes = body.len(), "Request body decompressed");

        Ok(Self {
            inner: request,
            body,
            decoder,
            platform_charset: config.platform_encoding(),
            params: OnceCell::new(),
        })
    }

    /// A fresh reader over the decompressed body, positioned at the start
    pub fn body(&self) -> Cursor<Bytes> {
        Cursor::new(self.body.clone())
    }

    /// The decompressed body
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// First value of `name`
    ///
    /// `None` if the parameter is absent, has no values, or its first value
    /// is null.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters().merged().first(name)
    }

    /// All values of `name`, or `None` if the parameter is absent
    pub fn parameter_values(&self, name: &str) -> Option<&[Option<String>]> {
        self.parameters().merged().get(name)
    }

    /// Detached snapshot of every parameter
    pub fn parameter_map(&self) -> HashMap<String, Box<[Option<String>]>> {
        self.parameters().merged().snapshot()
    }

    /// Parameter names
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.parameters().merged().names()
    }

    /// Pairs that failed to decode during extraction
    pub fn parse_errors(&self) -> &[ParamError] {
        self.parameters().errors()
    }

    /// The wrapped request
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Unwrap the request
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn parameters(&self) -> &Parameters {
        self.params.get_or_init(|| self.extract())
    }

    fn extract(&self) -> Parameters {
        let charset = self.inner.character_encoding().unwrap_or(DEFAULT_CHARSET);

        // The body text is decoded with the platform charset, not the
        // declared one; only percent escapes inside it use `charset`.
        let form = self
            .is_form_post()
            .then(|| self.platform_charset.decode_without_bom_handling(&self.body).0);

        let params = Parameters::extract(
            self.inner.query_string(),
            form.as_deref(),
            charset,
            &self.decoder,
        );

        debug!(
            query = params.query().len(),
            content = params.content().len(),
            errors = params.errors().len(),
            "Request parameters extracted"
        );

        params
    }

    fn is_form_post(&self) -> bool {
        self.inner.content_type() == Some(FORM_URLENCODED) && *self.inner.method() == Method::POST
    }
}

impl<R, D: fmt::Debug> fmt::Debug for GzippedRequest<R, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzippedRequest")
            .field("body_len", &self.body.len())
            .field("decoder", &self.decoder)
            .field("platform_charset", &self.platform_charset.name())
            .field("extracted", &self.params.get().is_some())
            .finish()
    }
}
