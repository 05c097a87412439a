//! Request pipeline: dispatch, wrap, invoke, finish

use crate::dispatcher::Dispatcher;
use crate::handler::{Request, Response};
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http_body_util::{BodyExt, Full};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use transcode_core::{BufferedResponse, Error, RawResponse, Result, TranscodeConfig};

/// Drives one request through the gzip wrappers and the selected handler
///
/// Built explicitly from a dispatcher and a configuration; no global state.
pub struct Pipeline<D> {
    dispatcher: Arc<D>,
    config: Arc<TranscodeConfig>,
}

impl<D: Dispatcher + 'static> Pipeline<D> {
    /// Create a pipeline, validating `config`
    pub fn new(dispatcher: D, config: TranscodeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            config: Arc::new(config),
        })
    }

    /// The dispatcher
    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// The configuration
    pub fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    /// Serve a request on the current thread
    ///
    /// The request body must be gzip. Errors are returned to the caller;
    /// use [`respond`](Self::respond) to turn them into responses.
    pub fn service(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let path = self.config.strip_context(req.uri().path()).to_string();

        let handler = self
            .dispatcher
            .dispatch(&path)?
            .ok_or_else(|| Error::RouteNotFound(path.clone()))?;
        debug!(path = %path, handler = handler.name(), "Request dispatched");

        let request = Request::new(req, &self.config)?;

        let mut raw = BufferedResponse::new();
        raw.set_character_encoding(&self.config.response_charset);
        let mut response = Response::new(raw, &self.config);

        if let Err(e) = handler.handle(&request, &mut response) {
            warn!(path = %path, handler = handler.name(), error = %e, "Handler failed");
            return Err(e);
        }

        response.finish()?;
        response.into_inner()?.into_response()
    }

    /// Serve a request, converting failures into plain-text error responses
    pub fn respond(&self, req: http::Request<Bytes>) -> http::Response<Bytes> {
        self.service(req).unwrap_or_else(|e| error_response(&e))
    }

    /// Serve a request from an async server
    ///
    /// The body is collected, then the blocking handler path runs on the
    /// blocking thread pool.
    pub async fn call(&self, req: http::Request<Full<Bytes>>) -> Result<http::Response<Full<Bytes>>> {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };
        let req = http::Request::from_parts(parts, body);

        let pipeline = self.clone();
        let response = tokio::task::spawn_blocking(move || pipeline.service(req))
            .await
            .map_err(|e| Error::Internal(format!("Handler task failed: {e}")))??;

        Ok(response.map(Full::new))
    }
}

impl<D> Clone for Pipeline<D> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            config: Arc::clone(&self.config),
        }
    }
}

impl<D: fmt::Debug> fmt::Debug for Pipeline<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("dispatcher", &self.dispatcher)
            .field("config", &self.config)
            .finish()
    }
}

/// Plain-text response describing `err`
pub fn error_response(err: &Error) -> http::Response<Bytes> {
    let mut response = http::Response::new(Bytes::from(err.to_string()));
    *response.status_mut() = err.to_status_code();
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
