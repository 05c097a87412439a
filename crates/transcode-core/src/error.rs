//! Error types for the transcoding layer

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for the transcoding layer
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error, including malformed gzip framing on the request body
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An output mode was requested after the other one became active
    #[error("Illegal state: {0}")]
    IllegalState(&'static str),

    /// The dispatcher is not ready to route requests
    #[error("Dispatcher not ready: {0}")]
    NotReady(String),

    /// No handler is registered for the path
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// A charset label that cannot be resolved
    #[error("Unsupported character encoding: {0}")]
    UnsupportedCharset(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert error to HTTP status code
    pub fn to_status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Io(e) if e.kind() == std::io::ErrorKind::InvalidData => StatusCode::BAD_REQUEST,
            Error::Io(e) if e.kind() == std::io::ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => StatusCode::BAD_REQUEST,
            Error::RouteNotFound(_) => StatusCode::NOT_FOUND,
            Error::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::UnsupportedCharset(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create a not-ready error
    pub fn not_ready(message: impl Into<String>) -> Self {
        Error::NotReady(message.into())
    }
}
