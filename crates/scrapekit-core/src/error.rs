//! The unified error type for the scrapekit engine.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced by the engine, the transport, and user handlers.
///
/// Control-flow decisions (stop this chain, stop this request) are *not*
/// errors; see [`crate::Flow`].
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The transport returned a non-ok status and the request asked for
    /// statuses to be raised.
    #[error("{method} {url}: {status}")]
    Http {
        url: String,
        method: Method,
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },

    /// A request was constructed or mutated into a conflicting shape.
    #[error("invalid request data: {0}")]
    InvalidRequest(String),

    /// A pipeline was missing (strict mode) or failed to process an item.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// A configuration value failed to parse or validate.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The transport timed out performing a request.
    #[error("request timed out")]
    Timeout,

    /// Any other transport-level failure (connect, TLS, protocol, ...).
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A response body could not be decoded as JSON.
    #[error("json decode failed: {0}")]
    Json(#[source] serde_json::Error),

    /// The engine is shutting down and no longer accepts requests.
    #[error("engine is closed")]
    Closed,

    /// An errback failed while handling another error; both are surfaced.
    #[error("errback failed: {errback_error} (original: {original})")]
    Errback {
        original: Box<ScrapeError>,
        errback_error: Box<ScrapeError>,
    },

    /// A user handler failed with a domain-specific message.
    #[error("{0}")]
    Handler(String),
}

impl ScrapeError {
    /// Builds the HTTP failure carried to exception middlewares when a
    /// response is not ok and `raise_for_status` is set.
    pub fn http(
        url: impl Into<String>,
        method: Method,
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        ScrapeError::Http {
            url: url.into(),
            method,
            status,
            headers,
            body,
        }
    }

    /// Wraps an arbitrary transport failure.
    pub fn transport<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ScrapeError::Transport(Box::new(source))
    }

    /// The status code, when this is an HTTP failure.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ScrapeError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The response headers, when this is an HTTP failure.
    pub fn response_headers(&self) -> Option<&HeaderMap> {
        match self {
            ScrapeError::Http { headers, .. } => Some(headers),
            _ => None,
        }
    }

    /// The coarse kind of this error, used for retry and adaptive
    /// rate-limit trigger matching.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScrapeError::Http { .. } => ErrorKind::Http,
            ScrapeError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ScrapeError::Pipeline(_) => ErrorKind::Pipeline,
            ScrapeError::Config(_) => ErrorKind::Config,
            ScrapeError::Timeout => ErrorKind::Timeout,
            ScrapeError::Transport(_) => ErrorKind::Transport,
            ScrapeError::Json(_) => ErrorKind::Json,
            ScrapeError::Closed => ErrorKind::Closed,
            ScrapeError::Errback { .. } => ErrorKind::Errback,
            ScrapeError::Handler(_) => ErrorKind::Handler,
        }
    }
}

/// Coarse error classification, matchable from configuration
/// (`SESSION_RETRY_EXCEPTIONS` takes a csv of these names).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Http,
    InvalidRequest,
    Pipeline,
    Config,
    Timeout,
    Transport,
    Json,
    Closed,
    Errback,
    Handler,
}

impl ErrorKind {
    /// The canonical configuration name for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Http => "http",
            ErrorKind::InvalidRequest => "invalid-request",
            ErrorKind::Pipeline => "pipeline",
            ErrorKind::Config => "config",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transport => "transport",
            ErrorKind::Json => "json",
            ErrorKind::Closed => "closed",
            ErrorKind::Errback => "errback",
            ErrorKind::Handler => "handler",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(ErrorKind::Http),
            "invalid-request" => Ok(ErrorKind::InvalidRequest),
            "pipeline" => Ok(ErrorKind::Pipeline),
            "config" => Ok(ErrorKind::Config),
            "timeout" => Ok(ErrorKind::Timeout),
            "transport" => Ok(ErrorKind::Transport),
            "json" => Ok(ErrorKind::Json),
            "closed" => Ok(ErrorKind::Closed),
            "errback" => Ok(ErrorKind::Errback),
            "handler" => Ok(ErrorKind::Handler),
            other => Err(ScrapeError::Config(format!(
                "unknown error kind: {other:?}"
            ))),
        }
    }
}
