//! The outgoing request model.

use crate::handler::{Callback, Errback};
use crate::{ScrapeError, StateMap};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Basic credentials, for the target or for a proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: Option<String>,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

/// A non-JSON request body.
#[derive(Debug, Clone)]
pub enum Body {
    /// Raw bytes, sent as-is.
    Bytes(Bytes),
    /// A url-encoded form, insertion order preserved.
    Form(Vec<(String, String)>),
}

/// One part of a multipart upload.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub name: String,
    pub filename: String,
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// An HTTP request plus its scheduling and handling metadata.
///
/// Built with [`Request::builder`] (or the [`Request::get`]/[`Request::post`]
/// shorthands). Construction validates that at most one of `body`/`json` is
/// set and that `json` and `files` are not combined; violations yield
/// [`ScrapeError::InvalidRequest`]. Middlewares may mutate a request, so
/// the engine's sender re-validates on submission.
#[derive(Clone)]
pub struct Request {
    pub url: String,
    pub method: Method,
    /// Query parameters, insertion order preserved.
    pub params: Vec<(String, String)>,
    pub body: Option<Body>,
    pub json: Option<serde_json::Value>,
    pub files: Option<Vec<FilePart>>,
    pub cookies: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub auth: Option<BasicAuth>,
    pub proxy: Option<String>,
    pub proxy_auth: Option<BasicAuth>,
    pub proxy_headers: HeaderMap,
    pub timeout: Option<Duration>,
    pub allow_redirects: bool,
    pub max_redirects: usize,
    /// When set, a non-ok response is routed to the error path instead of
    /// the callback.
    pub raise_for_status: bool,

    /// Dispatch priority; lower values dispatch first.
    pub priority: i32,
    /// When set, the request is parked on the delayed heap until
    /// submission time + delay.
    pub delay: Option<Duration>,
    pub callback: Option<Arc<dyn Callback>>,
    /// Arguments for the callback, owned by this request.
    pub cb_args: StateMap,
    pub errback: Option<Arc<dyn Errback>>,
    /// Middleware state, owned by this request.
    pub state: StateMap,
}

impl Request {
    /// Starts building a request with the given method.
    pub fn builder(method: Method, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// Starts building a GET request.
    pub fn get(url: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::GET, url)
    }

    /// Starts building a POST request.
    pub fn post(url: impl Into<String>) -> RequestBuilder {
        Self::builder(Method::POST, url)
    }

    /// Checks the body-shape invariants. The builder calls this once; the
    /// engine's sender calls it again because middlewares may have mutated
    /// the request since construction.
    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.json.is_some() && self.body.is_some() {
            return Err(ScrapeError::InvalidRequest(
                "cannot send both body and json".into(),
            ));
        }
        if self.json.is_some() && self.files.is_some() {
            return Err(ScrapeError::InvalidRequest(
                "cannot send both files and json".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("priority", &self.priority)
            .field("delay", &self.delay)
            .field("has_callback", &self.callback.is_some())
            .field("has_errback", &self.errback.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Request`].
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            request: Request {
                url: url.into(),
                method,
                params: Vec::new(),
                body: None,
                json: None,
                files: None,
                cookies: Vec::new(),
                headers: HeaderMap::new(),
                auth: None,
                proxy: None,
                proxy_auth: None,
                proxy_headers: HeaderMap::new(),
                timeout: None,
                allow_redirects: true,
                max_redirects: 10,
                raise_for_status: true,
                priority: 0,
                delay: None,
                callback: None,
                cb_args: StateMap::new(),
                errback: None,
                state: StateMap::new(),
            },
        }
    }

    /// Appends a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.request.params.push((key.into(), value.to_string()));
        self
    }

    /// Sets a raw byte body.
    pub fn body(mut self, bytes: impl Into<Bytes>) -> Self {
        self.request.body = Some(Body::Bytes(bytes.into()));
        self
    }

    /// Sets a url-encoded form body.
    pub fn form(mut self, fields: impl IntoIterator<Item = (String, String)>) -> Self {
        self.request.body = Some(Body::Form(fields.into_iter().collect()));
        self
    }

    /// Sets a JSON body.
    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.request.json = Some(value);
        self
    }

    /// Adds a multipart file part.
    pub fn file(mut self, part: FilePart) -> Self {
        self.request.files.get_or_insert_with(Vec::new).push(part);
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.cookies.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.request.headers.append(name, value);
        self
    }

    pub fn auth(mut self, auth: BasicAuth) -> Self {
        self.request.auth = Some(auth);
        self
    }

    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.request.proxy = Some(url.into());
        self
    }

    pub fn proxy_auth(mut self, auth: BasicAuth) -> Self {
        self.request.proxy_auth = Some(auth);
        self
    }

    pub fn proxy_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.request.proxy_headers.append(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = Some(timeout);
        self
    }

    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.request.allow_redirects = allow;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.request.max_redirects = max;
        self
    }

    pub fn raise_for_status(mut self, raise: bool) -> Self {
        self.request.raise_for_status = raise;
        self
    }

    /// Sets the dispatch priority; lower values dispatch first.
    pub fn priority(mut self, priority: i32) -> Self {
        self.request.priority = priority;
        self
    }

    /// Schedules the request no earlier than submission time + `delay`.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.request.delay = Some(delay);
        self
    }

    pub fn callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.request.callback = Some(callback);
        self
    }

    /// Stores a typed argument the callback can read from
    /// [`Request::cb_args`].
    pub fn cb_arg<T: Send + Sync + 'static>(mut self, key: impl Into<String>, value: T) -> Self {
        self.request.cb_args.insert(key, value);
        self
    }

    pub fn errback(mut self, errback: Arc<dyn Errback>) -> Self {
        self.request.errback = Some(errback);
        self
    }

    /// Seeds middleware state.
    pub fn state<T: Send + Sync + 'static>(mut self, key: impl Into<String>, value: T) -> Self {
        self.request.state.insert(key, value);
        self
    }

    /// Validates and returns the request.
    pub fn build(self) -> Result<Request, ScrapeError> {
        self.request.validate()?;
        Ok(self.request)
    }
}
