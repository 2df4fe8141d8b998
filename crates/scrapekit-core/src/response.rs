//! The incoming response model.

use crate::headers::charset_from_content_type;
use crate::ScrapeError;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, StatusCode};
use std::fmt;

/// A response cookie, as set by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// An HTTP response as observed by response middlewares and callbacks.
///
/// Created by the transport, dropped when request processing finishes.
#[derive(Clone)]
pub struct Response {
    /// The final URL, after any redirects.
    pub url: String,
    pub method: Method,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub cookies: Vec<Cookie>,
    pub body: Bytes,
}

impl Response {
    /// `true` when the status is below 400.
    pub fn ok(&self) -> bool {
        self.status.as_u16() < 400
    }

    /// The charset declared in the `Content-Type` header, if any.
    pub fn charset(&self) -> Option<String> {
        let content_type = self.headers.get(CONTENT_TYPE)?.to_str().ok()?;
        charset_from_content_type(content_type)
    }

    /// Decodes the body using the declared charset, falling back to utf-8
    /// when no charset is declared or the label is not a known encoding.
    pub fn text(&self) -> String {
        let label = self.charset();
        let encoding = label
            .as_deref()
            .and_then(|l| encoding_rs::Encoding::for_label(l.as_bytes()))
            .unwrap_or(encoding_rs::UTF_8);
        let (text, _, _) = encoding.decode(&self.body);
        text.into_owned()
    }

    /// Decodes the body as JSON. An empty (or whitespace-only) body yields
    /// `Ok(None)`.
    pub fn json(&self) -> Result<Option<serde_json::Value>, ScrapeError> {
        let trimmed: &[u8] = {
            let mut slice: &[u8] = &self.body;
            while let [first, rest @ ..] = slice {
                if first.is_ascii_whitespace() {
                    slice = rest;
                } else {
                    break;
                }
            }
            slice
        };
        if trimmed.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(trimmed)
            .map(Some)
            .map_err(ScrapeError::Json)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Response[{} {} -> {}]", self.method, self.url, self.status)
    }
}
