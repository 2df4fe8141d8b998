//! The transport seam and the bundled reqwest implementation.

use async_trait::async_trait;
use http::header::{HeaderValue, COOKIE};
use scrapekit_core::{BasicAuth, Body, Cookie, Request, Response, ScrapeError};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Performs HTTP requests on behalf of the engine.
///
/// Implementations must honour the request's timeout, redirect settings,
/// and proxy configuration, and return a [`Response`] populated with the
/// final URL, status, headers, cookies, and body. The response is released
/// when it is dropped at the end of the worker stages.
#[async_trait]
pub trait Session: Send + Sync {
    async fn perform(&self, request: &Request) -> Result<Response, ScrapeError>;

    /// Releases transport resources. Called once at shutdown.
    async fn close(&self) {}
}

/// TLS verification behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SslMode {
    /// Verify certificates against the system roots.
    Verify,
    /// Accept any certificate.
    NoVerify,
    /// Verify against a PEM CA bundle at the given path.
    CaBundle(PathBuf),
}

/// Default proxy configuration. Scheme keys are canonicalised without a
/// trailing `://`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyConfig {
    /// One proxy for every scheme.
    Url(String),
    /// Separate proxies per scheme.
    PerScheme {
        http: Option<String>,
        https: Option<String>,
    },
}

/// Which bundled transport backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HttpBackend {
    #[default]
    Reqwest,
}

impl FromStr for HttpBackend {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reqwest" => Ok(HttpBackend::Reqwest),
            other => Err(ScrapeError::Config(format!(
                "unknown http backend: {other:?}"
            ))),
        }
    }
}

/// HTTP session settings shared by every request.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Default request timeout.
    pub timeout: Duration,
    pub ssl: SslMode,
    pub proxy: Option<ProxyConfig>,
    pub backend: HttpBackend,
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    timeout: Duration,
    ssl: SslMode,
    proxy: Option<ProxyConfig>,
    backend: HttpBackend,
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - timeout: 60s
    /// - ssl: verify
    /// - proxy: none
    /// - backend: reqwest
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            ssl: SslMode::Verify,
            proxy: None,
            backend: HttpBackend::Reqwest,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ssl(mut self, ssl: SslMode) -> Self {
        self.ssl = ssl;
        self
    }

    pub fn proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn backend(mut self, backend: HttpBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn build(self) -> SessionConfig {
        SessionConfig {
            timeout: self.timeout,
            ssl: self.ssl,
            proxy: self.proxy,
            backend: self.backend,
        }
    }
}

/// Builds the session for the configured backend.
pub fn build_session(config: &SessionConfig) -> Result<std::sync::Arc<dyn Session>, ScrapeError> {
    match config.backend {
        HttpBackend::Reqwest => Ok(std::sync::Arc::new(ReqwestSession::new(config)?)),
    }
}

/// The bundled [`Session`] backed by `reqwest`.
///
/// A shared client serves requests with default redirect/proxy settings;
/// requests that override redirects or carry their own proxy get a
/// one-off client, since reqwest fixes both at client construction.
pub struct ReqwestSession {
    client: reqwest::Client,
    config: SessionConfig,
}

impl ReqwestSession {
    pub fn new(config: &SessionConfig) -> Result<Self, ScrapeError> {
        let client = base_builder(config)?
            .redirect(reqwest::redirect::Policy::limited(DEFAULT_MAX_REDIRECTS))
            .build()
            .map_err(ScrapeError::transport)?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn client_for(&self, request: &Request) -> Result<Option<reqwest::Client>, ScrapeError> {
        let default_redirects =
            request.allow_redirects && request.max_redirects == DEFAULT_MAX_REDIRECTS;
        if default_redirects && request.proxy.is_none() {
            return Ok(None);
        }

        let mut builder = base_builder(&self.config)?;
        builder = builder.redirect(if request.allow_redirects {
            reqwest::redirect::Policy::limited(request.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        });

        if let Some(proxy_url) = &request.proxy {
            let mut proxy = reqwest::Proxy::all(proxy_url).map_err(ScrapeError::transport)?;
            if let Some(auth) = &request.proxy_auth {
                proxy = proxy.basic_auth(&auth.username, auth.password.as_deref().unwrap_or(""));
            }
            if !request.proxy_headers.is_empty() {
                proxy = proxy.headers(request.proxy_headers.clone());
            }
            builder = builder.proxy(proxy);
        }

        builder.build().map(Some).map_err(ScrapeError::transport)
    }
}

const DEFAULT_MAX_REDIRECTS: usize = 10;

fn base_builder(config: &SessionConfig) -> Result<reqwest::ClientBuilder, ScrapeError> {
    let mut builder = reqwest::Client::builder().timeout(config.timeout);

    match &config.ssl {
        SslMode::Verify => {}
        SslMode::NoVerify => {
            builder = builder.danger_accept_invalid_certs(true);
        }
        SslMode::CaBundle(path) => {
            let pem = std::fs::read(path).map_err(|e| {
                ScrapeError::Config(format!("cannot read CA bundle {}: {e}", path.display()))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(ScrapeError::transport)?;
            builder = builder.add_root_certificate(cert);
        }
    }

    if let Some(proxy) = &config.proxy {
        match proxy {
            ProxyConfig::Url(url) => {
                builder = builder.proxy(reqwest::Proxy::all(url).map_err(ScrapeError::transport)?);
            }
            ProxyConfig::PerScheme { http, https } => {
                if let Some(url) = http {
                    builder =
                        builder.proxy(reqwest::Proxy::http(url).map_err(ScrapeError::transport)?);
                }
                if let Some(url) = https {
                    builder =
                        builder.proxy(reqwest::Proxy::https(url).map_err(ScrapeError::transport)?);
                }
            }
        }
    }

    Ok(builder)
}

fn cookie_header(cookies: &[(String, String)]) -> Result<HeaderValue, ScrapeError> {
    let joined = cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ");
    HeaderValue::from_str(&joined)
        .map_err(|_| ScrapeError::InvalidRequest("cookie values must be valid header text".into()))
}

fn apply_auth(builder: reqwest::RequestBuilder, auth: &BasicAuth) -> reqwest::RequestBuilder {
    builder.basic_auth(&auth.username, auth.password.as_deref())
}

fn map_reqwest_error(error: reqwest::Error) -> ScrapeError {
    if error.is_timeout() {
        ScrapeError::Timeout
    } else {
        ScrapeError::transport(error)
    }
}

#[async_trait]
impl Session for ReqwestSession {
    async fn perform(&self, request: &Request) -> Result<Response, ScrapeError> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| ScrapeError::InvalidRequest(format!("invalid url {}: {e}", request.url)))?;

        let one_off = self.client_for(request)?;
        let client = one_off.as_ref().unwrap_or(&self.client);

        let mut builder = client.request(request.method.clone(), url);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if !request.headers.is_empty() {
            builder = builder.headers(request.headers.clone());
        }
        if !request.cookies.is_empty() {
            builder = builder.header(COOKIE, cookie_header(&request.cookies)?);
        }
        if let Some(auth) = &request.auth {
            builder = apply_auth(builder, auth);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        builder = match (&request.files, &request.json, &request.body) {
            (Some(files), None, body) => {
                let mut form = reqwest::multipart::Form::new();
                if let Some(Body::Bytes(_)) = body {
                    return Err(ScrapeError::InvalidRequest(
                        "raw body cannot be combined with files".into(),
                    ));
                }
                if let Some(Body::Form(fields)) = body {
                    for (name, value) in fields {
                        form = form.text(name.clone(), value.clone());
                    }
                }
                for file in files {
                    let mut part = reqwest::multipart::Part::bytes(file.bytes.to_vec())
                        .file_name(file.filename.clone());
                    if let Some(content_type) = &file.content_type {
                        part = part.mime_str(content_type).map_err(ScrapeError::transport)?;
                    }
                    form = form.part(file.name.clone(), part);
                }
                builder.multipart(form)
            }
            (None, Some(json), None) => builder.json(json),
            (None, None, Some(Body::Bytes(bytes))) => builder.body(bytes.clone()),
            (None, None, Some(Body::Form(fields))) => builder.form(fields),
            (None, None, None) => builder,
            // The sender validates exclusivity before dispatch.
            _ => {
                return Err(ScrapeError::InvalidRequest(
                    "conflicting body fields".into(),
                ))
            }
        };

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let final_url = response.url().to_string();
        let status = response.status();
        let headers = response.headers().clone();
        let cookies = response
            .cookies()
            .map(|c| Cookie {
                name: c.name().to_string(),
                value: c.value().to_string(),
            })
            .collect();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(Response {
            url: final_url,
            method: request.method.clone(),
            status,
            headers,
            cookies,
            body,
        })
    }
}
