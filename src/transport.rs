//! HTTP transport seam.
//!
//! Everything above this module only needs to send a method, a path and an
//! optional JSON body, and get back a status code and a body. [`HttpTransport`]
//! does that over reqwest; tests and alternative stacks implement
//! [`Transport`] themselves.

use async_trait::async_trait;
use reqwest::{Method, Url};

use crate::config::Config;
use crate::error::{Error, Result};

/// Raw response handed back by a [`Transport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response body, as text.
    pub body: String,
}

impl Response {
    /// Create a response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Turn anything but the expected status into [`Error::UnexpectedStatus`].
    pub fn expect_status(self, expected: u16) -> Result<Self> {
        if self.status == expected {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    pub(crate) fn into_error(self) -> Error {
        Error::UnexpectedStatus {
            status: self.status,
            body: self.body,
        }
    }
}

/// The one capability the client needs from the network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. `path` is absolute and already percent-encoded.
    ///
    /// Must return `Ok` for every status code the server produced; only
    /// failures to get a response at all are errors.
    async fn request(&self, method: Method, path: &str, body: Option<String>) -> Result<Response>;
}

/// reqwest-backed transport with basic auth.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
    key: String,
    secret: String,
}

impl HttpTransport {
    /// Build a transport from a [`Config`].
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Self::with_http_client(http, config)
    }

    /// Build a transport around a custom reqwest client.
    ///
    /// This allows you to configure proxies, TLS settings, etc. The config's
    /// timeout is ignored in that case.
    pub fn with_http_client(http: reqwest::Client, config: &Config) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("Invalid URL '{}': {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("URL '{}' cannot be a base", config.url)));
        }

        Ok(Self {
            http,
            base_url,
            key: config.key.clone(),
            secret: config.secret.clone(),
        })
    }

    /// Get the base URL.
    pub fn url(&self) -> &Url {
        &self.base_url
    }

    /// Append `path` to the base URL, keeping any path prefix it carries.
    fn endpoint(&self, path: &str) -> String {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            self.base_url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url.to_string()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: Method, path: &str, body: Option<String>) -> Result<Response> {
        let endpoint = self.endpoint(path);
        tracing::debug!(%method, %endpoint, "sending request");

        let mut request = self
            .http
            .request(method, &endpoint)
            .basic_auth(&self.key, Some(&self.secret))
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/json")
                .body(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(status, bytes = body.len(), "received response");
        Ok(Response { status, body })
    }
}
