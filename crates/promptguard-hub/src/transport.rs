//! HTTP transport used by the fetcher.
//!
//! Redirects are not followed here; the fetcher handles them so the hop limit
//! and credential stripping are enforced in one place for every transport.

use crate::config::HubConfig;
use promptguard_core::{Error, Result};
use std::io::Read;
use std::sync::OnceLock;
use std::time::Duration;

/// A single GET request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: url::Url,
    pub bearer_token: Option<String>,
}

/// Response status, headers of interest and a streaming body
pub struct HttpResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub location: Option<String>,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Issues one request without following redirects
pub trait Transport: Send + Sync {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Blocking reqwest client, built on first use so fully cached models never
/// start the client's background runtime
pub struct HttpTransport {
    connect_timeout: Duration,
    read_timeout: Duration,
    client: OnceLock<reqwest::blocking::Client>,
}

impl HttpTransport {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&reqwest::blocking::Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("promptguard/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(self.connect_timeout)
            .timeout(self.read_timeout)
            .build()
            .map_err(|e| Error::internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self.client.get_or_init(|| client))
    }
}

impl Transport for HttpTransport {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client()?.get(request.url.clone());
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .map_err(|e| Error::download(request.url.as_str(), e.to_string()))?;

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(HttpResponse {
            status: response.status().as_u16(),
            content_length: response.content_length(),
            location,
            body: Box::new(response),
        })
    }
}
