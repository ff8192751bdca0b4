use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned status {status}")]
    Status { status: u16, url: String },
    #[error("Connection failed: {0}")]
    Connection(String),
}

impl NetworkError {
    /// Whether repeating the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            NetworkError::Http(e) => e.is_connect() || e.is_timeout(),
            NetworkError::Status { status, .. } => *status >= 500,
            NetworkError::Connection(_) => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortalRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
    /// Treat a non-2xx final status as a [`NetworkError::Status`].
    pub require_success: bool,
}

impl PortalRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            headers: Vec::new(),
            require_success: true,
        }
    }

    pub fn post(url: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
            headers: Vec::new(),
            require_success: true,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn allow_error_status(mut self) -> Self {
        self.require_success = false;
        self
    }

    pub fn body_field(&self, key: &str) -> Option<&str> {
        match &self.body {
            Some(RequestBody::Json(value)) => value.get(key).and_then(|v| v.as_str()),
            Some(RequestBody::Form(fields)) => fields
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str()),
            None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalResponse {
    pub status: u16,
    /// URL after redirects were followed.
    pub url: String,
    pub body: String,
}

impl PortalResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Carries one request to the portal and reports what came back.
///
/// Implementations own the cookie state: cookies set by any response must be
/// sent on every later request made through the same transport.
pub trait Transport {
    fn fetch(
        &self,
        request: &PortalRequest,
    ) -> impl Future<Output = Result<PortalResponse, NetworkError>> + Send;
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, NetworkError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .cookie_store(true)
            .build()?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn fetch(&self, request: &PortalRequest) -> Result<PortalResponse, NetworkError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            Some(RequestBody::Form(fields)) => builder.form(fields),
            Some(RequestBody::Json(value)) => builder.json(value),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .inspect_err(|e| log::error!("Decode error: {e:?}"))?;

        Ok(PortalResponse { status, url, body })
    }
}
