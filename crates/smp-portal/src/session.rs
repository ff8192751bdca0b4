use std::time::Duration;

use crate::transport::{HttpTransport, NetworkError, PortalRequest, PortalResponse, Transport};

/// Fixed-delay retry policy for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Live connection state for one run: the transport (and its cookie jar),
/// the portal address and the token most recently taken from the home page.
#[derive(Debug)]
pub struct Session<T = HttpTransport> {
    transport: T,
    base_url: String,
    retry: RetryPolicy,
    csrf_token: Option<String>,
}

impl Session<HttpTransport> {
    pub fn new(
        base_url: &str,
        user_agent: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, NetworkError> {
        let transport = HttpTransport::new(user_agent, timeout)?;
        Ok(Self::with_transport(transport, base_url, retry))
    }
}

impl<T: Transport> Session<T> {
    pub fn with_transport(transport: T, base_url: &str, retry: RetryPolicy) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
            csrf_token: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    pub(crate) fn set_csrf_token(&mut self, token: String) {
        self.csrf_token = Some(token);
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends `request`, retrying transient failures according to the session's
    /// retry policy. Cookies are carried by the transport across all calls.
    pub async fn fetch(&self, request: &PortalRequest) -> Result<PortalResponse, NetworkError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.retry.attempts => {
                    log::warn!(
                        "{:?} {} failed (attempt {}/{}): {}",
                        request.method,
                        request.url,
                        attempt,
                        self.retry.attempts,
                        e
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, request: &PortalRequest) -> Result<PortalResponse, NetworkError> {
        let response = self.transport.fetch(request).await?;
        log::debug!(
            "{:?} {} -> {} ({})",
            request.method,
            request.url,
            response.status,
            response.url
        );
        if request.require_success && !response.is_success() {
            return Err(NetworkError::Status {
                status: response.status,
                url: response.url,
            });
        }
        Ok(response)
    }
}
