//! The reqwest-backed dispatcher.

use super::{HttpDispatcher, RetryPolicy};
use crate::error::{FuzzError, Result};
use crate::request::{FuzzRequest, FuzzResponse};
use async_trait::async_trait;
use reqwest::{redirect, Client, Method};
use std::time::{Duration, Instant};
use tracing::debug;

/// Transport configuration for [`ReqwestDispatcher`].
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Per-request timeout. Default: 30 seconds.
    pub timeout: Duration,

    /// Whether the client chases redirects itself. Default: `false`;
    /// a fuzzer usually wants to see the 3xx, not its target.
    pub follow_redirects: bool,

    /// `User-Agent` header value.
    pub user_agent: String,

    /// Transport retry policy. Default: no retry.
    pub retry: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            follow_redirects: false,
            user_agent: concat!("fuzz-pipeline/", env!("CARGO_PKG_VERSION")).to_string(),
            retry: RetryPolicy::none(),
        }
    }
}

/// Dispatches requests over a shared [`reqwest::Client`].
pub struct ReqwestDispatcher {
    client: Client,
    config: DispatchConfig,
}

impl ReqwestDispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        let redirects = if config.follow_redirects {
            redirect::Policy::limited(10)
        } else {
            redirect::Policy::none()
        };
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(redirects)
            .user_agent(config.user_agent.clone())
            .build()
            .expect("failed to build HTTP client");
        Self { client, config }
    }

    async fn send_once(&self, request: &FuzzRequest) -> Result<FuzzResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| FuzzError::BadOptions(format!("bad HTTP method '{}'", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().await?;

        Ok(FuzzResponse {
            status,
            headers,
            body,
            elapsed: started.elapsed(),
        })
    }

    fn is_retryable(error: &FuzzError) -> bool {
        match error {
            FuzzError::Request(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl Default for ReqwestDispatcher {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}

#[async_trait]
impl HttpDispatcher for ReqwestDispatcher {
    async fn execute(&self, request: &FuzzRequest) -> Result<FuzzResponse> {
        let mut last_error = None;

        for attempt in 0..=self.config.retry.max_retries {
            if attempt > 0 {
                let delay = self.config.retry.delay_for_attempt(attempt - 1);
                debug!(url = %request.url, attempt, ?delay, "retrying request");
                tokio::time::sleep(delay).await;
            }
            match self.send_once(request).await {
                Ok(response) => return Ok(response),
                Err(e) if Self::is_retryable(&e) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| FuzzError::Network("retry loop exited unexpectedly".into())))
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(!config.follow_redirects);
        assert_eq!(config.retry.max_retries, 0);
    }

    #[tokio::test]
    async fn test_bad_method_rejected() {
        let dispatcher = ReqwestDispatcher::default();
        let request = FuzzRequest::new("NO SPACES ALLOWED", "http://localhost:1/");
        let err = dispatcher.execute(&request).await.unwrap_err();
        assert!(matches!(err, FuzzError::BadOptions(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_request_error() {
        // Port 1 is essentially never listening.
        let dispatcher = ReqwestDispatcher::default();
        let request = FuzzRequest::get("http://127.0.0.1:1/probe");
        let err = dispatcher.execute(&request).await.unwrap_err();
        assert!(matches!(err, FuzzError::Request(_)));
    }
}
