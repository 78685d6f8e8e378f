//! Mock dispatcher for testing without a live target.
//!
//! [`MockDispatcher`] answers from a handler closure and records every
//! request it sees, allowing downstream consumers to write deterministic
//! tests against this crate.
//!
//! # Example
//!
//! ```
//! use fuzz_pipeline::dispatch::MockDispatcher;
//!
//! let mock = MockDispatcher::with_status(404);
//! ```

use super::HttpDispatcher;
use crate::error::{FuzzError, Result};
use crate::request::{FuzzRequest, FuzzResponse};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

type Responder = dyn Fn(&FuzzRequest) -> Result<FuzzResponse> + Send + Sync;

/// A test dispatcher answering from a closure.
pub struct MockDispatcher {
    responder: Box<Responder>,
    seen: Mutex<Vec<FuzzRequest>>,
    latency: Option<Duration>,
}

impl MockDispatcher {
    /// Answer every request with the given handler.
    pub fn respond_with(
        responder: impl Fn(&FuzzRequest) -> Result<FuzzResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            seen: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    /// Always answer 200 with an empty body.
    pub fn ok() -> Self {
        Self::with_status(200)
    }

    /// Always answer with the given status.
    pub fn with_status(status: u16) -> Self {
        Self::respond_with(move |_| Ok(FuzzResponse::with_status(status)))
    }

    /// Always fail with a network error.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::respond_with(move |_| Err(FuzzError::Network(message.clone())))
    }

    /// Sleep this long before answering, to exercise in-flight behavior.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<FuzzRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// URLs of every request seen so far.
    pub fn urls(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|r| r.url.clone()).collect()
    }

    /// Number of requests dispatched.
    pub fn hits(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpDispatcher for MockDispatcher {
    async fn execute(&self, request: &FuzzRequest) -> Result<FuzzResponse> {
        self.seen.lock().unwrap().push(request.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        (self.responder)(request)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_requests() {
        let mock = MockDispatcher::ok();
        let resp = mock.execute(&FuzzRequest::get("http://t/a")).await.unwrap();
        assert_eq!(resp.status, 200);
        mock.execute(&FuzzRequest::get("http://t/b")).await.unwrap();
        assert_eq!(mock.urls(), vec!["http://t/a", "http://t/b"]);
        assert_eq!(mock.hits(), 2);
    }

    #[tokio::test]
    async fn test_mock_handler_sees_request() {
        let mock = MockDispatcher::respond_with(|req| {
            let status = if req.url.ends_with("admin") { 301 } else { 404 };
            Ok(FuzzResponse::with_status(status))
        });
        assert_eq!(
            mock.execute(&FuzzRequest::get("http://t/admin")).await.unwrap().status,
            301
        );
        assert_eq!(
            mock.execute(&FuzzRequest::get("http://t/img")).await.unwrap().status,
            404
        );
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockDispatcher::failing("boom");
        let err = mock.execute(&FuzzRequest::get("http://t/x")).await.unwrap_err();
        assert!(matches!(err, FuzzError::Network(_)));
    }
}
