//! HTTP dispatch seam.
//!
//! The pipeline never talks to an HTTP client directly; it hands requests
//! to an [`HttpDispatcher`]. The trait is object-safe and used as
//! `Arc<dyn HttpDispatcher>`. Built-in implementations:
//! [`ReqwestDispatcher`] for real traffic and [`MockDispatcher`] for
//! deterministic tests.
//!
//! Redirect handling, cookies, TLS, and connection pooling are the
//! dispatcher's concern; the pipeline only sees completed exchanges or
//! transport errors.

pub mod client;
pub mod mock;

pub use client::{DispatchConfig, ReqwestDispatcher};
pub use mock::MockDispatcher;

use crate::error::Result;
use crate::request::{FuzzRequest, FuzzResponse};
use async_trait::async_trait;
use std::time::Duration;

/// Abstraction over the HTTP transport.
#[async_trait]
pub trait HttpDispatcher: Send + Sync {
    /// Perform one exchange. Every completed response is `Ok`, whatever
    /// its status code; only transport failures are errors.
    async fn execute(&self, request: &FuzzRequest) -> Result<FuzzResponse>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;

    /// Release held resources. Called once when the run finishes.
    async fn close(&self) {}
}

/// Transport retry policy with exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt. Default: 0.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Growth factor applied per retry.
    pub multiplier: f64,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Randomise each delay into `[0, calculated]` to avoid hammering a
    /// recovering target in lockstep.
    pub jitter: bool,
}

impl RetryPolicy {
    /// No transport retry; errors surface immediately.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::standard()
        }
    }

    /// Two retries, 250ms initial delay, doubling, capped at 10s.
    pub fn standard() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(250),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }

    /// The delay before retry N (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jittered = if self.jitter {
            fastrand::f64() * capped
        } else {
            capped
        };
        Duration::from_secs_f64(jittered)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_exponential() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_retry_delay_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_jitter_in_range() {
        let policy = RetryPolicy {
            jitter: true,
            ..RetryPolicy::standard()
        };
        for _ in 0..100 {
            assert!(policy.delay_for_attempt(0) <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_none_preset() {
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }
}
