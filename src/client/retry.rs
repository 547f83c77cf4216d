use super::{Client, ClientError, ClientRequest, ClientResponse};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Backoff schedule for `RetryingClient`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to half the delay again at random
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), ignoring jitter.
    /// The provider's `retry_after` wins when present.
    pub fn delay(&self, attempt: u32, error: &ClientError) -> Duration {
        if let Some(after) = error.retry_after {
            return after.min(self.max_delay);
        }
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let half = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=half))
    }
}

/// Retries retryable client errors with exponential backoff
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: Client> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

#[async_trait]
impl<C: Client> Client for RetryingClient<C> {
    async fn send(&self, request: &ClientRequest) -> Result<ClientResponse, ClientError> {
        let mut attempt = 1;
        loop {
            match self.inner.send(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.jittered(self.policy.delay(attempt, &e));
                    tracing::warn!(
                        model = %self.inner.model_id(),
                        attempt,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Retrying client request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GenerationParams;
    use crate::message::{Message, Usage};
    use crate::testing::MockClient;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            jitter: false,
        }
    }

    fn request() -> ClientRequest {
        ClientRequest::new(vec![], GenerationParams::default())
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        let err = ClientError::unavailable("503");
        assert_eq!(policy.delay(1, &err), Duration::from_secs(1));
        assert_eq!(policy.delay(2, &err), Duration::from_secs(2));
        assert_eq!(policy.delay(3, &err), Duration::from_secs(4));
        assert_eq!(policy.delay(10, &err), Duration::from_secs(30));
        assert_eq!(policy.delay(64, &err), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_after_wins() {
        let policy = RetryPolicy::default();
        let err = ClientError::rate_limited("429").with_retry_after(Duration::from_secs(7));
        assert_eq!(policy.delay(1, &err), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let mock = MockClient::new("mock");
        mock.queue_error(ClientError::unavailable("503"));
        mock.queue_error(ClientError::rate_limited("429"));
        mock.queue_response(ClientResponse::new(Message::assistant("ok"), Usage::default()));
        let client = RetryingClient::new(mock, fast_policy(3));

        let response = client.send(&request()).await.unwrap();
        assert_eq!(response.message.text(), "ok");
        assert_eq!(client.into_inner().recorded_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mock = MockClient::new("mock");
        for _ in 0..5 {
            mock.queue_error(ClientError::unavailable("503"));
        }
        let client = RetryingClient::new(mock, fast_policy(2));

        let err = client.send(&request()).await.unwrap_err();
        assert_eq!(err.kind, crate::client::ClientErrorKind::Unavailable);
        assert_eq!(client.into_inner().recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_returns_immediately() {
        let mock = MockClient::new("mock");
        mock.queue_error(ClientError::auth("401"));
        mock.queue_response(ClientResponse::new(Message::assistant("never"), Usage::default()));
        let client = RetryingClient::new(mock, fast_policy(5));

        assert!(client.send(&request()).await.is_err());
        assert_eq!(client.into_inner().recorded_requests().len(), 1);
    }
}
