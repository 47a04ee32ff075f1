use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use strategist_core::config::{ModelConfig, RetryConfig};
use strategist_core::error::{Result, StrategistError};

use crate::providers::CompletionClient;

/// A completion client that retries transient failures with jittered
/// exponential backoff.
pub struct RetryingClient {
    inner: Box<dyn CompletionClient>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Box<dyn CompletionClient>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }
}

pub(crate) fn is_retryable(e: &StrategistError) -> bool {
    match e {
        StrategistError::Llm(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        _ => false,
    }
}

pub(crate) fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl CompletionClient for RetryingClient {
    fn complete(
        &self,
        config: &ModelConfig,
        system: Option<String>,
        prompt: String,
    ) -> BoxFuture<'_, Result<String>> {
        let config = config.clone();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            let mut attempt = 0;
            loop {
                match self
                    .inner
                    .complete(&config, system.clone(), prompt.clone())
                    .await
                {
                    Ok(text) => return Ok(text),
                    Err(e) if is_retryable(&e) && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            model = %config.model_id,
                            error = %e,
                            "Retrying LLM request"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Flaky {
        failures_left: AtomicU32,
        calls: Arc<AtomicU32>,
        error: &'static str,
    }

    impl CompletionClient for Flaky {
        fn complete(
            &self,
            _config: &ModelConfig,
            _system: Option<String>,
            _prompt: String,
        ) -> BoxFuture<'_, Result<String>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.failures_left.load(Ordering::SeqCst) > 0 {
                    self.failures_left.fetch_sub(1, Ordering::SeqCst);
                    return Err(StrategistError::Llm(self.error.to_string()));
                }
                Ok("ok".into())
            })
        }
    }

    fn model() -> ModelConfig {
        toml::from_str("model_id = \"test\"").unwrap()
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 4000,
        };
        let late = calculate_backoff(8, &config);
        assert!(late <= Duration::from_millis(4800));
        let first = calculate_backoff(0, &config);
        assert!(first >= Duration::from_millis(800) && first <= Duration::from_millis(1200));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&StrategistError::Llm("HTTP 503 Service Unavailable: x".into())));
        assert!(is_retryable(&StrategistError::Llm("operation timeout".into())));
        assert!(!is_retryable(&StrategistError::Llm("HTTP 401 Unauthorized: bad key".into())));
        assert!(!is_retryable(&StrategistError::Config("no key".into())));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                failures_left: AtomicU32::new(2),
                calls: calls.clone(),
                error: "HTTP 429 Too Many Requests: slow down",
            }),
            fast_retry(3),
        );

        let text = client.complete(&model(), None, "hi".into()).await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                failures_left: AtomicU32::new(10),
                calls: calls.clone(),
                error: "HTTP 500 Internal Server Error: boom",
            }),
            fast_retry(2),
        );

        assert!(client.complete(&model(), None, "hi".into()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                failures_left: AtomicU32::new(1),
                calls: calls.clone(),
                error: "HTTP 400 Bad Request: invalid model",
            }),
            fast_retry(3),
        );

        assert!(client.complete(&model(), None, "hi".into()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
