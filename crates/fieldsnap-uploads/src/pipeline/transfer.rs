//! Transfer stage: object store upload with exponential backoff

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::storage::ObjectStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempt budget and backoff schedule for transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Sleep after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(crate::config::DEFAULT_BACKOFF_BASE_MS),
        }
    }
}

impl From<&PipelineConfig> for RetryPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.backoff_base(),
        }
    }
}

/// Successful transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub url: String,
    pub attempts: u32,
}

#[derive(Clone)]
pub struct TransferStage {
    store: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
}

impl TransferStage {
    pub fn new(store: Arc<dyn ObjectStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Upload `bytes` under `key`, retrying transient failures
    ///
    /// No jitter. On exhaustion the last error is returned together with the
    /// number of attempts made.
    pub async fn transfer(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<TransferReceipt, PipelineError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.store.upload(key, bytes.clone(), content_type).await {
                Ok(()) => {
                    debug!(key, attempt, "Transfer succeeded");
                    return Ok(TransferReceipt {
                        url: self.store.public_url(key),
                        attempts: attempt,
                    });
                },
                Err(e) if attempt < max_attempts => {
                    let backoff = self.policy.delay_after(attempt);
                    warn!(
                        key,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %format!("{:#}", e),
                        "Transfer attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                },
                Err(e) => {
                    warn!(key, attempt, error = %format!("{:#}", e), "Transfer attempts exhausted");
                    return Err(PipelineError::Transfer {
                        attempts: attempt,
                        source: e,
                    });
                },
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    /// Fails the first `failures` uploads, records when each attempt happened
    struct FlakyStore {
        failures: u32,
        attempts: Mutex<Vec<Instant>>,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                attempts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ObjectStore for FlakyStore {
        async fn upload(&self, _key: &str, _data: Vec<u8>, _content_type: &str) -> Result<()> {
            let mut attempts = self.attempts.lock();
            attempts.push(Instant::now());
            if attempts.len() as u32 <= self.failures {
                anyhow::bail!("connection reset (attempt {})", attempts.len());
            }
            Ok(())
        }

        fn public_url(&self, key: &str) -> String {
            format!("https://cdn.test/{}", key)
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let store = FlakyStore::new(2);
        let stage = TransferStage::new(store.clone(), RetryPolicy::default());

        let receipt = stage.transfer("S1/before/x.jpg", vec![1, 2, 3], "image/jpeg").await.unwrap();

        assert_eq!(receipt.attempts, 3);
        assert_eq!(receipt.url, "https://cdn.test/S1/before/x.jpg");

        let attempts = store.attempts.lock();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[1] - attempts[0], Duration::from_secs(1));
        assert_eq!(attempts[2] - attempts[1], Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_error() {
        let store = FlakyStore::new(u32::MAX);
        let stage = TransferStage::new(store.clone(), RetryPolicy::default());

        let err = stage.transfer("k", vec![], "image/jpeg").await.unwrap_err();

        match &err {
            PipelineError::Transfer { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("attempt 3"));
        assert_eq!(store.attempts.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_policy_does_not_sleep() {
        let store = FlakyStore::new(1);
        let stage = TransferStage::new(
            store.clone(),
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_secs(30),
            },
        );

        let started = Instant::now();
        assert!(stage.transfer("k", vec![], "image/jpeg").await.is_err());
        assert_eq!(Instant::now() - started, Duration::ZERO);
    }
}
