//! Retrying chain reads
//!
//! Every single request (head, block, receipt) gets a bounded number of
//! attempts with exponential backoff. Both the request in flight and the
//! sleeps between attempts are cut short by shutdown.

use crate::config::MonitorConfig;
use crate::error::FetchError;
use crate::provider::ChainProvider;
use crate::shutdown::ShutdownSignal;
use crate::types::{Block, Receipt};
use alloy_primitives::B256;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const BACKOFF_MULTIPLIER: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            attempts: config.fetch_attempts.max(1),
            backoff: config.fetch_backoff(),
            max_backoff: config.fetch_backoff_max(),
        }
    }

    /// Delay after the zero-based `attempt` failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = BACKOFF_MULTIPLIER.saturating_pow(attempt);
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Run `op` until it yields a value, the attempts run out, or shutdown fires.
///
/// `Ok(None)` from `op` counts as a failed attempt; if every attempt ended
/// that way the result is `FetchError::Missing`.
pub async fn retry<T, F, Fut>(
    what: &str,
    policy: &RetryPolicy,
    shutdown: &mut ShutdownSignal,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    let mut last_error = None;

    for attempt in 0..policy.attempts {
        if shutdown.is_triggered() {
            return Err(FetchError::Cancelled);
        }

        let Some(outcome) = shutdown.guard(op()).await else {
            return Err(FetchError::Cancelled);
        };
        match outcome {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                debug!(attempt = attempt + 1, "{} not available yet", what);
                last_error = None;
            }
            Err(e) => {
                warn!(attempt = attempt + 1, error = %format!("{:#}", e), "{} failed", what);
                last_error = Some(e);
            }
        }

        if attempt + 1 < policy.attempts && shutdown.sleep(policy.delay(attempt)).await {
            return Err(FetchError::Cancelled);
        }
    }

    Err(match last_error {
        Some(source) => FetchError::Exhausted {
            what: what.to_string(),
            attempts: policy.attempts,
            source,
        },
        None => FetchError::Missing {
            what: what.to_string(),
            attempts: policy.attempts,
        },
    })
}

/// `ChainProvider` reads wrapped in the retry policy.
pub struct BlockFetcher {
    provider: Arc<dyn ChainProvider>,
    policy: RetryPolicy,
}

impl BlockFetcher {
    pub fn new(provider: Arc<dyn ChainProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub async fn head(&self, shutdown: &mut ShutdownSignal) -> Result<u64, FetchError> {
        retry("head block number", &self.policy, shutdown, || async {
            self.provider.get_block_height().await.map(Some)
        })
        .await
    }

    pub async fn block(&self, height: u64, shutdown: &mut ShutdownSignal) -> Result<Block, FetchError> {
        let what = format!("block {}", height);
        retry(&what, &self.policy, shutdown, || self.provider.get_block(height)).await
    }

    pub async fn receipt(&self, hash: B256, shutdown: &mut ShutdownSignal) -> Result<Receipt, FetchError> {
        let what = format!("receipt {:?}", hash);
        retry(&what, &self.policy, shutdown, || {
            self.provider.get_transaction_receipt(hash)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use crate::testing::FakeChain;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            attempts: 5,
            backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(9),
        };
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(3));
        assert_eq!(policy.delay(2), Duration::from_secs(9));
        assert_eq!(policy.delay(10), Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let calls = AtomicU32::new(0);
        let mut signal = ShutdownSignal::never();
        let value = retry("thing", &fast_policy(3), &mut signal, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                anyhow::bail!("flaky")
            }
            Ok(Some(7u64))
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted_and_missing() {
        let mut signal = ShutdownSignal::never();
        let err = retry("thing", &fast_policy(2), &mut signal, || async {
            Err::<Option<u64>, _>(anyhow::anyhow!("down"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, FetchError::Exhausted { attempts: 2, .. }));

        let err = retry("thing", &fast_policy(2), &mut signal, || async { Ok(None::<u64>) })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Missing { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_retry_stops_on_shutdown() {
        let (trigger, mut signal) = shutdown::channel();
        trigger.trigger();
        let err = retry("thing", &fast_policy(3), &mut signal, || async { Ok(Some(1u64)) })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_retry_abandons_request_in_flight() {
        let (trigger, mut signal) = shutdown::channel();
        let started = std::time::Instant::now();

        let handle = tokio::spawn(async move {
            retry("thing", &fast_policy(3), &mut signal, || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Some(1u64))
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.trigger();

        assert!(handle.await.unwrap().unwrap_err().is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_block_fetch_retries_provider() {
        let chain = Arc::new(FakeChain::new(50));
        chain.fail_block(40, 2);
        let fetcher = BlockFetcher::new(chain.clone(), fast_policy(3));

        let block = fetcher.block(40, &mut ShutdownSignal::never()).await.unwrap();
        assert_eq!(block.number, 40);
        assert_eq!(chain.fetched_blocks(), vec![40, 40, 40]);

        // Above the head the node keeps answering null
        let err = fetcher.block(60, &mut ShutdownSignal::never()).await.unwrap_err();
        assert!(matches!(err, FetchError::Missing { .. }));
    }
}
