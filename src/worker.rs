//! Polling worker
//!
//! One task owns the cursor, the decimals cache and the block pipeline. Each
//! tick it reads the head, plans a confirmed range and processes it block by
//! block. A block is gathered completely (block, receipts, decoded events)
//! before anything is dispatched, so retrying a block never delivers an
//! event twice.

use crate::analyzer::TransactionAnalyzer;
use crate::config::{FetchFailurePolicy, MonitorConfig};
use crate::cursor::ChainCursor;
use crate::dispatch::dispatch;
use crate::error::FetchError;
use crate::events::TransactionEvent;
use crate::fetcher::{BlockFetcher, RetryPolicy};
use crate::filter::matching_transactions;
use crate::provider::ChainProvider;
use crate::registry::{Snapshot, SubscriptionRegistry};
use crate::shutdown::ShutdownSignal;
use crate::token::TokenInfoResolver;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Fetches one block and turns its matching transactions into events.
pub struct BlockProcessor {
    fetcher: BlockFetcher,
    analyzer: TransactionAnalyzer,
}

impl BlockProcessor {
    pub fn new(
        provider: Arc<dyn ChainProvider>,
        resolver: Arc<dyn TokenInfoResolver>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            fetcher: BlockFetcher::new(provider.clone(), RetryPolicy::from_config(config)),
            analyzer: TransactionAnalyzer::new(provider, resolver, config),
        }
    }

    pub fn fetcher(&self) -> &BlockFetcher {
        &self.fetcher
    }

    /// Events of block `height` for the wallets in `snapshot`, in transaction order.
    ///
    /// Fails only when the block or one of the matched receipts cannot be
    /// fetched; a transaction that cannot be analyzed is logged and skipped.
    pub async fn collect_events(
        &mut self,
        height: u64,
        snapshot: &Snapshot,
        shutdown: &mut ShutdownSignal,
    ) -> Result<Vec<TransactionEvent>, FetchError> {
        let block = self.fetcher.block(height, shutdown).await?;
        let matched = matching_transactions(&block.transactions, snapshot);
        if matched.is_empty() {
            return Ok(Vec::new());
        }
        debug!(block = height, matched = matched.len(), "matched watched transactions");

        let mut events = Vec::with_capacity(matched.len());
        for tx in matched {
            if shutdown.is_triggered() {
                return Err(FetchError::Cancelled);
            }
            let receipt = self.fetcher.receipt(tx.hash, shutdown).await?;
            // Decimals and market-data lookups can be slow; nothing is delivered yet
            let Some(analyzed) = shutdown.guard(self.analyzer.analyze(&block, tx, &receipt)).await
            else {
                return Err(FetchError::Cancelled);
            };
            match analyzed {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => {
                    error!(block = height, tx = ?tx.hash, error = %format!("{:#}", e), "failed to build event");
                }
            }
        }
        Ok(events)
    }
}

pub struct PollingWorker {
    registry: Arc<SubscriptionRegistry>,
    processor: BlockProcessor,
    config: Arc<MonitorConfig>,
    shutdown: ShutdownSignal,
}

impl PollingWorker {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        provider: Arc<dyn ChainProvider>,
        resolver: Arc<dyn TokenInfoResolver>,
        config: Arc<MonitorConfig>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            processor: BlockProcessor::new(provider, resolver, &config),
            registry,
            config,
            shutdown,
        }
    }

    /// Run until shutdown is requested.
    pub async fn run(mut self) {
        let Some(mut cursor) = self.initial_cursor().await else {
            info!("Polling worker stopped before start");
            return;
        };
        info!("Starting monitoring from block {}", cursor.last_processed() + 1);

        while !self.shutdown.is_triggered() {
            match self.tick(&mut cursor).await {
                Ok(()) => {}
                Err(FetchError::Cancelled) => break,
                Err(e) => warn!(error = %e, "poll tick failed"),
            }
            if self.shutdown.sleep(self.config.poll_interval()).await {
                break;
            }
        }

        info!("Polling worker stopped after block {}", cursor.last_processed());
    }

    async fn initial_cursor(&mut self) -> Option<ChainCursor> {
        loop {
            match self.processor.fetcher().head(&mut self.shutdown).await {
                Ok(head) => return Some(ChainCursor::starting_at(head, self.config.initial_lookback)),
                Err(FetchError::Cancelled) => return None,
                Err(e) => warn!(error = %e, "could not read head block, retrying"),
            }
            if self.shutdown.sleep(self.config.poll_interval()).await {
                return None;
            }
        }
    }

    async fn tick(&mut self, cursor: &mut ChainCursor) -> Result<(), FetchError> {
        let head = self.processor.fetcher().head(&mut self.shutdown).await?;
        let Some(range) =
            cursor.next_range(head, self.config.confirmation_lag, self.config.chunk_size)
        else {
            debug!(head, last = cursor.last_processed(), "no confirmed blocks to process");
            return Ok(());
        };

        info!("Processing blocks {} to {} (head {})", range.start(), range.end(), head);
        for height in range {
            if self.shutdown.is_triggered() {
                return Err(FetchError::Cancelled);
            }
            self.process_block(height).await?;
            cursor.advance_to(height);
            if self.shutdown.sleep(self.config.block_delay()).await {
                return Err(FetchError::Cancelled);
            }
        }
        Ok(())
    }

    /// Process one block under the whole-block retry and failure policy.
    ///
    /// Returns `Ok` once the block is done or skipped.
    async fn process_block(&mut self, height: u64) -> Result<(), FetchError> {
        let max_attempts = self.config.block_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let snapshot = self.registry.snapshot_active();
            if snapshot.is_empty() {
                debug!(block = height, "no active subscriptions");
                return Ok(());
            }

            match self
                .processor
                .collect_events(height, &snapshot, &mut self.shutdown)
                .await
            {
                Ok(events) => {
                    for event in &events {
                        dispatch(event, &snapshot);
                    }
                    if !events.is_empty() {
                        info!(block = height, events = events.len(), "Completed block {}", height);
                    }
                    return Ok(());
                }
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(e) if attempt >= max_attempts => match self.config.fetch_failure_policy {
                    FetchFailurePolicy::Skip => {
                        error!(block = height, error = %e, "skipping block after {} attempts", attempt);
                        return Ok(());
                    }
                    FetchFailurePolicy::Stall => {
                        error!(block = height, error = %e, "block still failing after {} attempts, holding position", attempt);
                        attempt = 0;
                    }
                },
                Err(e) => warn!(block = height, attempt, error = %e, "block attempt failed"),
            }

            if self.shutdown.sleep(self.config.block_retry_delay()).await {
                return Err(FetchError::Cancelled);
            }
        }
    }
}
