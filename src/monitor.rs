//! Public wallet monitor API
//!
//! `MonitorService` owns the subscription registry and the lifecycle of the
//! single polling worker. The worker starts on the first subscription and
//! is asked to stop when the last one is removed. Subscribing and
//! unsubscribing never block on the worker.

use crate::config::{parse_address, MonitorConfig};
use crate::dispatch::panic_message;
use crate::error::MonitorError;
use crate::events::TransactionEvent;
use crate::provider::ChainProvider;
use crate::registry::{EventCallback, SubscriptionRegistry};
use crate::shutdown::{self, ShutdownTrigger};
use crate::token::TokenInfoResolver;
use crate::worker::PollingWorker;
use alloy_primitives::Address;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const STOP_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Running,
    /// Stop requested, worker still finishing its current step
    Stopping,
}

struct Worker {
    trigger: ShutdownTrigger,
    handle: JoinHandle<()>,
}

struct Lifecycle {
    state: MonitorState,
    worker: Option<Worker>,
    /// Bumped on every spawn so `stop()` can tell its worker from a newer one
    generation: u64,
    closed: bool,
}

impl Lifecycle {
    fn refresh(&mut self) {
        if let Some(worker) = &self.worker {
            if worker.handle.is_finished() {
                self.state = MonitorState::Stopped;
            }
        }
    }
}

pub struct MonitorService {
    registry: Arc<SubscriptionRegistry>,
    provider: Arc<dyn ChainProvider>,
    resolver: Arc<dyn TokenInfoResolver>,
    config: Arc<MonitorConfig>,
    runtime: Handle,
    lifecycle: Mutex<Lifecycle>,
}

impl MonitorService {
    /// Create a service hosted on the current tokio runtime.
    pub fn new(
        provider: Arc<dyn ChainProvider>,
        resolver: Arc<dyn TokenInfoResolver>,
        config: MonitorConfig,
    ) -> Result<Self, MonitorError> {
        let runtime = Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;
        Ok(Self::with_runtime(provider, resolver, config, runtime))
    }

    pub fn with_runtime(
        provider: Arc<dyn ChainProvider>,
        resolver: Arc<dyn TokenInfoResolver>,
        config: MonitorConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            registry: Arc::new(SubscriptionRegistry::new()),
            provider,
            resolver,
            config: Arc::new(config),
            runtime,
            lifecycle: Mutex::new(Lifecycle {
                state: MonitorState::Stopped,
                worker: None,
                generation: 0,
                closed: false,
            }),
        }
    }

    /// Watch `address`. Returns false if it was already subscribed.
    ///
    /// Starts the polling worker if it is not running.
    pub fn subscribe<F>(&self, address: &str, callback: F) -> Result<bool, MonitorError>
    where
        F: Fn(&TransactionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_callback(address, Arc::new(callback))
    }

    pub fn subscribe_callback(
        &self,
        address: &str,
        callback: EventCallback,
    ) -> Result<bool, MonitorError> {
        let wallet = parse_wallet(address)?;
        if !self.registry.insert(wallet, callback) {
            return Ok(false);
        }
        info!(wallet = %wallet, "Subscribed");

        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.closed {
            warn!(wallet = %wallet, "monitor is shut down, not starting the polling worker");
        } else {
            self.ensure_running(&mut lifecycle);
        }
        Ok(true)
    }

    /// Stop watching `address`. Returns false if it was not subscribed.
    ///
    /// Removing the last subscription asks the worker to stop without waiting for it.
    pub fn unsubscribe(&self, address: &str) -> Result<bool, MonitorError> {
        let wallet = parse_wallet(address)?;
        if !self.registry.remove(wallet) {
            return Ok(false);
        }
        info!(wallet = %wallet, "Unsubscribed");

        let mut lifecycle = self.lifecycle.lock();
        // A concurrent subscribe may have refilled the registry
        if self.registry.is_empty() {
            Self::request_stop_locked(&mut lifecycle);
        }
        Ok(true)
    }

    /// Pause or resume delivery for a subscribed wallet.
    pub fn set_active(&self, address: &str, active: bool) -> Result<bool, MonitorError> {
        Ok(self.registry.set_active(parse_wallet(address)?, active))
    }

    pub fn is_subscribed(&self, address: &str) -> Result<bool, MonitorError> {
        Ok(self.registry.contains(parse_wallet(address)?))
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    pub fn state(&self) -> MonitorState {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.refresh();
        lifecycle.state
    }

    /// Start the worker if it is not running. Returns true if a worker was spawned.
    pub fn start(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.closed {
            return false;
        }
        self.ensure_running(&mut lifecycle)
    }

    /// Ask the worker to stop without waiting. Returns false if nothing was running.
    pub fn request_stop(&self) -> bool {
        Self::request_stop_locked(&mut self.lifecycle.lock()).is_some()
    }

    /// Stop the worker and wait for it, bounded by the configured shutdown timeout.
    pub async fn stop(&self) -> Result<(), MonitorError> {
        let Some(generation) = Self::request_stop_locked(&mut self.lifecycle.lock()) else {
            return Ok(());
        };

        let timeout = self.config.shutdown_timeout();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let finished = {
                let mut lifecycle = self.lifecycle.lock();
                if lifecycle.generation != generation {
                    // Restarted meanwhile; the new worker waits for ours
                    return Ok(());
                }
                let running = lifecycle
                    .worker
                    .as_ref()
                    .map_or(false, |worker| !worker.handle.is_finished());
                if running {
                    None
                } else {
                    lifecycle.state = MonitorState::Stopped;
                    Some(lifecycle.worker.take())
                }
            };

            if let Some(worker) = finished {
                return match worker {
                    Some(worker) => join_worker(worker.handle).await,
                    None => Ok(()),
                };
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("Polling worker did not stop within {:?}", timeout);
                return Err(MonitorError::ShutdownTimeout(timeout));
            }
            tokio::time::sleep(STOP_POLL).await;
        }
    }

    /// Stop the worker for good; later subscriptions no longer start it.
    pub async fn shutdown(&self) -> Result<(), MonitorError> {
        self.lifecycle.lock().closed = true;
        info!("Shutting down monitor");
        self.stop().await
    }

    fn ensure_running(&self, lifecycle: &mut Lifecycle) -> bool {
        lifecycle.refresh();
        if lifecycle.state == MonitorState::Running {
            return false;
        }

        // A stopping worker must be gone before the next one touches the chain
        let previous = lifecycle.worker.take().map(|worker| worker.handle);
        let (trigger, signal) = shutdown::channel();
        let worker = PollingWorker::new(
            self.registry.clone(),
            self.provider.clone(),
            self.resolver.clone(),
            self.config.clone(),
            signal,
        );

        let handle = self.runtime.spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = join_worker(previous).await {
                    error!(error = %e, "previous polling worker ended abnormally");
                }
            }
            worker.run().await;
        });

        lifecycle.generation += 1;
        lifecycle.worker = Some(Worker { trigger, handle });
        lifecycle.state = MonitorState::Running;
        info!("Polling worker started");
        true
    }

    fn request_stop_locked(lifecycle: &mut Lifecycle) -> Option<u64> {
        lifecycle.refresh();
        match lifecycle.state {
            MonitorState::Running => {
                if let Some(worker) = &lifecycle.worker {
                    worker.trigger.trigger();
                }
                lifecycle.state = MonitorState::Stopping;
                info!("Polling worker stop requested");
                Some(lifecycle.generation)
            }
            MonitorState::Stopping => Some(lifecycle.generation),
            MonitorState::Stopped => None,
        }
    }
}

impl Drop for MonitorService {
    fn drop(&mut self) {
        if let Some(worker) = &self.lifecycle.get_mut().worker {
            worker.trigger.trigger();
        }
    }
}

fn parse_wallet(address: &str) -> Result<Address, MonitorError> {
    parse_address(address).map_err(|e| MonitorError::InvalidAddress {
        address: address.to_string(),
        reason: format!("{:#}", e),
    })
}

async fn join_worker(handle: JoinHandle<()>) -> Result<(), MonitorError> {
    match handle.await {
        Ok(()) => Ok(()),
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic().as_ref());
            error!("Polling worker panicked: {}", message);
            Err(MonitorError::WorkerPanicked(message))
        }
        Err(_) => Ok(()),
    }
}
