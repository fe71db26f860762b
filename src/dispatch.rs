//! Event delivery to subscriber callbacks
//!
//! Each callback runs at most once per event. An error or a panic inside a
//! callback is logged and never reaches the polling loop or other callbacks.

use crate::events::TransactionEvent;
use crate::registry::{EventCallback, Snapshot};
use alloy_primitives::Address;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Deliver `event` to every subscription in `snapshot` it involves.
pub fn dispatch(event: &TransactionEvent, snapshot: &Snapshot) -> DispatchReport {
    let mut report = DispatchReport::default();

    let mut wallets: Vec<&Address> = snapshot.keys().filter(|w| event.involves(**w)).collect();
    wallets.sort();

    for wallet in wallets {
        let Some(subscription) = snapshot.get(wallet) else {
            continue;
        };
        match catch_unwind(AssertUnwindSafe(|| (subscription.callback)(event))) {
            Ok(Ok(())) => report.delivered += 1,
            Ok(Err(e)) => {
                warn!(wallet = %wallet, tx = ?event.hash, error = %e, "subscriber callback failed");
                report.failed += 1;
            }
            Err(panic) => {
                error!(
                    wallet = %wallet,
                    tx = ?event.hash,
                    "subscriber callback panicked: {}",
                    panic_message(panic.as_ref())
                );
                report.failed += 1;
            }
        }
    }

    debug!(tx = ?event.hash, delivered = report.delivered, failed = report.failed, "event dispatched");
    report
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Callback forwarding events for `wallet` into an unbounded channel.
///
/// Fails once the receiver is dropped.
pub fn channel_callback(
    wallet: Address,
    sender: mpsc::UnboundedSender<(Address, TransactionEvent)>,
) -> EventCallback {
    Arc::new(move |event| {
        sender
            .send((wallet, event.clone()))
            .map_err(|_| anyhow::anyhow!("event receiver dropped"))
    })
}

/// Like `channel_callback`, but a full queue drops the event and counts as a failure.
pub fn bounded_channel_callback(
    wallet: Address,
    sender: mpsc::Sender<(Address, TransactionEvent)>,
) -> EventCallback {
    Arc::new(move |event| {
        sender
            .try_send((wallet, event.clone()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => anyhow::anyhow!("event queue full"),
                mpsc::error::TrySendError::Closed(_) => anyhow::anyhow!("event receiver dropped"),
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TxStatus;
    use crate::registry::SubscriptionRegistry;
    use alloy_primitives::{address, B256};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WALLET: Address = address!("939d8f09e002eaf17e10acab804164bece5b8e3c");
    const OTHER: Address = address!("f4aa85656d9350dae3d8006d8fb45c33415e6b21");
    const STRANGER: Address = address!("0000000000000000000000000000000000000003");

    fn event(from: Address, to: Address) -> TransactionEvent {
        TransactionEvent {
            hash: B256::ZERO,
            block_number: 1,
            timestamp: 0,
            from_address: from,
            to_address: Some(to),
            native_value: Decimal::ZERO,
            gas_used: 21_000,
            gas_price: Decimal::ONE,
            gas_cost: Decimal::ZERO,
            status: TxStatus::Success,
            transfers: vec![],
        }
    }

    #[test]
    fn test_only_involved_wallets_are_called() {
        let registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for wallet in [WALLET, OTHER, STRANGER] {
            let hits = hits.clone();
            registry.insert(
                wallet,
                Arc::new(move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            );
        }

        let report = dispatch(&event(WALLET, OTHER), &registry.snapshot_active());
        assert_eq!(report.delivered, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failing_callbacks_are_isolated() {
        let registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.insert(WALLET, Arc::new(|_| panic!("boom")));
        registry.insert(STRANGER, Arc::new(|_| anyhow::bail!("nope")));
        let counter = hits.clone();
        registry.insert(
            OTHER,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let report = dispatch(&event(WALLET, OTHER), &registry.snapshot_active());
        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let report = dispatch(&event(STRANGER, OTHER), &registry.snapshot_active());
        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
    }

    #[test]
    fn test_channel_callbacks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let callback = channel_callback(WALLET, tx);
        callback(&event(WALLET, OTHER)).unwrap();
        let (wallet, received) = rx.try_recv().unwrap();
        assert_eq!(wallet, WALLET);
        assert_eq!(received.from_address, WALLET);

        drop(rx);
        assert!(callback(&event(WALLET, OTHER)).is_err());

        let (tx, _rx) = mpsc::channel(1);
        let callback = bounded_channel_callback(WALLET, tx);
        callback(&event(WALLET, OTHER)).unwrap();
        assert!(callback(&event(WALLET, OTHER)).is_err());
    }
}
