//! Subscription registry
//!
//! Maps watched wallet addresses to their callbacks. Every read and write
//! goes through one mutex; the polling loop only ever works on a snapshot
//! copied out under the lock, so callbacks never run while it is held.

use crate::events::TransactionEvent;
use alloy_primitives::Address;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Callback invoked with every event touching the subscribed wallet.
pub type EventCallback = Arc<dyn Fn(&TransactionEvent) -> anyhow::Result<()> + Send + Sync>;

/// A watched wallet and the sink for its events.
#[derive(Clone)]
pub struct WalletSubscription {
    pub address: Address,
    pub callback: EventCallback,
    pub active: bool,
}

impl fmt::Debug for WalletSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSubscription")
            .field("address", &self.address)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

/// Point-in-time copy of the active subscriptions.
pub type Snapshot = HashMap<Address, WalletSubscription>;

#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: Mutex<HashMap<Address, WalletSubscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscription. Returns false if the address is already subscribed.
    pub fn insert(&self, address: Address, callback: EventCallback) -> bool {
        let mut subs = self.subscriptions.lock();
        if subs.contains_key(&address) {
            return false;
        }
        subs.insert(
            address,
            WalletSubscription {
                address,
                callback,
                active: true,
            },
        );
        true
    }

    /// Remove a subscription. Returns false if the address was not subscribed.
    pub fn remove(&self, address: Address) -> bool {
        self.subscriptions.lock().remove(&address).is_some()
    }

    /// Pause or resume delivery without dropping the subscription.
    pub fn set_active(&self, address: Address, active: bool) -> bool {
        match self.subscriptions.lock().get_mut(&address) {
            Some(sub) => {
                sub.active = active;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, address: Address) -> bool {
        self.subscriptions.lock().contains_key(&address)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.lock().is_empty()
    }

    /// Copy of all active subscriptions, taken under the lock.
    pub fn snapshot_active(&self) -> Snapshot {
        self.subscriptions
            .lock()
            .iter()
            .filter(|(_, sub)| sub.active)
            .map(|(addr, sub)| (*addr, sub.clone()))
            .collect()
    }
}
