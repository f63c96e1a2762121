//! In-memory balance bus for tests and single-process deployments.

use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{BalanceBus, BalanceSubscription};
use crate::notification::BalanceChanged;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus lock poisoned")]
    Poisoned,
}

/// Fan-out over std mpsc channels.
///
/// A send fails exactly when the receiving subscription was dropped, so the
/// subscriber list is rebuilt from the survivors on every publish; a dead
/// subscriber costs one failed send and is gone.
#[derive(Debug, Default)]
pub struct InMemoryBalanceBus {
    subscribers: Mutex<Vec<mpsc::Sender<BalanceChanged>>>,
}

impl InMemoryBalanceBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        // The Vec itself is always valid; poisoning only marks a panicked
        // holder, so recover and read.
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl BalanceBus for InMemoryBalanceBus {
    type Error = BusError;

    fn publish(&self, note: BalanceChanged) -> Result<(), BusError> {
        let mut subs = self.subscribers.lock().map_err(|_| BusError::Poisoned)?;

        let mut live = Vec::with_capacity(subs.len());
        for tx in subs.drain(..) {
            if tx.send(note.clone()).is_ok() {
                live.push(tx);
            }
        }
        *subs = live;

        Ok(())
    }

    fn subscribe(&self) -> BalanceSubscription {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        BalanceSubscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use careledger_core::{AccountId, MovementId};

    fn note(new_balance: i64) -> BalanceChanged {
        BalanceChanged {
            account_id: AccountId::new(),
            new_balance,
            movement_id: MovementId::new(),
        }
    }

    #[test]
    fn subscribers_receive_published_notifications() {
        let bus = InMemoryBalanceBus::new();
        let sub = bus.subscribe();

        let published = note(1_500);
        bus.publish(published.clone()).unwrap();

        assert_eq!(sub.try_recv().unwrap(), published);
    }

    #[test]
    fn every_subscriber_gets_its_own_copy() {
        let bus = InMemoryBalanceBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        let published = note(42);
        bus.publish(published.clone()).unwrap();

        assert_eq!(first.try_recv().unwrap(), published);
        assert_eq!(second.try_recv().unwrap(), published);
    }

    #[test]
    fn dropped_subscribers_are_swept_on_publish() {
        let bus = InMemoryBalanceBus::new();
        drop(bus.subscribe());
        let survivor = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(note(0)).unwrap();

        assert_eq!(bus.subscriber_count(), 1);
        assert!(survivor.try_recv().is_ok());
    }
}
