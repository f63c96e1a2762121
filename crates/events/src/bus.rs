//! Balance notification pub/sub (mechanics only).
//!
//! The bus sits after the ledger store: a movement is committed first, then
//! its notification is published. Delivery is **at-least-once** (a failed
//! publish can be retried because the committed movement is never lost), so
//! consumers must be idempotent. Ordering between concurrent publishers is
//! not guaranteed; the movement history, not the bus, is the authority on
//! order.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use crate::notification::BalanceChanged;

/// A live feed of balance notifications.
///
/// Each subscription receives a copy of every notification published after
/// it was created (broadcast semantics). Designed for single-threaded
/// consumption: hand one subscription to one consumer loop.
#[derive(Debug)]
pub struct BalanceSubscription {
    receiver: Receiver<BalanceChanged>,
}

impl BalanceSubscription {
    pub fn new(receiver: Receiver<BalanceChanged>) -> Self {
        Self { receiver }
    }

    /// Block until the next notification arrives.
    pub fn recv(&self) -> Result<BalanceChanged, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Next notification, if one is already queued.
    pub fn try_recv(&self) -> Result<BalanceChanged, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a notification.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<BalanceChanged, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Transport seam for balance notifications.
///
/// Implementations must be safe to share across threads; request handlers
/// publish concurrently after their commits.
pub trait BalanceBus: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, note: BalanceChanged) -> Result<(), Self::Error>;

    fn subscribe(&self) -> BalanceSubscription;
}

impl<B> BalanceBus for Arc<B>
where
    B: BalanceBus + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, note: BalanceChanged) -> Result<(), Self::Error> {
        (**self).publish(note)
    }

    fn subscribe(&self) -> BalanceSubscription {
        (**self).subscribe()
    }
}
