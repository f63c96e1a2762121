//! Collaborator-facing notifications.
//!
//! The ledger engine publishes a notification after every committed movement;
//! downstream collaborators (dashboards, messaging) subscribe through the
//! [`BalanceBus`] abstraction. The bus is for distribution only; the movement
//! store remains the source of truth.

pub mod bus;
pub mod in_memory_bus;
pub mod notification;

pub use bus::{BalanceBus, BalanceSubscription};
pub use in_memory_bus::{BusError, InMemoryBalanceBus};
pub use notification::BalanceChanged;
