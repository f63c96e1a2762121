//! Notification payloads published by the ledger engine.

use serde::{Deserialize, Serialize};

use careledger_core::{AccountId, MovementId};

/// Published after every successfully committed movement.
///
/// Carries just enough for downstream collaborators (dashboards, messaging) to
/// react or re-query; the movement history remains the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChanged {
    pub account_id: AccountId,
    pub new_balance: i64,
    pub movement_id: MovementId,
}
