use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use careledger_core::{AccountId, TenantId};

/// What kind of business object the account tracks a balance for.
///
/// Modeled as a tagged variant, not inheritance; kind-specific rules are
/// injected through the policy registry rather than hard-coded in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Patient billing balance (minor currency units).
    Patient,
    /// Cash register balance (minor currency units).
    CashRegister,
    /// Inventory stock level (smallest tracked unit of quantity).
    InventoryItem,
}

/// A balance-tracked entity.
///
/// `current_balance` is a cache: it always equals
/// `opening_balance + Σ effect` over the account's movements in committed
/// order. `version` is the optimistic-concurrency counter every balance write
/// must check against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub tenant_id: TenantId,
    pub kind: AccountKind,
    /// Id of the owning business object (patient, register, inventory item).
    pub owner_ref: Uuid,
    pub current_balance: i64,
    pub opening_balance: i64,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Open a new account at `opening_balance`, version 0, no movements yet.
    pub fn open(tenant_id: TenantId, kind: AccountKind, owner_ref: Uuid, opening_balance: i64) -> Self {
        Self {
            id: AccountId::new(),
            tenant_id,
            kind,
            owner_ref,
            current_balance: opening_balance,
            opening_balance,
            version: 0,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_starts_at_opening_balance() {
        let account = Account::open(TenantId::new(), AccountKind::Patient, Uuid::now_v7(), -2_500);
        assert_eq!(account.current_balance, -2_500);
        assert_eq!(account.opening_balance, -2_500);
        assert_eq!(account.version, 0);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&AccountKind::CashRegister).unwrap();
        assert_eq!(json, "\"cash_register\"");
    }
}
