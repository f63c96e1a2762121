//! Pluggable per-kind movement validation.
//!
//! The engine itself only knows that effects must be non-zero; everything
//! domain-flavored (a stock level must not go negative, a register may be
//! overdrawn or not) is a policy keyed by [`AccountKind`]. Adapters replace
//! policies per kind when their business rules differ.

use std::collections::HashMap;
use std::sync::Arc;

use careledger_core::{LedgerError, LedgerResult};

use crate::account::{Account, AccountKind};
use crate::movement::MovementType;

/// Validation hook applied to every prospective movement before commit.
///
/// `prospective_balance` already includes the effect (and, inside a batch, the
/// effects of earlier lines against the same account).
pub trait KindPolicy: Send + Sync {
    fn validate(
        &self,
        account: &Account,
        movement_type: MovementType,
        effect: i64,
        prospective_balance: i64,
    ) -> LedgerResult<()>;
}

/// Accepts any signed balance. Default for money kinds, where debt and advance
/// are both meaningful.
#[derive(Debug, Default)]
pub struct UnrestrictedPolicy;

impl KindPolicy for UnrestrictedPolicy {
    fn validate(
        &self,
        _account: &Account,
        _movement_type: MovementType,
        _effect: i64,
        _prospective_balance: i64,
    ) -> LedgerResult<()> {
        Ok(())
    }
}

/// Floors the balance at zero. Default for inventory: stock cannot go
/// negative unless the adapter installs a different policy.
#[derive(Debug, Default)]
pub struct NonNegativeBalancePolicy;

impl KindPolicy for NonNegativeBalancePolicy {
    fn validate(
        &self,
        account: &Account,
        _movement_type: MovementType,
        effect: i64,
        prospective_balance: i64,
    ) -> LedgerResult<()> {
        if prospective_balance < 0 {
            return Err(LedgerError::invalid_effect(format!(
                "effect {effect} would drive account {} below zero (balance {})",
                account.id,
                prospective_balance - effect,
            )));
        }
        Ok(())
    }
}

/// Policy lookup per account kind.
#[derive(Clone)]
pub struct PolicyRegistry {
    policies: HashMap<AccountKind, Arc<dyn KindPolicy>>,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        let mut policies: HashMap<AccountKind, Arc<dyn KindPolicy>> = HashMap::new();
        policies.insert(AccountKind::Patient, Arc::new(UnrestrictedPolicy));
        policies.insert(AccountKind::CashRegister, Arc::new(UnrestrictedPolicy));
        policies.insert(AccountKind::InventoryItem, Arc::new(NonNegativeBalancePolicy));
        Self { policies }
    }
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the policy for one kind.
    pub fn with_policy(mut self, kind: AccountKind, policy: Arc<dyn KindPolicy>) -> Self {
        self.policies.insert(kind, policy);
        self
    }

    pub fn validate(
        &self,
        account: &Account,
        movement_type: MovementType,
        effect: i64,
        prospective_balance: i64,
    ) -> LedgerResult<()> {
        match self.policies.get(&account.kind) {
            Some(policy) => policy.validate(account, movement_type, effect, prospective_balance),
            // Unknown kind: nothing to enforce beyond the engine's own checks.
            None => Ok(()),
        }
    }
}

impl core::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("kinds", &self.policies.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use careledger_core::TenantId;
    use uuid::Uuid;

    fn inventory_account(balance: i64) -> Account {
        let mut account = Account::open(
            TenantId::new(),
            AccountKind::InventoryItem,
            Uuid::now_v7(),
            balance,
        );
        account.current_balance = balance;
        account
    }

    #[test]
    fn inventory_floor_rejects_negative_stock() {
        let registry = PolicyRegistry::default();
        let account = inventory_account(5);

        let err = registry
            .validate(&account, MovementType::StockOut, -8, -3)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEffect(_)));
    }

    #[test]
    fn inventory_floor_allows_drain_to_zero() {
        let registry = PolicyRegistry::default();
        let account = inventory_account(5);

        registry
            .validate(&account, MovementType::StockOut, -5, 0)
            .unwrap();
    }

    #[test]
    fn patient_balance_may_go_negative() {
        let registry = PolicyRegistry::default();
        let account = Account::open(TenantId::new(), AccountKind::Patient, Uuid::now_v7(), 0);

        registry
            .validate(&account, MovementType::Charge, -10_000, -10_000)
            .unwrap();
    }

    #[test]
    fn kind_policy_is_replaceable() {
        // An adapter that explicitly allows negative stock (e.g. backorders).
        let registry = PolicyRegistry::default()
            .with_policy(AccountKind::InventoryItem, Arc::new(UnrestrictedPolicy));
        let account = inventory_account(0);

        registry
            .validate(&account, MovementType::StockOut, -1, -1)
            .unwrap();
    }
}
