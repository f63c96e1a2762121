//! Derived presentation aggregates.
//!
//! Everything here is recomputed from the movement history on demand and is
//! never a source of truth; the engine's cached balance and the history chain
//! remain authoritative.

use serde::{Deserialize, Serialize};

use careledger_core::{AccountId, LedgerResult, TenantId};
use careledger_events::BalanceBus;

use crate::engine::LedgerEngine;
use crate::movement::MovementType;
use crate::store::LedgerStore;

/// Summary of a money account for display: current balance split into debt
/// and advance, plus lifetime totals by movement class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatement {
    pub account_id: AccountId,
    pub balance: i64,
    /// Sum of charge magnitudes over the account's lifetime.
    pub total_charged: i64,
    /// Sum of payment magnitudes over the account's lifetime.
    pub total_paid: i64,
    /// Sum of refund magnitudes over the account's lifetime.
    pub total_refunded: i64,
    /// Amount owed to the clinic; zero when the balance is non-negative.
    pub debt: i64,
    /// Prepaid amount held on the account; zero when the balance is negative.
    pub advance: i64,
    pub movement_count: usize,
}

impl<S, B> LedgerEngine<S, B>
where
    S: LedgerStore,
    B: BalanceBus,
{
    /// Build the statement view from the full history of one account.
    pub fn account_statement(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> LedgerResult<AccountStatement> {
        let account = self.get_account(tenant_id, account_id)?;
        let history = self.store.movements(tenant_id, account_id)?;

        let mut total_charged = 0i64;
        let mut total_paid = 0i64;
        let mut total_refunded = 0i64;
        for movement in &history {
            match movement.movement_type {
                MovementType::Charge => total_charged += movement.effect.abs(),
                MovementType::Payment => total_paid += movement.effect.abs(),
                MovementType::Refund => total_refunded += movement.effect.abs(),
                _ => {}
            }
        }

        let balance = account.current_balance;
        Ok(AccountStatement {
            account_id,
            balance,
            total_charged,
            total_paid,
            total_refunded,
            debt: (-balance).max(0),
            advance: balance.max(0),
            movement_count: history.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use uuid::Uuid;

    use careledger_core::{LedgerError, UserId};
    use careledger_events::InMemoryBalanceBus;

    use crate::account::AccountKind;
    use crate::movement::NewMovement;
    use crate::store::InMemoryLedgerStore;

    type TestEngine = LedgerEngine<Arc<InMemoryLedgerStore>, InMemoryBalanceBus>;

    fn test_engine() -> (TestEngine, TenantId) {
        let engine = LedgerEngine::new(Arc::new(InMemoryLedgerStore::new()), InMemoryBalanceBus::new());
        (engine, TenantId::new())
    }

    #[test]
    fn statement_splits_debt_from_advance() {
        let (engine, tenant_id) = test_engine();
        let actor = UserId::new();
        let account = engine
            .open_account(tenant_id, AccountKind::Patient, Uuid::now_v7(), 0)
            .unwrap();

        engine
            .apply_movement(
                tenant_id,
                NewMovement::new(account.id, MovementType::Charge, -30_000),
                actor,
            )
            .unwrap();
        engine
            .apply_movement(
                tenant_id,
                NewMovement::new(account.id, MovementType::Payment, 10_000),
                actor,
            )
            .unwrap();

        let statement = engine.account_statement(tenant_id, account.id).unwrap();
        assert_eq!(statement.balance, -20_000);
        assert_eq!(statement.debt, 20_000);
        assert_eq!(statement.advance, 0);
        assert_eq!(statement.total_charged, 30_000);
        assert_eq!(statement.total_paid, 10_000);
        assert_eq!(statement.total_refunded, 0);
        assert_eq!(statement.movement_count, 2);

        // Overpay: the debt flips to an advance.
        engine
            .apply_movement(
                tenant_id,
                NewMovement::new(account.id, MovementType::Payment, 25_000),
                actor,
            )
            .unwrap();
        let statement = engine.account_statement(tenant_id, account.id).unwrap();
        assert_eq!(statement.debt, 0);
        assert_eq!(statement.advance, 5_000);
    }

    #[test]
    fn refund_totals_use_magnitudes() {
        let (engine, tenant_id) = test_engine();
        let actor = UserId::new();
        let account = engine
            .open_account(tenant_id, AccountKind::Patient, Uuid::now_v7(), 0)
            .unwrap();

        let payment = engine
            .apply_movement(
                tenant_id,
                NewMovement::new(account.id, MovementType::Payment, 50_000),
                actor,
            )
            .unwrap();
        engine
            .execute_refund(tenant_id, payment.id, 20_000, actor, None)
            .unwrap();

        let statement = engine.account_statement(tenant_id, account.id).unwrap();
        assert_eq!(statement.total_paid, 50_000);
        assert_eq!(statement.total_refunded, 20_000);
        assert_eq!(statement.balance, 30_000);
    }

    #[test]
    fn fresh_account_statement_reflects_opening_balance() {
        let (engine, tenant_id) = test_engine();
        let account = engine
            .open_account(tenant_id, AccountKind::Patient, Uuid::now_v7(), 12_000)
            .unwrap();

        let statement = engine.account_statement(tenant_id, account.id).unwrap();
        assert_eq!(statement.balance, 12_000);
        assert_eq!(statement.advance, 12_000);
        assert_eq!(statement.movement_count, 0);
    }

    #[test]
    fn unknown_account_is_rejected() {
        let (engine, tenant_id) = test_engine();
        let err = engine
            .account_statement(tenant_id, AccountId::new())
            .unwrap_err();
        assert_eq!(err, LedgerError::AccountNotFound);
    }
}
