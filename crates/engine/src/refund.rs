//! Refund policy in front of the engine.
//!
//! A refund is only valid against a specific prior payment movement, and only
//! up to that payment's remaining refundable amount (original magnitude minus
//! all prior refunds referencing it). The executing path reads the payment
//! account's version before the refund history and commits conditional on
//! that exact version, so the validation and the movement write form one
//! serialized unit: a competing refund that commits in between bumps the
//! version, the commit fails, and re-validation sees the competitor's refund.

use chrono::Utc;
use tracing::info;

use careledger_core::{
    ExpectedVersion, LedgerError, LedgerResult, MovementId, TenantId, UserId,
};
use careledger_events::BalanceBus;

use crate::engine::LedgerEngine;
use crate::movement::{Movement, MovementType, Reference};
use crate::store::{AccountWrite, LedgerStore};

/// Outcome of a successful refund validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundCheck {
    /// Refundable amount still remaining on the payment, before the requested
    /// refund is applied.
    pub remaining: i64,
}

impl<S, B> LedgerEngine<S, B>
where
    S: LedgerStore,
    B: BalanceBus,
{
    /// Check whether `requested_amount` can still be refunded against the
    /// payment. Read-only; `execute_refund` repeats this check inside the
    /// serialized write path.
    pub fn validate_refund(
        &self,
        tenant_id: TenantId,
        payment_movement_id: MovementId,
        requested_amount: i64,
    ) -> LedgerResult<RefundCheck> {
        let payment = self.load_payment(tenant_id, payment_movement_id, requested_amount)?;
        let remaining = self.remaining_refundable(tenant_id, &payment)?;
        if requested_amount > remaining {
            return Err(LedgerError::RefundExceedsRemaining { remaining });
        }
        Ok(RefundCheck { remaining })
    }

    /// Validate and apply a refund as one logical operation.
    ///
    /// On success the committed movement has `effect = -amount` and references
    /// the original payment, which is how later validations find it.
    pub fn execute_refund(
        &self,
        tenant_id: TenantId,
        payment_movement_id: MovementId,
        amount: i64,
        actor: UserId,
        notes: Option<String>,
    ) -> LedgerResult<Movement> {
        let movement = self.with_retry(|| {
            let payment = self.load_payment(tenant_id, payment_movement_id, amount)?;

            // Account (and version) first, refund history second. Any refund
            // committed after this read raises the version and fails the
            // conditional commit below, so the history we validate against
            // can never silently miss a winner.
            let account = self
                .store
                .get_account(tenant_id, payment.account_id)?
                .ok_or(LedgerError::AccountNotFound)?;

            let remaining = self.remaining_refundable(tenant_id, &payment)?;
            if amount > remaining {
                return Err(LedgerError::RefundExceedsRemaining { remaining });
            }

            let balance_before = account.current_balance;
            let balance_after = balance_before.checked_sub(amount).ok_or_else(|| {
                LedgerError::invalid_effect(format!(
                    "refund {amount} overflows the balance of account {}",
                    account.id
                ))
            })?;
            self.policies
                .validate(&account, MovementType::Refund, -amount, balance_after)?;

            let movement = Movement {
                id: MovementId::new(),
                account_id: account.id,
                movement_type: MovementType::Refund,
                effect: -amount,
                balance_before,
                balance_after,
                reference: Some(Reference::new("payment", *payment_movement_id.as_uuid())),
                batch_id: None,
                created_by: actor,
                created_at: Utc::now(),
                notes: notes.clone(),
            };

            self.store.commit(
                tenant_id,
                vec![AccountWrite {
                    account_id: account.id,
                    expected_version: ExpectedVersion::Exact(account.version),
                    new_balance: balance_after,
                    movements: vec![movement.clone()],
                }],
            )?;
            Ok(movement)
        })?;

        self.publish_committed(std::slice::from_ref(&movement));
        info!(
            payment_movement_id = %payment_movement_id,
            refund_movement_id = %movement.id,
            amount,
            "refund applied"
        );
        Ok(movement)
    }

    fn load_payment(
        &self,
        tenant_id: TenantId,
        payment_movement_id: MovementId,
        requested_amount: i64,
    ) -> LedgerResult<Movement> {
        if requested_amount <= 0 {
            return Err(LedgerError::invalid_effect("refund amount must be positive"));
        }

        let payment = self
            .store
            .find_movement(tenant_id, payment_movement_id)?
            .ok_or_else(|| LedgerError::invalid_effect("refund target movement not found"))?;

        if payment.movement_type != MovementType::Payment {
            return Err(LedgerError::invalid_effect(
                "refund target is not a payment movement",
            ));
        }
        Ok(payment)
    }

    fn remaining_refundable(&self, tenant_id: TenantId, payment: &Movement) -> LedgerResult<i64> {
        let already_refunded: i64 = self
            .store
            .refunds_referencing(tenant_id, payment.id)?
            .iter()
            .map(|m| m.effect.abs())
            .sum();
        Ok(payment.effect.abs() - already_refunded)
    }
}
