//! Persistence seam for accounts and movements.
//!
//! The engine exclusively owns both record types through [`LedgerStore`];
//! domain adapters never write balances directly. The in-memory implementation
//! is the tests/dev backend; a SQL backend would implement the same trait with
//! `accounts` / `movements` tables and a transaction per [`commit`].
//!
//! [`commit`]: LedgerStore::commit

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use thiserror::Error;

use careledger_core::{AccountId, DocumentId, ExpectedVersion, LedgerError, MovementId, TenantId};

use crate::account::Account;
use crate::movement::{Movement, MovementType};

/// Store operation error (infrastructure-level, distinct from domain errors).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("account not found")]
    AccountNotFound,

    #[error("account already exists")]
    DuplicateAccount,

    #[error("invalid commit: {0}")]
    InvalidCommit(String),
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => LedgerError::conflict(msg),
            StoreError::AccountNotFound => LedgerError::AccountNotFound,
            other => LedgerError::store(other.to_string()),
        }
    }
}

/// One account's slice of a prepared commit: the version the writer read, the
/// balance it computed, and the movements (with `balance_before`/`after`
/// already chained) to append.
#[derive(Debug, Clone)]
pub struct AccountWrite {
    pub account_id: AccountId,
    pub expected_version: ExpectedVersion,
    pub new_balance: i64,
    pub movements: Vec<Movement>,
}

/// Append-only, tenant-scoped ledger store.
///
/// `commit` is the single write path for balances and must be atomic across
/// every [`AccountWrite`] it receives: either all version checks pass and all
/// movements land, or nothing is persisted. That one guarantee is what makes
/// both `apply_movement` (one write) and `apply_batch` (several, sorted by
/// account id) safe under concurrency.
pub trait LedgerStore: Send + Sync {
    fn insert_account(&self, account: Account) -> Result<(), StoreError>;

    fn get_account(&self, tenant_id: TenantId, account_id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Atomically apply a set of per-account writes.
    ///
    /// Implementations must:
    /// - check every write's `expected_version` against the stored account
    ///   before persisting anything
    /// - append movements in the given order and bump each account's version
    ///   by its number of appended movements
    /// - reject the whole commit on any failed check (all-or-nothing)
    fn commit(&self, tenant_id: TenantId, writes: Vec<AccountWrite>) -> Result<Vec<Movement>, StoreError>;

    /// Full movement history for an account, in committed order.
    fn movements(&self, tenant_id: TenantId, account_id: AccountId) -> Result<Vec<Movement>, StoreError>;

    /// Movements that were committed under one batch id, in committed order.
    fn movements_by_batch(&self, tenant_id: TenantId, batch_id: DocumentId) -> Result<Vec<Movement>, StoreError>;

    /// Look up a single movement by id.
    fn find_movement(&self, tenant_id: TenantId, movement_id: MovementId) -> Result<Option<Movement>, StoreError>;

    /// All refund movements whose reference points at `target`, in committed
    /// order. Used to compute the remaining refundable amount of a payment.
    fn refunds_referencing(&self, tenant_id: TenantId, target: MovementId) -> Result<Vec<Movement>, StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        (**self).insert_account(account)
    }

    fn get_account(&self, tenant_id: TenantId, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        (**self).get_account(tenant_id, account_id)
    }

    fn commit(&self, tenant_id: TenantId, writes: Vec<AccountWrite>) -> Result<Vec<Movement>, StoreError> {
        (**self).commit(tenant_id, writes)
    }

    fn movements(&self, tenant_id: TenantId, account_id: AccountId) -> Result<Vec<Movement>, StoreError> {
        (**self).movements(tenant_id, account_id)
    }

    fn movements_by_batch(&self, tenant_id: TenantId, batch_id: DocumentId) -> Result<Vec<Movement>, StoreError> {
        (**self).movements_by_batch(tenant_id, batch_id)
    }

    fn find_movement(&self, tenant_id: TenantId, movement_id: MovementId) -> Result<Option<Movement>, StoreError> {
        (**self).find_movement(tenant_id, movement_id)
    }

    fn refunds_referencing(&self, tenant_id: TenantId, target: MovementId) -> Result<Vec<Movement>, StoreError> {
        (**self).refunds_referencing(tenant_id, target)
    }
}

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<(TenantId, AccountId), Account>,
    /// Per-account history, append order == committed order.
    movements: HashMap<(TenantId, AccountId), Vec<Movement>>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. A single `RwLock` over both maps makes `commit`
/// trivially atomic; readers take snapshots and never block writers beyond the
/// lock itself.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    inner: RwLock<Inner>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::InvalidCommit("lock poisoned".to_string())
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let key = (account.tenant_id, account.id);
        if inner.accounts.contains_key(&key) {
            return Err(StoreError::DuplicateAccount);
        }
        inner.movements.entry(key).or_default();
        inner.accounts.insert(key, account);
        Ok(())
    }

    fn get_account(&self, tenant_id: TenantId, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner.accounts.get(&(tenant_id, account_id)).cloned())
    }

    fn commit(&self, tenant_id: TenantId, writes: Vec<AccountWrite>) -> Result<Vec<Movement>, StoreError> {
        if writes.is_empty() {
            return Ok(vec![]);
        }

        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;

        // Phase 1: validate every write before touching anything.
        for write in &writes {
            let account = inner
                .accounts
                .get(&(tenant_id, write.account_id))
                .ok_or(StoreError::AccountNotFound)?;

            if !write.expected_version.matches(account.version) {
                return Err(StoreError::Concurrency(format!(
                    "account {} expected {:?}, found {}",
                    write.account_id, write.expected_version, account.version
                )));
            }

            for m in &write.movements {
                if m.account_id != write.account_id {
                    return Err(StoreError::InvalidCommit(format!(
                        "movement {} targets account {}, write targets {}",
                        m.id, m.account_id, write.account_id
                    )));
                }
            }
        }

        // Phase 2: apply. No fallible operation below this point.
        let now = Utc::now();
        let mut committed = Vec::new();
        for write in writes {
            let key = (tenant_id, write.account_id);
            if let Some(account) = inner.accounts.get_mut(&key) {
                account.current_balance = write.new_balance;
                account.version += write.movements.len() as u64;
                account.updated_at = now;
            }
            let history = inner.movements.entry(key).or_default();
            for m in write.movements {
                history.push(m.clone());
                committed.push(m);
            }
        }

        Ok(committed)
    }

    fn movements(&self, tenant_id: TenantId, account_id: AccountId) -> Result<Vec<Movement>, StoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner
            .movements
            .get(&(tenant_id, account_id))
            .cloned()
            .unwrap_or_default())
    }

    fn movements_by_batch(&self, tenant_id: TenantId, batch_id: DocumentId) -> Result<Vec<Movement>, StoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        let mut found: Vec<Movement> = inner
            .movements
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .flat_map(|(_, history)| history.iter())
            .filter(|m| m.batch_id == Some(batch_id))
            .cloned()
            .collect();
        // Batch commit order is total across accounts; movement ids are
        // time-ordered UUIDv7, so sorting restores it.
        found.sort_by_key(|m| m.id);
        Ok(found)
    }

    fn find_movement(&self, tenant_id: TenantId, movement_id: MovementId) -> Result<Option<Movement>, StoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner
            .movements
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .flat_map(|(_, history)| history.iter())
            .find(|m| m.id == movement_id)
            .cloned())
    }

    fn refunds_referencing(&self, tenant_id: TenantId, target: MovementId) -> Result<Vec<Movement>, StoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        let target_uuid = *target.as_uuid();
        Ok(inner
            .movements
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .flat_map(|(_, history)| history.iter())
            .filter(|m| {
                m.movement_type == MovementType::Refund
                    && m.reference
                        .as_ref()
                        .is_some_and(|r| r.reference_id == target_uuid)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
impl InMemoryLedgerStore {
    /// Test-only: corrupt a cached balance to simulate a bypassed write path.
    pub(crate) fn tamper_balance(&self, tenant_id: TenantId, account_id: AccountId, delta: i64) {
        if let Ok(mut inner) = self.inner.write() {
            if let Some(account) = inner.accounts.get_mut(&(tenant_id, account_id)) {
                account.current_balance += delta;
            }
        }
    }
}
