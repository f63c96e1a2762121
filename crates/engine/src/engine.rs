//! The ledger engine: every balance mutation goes through here.
//!
//! Write pipeline: load accounts → chain prospective balances → per-kind
//! policy validation → single atomic store commit with optimistic version
//! checks → publish notifications. Version conflicts are retried with jittered
//! backoff before `ConcurrencyConflict` reaches the caller, so a conflicting
//! pair of writers is invisible to end users unless contention persists.

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use careledger_core::{
    AccountId, DocumentId, ExpectedVersion, LedgerError, LedgerResult, MovementId, TenantId, UserId,
};
use careledger_events::{BalanceBus, BalanceChanged};

use crate::account::{Account, AccountKind};
use crate::movement::{Movement, NewMovement};
use crate::policy::PolicyRegistry;
use crate::query::{MovementQuery, Page, SortOrder};
use crate::store::{AccountWrite, LedgerStore};

/// Bounded retry on version conflicts before surfacing to the caller.
const MAX_ATTEMPTS: u32 = 5;

/// The balance ledger engine.
///
/// Generic over the persistence seam and the notification bus so tests run
/// against the in-memory pair and production can swap either side.
#[derive(Debug)]
pub struct LedgerEngine<S, B> {
    pub(crate) store: S,
    pub(crate) bus: B,
    pub(crate) policies: PolicyRegistry,
}

impl<S, B> LedgerEngine<S, B> {
    /// Engine with the default per-kind policies (inventory floored at zero).
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            policies: PolicyRegistry::default(),
        }
    }

    pub fn with_policies(store: S, bus: B, policies: PolicyRegistry) -> Self {
        Self { store, bus, policies }
    }
}

impl<S, B> LedgerEngine<S, B>
where
    S: LedgerStore,
    B: BalanceBus,
{
    /// Register a new balance-tracked account (Account Registry entry point).
    pub fn open_account(
        &self,
        tenant_id: TenantId,
        kind: AccountKind,
        owner_ref: Uuid,
        opening_balance: i64,
    ) -> LedgerResult<Account> {
        let account = Account::open(tenant_id, kind, owner_ref, opening_balance);
        self.store.insert_account(account.clone())?;
        info!(account_id = %account.id, ?kind, opening_balance, "account opened");
        Ok(account)
    }

    /// Apply one signed movement to an account.
    ///
    /// Serialized against concurrent writers on the same account via the
    /// version check inside the store commit; on conflict the whole
    /// read-validate-commit cycle re-runs against fresh state.
    pub fn apply_movement(
        &self,
        tenant_id: TenantId,
        movement: NewMovement,
        actor: UserId,
    ) -> LedgerResult<Movement> {
        let mut committed = self.apply_lines(tenant_id, vec![movement], actor, None)?;
        // One line in, exactly one movement out.
        committed
            .pop()
            .ok_or_else(|| LedgerError::store("commit returned no movement"))
    }

    /// Apply several lines as one all-or-nothing unit, possibly spanning
    /// accounts (e.g. a transfer debiting one register and crediting another).
    pub fn apply_batch(
        &self,
        tenant_id: TenantId,
        lines: Vec<NewMovement>,
        actor: UserId,
    ) -> LedgerResult<Vec<Movement>> {
        self.apply_lines(tenant_id, lines, actor, None)
    }

    /// Shared write path; `batch_id` is set by the document processor.
    pub(crate) fn apply_lines(
        &self,
        tenant_id: TenantId,
        lines: Vec<NewMovement>,
        actor: UserId,
        batch_id: Option<DocumentId>,
    ) -> LedgerResult<Vec<Movement>> {
        if lines.is_empty() {
            return Err(LedgerError::invalid_effect("batch must contain at least one line"));
        }
        for line in &lines {
            if line.effect == 0 {
                return Err(LedgerError::invalid_effect("effect cannot be zero"));
            }
        }

        let committed =
            self.with_retry(|| self.try_apply(tenant_id, &lines, actor, batch_id))?;

        self.publish_committed(&committed);

        info!(
            tenant_id = %tenant_id,
            movements = committed.len(),
            batch_id = ?batch_id,
            "movements committed"
        );
        Ok(committed)
    }

    /// One optimistic attempt: prepare all writes against a snapshot of the
    /// touched accounts, then commit conditionally on their versions.
    pub(crate) fn try_apply(
        &self,
        tenant_id: TenantId,
        lines: &[NewMovement],
        actor: UserId,
        batch_id: Option<DocumentId>,
    ) -> LedgerResult<Vec<Movement>> {
        // Snapshot each distinct account once; BTreeMap keeps accounts in
        // ascending id order, the fixed order version checks are taken in.
        let mut touched: BTreeMap<AccountId, (Account, i64)> = BTreeMap::new();
        for line in lines {
            if !touched.contains_key(&line.account_id) {
                let account = self
                    .store
                    .get_account(tenant_id, line.account_id)?
                    .ok_or(LedgerError::AccountNotFound)?;
                let balance = account.current_balance;
                touched.insert(line.account_id, (account, balance));
            }
        }

        // Chain prospective balances in input order so a later line against
        // the same account sees the earlier lines' effects.
        let now = Utc::now();
        let mut prepared: Vec<Movement> = Vec::with_capacity(lines.len());
        for line in lines {
            let (account, running) = touched
                .get_mut(&line.account_id)
                .ok_or_else(|| LedgerError::store("account vanished during prepare"))?;

            let balance_before = *running;
            let balance_after = balance_before.checked_add(line.effect).ok_or_else(|| {
                LedgerError::invalid_effect(format!(
                    "effect {} overflows the balance of account {}",
                    line.effect, line.account_id
                ))
            })?;
            self.policies
                .validate(account, line.movement_type, line.effect, balance_after)?;
            *running = balance_after;

            prepared.push(Movement {
                id: MovementId::new(),
                account_id: line.account_id,
                movement_type: line.movement_type,
                effect: line.effect,
                balance_before,
                balance_after,
                reference: line.reference.clone(),
                batch_id,
                created_by: actor,
                created_at: now,
                notes: line.notes.clone(),
            });
        }

        let writes: Vec<AccountWrite> = touched
            .iter()
            .map(|(account_id, (account, new_balance))| AccountWrite {
                account_id: *account_id,
                expected_version: ExpectedVersion::Exact(account.version),
                new_balance: *new_balance,
                movements: prepared
                    .iter()
                    .filter(|m| m.account_id == *account_id)
                    .cloned()
                    .collect(),
            })
            .collect();

        self.store.commit(tenant_id, writes)?;
        // Return in input-line order, not account-sorted commit order.
        Ok(prepared)
    }

    /// Notify subscribers of every committed movement. The movements are
    /// durable; a lost notification is recoverable from the history, so
    /// publishing is best-effort.
    pub(crate) fn publish_committed(&self, committed: &[Movement]) {
        for movement in committed {
            let note = BalanceChanged {
                account_id: movement.account_id,
                new_balance: movement.balance_after,
                movement_id: movement.id,
            };
            if let Err(e) = self.bus.publish(note) {
                warn!(movement_id = %movement.id, error = ?e, "balance notification publish failed");
            }
        }
    }

    pub(crate) fn with_retry<T>(&self, f: impl Fn() -> LedgerResult<T>) -> LedgerResult<T> {
        let mut attempt: u32 = 0;
        loop {
            match f() {
                Err(err) if err.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    attempt += 1;
                    warn!(attempt, error = %err, "version conflict, retrying");
                    thread::sleep(backoff_delay(attempt));
                }
                Err(err) if err.is_retryable() => {
                    warn!(attempts = MAX_ATTEMPTS, "version conflict retries exhausted");
                    return Err(err);
                }
                other => return other,
            }
        }
    }

    /// Point-in-time balance + version. Never blocks on writers.
    pub fn get_balance(&self, tenant_id: TenantId, account_id: AccountId) -> LedgerResult<(i64, u64)> {
        let account = self.get_account(tenant_id, account_id)?;
        Ok((account.current_balance, account.version))
    }

    pub fn get_account(&self, tenant_id: TenantId, account_id: AccountId) -> LedgerResult<Account> {
        self.store
            .get_account(tenant_id, account_id)?
            .ok_or(LedgerError::AccountNotFound)
    }

    /// Paginated ledger read over committed order.
    pub fn list_movements(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        query: MovementQuery,
    ) -> LedgerResult<Page<Movement>> {
        // Distinguish "no movements yet" from "no such account".
        self.get_account(tenant_id, account_id)?;

        let mut history = self.store.movements(tenant_id, account_id)?;
        if let Some(movement_type) = query.movement_type {
            history.retain(|m| m.movement_type == movement_type);
        }
        if query.order == SortOrder::Descending {
            history.reverse();
        }

        let total = history.len();
        let items = history
            .into_iter()
            .skip(query.offset)
            .take(query.capped_limit())
            .collect();

        Ok(Page {
            items,
            offset: query.offset,
            total,
        })
    }

    /// Movements committed under one document batch, in committed order.
    pub fn movements_for_batch(
        &self,
        tenant_id: TenantId,
        batch_id: DocumentId,
    ) -> LedgerResult<Vec<Movement>> {
        Ok(self.store.movements_by_batch(tenant_id, batch_id)?)
    }

    /// Recompute the invariant from scratch and compare with the cached
    /// balance. Maintenance/audit path, not for hot-path callers.
    ///
    /// A mismatch means corruption or a bypassed write path; it is reported,
    /// never repaired.
    pub fn verify_integrity(&self, tenant_id: TenantId, account_id: AccountId) -> LedgerResult<()> {
        let account = self.get_account(tenant_id, account_id)?;
        let history = self.store.movements(tenant_id, account_id)?;

        let mut running = account.opening_balance;
        for movement in &history {
            if movement.balance_before != running
                || movement.balance_after != movement.balance_before + movement.effect
            {
                error!(
                    account_id = %account_id,
                    movement_id = %movement.id,
                    expected = running,
                    actual = movement.balance_before,
                    "movement chain is broken"
                );
                return Err(LedgerError::IntegrityViolation {
                    account_id,
                    expected: running,
                    actual: movement.balance_before,
                });
            }
            running = movement.balance_after;
        }

        if running != account.current_balance {
            error!(
                account_id = %account_id,
                expected = running,
                actual = account.current_balance,
                "cached balance disagrees with movement history"
            );
            return Err(LedgerError::IntegrityViolation {
                account_id,
                expected: running,
                actual: account.current_balance,
            });
        }

        Ok(())
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    // ~100µs base doubling per attempt, plus jitter derived from fresh UUID
    // bytes so colliding writers desynchronize without a rand dependency.
    let base = 100u64 << attempt.min(6);
    let jitter = u64::from(Uuid::now_v7().as_bytes()[15]) % base;
    Duration::from_micros(base + jitter)
}
