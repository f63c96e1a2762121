//! Document batch lifecycle: draft → confirmed | cancelled.
//!
//! A draft document stages line movements without touching any balance.
//! Confirmation applies every line through `apply_batch` as one unit tagged
//! with the document id; cancellation discards the draft. Both exits are
//! terminal. Confirming an already-confirmed document is an idempotent no-op
//! returning the original movements, never a double-apply.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use careledger_core::{AccountId, DocumentId, LedgerError, LedgerResult, TenantId, UserId};
use careledger_events::BalanceBus;

use crate::engine::LedgerEngine;
use crate::movement::{Movement, MovementType, NewMovement, Reference};
use crate::store::LedgerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Confirmed,
    Cancelled,
}

/// One staged line: which account, which vocabulary, what signed effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub account_id: AccountId,
    pub movement_type: MovementType,
    pub effect: i64,
    pub reference: Option<Reference>,
}

impl DocumentLine {
    pub fn new(account_id: AccountId, movement_type: MovementType, effect: i64) -> Self {
        Self {
            account_id,
            movement_type,
            effect,
            reference: None,
        }
    }
}

/// A named batch of pending line movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub tenant_id: TenantId,
    pub document_type: String,
    pub status: DocumentStatus,
    pub lines: Vec<DocumentLine>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirmed_by: Option<UserId>,
}

#[derive(Debug)]
struct DocumentRecord {
    document: Document,
    /// Internal claim taken for the duration of a confirm attempt so two
    /// concurrent confirms cannot both reach `apply_batch`.
    confirming: bool,
}

/// Builds all-or-nothing documents on top of the ledger engine.
#[derive(Debug)]
pub struct DocumentProcessor<S, B> {
    engine: Arc<LedgerEngine<S, B>>,
    documents: RwLock<HashMap<(TenantId, DocumentId), DocumentRecord>>,
}

/// What the confirm claim found.
enum ClaimOutcome {
    Claimed(Vec<DocumentLine>),
    AlreadyConfirmed,
}

impl<S, B> DocumentProcessor<S, B>
where
    S: LedgerStore,
    B: BalanceBus,
{
    pub fn new(engine: Arc<LedgerEngine<S, B>>) -> Self {
        Self {
            engine,
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Stage a document. Structural validation only (at least one line, no
    /// zero effects); account-level constraints are checked at confirm time.
    pub fn create_draft(
        &self,
        tenant_id: TenantId,
        document_type: impl Into<String>,
        lines: Vec<DocumentLine>,
        actor: UserId,
    ) -> LedgerResult<Document> {
        if lines.is_empty() {
            return Err(LedgerError::invalid_effect("document must have at least one line"));
        }
        for line in &lines {
            if line.effect == 0 {
                return Err(LedgerError::invalid_effect("document line effect cannot be zero"));
            }
        }

        let document = Document {
            id: DocumentId::new(),
            tenant_id,
            document_type: document_type.into(),
            status: DocumentStatus::Draft,
            lines,
            created_by: actor,
            created_at: Utc::now(),
            confirmed_at: None,
            confirmed_by: None,
        };

        let mut documents = self.documents.write().map_err(|_| lock_poisoned())?;
        documents.insert(
            (tenant_id, document.id),
            DocumentRecord {
                document: document.clone(),
                confirming: false,
            },
        );
        Ok(document)
    }

    /// Apply the document's lines as one batch and transition to Confirmed.
    ///
    /// Safe to retry: a failed confirm leaves the document Draft with zero
    /// movements; a repeated confirm of a Confirmed document returns the
    /// movements committed the first time.
    pub fn confirm(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
        actor: UserId,
    ) -> LedgerResult<Vec<Movement>> {
        let lines = match self.claim(tenant_id, document_id)? {
            ClaimOutcome::AlreadyConfirmed => {
                return self.engine.movements_for_batch(tenant_id, document_id);
            }
            ClaimOutcome::Claimed(lines) => lines,
        };

        let new_movements: Vec<NewMovement> = lines
            .into_iter()
            .map(|line| NewMovement {
                account_id: line.account_id,
                movement_type: line.movement_type,
                effect: line.effect,
                reference: line.reference,
                notes: None,
            })
            .collect();

        match self
            .engine
            .apply_lines(tenant_id, new_movements, actor, Some(document_id))
        {
            Ok(movements) => {
                self.finish_confirm(tenant_id, document_id, actor)?;
                info!(document_id = %document_id, lines = movements.len(), "document confirmed");
                Ok(movements)
            }
            Err(err) => {
                // Release the claim; the document stays Draft.
                self.release_claim(tenant_id, document_id)?;
                Err(err)
            }
        }
    }

    /// Discard a draft. Only legal while Draft; both terminal states reject.
    pub fn cancel(&self, tenant_id: TenantId, document_id: DocumentId) -> LedgerResult<Document> {
        let mut documents = self.documents.write().map_err(|_| lock_poisoned())?;
        let record = documents
            .get_mut(&(tenant_id, document_id))
            .ok_or(LedgerError::DocumentNotFound)?;

        match record.document.status {
            DocumentStatus::Confirmed => Err(LedgerError::DocumentAlreadyConfirmed(document_id)),
            DocumentStatus::Cancelled => Err(LedgerError::DocumentAlreadyCancelled(document_id)),
            DocumentStatus::Draft if record.confirming => {
                Err(LedgerError::conflict("confirm in progress"))
            }
            DocumentStatus::Draft => {
                record.document.status = DocumentStatus::Cancelled;
                info!(document_id = %document_id, "document cancelled");
                Ok(record.document.clone())
            }
        }
    }

    pub fn get_document(&self, tenant_id: TenantId, document_id: DocumentId) -> LedgerResult<Document> {
        let documents = self.documents.read().map_err(|_| lock_poisoned())?;
        documents
            .get(&(tenant_id, document_id))
            .map(|record| record.document.clone())
            .ok_or(LedgerError::DocumentNotFound)
    }

    fn claim(&self, tenant_id: TenantId, document_id: DocumentId) -> LedgerResult<ClaimOutcome> {
        let mut documents = self.documents.write().map_err(|_| lock_poisoned())?;
        let record = documents
            .get_mut(&(tenant_id, document_id))
            .ok_or(LedgerError::DocumentNotFound)?;

        match record.document.status {
            DocumentStatus::Confirmed => Ok(ClaimOutcome::AlreadyConfirmed),
            DocumentStatus::Cancelled => Err(LedgerError::DocumentAlreadyCancelled(document_id)),
            DocumentStatus::Draft if record.confirming => {
                // Another handler is mid-confirm; surfacing a conflict lets
                // the caller retry and land on the idempotent path.
                Err(LedgerError::conflict("confirm in progress"))
            }
            DocumentStatus::Draft => {
                record.confirming = true;
                Ok(ClaimOutcome::Claimed(record.document.lines.clone()))
            }
        }
    }

    fn finish_confirm(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
        actor: UserId,
    ) -> LedgerResult<()> {
        let mut documents = self.documents.write().map_err(|_| lock_poisoned())?;
        if let Some(record) = documents.get_mut(&(tenant_id, document_id)) {
            record.document.status = DocumentStatus::Confirmed;
            record.document.confirmed_at = Some(Utc::now());
            record.document.confirmed_by = Some(actor);
            record.confirming = false;
        }
        Ok(())
    }

    fn release_claim(&self, tenant_id: TenantId, document_id: DocumentId) -> LedgerResult<()> {
        let mut documents = self.documents.write().map_err(|_| lock_poisoned())?;
        if let Some(record) = documents.get_mut(&(tenant_id, document_id)) {
            record.confirming = false;
        }
        Ok(())
    }
}

fn lock_poisoned() -> LedgerError {
    LedgerError::store("document map lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use careledger_events::InMemoryBalanceBus;

    use crate::account::AccountKind;
    use crate::query::MovementQuery;
    use crate::store::InMemoryLedgerStore;

    type TestEngine = LedgerEngine<Arc<InMemoryLedgerStore>, InMemoryBalanceBus>;

    fn setup() -> (Arc<TestEngine>, DocumentProcessor<Arc<InMemoryLedgerStore>, InMemoryBalanceBus>, TenantId) {
        let engine = Arc::new(LedgerEngine::new(
            Arc::new(InMemoryLedgerStore::new()),
            InMemoryBalanceBus::new(),
        ));
        let processor = DocumentProcessor::new(engine.clone());
        (engine, processor, TenantId::new())
    }

    fn item(engine: &TestEngine, tenant_id: TenantId, stock: i64) -> AccountId {
        engine
            .open_account(tenant_id, AccountKind::InventoryItem, Uuid::now_v7(), stock)
            .unwrap()
            .id
    }

    #[test]
    fn draft_has_no_balance_effect() {
        let (engine, processor, tenant_id) = setup();
        let account_id = item(&engine, tenant_id, 10);

        let document = processor
            .create_draft(
                tenant_id,
                "stock_receipt",
                vec![DocumentLine::new(account_id, MovementType::StockIn, 5)],
                UserId::new(),
            )
            .unwrap();

        assert_eq!(document.status, DocumentStatus::Draft);
        assert_eq!(engine.get_balance(tenant_id, account_id).unwrap(), (10, 0));
    }

    #[test]
    fn confirm_applies_all_lines_with_shared_batch_id() {
        let (engine, processor, tenant_id) = setup();
        let actor = UserId::new();
        let a = item(&engine, tenant_id, 0);
        let b = item(&engine, tenant_id, 0);

        let document = processor
            .create_draft(
                tenant_id,
                "stock_receipt",
                vec![
                    DocumentLine::new(a, MovementType::StockIn, 12),
                    DocumentLine::new(b, MovementType::StockIn, 7),
                ],
                actor,
            )
            .unwrap();

        let movements = processor.confirm(tenant_id, document.id, actor).unwrap();
        assert_eq!(movements.len(), 2);
        assert!(movements.iter().all(|m| m.batch_id == Some(document.id)));

        assert_eq!(engine.get_balance(tenant_id, a).unwrap().0, 12);
        assert_eq!(engine.get_balance(tenant_id, b).unwrap().0, 7);

        let stored = processor.get_document(tenant_id, document.id).unwrap();
        assert_eq!(stored.status, DocumentStatus::Confirmed);
        assert_eq!(stored.confirmed_by, Some(actor));
        assert!(stored.confirmed_at.is_some());
    }

    #[test]
    fn invalid_middle_line_leaves_zero_movements_and_draft_status() {
        let (engine, processor, tenant_id) = setup();
        let actor = UserId::new();
        let a = item(&engine, tenant_id, 10);
        let b = item(&engine, tenant_id, 1);
        let c = item(&engine, tenant_id, 10);

        let document = processor
            .create_draft(
                tenant_id,
                "stock_issue",
                vec![
                    DocumentLine::new(a, MovementType::StockOut, -5),
                    // Would drive item b to -4.
                    DocumentLine::new(b, MovementType::StockOut, -5),
                    DocumentLine::new(c, MovementType::StockOut, -5),
                ],
                actor,
            )
            .unwrap();

        let err = processor.confirm(tenant_id, document.id, actor).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEffect(_)));

        for account_id in [a, b, c] {
            let page = engine
                .list_movements(tenant_id, account_id, MovementQuery::default())
                .unwrap();
            assert_eq!(page.total, 0);
        }
        let stored = processor.get_document(tenant_id, document.id).unwrap();
        assert_eq!(stored.status, DocumentStatus::Draft);

        // The failed confirm released its claim: fixing stock lets it retry.
        engine
            .apply_movement(
                tenant_id,
                NewMovement::new(b, MovementType::StockIn, 10),
                actor,
            )
            .unwrap();
        processor.confirm(tenant_id, document.id, actor).unwrap();
    }

    #[test]
    fn confirm_is_idempotent() {
        let (engine, processor, tenant_id) = setup();
        let actor = UserId::new();
        let account_id = item(&engine, tenant_id, 0);

        let document = processor
            .create_draft(
                tenant_id,
                "stock_receipt",
                vec![DocumentLine::new(account_id, MovementType::StockIn, 4)],
                actor,
            )
            .unwrap();

        let first = processor.confirm(tenant_id, document.id, actor).unwrap();
        let second = processor.confirm(tenant_id, document.id, actor).unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.get_balance(tenant_id, account_id).unwrap().0, 4);
        assert_eq!(
            engine
                .list_movements(tenant_id, account_id, MovementQuery::default())
                .unwrap()
                .total,
            1
        );
    }

    #[test]
    fn cancel_blocks_later_confirm() {
        let (engine, processor, tenant_id) = setup();
        let actor = UserId::new();
        let account_id = item(&engine, tenant_id, 0);

        let document = processor
            .create_draft(
                tenant_id,
                "stock_receipt",
                vec![DocumentLine::new(account_id, MovementType::StockIn, 4)],
                actor,
            )
            .unwrap();

        let cancelled = processor.cancel(tenant_id, document.id).unwrap();
        assert_eq!(cancelled.status, DocumentStatus::Cancelled);

        let err = processor.confirm(tenant_id, document.id, actor).unwrap_err();
        assert_eq!(err, LedgerError::DocumentAlreadyCancelled(document.id));
        assert_eq!(engine.get_balance(tenant_id, account_id).unwrap().0, 0);
    }

    #[test]
    fn terminal_states_reject_cancel() {
        let (engine, processor, tenant_id) = setup();
        let actor = UserId::new();
        let account_id = item(&engine, tenant_id, 0);

        let document = processor
            .create_draft(
                tenant_id,
                "stock_receipt",
                vec![DocumentLine::new(account_id, MovementType::StockIn, 4)],
                actor,
            )
            .unwrap();
        processor.confirm(tenant_id, document.id, actor).unwrap();

        let err = processor.cancel(tenant_id, document.id).unwrap_err();
        assert_eq!(err, LedgerError::DocumentAlreadyConfirmed(document.id));
    }

    #[test]
    fn structural_validation_rejects_empty_and_zero_lines() {
        let (_, processor, tenant_id) = setup();

        let err = processor
            .create_draft(tenant_id, "stock_receipt", vec![], UserId::new())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEffect(_)));

        let err = processor
            .create_draft(
                tenant_id,
                "stock_receipt",
                vec![DocumentLine::new(AccountId::new(), MovementType::StockIn, 0)],
                UserId::new(),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEffect(_)));
    }

    #[test]
    fn unknown_document_is_not_found() {
        let (_, processor, tenant_id) = setup();
        let err = processor
            .confirm(tenant_id, DocumentId::new(), UserId::new())
            .unwrap_err();
        assert_eq!(err, LedgerError::DocumentNotFound);
    }
}
