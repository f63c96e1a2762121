use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use careledger_core::{AccountId, DocumentId, MovementId, UserId};

/// Domain vocabulary for movements.
///
/// The engine never derives a sign from the type; the domain adapter supplies
/// the signed `effect`. The type is carried for filtering, display and the
/// refund policy (which only accepts `Payment` targets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Charge,
    Payment,
    Refund,
    Adjustment,
    StockIn,
    StockOut,
    CashIncome,
    CashExpense,
    CashTransfer,
}

/// Link to the originating business object (appointment, payment record,
/// warehouse document line, a corrected movement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub reference_type: String,
    pub reference_id: Uuid,
}

impl Reference {
    pub fn new(reference_type: impl Into<String>, reference_id: Uuid) -> Self {
        Self {
            reference_type: reference_type.into(),
            reference_id,
        }
    }
}

/// An immutable, signed change applied to an account's balance.
///
/// Movements are never updated or deleted; corrections are new `Adjustment`
/// movements referencing the corrected one. `balance_before`/`balance_after`
/// snapshot the account balance around this movement, so any prefix of the
/// history is independently checkable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub account_id: AccountId,
    pub movement_type: MovementType,
    /// Signed quantity applied to the balance (sign chosen by the adapter).
    pub effect: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub reference: Option<Reference>,
    /// Set when the movement was applied as part of a document batch.
    pub batch_id: Option<DocumentId>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Input for one movement to apply. The engine fills in identity, balances and
/// the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub account_id: AccountId,
    pub movement_type: MovementType,
    pub effect: i64,
    pub reference: Option<Reference>,
    pub notes: Option<String>,
}

impl NewMovement {
    pub fn new(account_id: AccountId, movement_type: MovementType, effect: i64) -> Self {
        Self {
            account_id,
            movement_type,
            effect,
            reference: None,
            notes: None,
        }
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_type_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&MovementType::StockIn).unwrap(), "\"stock_in\"");
        assert_eq!(serde_json::to_string(&MovementType::CashExpense).unwrap(), "\"cash_expense\"");
    }

    #[test]
    fn builder_attaches_reference_and_notes() {
        let reference = Reference::new("appointment", Uuid::now_v7());
        let m = NewMovement::new(AccountId::new(), MovementType::Charge, -5_000)
            .with_reference(reference.clone())
            .with_notes("initial consult");
        assert_eq!(m.reference, Some(reference));
        assert_eq!(m.notes.as_deref(), Some("initial consult"));
    }
}
