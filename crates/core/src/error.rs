//! Ledger error model.

use thiserror::Error;

use crate::id::{AccountId, DocumentId};

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure failures are wrapped in `Store`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The account does not exist, or belongs to a different tenant.
    #[error("account not found")]
    AccountNotFound,

    /// The movement effect is invalid (zero, or a per-kind floor was violated).
    #[error("invalid effect: {0}")]
    InvalidEffect(String),

    /// Optimistic concurrency retries were exhausted; safe to try again.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// A refund would exceed the remaining refundable amount of the payment.
    #[error("refund exceeds remaining refundable amount ({remaining} remaining)")]
    RefundExceedsRemaining { remaining: i64 },

    /// The document does not exist, or belongs to a different tenant.
    #[error("document not found")]
    DocumentNotFound,

    /// The document is already confirmed (terminal).
    #[error("document {0} is already confirmed")]
    DocumentAlreadyConfirmed(DocumentId),

    /// The document is already cancelled (terminal).
    #[error("document {0} is already cancelled")]
    DocumentAlreadyCancelled(DocumentId),

    /// The cached balance disagrees with the movement history. Always
    /// alert-worthy; never auto-corrected.
    #[error("integrity violation on account {account_id}: expected {expected}, stored {actual}")]
    IntegrityViolation {
        account_id: AccountId,
        expected: i64,
        actual: i64,
    },

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(String),
}

impl LedgerError {
    pub fn invalid_effect(msg: impl Into<String>) -> Self {
        Self::InvalidEffect(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConcurrencyConflict(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Whether retrying the operation may succeed without any caller-side change.
    ///
    /// Validation errors are deterministic and must not be retried; conflicts
    /// are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_))
    }
}
