//! `careledger-engine` — the balance ledger engine.
//!
//! Maintains a running balance per tracked account (patient billing, cash
//! register, inventory item) that is always reconstructable from an append-only
//! history of signed movements, and serializes concurrent writers per account
//! so lost updates cannot occur.
//!
//! Module map:
//! - [`account`] / [`movement`]: the two record types the engine owns
//! - [`store`]: the `LedgerStore` persistence seam + in-memory implementation
//! - [`policy`]: pluggable per-kind movement validation (e.g. stock floor)
//! - [`engine`]: `LedgerEngine` with the apply/batch/read/verify operations
//! - [`document`]: draft → confirmed | cancelled batch lifecycle
//! - [`refund`]: refundable-remaining policy in front of the engine
//! - [`view`]: derived presentation aggregates (never a source of truth)

pub mod account;
pub mod document;
pub mod engine;
pub mod movement;
pub mod policy;
pub mod query;
pub mod refund;
pub mod store;
pub mod view;

pub use account::{Account, AccountKind};
pub use document::{Document, DocumentLine, DocumentProcessor, DocumentStatus};
pub use engine::LedgerEngine;
pub use movement::{Movement, MovementType, NewMovement, Reference};
pub use policy::{KindPolicy, NonNegativeBalancePolicy, PolicyRegistry, UnrestrictedPolicy};
pub use query::{MovementQuery, Page, SortOrder};
pub use refund::RefundCheck;
pub use store::{AccountWrite, InMemoryLedgerStore, LedgerStore, StoreError};
pub use view::AccountStatement;
