//! `careledger-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod version;

pub use error::{LedgerError, LedgerResult};
pub use id::{AccountId, DocumentId, MovementId, TenantId, UserId};
pub use version::ExpectedVersion;
