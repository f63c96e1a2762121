//! Query shapes for paginated ledger reads.

use serde::{Deserialize, Serialize};

use crate::movement::MovementType;

/// Hard cap on page size; larger requests are clamped, not rejected.
pub const MAX_PAGE_SIZE: usize = 200;

const DEFAULT_PAGE_SIZE: usize = 50;

/// Sort direction over committed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Oldest first (ledger/timeline views).
    Ascending,
    /// Newest first ("recent activity" views).
    Descending,
}

/// Pagination + filter parameters for `list_movements`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementQuery {
    pub order: SortOrder,
    pub limit: usize,
    pub offset: usize,
    /// Restrict to one movement type (e.g. only payments).
    pub movement_type: Option<MovementType>,
}

impl Default for MovementQuery {
    fn default() -> Self {
        Self {
            order: SortOrder::Ascending,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
            movement_type: None,
        }
    }
}

impl MovementQuery {
    pub fn ascending(limit: usize, offset: usize) -> Self {
        Self {
            order: SortOrder::Ascending,
            limit,
            offset,
            ..Self::default()
        }
    }

    pub fn descending(limit: usize, offset: usize) -> Self {
        Self {
            order: SortOrder::Descending,
            limit,
            offset,
            ..Self::default()
        }
    }

    pub fn with_type(mut self, movement_type: MovementType) -> Self {
        self.movement_type = Some(movement_type);
        self
    }

    /// Effective page size after the cap.
    pub fn capped_limit(&self) -> usize {
        self.limit.min(MAX_PAGE_SIZE)
    }
}

/// One page of results plus enough context to fetch the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: usize,
    /// Total matching records (before pagination).
    pub total: usize,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.offset + self.items.len() < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_capped() {
        let q = MovementQuery::ascending(10_000, 0);
        assert_eq!(q.capped_limit(), MAX_PAGE_SIZE);
    }

    #[test]
    fn has_more_accounts_for_offset() {
        let page = Page {
            items: vec![1, 2, 3],
            offset: 10,
            total: 14,
        };
        assert!(page.has_more());

        let last = Page {
            items: vec![1],
            offset: 13,
            total: 14,
        };
        assert!(!last.has_more());
    }
}
