//! storage-adapters/src/lib.rs
//!
//! Implementations of the `domains::ContentStore` port.

use async_trait::async_trait;
use domains::StoreResult;

pub mod memory;
#[cfg(feature = "db-sqlite")]
pub mod sqlite;

pub use memory::{MemoryContentStore, MemoryTx};
#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteContentStore;

/// Committed row totals per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub articles: usize,
    pub comments: usize,
    pub likes: usize,
}

impl RowCounts {
    pub fn total(&self) -> usize {
        self.articles + self.comments + self.likes
    }
}

/// Reports what is committed, outside of any transaction.
#[async_trait]
pub trait RowCounter {
    async fn row_counts(&self) -> StoreResult<RowCounts>;
}
