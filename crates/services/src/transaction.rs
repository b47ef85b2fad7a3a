//! Per-request transaction scope.
//!
//! [`TransactionCoordinator::begin`] hands out a [`Transaction`] guard that
//! owns the store's transaction handle. The guard is consumed by exactly one
//! of [`Transaction::commit`], [`Transaction::abort`] or
//! [`Transaction::finish`], so finishing twice does not compile. A guard that
//! is dropped unfinished (early return, panic, cancelled future) releases its
//! handle, and the store discards every write made through it.
//!
//! ```rust,ignore
//! let mut txn = coordinator.begin().await?;
//! let (store, tx) = txn.parts();
//! let outcome = do_work(store, tx).await;
//! txn.finish(outcome).await // commits on Ok, aborts on Err
//! ```

use std::sync::Arc;

use domains::{ContentError, ContentResult, ContentStore};
use tracing::{debug, warn};

/// Opens one logical transaction per inbound write request.
pub struct TransactionCoordinator<S> {
    store: Arc<S>,
}

impl<S> Clone for TransactionCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ContentStore> TransactionCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Starts a transaction. Store failures surface as `ContentError::Store`.
    pub async fn begin(&self) -> ContentResult<Transaction<'_, S>> {
        let tx = self.store.begin().await?;
        debug!("transaction started");
        Ok(Transaction {
            store: self.store.as_ref(),
            tx,
            pending: Pending::new(),
        })
    }
}

/// Scoped transaction guard. See the module docs for the lifecycle.
pub struct Transaction<'s, S: ContentStore> {
    store: &'s S,
    tx: S::Tx,
    pending: Pending,
}

impl<'s, S: ContentStore> Transaction<'s, S> {
    /// The store and the live handle, to be passed to store, indexer and
    /// cascade calls.
    pub fn parts(&mut self) -> (&'s S, &mut S::Tx) {
        (self.store, &mut self.tx)
    }

    /// Commits every write made through this transaction.
    ///
    /// A store that refuses the commit yields `ContentError::TransactionFailure`;
    /// the failure is never retried.
    pub async fn commit(self) -> ContentResult<()> {
        let Transaction { store, tx, pending } = self;
        let result = store.commit(tx).await;
        pending.settle();
        result.map_err(|err| ContentError::TransactionFailure(err.to_string()))?;
        debug!("transaction committed");
        Ok(())
    }

    /// Discards every write made through this transaction.
    pub async fn abort(self) -> ContentResult<()> {
        let Transaction { store, tx, pending } = self;
        let result = store.rollback(tx).await;
        pending.settle();
        result?;
        debug!("transaction rolled back");
        Ok(())
    }

    /// Commits when `outcome` is a success and aborts otherwise, then hands
    /// the outcome back. A failed rollback is logged; the original error wins.
    pub async fn finish<T>(self, outcome: ContentResult<T>) -> ContentResult<T> {
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.abort().await {
                    warn!(error = %rollback_err, "rollback failed after {err}");
                }
                Err(err)
            }
        }
    }
}

/// Warns when a guard goes out of scope before commit or abort ran to the end.
struct Pending {
    settled: bool,
}

impl Pending {
    fn new() -> Self {
        Self { settled: false }
    }

    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if !self.settled {
            warn!("transaction dropped without commit or abort - discarding writes");
        }
    }
}
