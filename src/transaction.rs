//! Transactions
//!
//! A [`Transaction`] pins one connection for its lifetime. It is itself an
//! [`EntityStore`], so every query and write made through it runs on that
//! connection, in call order.
//!
//! - isolation levels are set when the transaction begins
//! - nested transactions are savepoints (`sp_1`, `sp_2`, ...)
//! - dropping an open transaction rolls it back

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::driver::Connection;
use crate::error::{QuarryError, Result};
use crate::store::{EntityStore, StoreCore};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Read uncommitted (PostgreSQL treats it as read committed)
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub(crate) fn to_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// An open database transaction
///
/// # Examples
///
/// ```no_run
/// # use quarry::prelude::*;
/// # fn run<E: Entity>(store: &EntityDataStore, entity: &mut E) -> quarry::Result<()> {
/// let tx = store.begin()?;
/// tx.insert(entity)?;
/// tx.commit()?;
/// # Ok(())
/// # }
/// ```
pub struct Transaction {
    core: Arc<StoreCore>,
    depth: u32,
    closed: bool,
}

impl Transaction {
    /// Takes a connection from `parent` and begins a transaction on it.
    pub(crate) fn begin(parent: &StoreCore, isolation: Option<IsolationLevel>) -> Result<Self> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        let mut conn = parent.open_connection()?;
        conn.begin(isolation)
            .map_err(|e| QuarryError::statement("BEGIN", e))?;
        log::debug!("transaction started (isolation: {isolation:?})");

        Ok(Self {
            core: Arc::new(parent.bound_to(Arc::new(Mutex::new(conn)))),
            depth: 0,
            closed: false,
        })
    }

    /// Starts a nested transaction (savepoint)
    ///
    /// Rolling the nested transaction back undoes only what was done through it;
    /// the outer transaction stays open.
    ///
    /// # Errors
    ///
    /// [`QuarryError::TransactionClosed`] when this transaction is already finished.
    pub fn begin_nested(&mut self) -> Result<Transaction> {
        if self.closed {
            return Err(QuarryError::TransactionClosed);
        }
        let depth = self.depth + 1;
        self.run(&format!("SAVEPOINT sp_{depth}"))?;
        Ok(Transaction {
            core: Arc::clone(&self.core),
            depth,
            closed: false,
        })
    }

    /// Commits the transaction, or releases the savepoint of a nested one
    ///
    /// # Errors
    ///
    /// [`QuarryError::TransactionClosed`] when already finished, or the driver error.
    pub fn commit(mut self) -> Result<()> {
        if self.closed {
            return Err(QuarryError::TransactionClosed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        // Marked closed first: a failed commit must not be rolled back again on drop
        self.closed = true;
        if self.depth == 0 {
            self.with_conn(|conn| conn.commit())
                .map_err(|e| QuarryError::statement("COMMIT", e))?;
        } else {
            self.run(&format!("RELEASE SAVEPOINT sp_{}", self.depth))?;
        }

        #[cfg(feature = "metrics")]
        METRICS.record_transaction("commit");
        Ok(())
    }

    /// Discards everything done in the transaction (or since the savepoint)
    ///
    /// # Errors
    ///
    /// [`QuarryError::TransactionClosed`] when already finished, or the driver error.
    pub fn rollback(mut self) -> Result<()> {
        if self.closed {
            return Err(QuarryError::TransactionClosed);
        }
        self.closed = true;
        self.undo()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Savepoint nesting depth; 0 for a top-level transaction
    pub fn depth(&self) -> u32 {
        self.depth
    }

    fn undo(&self) -> Result<()> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        #[cfg(feature = "metrics")]
        METRICS.record_transaction("rollback");

        if self.depth == 0 {
            self.with_conn(|conn| conn.rollback())
                .map_err(|e| QuarryError::statement("ROLLBACK", e))
        } else {
            // ROLLBACK TO keeps the savepoint open; release it so the stack unwinds
            self.run(&format!("ROLLBACK TO SAVEPOINT sp_{}", self.depth))?;
            self.run(&format!("RELEASE SAVEPOINT sp_{}", self.depth))
        }
    }

    fn run(&self, sql: &str) -> Result<()> {
        let executor = &self.core.executor;
        self.with_conn(|conn| executor.batch(conn, sql))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut dyn Connection) -> Result<T>) -> Result<T> {
        self.core.with_connection(f)
    }
}

impl EntityStore for Transaction {
    fn core(&self) -> &Arc<StoreCore> {
        &self.core
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!(
                "transaction dropped without commit; rolling back (depth {})",
                self.depth
            );
            self.closed = true;
            if let Err(e) = self.undo() {
                log::warn!("rollback on drop failed: {e}");
            }
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("depth", &self.depth)
            .field("closed", &self.closed)
            .finish()
    }
}
