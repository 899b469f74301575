//! Statement execution.
//!
//! Every statement the store runs goes through [`StatementExecutor`], which wraps
//! the driver call with statement listeners, a tracing span and metrics, and tags
//! driver errors with the SQL that caused them.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::driver::{Connection, RowCursor};
use crate::error::{QuarryError, Result};
use crate::listener::StatementListener;
use crate::sql::BoundStatement;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Runs bound statements against a connection
#[derive(Clone, Default)]
pub struct StatementExecutor {
    listeners: Vec<Arc<dyn StatementListener>>,
}

impl StatementExecutor {
    pub fn new(listeners: Vec<Arc<dyn StatementListener>>) -> Self {
        Self { listeners }
    }

    /// Runs a statement that returns rows
    ///
    /// # Errors
    ///
    /// [`QuarryError::StatementExecution`] wrapping the driver error.
    pub fn query(
        &self,
        conn: &mut dyn Connection,
        statement: &BoundStatement,
    ) -> Result<Box<dyn RowCursor>> {
        let sql = statement.sql.as_str();
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_statement_span(sql).entered();

        for listener in &self.listeners {
            listener.before_query(sql, &statement.params);
        }

        let start = Instant::now();
        let result = conn.query(sql, &statement.params).map_err(|e| {
            #[cfg(feature = "metrics")]
            METRICS.record_statement_error();
            QuarryError::statement(sql, e)
        });

        let duration = start.elapsed();
        #[cfg(feature = "metrics")]
        METRICS.record_statement(duration);
        log::trace!("query took {duration:?}");

        let cursor = result?;
        for listener in &self.listeners {
            listener.after_query(sql);
        }
        Ok(cursor)
    }

    /// Runs an insert, update or delete and returns the affected row count
    ///
    /// # Errors
    ///
    /// [`QuarryError::StatementExecution`] wrapping the driver error.
    pub fn update(&self, conn: &mut dyn Connection, statement: &BoundStatement) -> Result<u64> {
        let sql = statement.sql.as_str();
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_statement_span(sql).entered();

        for listener in &self.listeners {
            listener.before_update(sql, &statement.params);
        }

        let start = Instant::now();
        let result = conn.execute(sql, &statement.params).map_err(|e| {
            #[cfg(feature = "metrics")]
            METRICS.record_statement_error();
            QuarryError::statement(sql, e)
        });

        let duration = start.elapsed();
        #[cfg(feature = "metrics")]
        METRICS.record_statement(duration);
        log::trace!("update took {duration:?}");

        let affected = result?;
        for listener in &self.listeners {
            listener.after_update(sql, affected);
        }
        Ok(affected)
    }

    /// Runs parameterless statements (DDL, savepoints)
    ///
    /// # Errors
    ///
    /// [`QuarryError::StatementExecution`] wrapping the driver error.
    pub fn batch(&self, conn: &mut dyn Connection, sql: &str) -> Result<()> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_statement_span(sql).entered();

        for listener in &self.listeners {
            listener.before_update(sql, &[]);
        }

        let start = Instant::now();
        let result = conn.execute_batch(sql).map_err(|e| {
            #[cfg(feature = "metrics")]
            METRICS.record_statement_error();
            QuarryError::statement(sql, e)
        });

        let duration = start.elapsed();
        #[cfg(feature = "metrics")]
        METRICS.record_statement(duration);
        log::trace!("batch took {duration:?}");

        result
    }
}

impl fmt::Debug for StatementExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementExecutor")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
