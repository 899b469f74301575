//! Storage driver boundary.
//!
//! Everything above this module talks to the database through [`Connection`]
//! and [`RowCursor`] using [`Value`] parameters; the SQLite and PostgreSQL
//! drivers translate to `rusqlite` and `may_postgres`.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::sql::Platform;
use crate::transaction::IsolationLevel;
use crate::value::Value;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PostgresProvider;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteProvider;

/// One open database connection
///
/// A connection is owned by a single code path at a time: the store holds it for
/// the length of one operation, or a [`Transaction`](crate::Transaction) holds it
/// until commit or rollback.
pub trait Connection: Send {
    /// Runs a statement and returns the number of affected rows
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Runs a statement that returns rows
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Box<dyn RowCursor>>;

    /// Runs one or more parameterless statements (DDL)
    fn execute_batch(&mut self, sql: &str) -> Result<()>;

    fn begin(&mut self, isolation: Option<IsolationLevel>) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    /// A transaction is open on this connection
    fn in_transaction(&self) -> bool;

    /// Sizes the prepared statement cache, where the driver has one
    fn set_statement_cache_capacity(&mut self, _capacity: usize) {}
}

/// Hands out connections to one database
pub trait ConnectionProvider: Send + Sync + fmt::Debug {
    fn connection(&self) -> Result<Box<dyn Connection>>;

    fn platform(&self) -> Arc<dyn Platform>;
}

/// Rows produced by one execution
pub trait RowCursor: Send {
    /// Column labels, in result order
    fn columns(&self) -> &Arc<Vec<String>>;

    /// Next row, `None` once exhausted or closed
    fn next_row(&mut self) -> Result<Option<Vec<Value>>>;

    /// Releases the rows; further calls to [`next_row`](Self::next_row) return `None`
    fn close(&mut self);
}

/// Cursor over rows already read from the driver
#[derive(Debug)]
pub struct BufferedCursor {
    columns: Arc<Vec<String>>,
    rows: std::vec::IntoIter<Vec<Value>>,
    closed: bool,
}

impl BufferedCursor {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: Arc::new(columns),
            rows: rows.into_iter(),
            closed: false,
        }
    }

    pub fn remaining(&self) -> usize {
        if self.closed {
            0
        } else {
            self.rows.len()
        }
    }
}

impl RowCursor for BufferedCursor {
    fn columns(&self) -> &Arc<Vec<String>> {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.rows.next())
    }

    fn close(&mut self) {
        self.closed = true;
        self.rows = Vec::new().into_iter();
    }
}
