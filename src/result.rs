//! Query results.
//!
//! A [`QueryResult`] holds a prepared statement, not rows: every call to
//! [`iter`](QueryResult::iter), [`to_list`](QueryResult::to_list) or
//! [`first`](QueryResult::first) runs the query again and maps rows one at a time
//! as the iterator advances. Once [`close`](QueryResult::close) has been called,
//! from any thread, running iterators stop and new iterations fail with
//! [`QuarryError::ResultClosed`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::driver::{BufferedCursor, RowCursor};
use crate::error::{QuarryError, Result};
use crate::reader::ResultReader;
use crate::value::{FromValue, Value};

type Opener = Arc<dyn Fn() -> Result<Box<dyn RowCursor>> + Send + Sync>;

enum Source {
    /// Runs the statement on each iteration
    Statement(Opener),
    /// Rows already read (generated keys of an insert)
    Rows {
        columns: Arc<Vec<String>>,
        rows: Arc<Vec<Vec<Value>>>,
    },
}

/// Rows of an executed query, read as `T`
pub struct QueryResult<T> {
    source: Source,
    reader: Arc<dyn ResultReader<T>>,
    closed: Arc<AtomicBool>,
}

impl<T> QueryResult<T> {
    pub(crate) fn new(
        opener: impl Fn() -> Result<Box<dyn RowCursor>> + Send + Sync + 'static,
        reader: Arc<dyn ResultReader<T>>,
    ) -> Self {
        Self {
            source: Source::Statement(Arc::new(opener)),
            reader,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn from_rows(
        columns: Arc<Vec<String>>,
        rows: Vec<Vec<Value>>,
        reader: Arc<dyn ResultReader<T>>,
    ) -> Self {
        Self {
            source: Source::Rows {
                columns,
                rows: Arc::new(rows),
            },
            reader,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs the query and iterates its rows
    ///
    /// # Errors
    ///
    /// [`QuarryError::ResultClosed`] after [`close`](Self::close), otherwise the
    /// execution error.
    pub fn iter(&self) -> Result<ResultIter<T>> {
        if self.is_closed() {
            return Err(QuarryError::ResultClosed);
        }
        let cursor: Box<dyn RowCursor> = match &self.source {
            Source::Statement(open) => open()?,
            Source::Rows { columns, rows } => Box::new(BufferedCursor::new(
                columns.as_ref().clone(),
                rows.as_ref().clone(),
            )),
        };
        Ok(ResultIter {
            cursor,
            reader: Arc::clone(&self.reader),
            closed: Arc::clone(&self.closed),
        })
    }

    /// Runs the query and collects every row
    pub fn to_list(&self) -> Result<Vec<T>> {
        self.iter()?.collect()
    }

    /// Runs the query and returns its first row, if any
    pub fn first(&self) -> Result<Option<T>> {
        let mut iter = self.iter()?;
        let first = iter.next().transpose();
        iter.cursor.close();
        first
    }

    /// Releases the result; calling it again does nothing
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Handle that closes this result from another thread
    pub fn closer(&self) -> ResultCloser {
        ResultCloser {
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<T> fmt::Debug for QueryResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Statement(_) => "statement",
            Source::Rows { .. } => "rows",
        };
        f.debug_struct("QueryResult")
            .field("source", &source)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Closes a [`QueryResult`] from anywhere
#[derive(Debug, Clone)]
pub struct ResultCloser {
    closed: Arc<AtomicBool>,
}

impl ResultCloser {
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Iterator over one execution of a [`QueryResult`]
pub struct ResultIter<T> {
    cursor: Box<dyn RowCursor>,
    reader: Arc<dyn ResultReader<T>>,
    closed: Arc<AtomicBool>,
}

impl<T> Iterator for ResultIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed.load(Ordering::Acquire) {
            self.cursor.close();
            return None;
        }
        match self.cursor.next_row() {
            Ok(Some(row)) => Some(self.reader.read(self.cursor.columns(), row)),
            Ok(None) => {
                self.cursor.close();
                None
            }
            Err(e) => {
                self.cursor.close();
                Some(Err(e))
            }
        }
    }
}

/// A single computed value, such as a row count
///
/// The computation runs on the first [`value`](Scalar::value) call and its result
/// is kept for later calls.
pub struct Scalar<T> {
    compute: Box<dyn Fn() -> Result<T> + Send + Sync>,
    cached: OnceCell<T>,
}

impl<T: Clone> Scalar<T> {
    pub(crate) fn new(compute: impl Fn() -> Result<T> + Send + Sync + 'static) -> Self {
        Self {
            compute: Box::new(compute),
            cached: OnceCell::new(),
        }
    }

    pub fn value(&self) -> Result<T> {
        self.cached.get_or_try_init(|| (self.compute)()).cloned()
    }
}

impl<T: fmt::Debug> fmt::Debug for Scalar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scalar")
            .field("value", &self.cached.get())
            .finish()
    }
}

/// One row of a projection, with its column labels
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    columns: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Tuple {
    pub fn new(columns: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value at `index` converted to `T`
    ///
    /// # Errors
    ///
    /// [`QuarryError::Conversion`] for an out-of-range index or a value that does
    /// not convert.
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.values.get(index).cloned().ok_or_else(|| {
            QuarryError::Conversion(format!(
                "column index {index} out of range for {} column(s)",
                self.values.len()
            ))
        })?;
        T::from_value(value)
    }

    /// Value of the column labelled `name` (ignoring ASCII case) converted to `T`
    pub fn get_by_name<T: FromValue>(&self, name: &str) -> Result<T> {
        let index = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| QuarryError::Conversion(format!("no column named '{name}'")))?;
        self.get(index)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Column label → value object
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}
